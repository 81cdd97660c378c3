use crate::config::AppConfig;
use crate::cvss;
use crate::index::VulnerabilityIndex;
use crate::ingest;
use crate::models::{EnrichedVulnerability, MatchedVulnerability, ResolvedCvss};
use crate::severity::Severity;
use anyhow::{bail, Context};
use providers::hash::HashProvider;
use providers::noop::NoopProvider;
use providers::ollama::{OllamaConfig, OllamaProvider};
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{with_retry, ProviderRegistry, RetryPolicy, TextGenerator};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::ArtifactPaths;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub loaded: usize,
    pub indexed: usize,
    pub nlist: usize,
}

#[derive(Debug, Default)]
pub struct EnrichSummary {
    pub loaded: usize,
    pub enriched: usize,
    pub skipped: usize,
}

/// One-shot index build: ingest -> embed -> train -> persist.
pub async fn run_build(config: &AppConfig, inputs: &[PathBuf]) -> anyhow::Result<BuildSummary> {
    let records = ingest::load_records(inputs);
    if records.is_empty() {
        bail!("no valid input records; not writing an index artifact");
    }

    let registry = build_registry(config);
    let provider = registry.embedding(None)?;
    let retry = retry_policy(config);

    let index = VulnerabilityIndex::build(
        &records,
        provider.as_ref(),
        config.embeddings.batch_size,
        &retry,
    )
    .await
    .context("index build")?;

    let paths = ArtifactPaths::new(&config.index.dir);
    index.save(&paths).context("index persist")?;

    Ok(BuildSummary {
        loaded: records.len(),
        indexed: index.len(),
        nlist: index.nlist(),
    })
}

/// Batch enrichment: match -> resolve -> classify -> generate -> emit.
///
/// A missing or incompatible index disables matching (resolution falls
/// through to domain defaults); a failing generator substitutes the
/// configured fallback message. Only records with no description or no
/// resolvable base score are skipped.
pub async fn run_enrich(
    config: &AppConfig,
    inputs: &[PathBuf],
    output: &Path,
) -> anyhow::Result<EnrichSummary> {
    let records = ingest::load_records(inputs);
    if records.is_empty() {
        bail!("no valid input records; not writing an output artifact");
    }

    let registry = build_registry(config);
    let provider = registry.embedding(None)?;
    let generator = registry.generator(None)?;
    let retry = retry_policy(config);

    let index = match VulnerabilityIndex::load(&ArtifactPaths::new(&config.index.dir), provider.as_ref())
    {
        Ok(index) => Some(index),
        Err(e) => {
            warn!("vector index unavailable, matching disabled: {}", e);
            None
        }
    };

    let mut summary = EnrichSummary {
        loaded: records.len(),
        ..Default::default()
    };
    let mut enriched = Vec::with_capacity(records.len());

    for record in &records {
        let matched = match &index {
            Some(index) => {
                match index
                    .query(
                        provider.as_ref(),
                        std::slice::from_ref(&record.description),
                        config.index.top_k,
                        &retry,
                    )
                    .await
                {
                    Ok(mut results) => results.pop().unwrap_or_default().into_iter().next(),
                    Err(e) => {
                        warn!("index query failed, continuing without a match: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let empty = BTreeMap::new();
        let matched_metrics = matched.as_ref().map(|m| &m.entry.cvss).unwrap_or(&empty);
        let resolved = cvss::score_record(
            &record.description,
            &record.cvss,
            matched_metrics,
            config.scoring.temporal_fallback,
        );

        if resolved.base_score.is_none() {
            warn!(
                "skipping record {} with unresolvable base score",
                record.id.as_deref().unwrap_or("<unknown>")
            );
            summary.skipped += 1;
            continue;
        }

        let severity = Severity::from_score(resolved.base_score);
        let solution = generate_solution(
            generator.as_ref(),
            &retry,
            &resolved,
            matched.as_ref(),
            &config.generation.fallback_message,
        )
        .await;

        enriched.push(EnrichedVulnerability {
            description: resolved.description.clone(),
            cvss_vector: resolved.base_vector.clone(),
            base_score: resolved.base_score,
            temporal_score: resolved.temporal_score,
            environmental_score: resolved.environmental_score,
            severity: severity.to_string(),
            solution,
        });
        summary.enriched += 1;
    }

    storage::save_json(output, &enriched).context("write enriched output")?;
    info!(
        "wrote {} enriched records to {}",
        enriched.len(),
        output.display()
    );
    Ok(summary)
}

/// Semantic lookup against the persisted index. An unbuilt or incompatible
/// index yields an empty result set, not an error.
pub async fn run_search(
    config: &AppConfig,
    query: &str,
    k: usize,
) -> anyhow::Result<Vec<MatchedVulnerability>> {
    let registry = build_registry(config);
    let provider = registry.embedding(None)?;
    let retry = retry_policy(config);

    let index =
        match VulnerabilityIndex::load(&ArtifactPaths::new(&config.index.dir), provider.as_ref()) {
            Ok(index) => index,
            Err(e) => {
                warn!("vector index unavailable: {}", e);
                return Ok(Vec::new());
            }
        };
    let mut results = index
        .query(provider.as_ref(), &[query.to_string()], k, &retry)
        .await?;
    Ok(results.pop().unwrap_or_default())
}

async fn generate_solution(
    generator: &dyn TextGenerator,
    retry: &RetryPolicy,
    resolved: &ResolvedCvss,
    matched: Option<&MatchedVulnerability>,
    fallback: &str,
) -> String {
    let matched_solution = matched
        .map(|m| m.entry.solution.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("None");
    let cvss_context = format!(
        "Base Score: {}, Temporal Score: {}, Environmental Score: {}, Vector: {}",
        fmt_score(resolved.base_score),
        fmt_score(resolved.temporal_score),
        fmt_score(resolved.environmental_score),
        resolved.base_vector
    );
    let prompt = format!(
        "You are a security expert. Based on the following vulnerability \
         description, CVSS context, and any existing solution, provide a \
         practical, actionable remediation. Keep it concise.\n\n\
         Description: {}\nCVSS context: {}\nExisting solution: {}\n\nSolution:",
        resolved.description, cvss_context, matched_solution
    );

    match with_retry(retry, || generator.generate(&prompt)).await {
        Ok(resp) => resp.text,
        Err(e) => {
            warn!("text generation failed, using fallback: {}", e);
            fallback.to_string()
        }
    }
}

fn fmt_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.1}", s),
        None => "n/a".to_string(),
    }
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", Arc::new(NoopProvider))
        .with_generator("noop", Arc::new(NoopProvider))
        .with_embedding(
            "hash",
            Arc::new(HashProvider::new(config.embeddings.dimension)),
        );

    if let (Ok(key), Ok(base)) = (
        std::env::var("OPENAI_API_KEY"),
        std::env::var("OPENAI_BASE_URL"),
    ) {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key,
            base_url: base,
            embedding_model: config.embeddings.model.clone(),
            dimension: config.embeddings.dimension,
        });
        reg = reg.with_embedding("openai", Arc::new(provider));
    }

    let ollama = OllamaProvider::new(OllamaConfig {
        base_url: config.generation.url.clone(),
        model: config.generation.model.clone(),
        timeout: Duration::from_secs(config.generation.timeout_secs),
    });
    reg = reg.with_generator("ollama", Arc::new(ollama));

    reg.set_preferred_embedding(&config.embeddings.provider)
        .set_preferred_generator(&config.generation.provider)
}

pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.retry.max_attempts.max(1),
        backoff: Duration::from_secs(config.retry.backoff_secs),
    }
}
