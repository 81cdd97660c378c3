use std::fs;
use std::path::Path;
use tempfile::tempdir;
use triage_core::config::{
    AppConfig, EmbeddingConfig, GenerationConfig, IndexConfig, RetryConfig, ScoringConfig,
};
use triage_core::models::EnrichedVulnerability;
use triage_core::pipeline;

fn test_config(index_dir: &Path) -> AppConfig {
    AppConfig {
        index: IndexConfig {
            dir: index_dir.to_string_lossy().into_owned(),
            top_k: 1,
        },
        embeddings: EmbeddingConfig {
            provider: "hash".to_string(),
            model: String::new(),
            dimension: 64,
            batch_size: 8,
        },
        generation: GenerationConfig {
            provider: "noop".to_string(),
            model: String::new(),
            url: "http://localhost:11434".to_string(),
            timeout_secs: 1,
            fallback_message: "consult your security team".to_string(),
        },
        retry: RetryConfig {
            max_attempts: 1,
            backoff_secs: 0,
        },
        scoring: ScoringConfig {
            temporal_fallback: None,
        },
    }
}

#[tokio::test]
async fn build_then_search_finds_the_indexed_record() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("vulns.json");
    fs::write(
        &input,
        r#"[{"description": "SQL injection in login", "id": "V1"}]"#,
    )
    .unwrap();

    let cfg = test_config(&temp.path().join("index"));
    let summary = pipeline::run_build(&cfg, &[input]).await.unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.nlist, 1);
    assert!(temp.path().join("index").join("index.bin").exists());
    assert!(temp.path().join("index").join("metadata.json").exists());
    assert!(temp.path().join("index").join("provider.json").exists());

    let results = pipeline::run_search(&cfg, "SQL injection", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entry.id, "V1");
    assert!(results[0].distance < 1.0);

    // Querying with the exact indexed text embeds to the same vector.
    let exact = pipeline::run_search(&cfg, "SQL injection in login", 1)
        .await
        .unwrap();
    assert!(exact[0].distance < 1e-5);
}

#[tokio::test]
async fn search_without_an_index_returns_empty() {
    let temp = tempdir().unwrap();
    let cfg = test_config(&temp.path().join("missing-index"));
    let results = pipeline::run_search(&cfg, "anything", 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn build_with_no_valid_records_writes_nothing() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("vulns.json");
    fs::write(&input, r#"[{"id": "V1", "description": ""}]"#).unwrap();

    let cfg = test_config(&temp.path().join("index"));
    assert!(pipeline::run_build(&cfg, &[input]).await.is_err());
    assert!(!temp.path().join("index").join("index.bin").exists());
}

#[tokio::test]
async fn enrich_produces_scored_records_with_fallback_solution() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("vulns.json");
    fs::write(
        &input,
        r#"[{
            "id": "V1",
            "synopsis": "auth bypass",
            "description": "Remote code execution in the admin console",
            "cvss": {"C": "H", "I": "H", "A": "H"},
            "solution": "Apply vendor patch 1.2.3"
        }]"#,
    )
    .unwrap();

    let cfg = test_config(&temp.path().join("index"));
    pipeline::run_build(&cfg, &[input.clone()]).await.unwrap();

    let output = temp.path().join("enriched.json");
    let summary = pipeline::run_enrich(&cfg, &[input], &output).await.unwrap();
    assert_eq!(summary.enriched, 1);
    assert_eq!(summary.skipped, 0);

    let enriched: Vec<EnrichedVulnerability> =
        serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(enriched.len(), 1);
    let record = &enriched[0];
    assert!(record.cvss_vector.starts_with("CVSS:3.1/"));
    assert_eq!(record.base_score, Some(9.8));
    assert_eq!(record.severity, "Critical");
    // Noop generator always errors, so the configured fallback comes through.
    assert_eq!(record.solution, "consult your security team");
}

#[tokio::test]
async fn enrich_without_an_index_degrades_to_defaults() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("vulns.json");
    fs::write(
        &input,
        r#"[{"id": "V1", "description": "Information disclosure in logs"}]"#,
    )
    .unwrap();

    // Index directory was never built.
    let cfg = test_config(&temp.path().join("missing-index"));
    let output = temp.path().join("enriched.json");
    let summary = pipeline::run_enrich(&cfg, &[input], &output).await.unwrap();
    assert_eq!(summary.enriched, 1);

    let enriched: Vec<EnrichedVulnerability> =
        serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    // All metrics fall through to domain defaults: a zero-impact vector.
    assert_eq!(
        enriched[0].cvss_vector,
        "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"
    );
    assert_eq!(enriched[0].base_score, Some(0.0));
    assert_eq!(enriched[0].severity, "Low");
}

#[tokio::test]
async fn enrich_overwrites_previous_output() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("vulns.json");
    fs::write(
        &input,
        r#"[{"id": "V1", "description": "Path traversal in file export"}]"#,
    )
    .unwrap();

    let cfg = test_config(&temp.path().join("index"));
    pipeline::run_build(&cfg, &[input.clone()]).await.unwrap();

    let output = temp.path().join("enriched.json");
    fs::write(&output, "[{\"stale\": true}]").unwrap();
    pipeline::run_enrich(&cfg, &[input], &output).await.unwrap();

    let enriched: Vec<EnrichedVulnerability> =
        serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].description, "Path traversal in file export");
}
