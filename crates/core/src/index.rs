//! Vulnerability index: ANN structure plus position-aligned metadata.
//!
//! Built once per run from the full record set, persisted, then reloaded
//! read-only for queries. The metadata arena is keyed by insertion order;
//! an id→position map resolves external ids, last write wins.

use crate::embeddings::{self, EmbedError};
use crate::ivf::{self, IvfError, IvfFlatIndex};
use crate::models::{IndexedVulnerability, MatchedVulnerability, VulnerabilityRecord};
use providers::{EmbeddingProvider, RetryPolicy};
use std::collections::HashMap;
use storage::{ArtifactPaths, ProviderRecord, StorageError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no valid records to index")]
    NoValidRecords,
    #[error("embedding provider has zero dimension")]
    ZeroDimension,
    #[error("embedding provider mismatch: index built with {stored}, active is {active}")]
    ProviderMismatch { stored: String, active: String },
    #[error("dimension mismatch: index built for {expected}, active provider has {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Ivf(#[from] IvfError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
pub struct VulnerabilityIndex {
    ivf: IvfFlatIndex,
    entries: Vec<IndexedVulnerability>,
    by_id: HashMap<String, usize>,
    provider: ProviderRecord,
}

impl VulnerabilityIndex {
    /// Build from scratch: embed every valid record, size and train the
    /// partitioning, insert all vectors. Records without a usable
    /// description are dropped with a diagnostic; zero valid records abort
    /// the build before anything is written.
    pub async fn build(
        records: &[VulnerabilityRecord],
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
        retry: &RetryPolicy,
    ) -> Result<Self, IndexError> {
        if provider.dimension() == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut texts = Vec::new();
        let mut entries = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            if record.description.trim().is_empty() {
                warn!("skipping record {} with missing/empty description", idx);
                continue;
            }
            let id = record
                .id
                .clone()
                .unwrap_or_else(|| format!("vuln_{}", entries.len()));
            texts.push(record.embedding_text());
            entries.push(IndexedVulnerability {
                id,
                title: record.title.clone(),
                synopsis: record.synopsis.clone(),
                description: record.description.clone(),
                cvss: record.cvss.clone(),
                solution: record.solution.clone(),
            });
        }
        if entries.is_empty() {
            return Err(IndexError::NoValidRecords);
        }

        let vectors = embeddings::embed_batches(provider, &texts, batch_size, retry).await?;

        let n = vectors.len();
        let nlist = ivf::partition_count(n);
        let nprobe = ivf::probe_count(nlist);
        info!("indexing {} vectors with nlist={} nprobe={}", n, nlist, nprobe);

        let mut index = IvfFlatIndex::train(provider.dimension(), nlist, nprobe, &vectors)?;
        for v in &vectors {
            index.add(v)?;
        }

        let by_id = build_id_map(&entries);

        Ok(Self {
            ivf: index,
            entries,
            by_id,
            provider: ProviderRecord {
                fingerprint: provider.fingerprint(),
                dimension: provider.dimension(),
            },
        })
    }

    pub fn save(&self, paths: &ArtifactPaths) -> Result<(), IndexError> {
        storage::save_blob(&paths.index(), &self.ivf)?;
        storage::save_json(&paths.metadata(), &self.entries)?;
        storage::save_json(&paths.provider(), &self.provider)?;
        info!(
            "persisted index with {} entries to {}",
            self.entries.len(),
            paths.dir.display()
        );
        Ok(())
    }

    /// Reload a persisted index for querying. The active embedding provider
    /// must match the one recorded at build time; re-embedding queries with
    /// anything else would make the distances meaningless.
    pub fn load(
        paths: &ArtifactPaths,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self, IndexError> {
        let record: ProviderRecord = storage::load_json(&paths.provider())?;
        if record.fingerprint != provider.fingerprint() {
            return Err(IndexError::ProviderMismatch {
                stored: record.fingerprint,
                active: provider.fingerprint(),
            });
        }
        if record.dimension != provider.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: record.dimension,
                got: provider.dimension(),
            });
        }
        let ivf: IvfFlatIndex = storage::load_blob(&paths.index())?;
        if ivf.dim() != record.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: ivf.dim(),
                got: record.dimension,
            });
        }
        let entries: Vec<IndexedVulnerability> = storage::load_json(&paths.metadata())?;
        let by_id = build_id_map(&entries);
        info!(
            "loaded index with {} entries from {}",
            entries.len(),
            paths.dir.display()
        );
        Ok(Self {
            ivf,
            entries,
            by_id,
            provider: record,
        })
    }

    /// Batch nearest-neighbor lookup: per query, up to `k` metadata copies
    /// with their distances, ascending. Positions the ANN structure reports
    /// outside the arena are dropped rather than padded.
    pub async fn query(
        &self,
        provider: &dyn EmbeddingProvider,
        queries: &[String],
        k: usize,
        retry: &RetryPolicy,
    ) -> Result<Vec<Vec<MatchedVulnerability>>, IndexError> {
        if provider.dimension() != self.ivf.dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.ivf.dim(),
                got: provider.dimension(),
            });
        }
        let vectors =
            embeddings::embed_batches(provider, queries, queries.len().max(1), retry).await?;

        let mut results = Vec::with_capacity(queries.len());
        for v in &vectors {
            let hits = self.ivf.search(v, k)?;
            let mut matches = Vec::with_capacity(hits.len());
            for (distance, position) in hits {
                match self.entries.get(position as usize) {
                    Some(entry) => matches.push(MatchedVulnerability {
                        entry: entry.clone(),
                        distance,
                    }),
                    None => warn!("dropping out-of-range index position {}", position),
                }
            }
            results.push(matches);
        }
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nlist(&self) -> usize {
        self.ivf.nlist()
    }

    /// Arena position for an external id, if indexed.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn entry(&self, position: usize) -> Option<&IndexedVulnerability> {
        self.entries.get(position)
    }
}

fn build_id_map(entries: &[IndexedVulnerability]) -> HashMap<String, usize> {
    let mut by_id = HashMap::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        if by_id.insert(entry.id.clone(), position).is_some() {
            warn!("duplicate id {}: keeping the later entry", entry.id);
        }
    }
    by_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::hash::HashProvider;
    use std::collections::BTreeMap;

    fn record(id: &str, description: &str) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: Some(id.to_string()),
            title: String::new(),
            synopsis: String::new(),
            description: description.to_string(),
            cvss: BTreeMap::new(),
            solution: String::new(),
            impact: String::new(),
        }
    }

    #[tokio::test]
    async fn build_skips_empty_descriptions() {
        let provider = HashProvider::new(32);
        let records = vec![record("V1", "SQL injection in login"), record("V2", "  ")];
        let index = VulnerabilityIndex::build(&records, &provider, 8, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.nlist(), 1);
    }

    #[tokio::test]
    async fn build_with_no_valid_records_fails() {
        let provider = HashProvider::new(32);
        let records = vec![record("V1", "")];
        let err = VulnerabilityIndex::build(&records, &provider, 8, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NoValidRecords));
    }

    #[tokio::test]
    async fn duplicate_ids_keep_last_entry() {
        let provider = HashProvider::new(32);
        let records = vec![
            record("V1", "stack overflow in codec"),
            record("V1", "heap overflow in parser"),
        ];
        let index = VulnerabilityIndex::build(&records, &provider, 8, &RetryPolicy::default())
            .await
            .unwrap();
        let pos = index.position_of("V1").unwrap();
        assert_eq!(pos, 1);
        assert_eq!(index.entry(pos).unwrap().description, "heap overflow in parser");
    }

    #[tokio::test]
    async fn save_load_query_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(temp.path().join("index"));
        let provider = HashProvider::new(64);
        let records = vec![
            record("V1", "SQL injection in login form"),
            record("V2", "kernel use after free"),
            record("V3", "cross site scripting in search page"),
        ];
        let retry = RetryPolicy::default();
        let built = VulnerabilityIndex::build(&records, &provider, 8, &retry)
            .await
            .unwrap();
        built.save(&paths).unwrap();

        let loaded = VulnerabilityIndex::load(&paths, &provider).unwrap();
        assert_eq!(loaded.len(), 3);

        let results = loaded
            .query(&provider, &["SQL injection".to_string()], 1, &retry)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[0][0].entry.id, "V1");
    }

    #[tokio::test]
    async fn load_rejects_provider_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(temp.path().join("index"));
        let provider = HashProvider::new(64);
        let records = vec![record("V1", "open redirect")];
        let retry = RetryPolicy::default();
        let built = VulnerabilityIndex::build(&records, &provider, 8, &retry)
            .await
            .unwrap();
        built.save(&paths).unwrap();

        let other = HashProvider::new(32);
        let err = VulnerabilityIndex::load(&paths, &other).unwrap_err();
        assert!(matches!(err, IndexError::ProviderMismatch { .. }));
    }
}
