use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One source vulnerability as ingested. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    #[serde(default, alias = "notification_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    pub description: String,
    #[serde(default, alias = "cvss_vector")]
    pub cvss: BTreeMap<String, String>,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub impact: String,
}

impl VulnerabilityRecord {
    /// Text fed to the embedding provider at build and query time.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.synopsis, self.description)
            .trim()
            .to_string()
    }
}

/// Positional copy of the display fields stored next to each indexed vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVulnerability {
    pub id: String,
    pub title: String,
    pub synopsis: String,
    pub description: String,
    pub cvss: BTreeMap<String, String>,
    pub solution: String,
}

/// A metadata copy returned from a nearest-neighbor lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedVulnerability {
    #[serde(flatten)]
    pub entry: IndexedVulnerability,
    pub distance: f32,
}

/// Canonical CVSS vectors and scores resolved for one vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedCvss {
    pub description: String,
    pub base_vector: String,
    pub base_score: Option<f64>,
    pub temporal_vector: Option<String>,
    pub temporal_score: Option<f64>,
    pub environmental_vector: Option<String>,
    pub environmental_score: Option<f64>,
}

/// Final per-record output written by the enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedVulnerability {
    pub description: String,
    pub cvss_vector: String,
    pub base_score: Option<f64>,
    pub temporal_score: Option<f64>,
    pub environmental_score: Option<f64>,
    pub severity: String,
    pub solution: String,
}
