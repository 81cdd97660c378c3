//! Loads vulnerability records from JSON sources.
//!
//! Each source must be a JSON array of objects. A malformed source is
//! skipped; a malformed or description-less record is dropped. Neither
//! aborts the batch.

use crate::models::VulnerabilityRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Load records from files and/or directories (a directory contributes its
/// `*.json` children).
pub fn load_records(inputs: &[PathBuf]) -> Vec<VulnerabilityRecord> {
    let mut records = Vec::new();
    let mut sources = 0usize;
    for path in expand_inputs(inputs) {
        match load_source(&path) {
            Ok(mut batch) => {
                sources += 1;
                records.append(&mut batch);
            }
            Err(e) => error!("skipping source {}: {}", path.display(), e),
        }
    }
    info!("loaded {} records from {} sources", records.len(), sources);
    records
}

fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            match fs::read_dir(input) {
                Ok(dir) => {
                    let mut children: Vec<PathBuf> = dir
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                        .collect();
                    children.sort();
                    paths.extend(children);
                }
                Err(e) => error!("cannot read directory {}: {}", input.display(), e),
            }
        } else {
            paths.push(input.clone());
        }
    }
    paths
}

fn load_source(path: &Path) -> anyhow::Result<Vec<VulnerabilityRecord>> {
    let bytes = fs::read(path)?;
    // Root must be a JSON array; elements are validated individually.
    let values: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;

    let mut records = Vec::with_capacity(values.len());
    let mut dropped = 0usize;
    for value in values {
        match serde_json::from_value::<VulnerabilityRecord>(value) {
            Ok(record) if !record.description.trim().is_empty() => records.push(record),
            Ok(record) => {
                warn!(
                    "dropping record {} with empty description",
                    record.id.as_deref().unwrap_or("<unknown>")
                );
                dropped += 1;
            }
            Err(e) => {
                warn!("dropping malformed record in {}: {}", path.display(), e);
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        warn!("{}: dropped {} invalid records", path.display(), dropped);
    }
    Ok(records)
}
