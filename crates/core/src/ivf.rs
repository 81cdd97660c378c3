//! IVF-Flat approximate nearest-neighbor index.
//!
//! A k-means-trained coarse quantizer splits the vector space into `nlist`
//! partitions; each vector lives in the inverted list of its nearest
//! centroid. A query scans the `nprobe` closest partitions and ranks
//! candidates by squared Euclidean distance (monotonic with cosine distance
//! over normalized vectors, lower is better).

use serde::{Deserialize, Serialize};
use thiserror::Error;

const KMEANS_MAX_ITERS: usize = 25;

#[derive(Debug, Error)]
pub enum IvfError {
    #[error("dimension mismatch: index built for {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("cannot train on an empty vector set")]
    EmptyTrainingSet,
    #[error("invalid partition count {nlist} for {count} vectors")]
    InvalidPartitionCount { nlist: usize, count: usize },
}

/// `nlist = max(1, min(round(sqrt(n)), n))` — non-degenerate for both tiny
/// and large corpora.
pub fn partition_count(n: usize) -> usize {
    ((n as f64).sqrt().round() as usize).clamp(1, n.max(1))
}

/// Search breadth: a speed/recall compromise, never wider than the index.
pub fn probe_count(nlist: usize) -> usize {
    nlist.min(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfFlatIndex {
    dim: usize,
    nlist: usize,
    nprobe: usize,
    centroids: Vec<f32>,
    lists: Vec<Vec<u32>>,
    vectors: Vec<f32>,
}

impl IvfFlatIndex {
    /// Train the coarse quantizer on the full training set.
    ///
    /// Seeding is deterministic (evenly spaced training vectors) so repeated
    /// builds over the same corpus produce the same partitioning.
    pub fn train(
        dim: usize,
        nlist: usize,
        nprobe: usize,
        training: &[Vec<f32>],
    ) -> Result<Self, IvfError> {
        if training.is_empty() {
            return Err(IvfError::EmptyTrainingSet);
        }
        if nlist == 0 || nlist > training.len() || nprobe > nlist {
            return Err(IvfError::InvalidPartitionCount {
                nlist,
                count: training.len(),
            });
        }
        for v in training {
            if v.len() != dim {
                return Err(IvfError::DimensionMismatch {
                    expected: dim,
                    got: v.len(),
                });
            }
        }

        let n = training.len();
        let mut centroids: Vec<f32> = (0..nlist)
            .flat_map(|i| training[i * n / nlist].iter().copied())
            .collect();
        let mut assignments = vec![usize::MAX; n];

        for _ in 0..KMEANS_MAX_ITERS {
            let mut changed = false;
            for (vi, v) in training.iter().enumerate() {
                let nearest = nearest_centroid(&centroids, dim, nlist, v);
                if assignments[vi] != nearest {
                    assignments[vi] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![0f32; nlist * dim];
            let mut counts = vec![0usize; nlist];
            for (vi, v) in training.iter().enumerate() {
                let c = assignments[vi];
                counts[c] += 1;
                for (d, x) in v.iter().enumerate() {
                    sums[c * dim + d] += x;
                }
            }
            for c in 0..nlist {
                // An empty partition keeps its previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                for d in 0..dim {
                    centroids[c * dim + d] = sums[c * dim + d] / counts[c] as f32;
                }
            }
        }

        Ok(Self {
            dim,
            nlist,
            nprobe,
            centroids,
            lists: vec![Vec::new(); nlist],
            vectors: Vec::new(),
        })
    }

    /// Insert a vector, returning its position in insertion order.
    pub fn add(&mut self, vector: &[f32]) -> Result<u32, IvfError> {
        if vector.len() != self.dim {
            return Err(IvfError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let position = (self.vectors.len() / self.dim) as u32;
        let c = nearest_centroid(&self.centroids, self.dim, self.nlist, vector);
        self.lists[c].push(position);
        self.vectors.extend_from_slice(vector);
        Ok(position)
    }

    /// Up to `k` (distance, position) pairs in ascending distance order,
    /// scanning the `nprobe` partitions closest to the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, u32)>, IvfError> {
        if query.len() != self.dim {
            return Err(IvfError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 || self.len() == 0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(f32, usize)> = (0..self.nlist)
            .map(|c| {
                let centroid = &self.centroids[c * self.dim..(c + 1) * self.dim];
                (l2_sq(centroid, query), c)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut hits: Vec<(f32, u32)> = Vec::new();
        for &(_, c) in ranked.iter().take(self.nprobe) {
            for &position in &self.lists[c] {
                let start = position as usize * self.dim;
                let stored = &self.vectors[start..start + self.dim];
                hits.push((l2_sq(stored, query), position));
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.vectors.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }
}

fn nearest_centroid(centroids: &[f32], dim: usize, nlist: usize, v: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for c in 0..nlist {
        let d = l2_sq(&centroids[c * dim..(c + 1) * dim], v);
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    best
}

fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
