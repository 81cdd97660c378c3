use providers::{with_retry, EmbeddingProvider, ProviderError, RetryPolicy};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("embedding dimension mismatch: provider declares {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("provider returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },
}

/// Embed a batch of texts in chunks, with bounded retry per chunk.
///
/// Vectors are L2-normalized here rather than trusted from the provider,
/// and every vector is checked against the provider's declared dimension.
pub async fn embed_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    retry: &RetryPolicy,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let batch_size = batch_size.max(1);
    let expected = provider.dimension();
    let mut vectors = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let resp = with_retry(retry, || provider.embed(chunk)).await?;
        if resp.vectors.len() != chunk.len() {
            return Err(EmbedError::CountMismatch {
                expected: chunk.len(),
                got: resp.vectors.len(),
            });
        }
        for mut v in resp.vectors {
            if v.len() != expected {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    got: v.len(),
                });
            }
            normalize(&mut v);
            vectors.push(v);
        }
        debug!("embedded {}/{} texts", vectors.len(), texts.len());
    }

    Ok(vectors)
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}
