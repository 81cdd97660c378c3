use crate::{EmbedResponse, EmbeddingProvider, ProviderError};

/// Deterministic feature-hashing embedder. No network, no model weights:
/// each token is hashed with blake3 into a signed bucket and the result is
/// L2-normalized. Token overlap between texts translates into vector
/// proximity, which is enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashProvider {
    dimension: usize,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let h = u64::from_le_bytes(bytes[..8].try_into().expect("8-byte slice"));
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: texts.iter().map(|t| self.embed_one(t)).collect(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        format!("hash#{}", self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let p = HashProvider::new(64);
        let texts = vec!["SQL injection in login".to_string()];
        let a = p.embed(&texts).await.unwrap();
        let b = p.embed(&texts).await.unwrap();
        assert_eq!(a.vectors, b.vectors);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let p = HashProvider::new(64);
        let texts = vec!["buffer overflow in parser".to_string()];
        let resp = p.embed(&texts).await.unwrap();
        let norm: f32 = resp.vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_text_is_closer_than_disjoint() {
        let p = HashProvider::new(128);
        let texts = vec![
            "SQL injection in login".to_string(),
            "SQL injection".to_string(),
            "kernel race condition".to_string(),
        ];
        let resp = p.embed(&texts).await.unwrap();
        let d = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
        };
        let near = d(&resp.vectors[0], &resp.vectors[1]);
        let far = d(&resp.vectors[0], &resp.vectors[2]);
        assert!(near < far);
    }
}
