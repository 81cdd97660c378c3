use crate::{EmbedResponse, EmbeddingProvider, GenerateResponse, ProviderError, TextGenerator};

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for NoopProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: vec![vec![]; texts.len()],
        })
    }

    fn dimension(&self) -> usize {
        0
    }

    fn fingerprint(&self) -> String {
        "noop".to_string()
    }
}

#[async_trait::async_trait]
impl TextGenerator for NoopProvider {
    async fn generate(&self, _prompt: &str) -> Result<GenerateResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
