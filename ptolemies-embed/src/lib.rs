//! Batched external-provider calls producing fixed-dimension vectors (C5).

mod error;
mod model;

pub use error::EmbedError;
pub use model::{normalize, EmbeddingModel, MockEmbedder, OpenAiCompatible};

use ptolemies_core::backoff::Backoff;
use std::sync::Arc;

pub struct EmbedOutcome {
    /// One entry per input, `None` where embedding failed after exhausting
    /// retries — the chunk remains storable but unsearchable (§4.5).
    pub vectors: Vec<Option<Vec<f32>>>,
}

pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    batch_max: usize,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>, batch_max: usize) -> Self {
        Self { model, batch_max }
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn model_name(&self) -> String {
        self.model.model_name().to_string()
    }

    /// `embed(batch) -> list<vector<D>>` with the retry/backoff/splitting
    /// policy from §4.5. Splits `inputs` into batches of at most
    /// `batch_max`, preserving input order in the returned outcome.
    pub async fn embed(&self, inputs: &[String]) -> EmbedOutcome {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_max) {
            let results = self.embed_batch_with_retry(batch).await;
            vectors.extend(results);
        }
        EmbedOutcome { vectors }
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Vec<Option<Vec<f32>>> {
        let backoff = Backoff::embedder_rate_limited();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.model.embed_raw(batch).await {
                Ok(vectors) => return vectors.into_iter().map(Some).collect(),
                Err(EmbedError::RateLimited) if attempt < backoff.max_attempts() => {
                    backoff.sleep(attempt).await;
                    continue;
                }
                Err(EmbedError::Provider { .. }) | Err(EmbedError::Transport { .. }) => {
                    return self.embed_with_halving(batch, 2).await;
                }
                Err(_) => return vec![None; batch.len()],
            }
        }
    }

    /// On a provider error, halves the batch and retries up to
    /// `remaining_halvings` times; on persistent failure returns per-item
    /// `None`s so affected chunks are recorded as unembedded rather than
    /// failing the whole crawl.
    fn embed_with_halving<'a>(
        &'a self,
        batch: &'a [String],
        remaining_halvings: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Vec<Option<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move {
            if batch.len() <= 1 || remaining_halvings == 0 {
                match self.model.embed_raw(batch).await {
                    Ok(vectors) => return vectors.into_iter().map(Some).collect(),
                    Err(_) => return vec![None; batch.len()],
                }
            }
            let mid = batch.len() / 2;
            let (left, right) = batch.split_at(mid);

            let left_result = match self.model.embed_raw(left).await {
                Ok(vectors) => vectors.into_iter().map(Some).collect(),
                Err(_) => self.embed_with_halving(left, remaining_halvings - 1).await,
            };
            let right_result = match self.model.embed_raw(right).await {
                Ok(vectors) => vectors.into_iter().map(Some).collect(),
                Err(_) => self.embed_with_halving(right, remaining_halvings - 1).await,
            };

            let mut combined = left_result;
            combined.extend(right_result);
            combined
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyModel {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl EmbeddingModel for FlakyModel {
        async fn embed_raw(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(EmbedError::Provider {
                    message: "boom".to_string(),
                });
            }
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn successful_batch_returns_all_vectors() {
        let embedder = Embedder::new(Arc::new(MockEmbedder::new(8)), 100);
        let inputs = vec!["a".to_string(), "b".to_string()];
        let outcome = embedder.embed(&inputs).await;
        assert_eq!(outcome.vectors.len(), 2);
        assert!(outcome.vectors.iter().all(|v| v.is_some()));
    }

    #[tokio::test]
    async fn persistent_provider_failure_yields_none_not_error() {
        let model = Arc::new(FlakyModel {
            calls: AtomicUsize::new(0),
            fail_first_n: 1000,
        });
        let embedder = Embedder::new(model, 100);
        let inputs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let outcome = embedder.embed(&inputs).await;
        assert_eq!(outcome.vectors.len(), 3);
        assert!(outcome.vectors.iter().all(|v| v.is_none()));
    }

    #[tokio::test]
    async fn recovers_after_halving() {
        let model = Arc::new(FlakyModel {
            calls: AtomicUsize::new(0),
            fail_first_n: 1,
        });
        let embedder = Embedder::new(model, 100);
        let inputs = vec!["a".to_string(), "b".to_string()];
        let outcome = embedder.embed(&inputs).await;
        assert_eq!(outcome.vectors.len(), 2);
    }
}
