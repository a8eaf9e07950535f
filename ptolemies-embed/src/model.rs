use crate::error::EmbedError;
use async_trait::async_trait;

/// Provider-agnostic embedding call: a single batched request returning one
/// vector per input, in order. Implementations only need to describe how to
/// make one provider call; retry/backoff/batch-splitting lives in
/// [`crate::Embedder`].
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed_raw(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Deterministic hash-based embeddings: used for tests and for operating the
/// engine in graph-only mode is handled one layer up (absence of
/// `EMBEDDING_API_KEY`), but this mock is what backs those tests without a
/// network dependency.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(1536)
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    async fn embed_raw(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(inputs.iter().map(|text| hash_embedding(text, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-hash-embedder"
    }
}

fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    // Expand a blake3 hash into as many 4-byte words as needed by rehashing
    // with a counter appended, then map each word to a float in [-1, 1].
    let mut bytes = Vec::with_capacity(dimension * 4);
    let mut counter: u64 = 0;
    while bytes.len() < dimension * 4 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        hasher.update(&counter.to_le_bytes());
        bytes.extend_from_slice(hasher.finalize().as_bytes());
        counter += 1;
    }
    let mut vector = Vec::with_capacity(dimension);
    for chunk in bytes.chunks_exact(4).take(dimension) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        vector.push((word as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
    }
    normalize(&mut vector);
    vector
}

pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// OpenAI-compatible batched embeddings endpoint: any provider implementing
/// the `POST /embeddings {model, input: [..]}` shape.
pub struct OpenAiCompatible {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiCompatible {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbedResponseItem {
    embedding: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseItem>,
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatible {
    async fn embed_raw(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|source| EmbedError::Transport { source })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(EmbedError::RateLimited);
        }
        if status.is_server_error() {
            return Err(EmbedError::Provider {
                message: format!("server error {status}"),
            });
        }
        if !status.is_success() {
            return Err(EmbedError::Provider {
                message: format!("unexpected status {status}"),
            });
        }

        let body: EmbedResponse = resp.json().await.map_err(|source| EmbedError::Transport { source })?;
        Ok(body
            .data
            .into_iter()
            .map(|item| {
                let mut v = item.embedding;
                normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
