
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use super::transport::HttpTransport;
use crate::config::{Provider, ServiceConfig};
use crate::{Result, ServiceKind, VisaBridgeError};

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    transport: HttpTransport,
    model: String,
    batch_size: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        Ok(Self::with_transport(
            HttpTransport::from_config(service)?,
            service,
        ))
    }

    #[inline]
    pub fn with_transport(transport: HttpTransport, service: &ServiceConfig) -> Self {
        Self {
            transport,
            model: service.embedding_model.clone(),
            batch_size: service.batch_size.max(1),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            VisaBridgeError::EmbeddingService(format!("failed to serialize request: {e}"))
        })?;

        let path = match self.transport.provider() {
            Provider::Ollama => "/api/embed",
            Provider::OpenAi => "/v1/embeddings",
        };

        let response_text = self
            .transport
            .post_json(path, &request_json)
            .map_err(|e| e.for_service(ServiceKind::Embedding))?;

        let embeddings = match self.transport.provider() {
            Provider::Ollama => {
                serde_json::from_str::<OllamaEmbedResponse>(&response_text)
                    .map_err(malformed)?
                    .embeddings
            }
            Provider::OpenAi => {
                let mut data = serde_json::from_str::<OpenAiEmbedResponse>(&response_text)
                    .map_err(malformed)?
                    .data;
                data.sort_by_key(|item| item.index);
                data.into_iter().map(|item| item.embedding).collect()
            }
        };

        if embeddings.len() != texts.len() {
            return Err(VisaBridgeError::EmbeddingService(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

fn malformed(err: serde_json::Error) -> VisaBridgeError {
    VisaBridgeError::EmbeddingService(format!("malformed embedding response: {err}"))
}

impl Embedder for EmbeddingClient {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(chunk)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn batch_size(&self) -> usize {
        self.batch_size as usize
    }
}
