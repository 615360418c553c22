// External model services
// Embedding and chat completion over HTTP, behind traits so the index and
// responder can run against any backend.

pub mod chat;
pub mod embeddings;
pub mod transport;

pub use chat::ChatClient;
pub use embeddings::EmbeddingClient;
pub use transport::{HttpTransport, TransportError};

use crate::{Result, VisaBridgeError};
use crate::memory::ConversationTurn;

/// Turns text into fixed-dimension vectors
pub trait Embedder: Send + Sync {
    /// Embed every input, returning one vector per input in the same order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            (None, _) => Err(VisaBridgeError::EmbeddingService(
                "service returned no embedding".to_string(),
            )),
            (Some(_), false) => Err(VisaBridgeError::EmbeddingService(format!(
                "expected 1 embedding, received {}",
                vectors.len() + 1
            ))),
        }
    }

    /// How many texts the caller should hand over per `embed_batch` call
    #[inline]
    fn batch_size(&self) -> usize {
        16
    }
}

/// Generates answer text from a prompt and the prior conversation
pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String>;
}
