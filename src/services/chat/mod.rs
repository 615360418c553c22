
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LanguageModel;
use super::transport::HttpTransport;
use crate::config::{Provider, ServiceConfig};
use crate::memory::ConversationTurn;
use crate::{Result, ServiceKind, VisaBridgeError};

/// Chat completion client for the configured provider
#[derive(Debug, Clone)]
pub struct ChatClient {
    transport: HttpTransport,
    model: String,
    temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

impl ChatClient {
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
            model: service.chat_model.clone(),
            temperature: service.temperature,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Prior turns as role-tagged messages, followed by the prompt as the
    /// final user message
    #[inline]
    pub fn build_messages(prompt: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
        history
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.text.clone(),
            })
            .chain(std::iter::once(ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }))
            .collect()
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Result<(&'static str, String)> {
        match self.transport.provider() {
            Provider::Ollama => {
                let request = OllamaChatRequest {
                    model: &self.model,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.temperature,
                    },
                };
                Ok(("/api/chat", serde_json::to_string(&request)?))
            }
            Provider::OpenAi => {
                let request = OpenAiChatRequest {
                    model: &self.model,
                    messages,
                    temperature: self.temperature,
                };
                Ok(("/v1/chat/completions", serde_json::to_string(&request)?))
            }
        }
    }

    fn parse_response(&self, response_text: &str) -> Result<String> {
        let content = match self.transport.provider() {
            Provider::Ollama => {
                serde_json::from_str::<OllamaChatResponse>(response_text)
                    .map_err(malformed)?
                    .message
                    .content
            }
            Provider::OpenAi => serde_json::from_str::<OpenAiChatResponse>(response_text)
                .map_err(malformed)?
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| {
                    VisaBridgeError::LanguageModelService("response had no choices".to_string())
                })?,
        };

        if content.trim().is_empty() {
            return Err(VisaBridgeError::LanguageModelService(
                "language model returned an empty answer".to_string(),
            ));
        }

        Ok(content)
    }
}

fn malformed(err: serde_json::Error) -> VisaBridgeError {
    VisaBridgeError::LanguageModelService(format!("malformed chat response: {err}"))
}

impl LanguageModel for ChatClient {
    fn complete(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String> {
        let messages = Self::build_messages(prompt, history);
        debug!(
            "Requesting completion from {} ({} messages)",
            self.model,
            messages.len()
        );

        let (path, body) = self.request_body(&messages).map_err(|e| {
            VisaBridgeError::LanguageModelService(format!("failed to serialize request: {e}"))
        })?;

        let response_text = self
            .transport
            .post_json(path, &body)
            .map_err(|e| e.for_service(ServiceKind::LanguageModel))?;

        let answer = self.parse_response(&response_text)?;
        debug!("Received completion ({} chars)", answer.chars().count());
        Ok(answer)
    }
}
