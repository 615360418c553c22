
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::{ConfigError, Provider, ServiceConfig};
use crate::{ServiceKind, VisaBridgeError};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

/// Failure of a single logical HTTP request, after retries
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Classify the error for the service that issued the request
    #[inline]
    pub fn for_service(self, service: ServiceKind) -> VisaBridgeError {
        match (self, service) {
            (Self::Timeout(timeout), service) => VisaBridgeError::ServiceTimeout {
                service,
                seconds: timeout.as_secs(),
            },
            (other, ServiceKind::Embedding) => VisaBridgeError::EmbeddingService(other.to_string()),
            (other, ServiceKind::LanguageModel) => {
                VisaBridgeError::LanguageModelService(other.to_string())
            }
        }
    }
}

/// Blocking HTTP client shared by the embedding and chat clients
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    provider: Provider,
    agent: ureq::Agent,
    api_key: Option<String>,
    timeout: Duration,
    retry_attempts: u32,
    backoff: Duration,
}

impl HttpTransport {
    /// The key is kept only for the OpenAI provider; Ollama requests never
    /// carry an `Authorization` header.
    #[inline]
    pub fn new(service: &ServiceConfig, api_key: Option<String>) -> Result<Self, ConfigError> {
        let base_url = service.service_url()?;
        let timeout = Duration::from_secs(if service.timeout_seconds == 0 {
            DEFAULT_TIMEOUT_SECONDS
        } else {
            service.timeout_seconds
        });

        Ok(Self {
            base_url,
            provider: service.provider,
            agent: Self::build_agent(timeout),
            api_key: api_key.filter(|_| service.provider == Provider::OpenAi),
            timeout,
            retry_attempts: service.retry_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Build a transport, reading the API key the provider requires
    #[inline]
    pub fn from_config(service: &ServiceConfig) -> Result<Self, ConfigError> {
        let api_key = service.api_key()?;
        Self::new(service, api_key)
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::build_agent(timeout);
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubled for every further attempt
    #[inline]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    #[inline]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into()
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Other(format!("invalid endpoint {path}: {e}")))
    }

    /// Check that the service answers its model listing endpoint
    #[inline]
    pub fn ping(&self) -> Result<(), TransportError> {
        let path = match self.provider {
            Provider::Ollama => "/api/tags",
            Provider::OpenAi => "/v1/models",
        };
        self.get(path).map(|_| ())
    }

    #[inline]
    pub fn get(&self, path: &str) -> Result<String, TransportError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        self.request_with_retry(|| {
            let mut request = self.agent.get(url.as_str());
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json(&self, path: &str, body: &str) -> Result<String, TransportError> {
        let url = self.endpoint(path)?;
        debug!("POST {} ({} bytes)", url, body.len());

        self.request_with_retry(|| {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            request
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> Result<String, TransportError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let retryable = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                TransportError::Status(*status)
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(TransportError::Status(*status));
                            }
                        }
                        ureq::Error::Timeout(_) => {
                            warn!(
                                "Request timed out after {:?}, attempt {}/{}",
                                self.timeout, attempt, self.retry_attempts
                            );
                            TransportError::Timeout(self.timeout)
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            TransportError::Unreachable(error.to_string())
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(TransportError::Other(error.to_string()));
                        }
                    };

                    last_error = Some(retryable);

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| TransportError::Other("request failed after retries".to_string())))
    }
}
