// Interaction evaluation
// Counts queries, latencies and failures across conversations, and persists
// the accumulated metrics as JSON when a conversation ends.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EvaluationConfig;
use crate::memory::ConversationTurn;
use crate::{Result, VisaBridgeError};

/// Message carried by the summary when nothing has been recorded yet
pub const NO_DATA_MESSAGE: &str = "No data available for summary";

/// One answered (or failed) query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    /// Seconds from receipt of the query to the answer
    pub response_time: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub query: String,
}

/// One continuous conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub interactions: Vec<Interaction>,
}

impl ConversationSession {
    #[inline]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            interactions: Vec::new(),
        }
    }

    #[inline]
    pub const fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// The session as alternating user and assistant turns
    #[inline]
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.interactions
            .iter()
            .flat_map(|i| {
                [
                    ConversationTurn::user(i.query.clone()),
                    ConversationTurn::assistant(i.response.clone()),
                ]
            })
            .collect()
    }
}

impl Default for ConversationSession {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the evaluator has accumulated; this is what gets persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsStore {
    pub total_conversations: u64,
    pub total_queries: u64,
    pub response_times: Vec<f64>,
    pub errors: Vec<ErrorRecord>,
    pub conversation_history: Vec<ConversationSession>,
}

/// Metrics shared between bot instances; every mutation happens under the lock
pub type SharedMetrics = Arc<Mutex<MetricsStore>>;

impl MetricsStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn into_shared(self) -> SharedMetrics {
        Arc::new(Mutex::new(self))
    }

    /// Read a persisted store; a missing file is an empty store
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No metrics file at {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            VisaBridgeError::MetricsPersistence(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            VisaBridgeError::MetricsPersistence(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Overwrite `path` with the whole store
    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(self)?;
            fs::write(path, json)
        };

        write().map_err(|e| {
            VisaBridgeError::MetricsPersistence(format!(
                "failed to write {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Metrics saved to {}", path.display());
        Ok(())
    }

    fn record(&mut self, interaction: &Interaction) {
        self.total_queries += 1;
        self.response_times.push(interaction.response_time);
        if let Some(error) = &interaction.error {
            self.errors.push(ErrorRecord {
                timestamp: interaction.timestamp,
                error: error.clone(),
                query: interaction.query.clone(),
            });
        }
    }

    /// Aggregate statistics over everything recorded so far.
    ///
    /// Interactions live only in their sessions, so `active` is the caller's
    /// still-open session when its responses should count as well.
    #[inline]
    pub fn summary(
        &self,
        thresholds: &QualityThresholds,
        active: Option<&ConversationSession>,
    ) -> Summary {
        if self.response_times.is_empty() || self.total_queries == 0 {
            return Summary::NoData {
                error: NO_DATA_MESSAGE.to_string(),
            };
        }

        let average = self.response_times.iter().sum::<f64>() / self.response_times.len() as f64;
        let error_rate = self.errors.len() as f64 / self.total_queries as f64;

        Summary::Report(SummaryReport {
            total_conversations: self.total_conversations,
            total_queries: self.total_queries,
            average_response_time: round2(average),
            error_rate: round2(error_rate * 100.0),
            total_errors: self.errors.len(),
            slow_responses: self
                .response_times
                .iter()
                .filter(|&&t| t > thresholds.response_time_threshold)
                .count(),
            short_responses: self
                .conversation_history
                .iter()
                .chain(active)
                .flat_map(|session| &session.interactions)
                .filter(|i| i.response.chars().count() < thresholds.min_response_length)
                .count(),
            generated_at: Utc::now(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Limits used to flag responses in the summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub response_time_threshold: f64,
    pub min_response_length: usize,
}

impl Default for QualityThresholds {
    #[inline]
    fn default() -> Self {
        Self::from(&EvaluationConfig::default())
    }
}

impl From<&EvaluationConfig> for QualityThresholds {
    #[inline]
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            response_time_threshold: config.response_time_threshold,
            min_response_length: config.min_response_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total_conversations: u64,
    pub total_queries: u64,
    /// Mean seconds per query, two decimals
    pub average_response_time: f64,
    /// Percentage of queries that failed, two decimals
    pub error_rate: f64,
    pub total_errors: usize,
    pub slow_responses: usize,
    pub short_responses: usize,
    pub generated_at: DateTime<Utc>,
}

/// Result of [`Evaluator::generate_summary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    NoData { error: String },
    Report(SummaryReport),
}

impl Summary {
    #[inline]
    pub const fn report(&self) -> Option<&SummaryReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::NoData { .. } => None,
        }
    }
}

/// Records interactions for one bot and owns its active session
#[derive(Debug)]
pub struct Evaluator {
    metrics: SharedMetrics,
    active: Option<ConversationSession>,
    metrics_path: PathBuf,
    thresholds: QualityThresholds,
}

impl Evaluator {
    #[inline]
    pub fn new(metrics: SharedMetrics, metrics_path: PathBuf, thresholds: QualityThresholds) -> Self {
        Self {
            metrics,
            active: None,
            metrics_path,
            thresholds,
        }
    }

    fn store(&self) -> MutexGuard<'_, MetricsStore> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub const fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    #[inline]
    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    #[inline]
    pub const fn active_session(&self) -> Option<&ConversationSession> {
        self.active.as_ref()
    }

    /// Copy of the store as it is right now
    #[inline]
    pub fn snapshot(&self) -> MetricsStore {
        self.store().clone()
    }

    /// Open a new session, ending any session that is still open
    #[inline]
    pub fn start_conversation(&mut self) -> Uuid {
        if self.active.is_some() {
            info!("Ending the open conversation before starting a new one");
            self.end_conversation();
        }

        let session = ConversationSession::new();
        let id = session.id;
        self.active = Some(session);
        self.store().total_conversations += 1;

        debug!("Started conversation {}", id);
        id
    }

    #[inline]
    pub fn record_interaction(
        &mut self,
        query: &str,
        response: &str,
        response_time: f64,
        error: Option<&str>,
    ) {
        if self.active.is_none() {
            warn!("Interaction recorded outside a conversation; starting one");
            self.start_conversation();
        }

        let interaction = Interaction {
            timestamp: Utc::now(),
            query: query.to_string(),
            response: response.to_string(),
            response_time,
            error: error.map(ToString::to_string),
        };

        self.store().record(&interaction);
        if let Some(session) = self.active.as_mut() {
            session.interactions.push(interaction);
        }
    }

    /// Close the active session, archive it and persist the metrics.
    ///
    /// A failed write is logged; the in-memory metrics stay intact.
    #[inline]
    pub fn end_conversation(&mut self) {
        let mut store = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);

        match self.active.take() {
            Some(mut session) => {
                session.end_time = Some(Utc::now());
                debug!(
                    "Ended conversation {} with {} interactions",
                    session.id,
                    session.interactions.len()
                );
                store.conversation_history.push(session);
            }
            None => debug!("No active conversation to end"),
        }

        if let Err(e) = store.persist(&self.metrics_path) {
            error!("Error saving metrics: {}", e);
        }
    }

    #[inline]
    pub fn generate_summary(&self) -> Summary {
        self.store().summary(&self.thresholds, self.active.as_ref())
    }
}
