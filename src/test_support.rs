// In-process stand-ins for the model services

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::memory::ConversationTurn;
use crate::services::{Embedder, LanguageModel};
use crate::{Result, ServiceKind, VisaBridgeError};

/// Embeds text as keyword counts over a fixed vocabulary
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
    failing: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every later call fail as if the service were down
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VisaBridgeError::EmbeddingService(
                "connection refused".to_string(),
            ));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                std::iter::once(0.01)
                    .chain(
                        self.vocabulary
                            .iter()
                            .map(|word| lower.matches(word.as_str()).count() as f32),
                    )
                    .collect()
            })
            .collect())
    }

    fn batch_size(&self) -> usize {
        4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub history_len: usize,
}

/// Language model returning canned answers and recording every prompt
pub struct ScriptedModel {
    answer: String,
    condensed: Option<String>,
    failure: Mutex<Option<VisaBridgeError>>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            condensed: None,
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer condense prompts with `question`
    pub fn condensing_to(mut self, question: &str) -> Self {
        self.condensed = Some(question.to_string());
        self
    }

    /// Fail the next call with a timeout
    pub fn time_out_next(&self) {
        *self.failure.lock().expect("lock") = Some(VisaBridgeError::ServiceTimeout {
            service: ServiceKind::LanguageModel,
            seconds: 30,
        });
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock").clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String> {
        self.calls.lock().expect("lock").push(RecordedCall {
            prompt: prompt.to_string(),
            history_len: history.len(),
        });

        let failure = self.failure.lock().expect("lock").take();
        if let Some(err) = failure {
            return Err(err);
        }

        let is_condense = prompt.starts_with("Given the following conversation");
        match &self.condensed {
            Some(condensed) if is_condense => Ok(condensed.clone()),
            _ => Ok(self.answer.clone()),
        }
    }
}
