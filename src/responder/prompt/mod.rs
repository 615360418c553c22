
use itertools::Itertools;

use crate::language::Language;
use crate::memory::{ConversationTurn, render_transcript};

/// Scope and language rules given to the model with every question
pub const SYSTEM_INSTRUCTIONS: &str = "You are VisaBridge AI Assistant, a helpful chatbot that provides information about visa and immigration processes for over 20 countries.

You can understand and respond to queries in multiple languages including English and Urdu (اردو).

IMPORTANT RULES FOR LANGUAGE DETECTION:
1. Carefully analyze the user's query to determine its primary language
2. If the query is primarily in English (Latin script), respond in English only
3. Only respond in Urdu if the query itself is primarily written in Urdu script
4. Ignore any examples or quotes of other languages within the query when determining response language
5. If a query contains both languages, respond in the language that makes up the majority of the query";

const CONTEXT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const CONDENSE_TEMPLATE: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

/// Everything that goes into an answer prompt
#[derive(Debug, Clone, Copy)]
pub struct PromptFields<'a> {
    pub instructions: &'a str,
    pub language: Option<Language>,
    pub passages: &'a [&'a str],
    pub history: &'a [ConversationTurn],
    pub question: &'a str,
}

impl<'a> PromptFields<'a> {
    /// Fields with the standard instructions and no language hint
    #[inline]
    pub const fn new(
        question: &'a str,
        passages: &'a [&'a str],
        history: &'a [ConversationTurn],
    ) -> Self {
        Self {
            instructions: SYSTEM_INSTRUCTIONS,
            language: None,
            passages,
            history,
            question,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

/// A rendered prompt plus the prior turns sent alongside it as messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub text: String,
    pub history: &'a [ConversationTurn],
}

#[inline]
pub fn build_prompt<'a>(fields: &PromptFields<'a>) -> Prompt<'a> {
    let mut sections = vec![fields.instructions.to_string()];

    if let Some(language) = fields.language {
        sections.push(format!(
            "The user's query appears to be written primarily in {}.",
            language.display_name()
        ));
    }

    sections.push(CONTEXT_PREAMBLE.to_string());
    sections.push(fields.passages.iter().join("\n\n"));
    sections.push(format!("Question: {}\nAnswer:", fields.question));

    Prompt {
        text: sections.join("\n\n"),
        history: fields.history,
    }
}

/// Prompt asking the model to rewrite a follow-up into a standalone question
#[inline]
pub fn build_condense_prompt(history: &[ConversationTurn], question: &str) -> String {
    CONDENSE_TEMPLATE
        .replace("{chat_history}", &render_transcript(history))
        .replace("{question}", question)
}
