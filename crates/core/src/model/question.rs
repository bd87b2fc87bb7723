use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChoiceId, QuestionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question has no usable identifier")]
    MissingId,

    #[error("question {id} has no prompt text")]
    MissingPrompt { id: String },

    #[error("question {id} has no choices")]
    NoChoices { id: String },

    #[error("choice in question {question_id} has no usable identifier")]
    MissingChoiceId { question_id: String },
}

/// A single answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    id: ChoiceId,
    label: String,
}

impl Choice {
    #[must_use]
    pub fn new(id: ChoiceId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ChoiceId {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A validated assessment question.
///
/// Sourced once at session start and immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    choices: Vec<Choice>,
}

impl Question {
    /// # Errors
    ///
    /// Returns `QuestionError::NoChoices` when `choices` is empty.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        if choices.is_empty() {
            return Err(QuestionError::NoChoices {
                id: id.as_str().to_owned(),
            });
        }
        Ok(Self {
            id,
            prompt: prompt.into(),
            choices,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Looks up a choice by id.
    #[must_use]
    pub fn choice(&self, id: &ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id() == id)
    }
}

/// Raw choice payload as delivered by the start collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceDraft {
    pub id: Option<String>,
    pub value: Option<String>,
    #[serde(default)]
    pub label: String,
}

impl ChoiceDraft {
    fn normalize(self, question_id: &str) -> Result<Choice, QuestionError> {
        let id = self
            .id
            .or(self.value)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| QuestionError::MissingChoiceId {
                question_id: question_id.to_owned(),
            })?;
        Ok(Choice::new(ChoiceId::new(id), self.label))
    }
}

/// Raw question payload as delivered by the start collaborator.
///
/// Upstream data is not uniform: the identifier may arrive under `id`,
/// `question_id`, or `key`, and the prompt under `prompt` or `text`.
/// Normalization resolves each through its fallback chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionDraft {
    pub id: Option<String>,
    pub question_id: Option<String>,
    pub key: Option<String>,
    pub prompt: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceDraft>,
}

impl QuestionDraft {
    /// Resolve identifiers and produce a validated [`Question`].
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when no identifier, prompt, or choices can be
    /// resolved.
    pub fn normalize(self) -> Result<Question, QuestionError> {
        let id = self
            .id
            .or(self.question_id)
            .or(self.key)
            .filter(|id| !id.trim().is_empty())
            .ok_or(QuestionError::MissingId)?;

        let prompt = self
            .prompt
            .or(self.text)
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or_else(|| QuestionError::MissingPrompt { id: id.clone() })?;

        let choices = self
            .choices
            .into_iter()
            .map(|draft| draft.normalize(&id))
            .collect::<Result<Vec<_>, _>>()?;

        Question::new(QuestionId::new(id), prompt, choices)
    }
}
