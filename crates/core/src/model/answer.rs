use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ChoiceId, QuestionId};

/// A submitted answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
    /// Time the user spent on the question, in milliseconds.
    pub response_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Append-only map of answers keyed by question.
///
/// One answer per question; a retry for the same question overwrites the
/// earlier record (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSheet {
    entries: BTreeMap<QuestionId, AnswerRecord>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answer, returning the record it replaced, if any.
    pub fn record(&mut self, answer: AnswerRecord) -> Option<AnswerRecord> {
        self.entries.insert(answer.question_id.clone(), answer)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerRecord> {
        self.entries.get(question_id)
    }

    /// Number of distinct questions answered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnswerRecord> {
        self.entries.values()
    }
}
