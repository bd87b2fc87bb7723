use wealth_core::model::{
    AnswerRecord, AnswerSheet, CalibrationEvent, CalibrationTally, Progress, Question, QuestionId,
    ReportResult, Session, SessionId, Stage, StageSnapshot,
};

/// In-memory authoritative record of the session: stage, questions, answers,
/// progress, calibration projection, and the merged report.
///
/// Owned exclusively by the flow controller's single-writer loop; everything
/// else observes it through read-only views.
#[derive(Debug)]
pub struct SessionState {
    stage: Stage,
    session: Option<Session>,
    questions: Vec<Question>,
    answers: AnswerSheet,
    answered_index: u32,
    calibration: CalibrationTally,
    report: Option<ReportResult>,
}

impl SessionState {
    /// Fresh state for a cold session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::NotStarted,
            session: None,
            questions: Vec::new(),
            answers: AnswerSheet::new(),
            answered_index: 0,
            calibration: CalibrationTally::new(),
            report: None,
        }
    }

    /// Rehydrate from a persisted snapshot.
    ///
    /// The question set is not part of the snapshot; a restored session keeps
    /// whatever the push channel and completion path still deliver.
    #[must_use]
    pub fn from_snapshot(snapshot: &StageSnapshot, restored_at: chrono::DateTime<chrono::Utc>) -> Self {
        let mut state = Self::new();
        state.stage = snapshot.stage();
        state.session = snapshot
            .session_id()
            .cloned()
            .map(|id| Session::new(id, restored_at));
        state
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(Session::session_id)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| question.id() == id)
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.questions.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn answered_index(&self) -> u32 {
        self.answered_index
    }

    /// Progress view; `completed` tracks the stage, not the counters.
    #[must_use]
    pub fn progress(&self) -> Progress {
        let total = self.total_questions();
        Progress::new(
            self.answered_index.min(total),
            total,
            self.stage.is_post_answering(),
        )
        .unwrap_or_else(|_| Progress::fresh(total))
    }

    #[must_use]
    pub fn calibration(&self) -> &CalibrationTally {
        &self.calibration
    }

    #[must_use]
    pub fn report(&self) -> Option<&ReportResult> {
        self.report.as_ref()
    }

    pub(crate) fn install_session(&mut self, session: Session, questions: Vec<Question>) {
        self.session = Some(session);
        self.questions = questions;
        self.answers = AnswerSheet::new();
        self.answered_index = 0;
    }

    /// Apply a stage change, returning the effective stage.
    ///
    /// A regression attempt is rejected and the last forward stage is
    /// re-asserted; the caller decides whether to log.
    pub(crate) fn transition(&mut self, next: Stage) -> Stage {
        if self.stage.accepts(next) {
            self.stage = next;
        }
        self.stage
    }

    pub(crate) fn record_answer(&mut self, answer: AnswerRecord) -> Option<AnswerRecord> {
        self.answers.record(answer)
    }

    pub(crate) fn set_answered_index(&mut self, next: u32) {
        self.answered_index = next.min(self.total_questions());
    }

    pub(crate) fn apply_calibration(&mut self, event: &CalibrationEvent) -> bool {
        self.calibration.apply(event)
    }

    pub(crate) fn set_report(&mut self, report: ReportResult) {
        self.report = Some(report);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
