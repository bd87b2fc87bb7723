use serde::{Deserialize, Serialize};

/// Outcome artifact produced by the report-generation collaborator.
///
/// Merged into the session when the report-ready push event arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResult {
    /// Outcome label assigned by the analysis backend.
    pub outcome: String,
    /// Narrative summary shown to the user.
    pub narrative: String,
    /// Reference to the rendered report artifact, when available.
    pub report_ref: Option<String>,
}
