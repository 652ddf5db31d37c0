//! Saga and step status vocabulary.

use serde::{Deserialize, Serialize};

/// The status of a saga run.
///
/// Transitions:
/// ```text
/// Started ──┬──► Completed
///           ├──► Compensating ──► Compensated
///           └──► Failed
/// ```
///
/// `Failed` is reserved for engine-level anomalies outside the normal step
/// contract; a mandatory step failure always ends in `Compensated`, even
/// when there was nothing to compensate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    /// Forward execution is in progress (initial status).
    Started,

    /// All steps completed successfully (terminal).
    Completed,

    /// A mandatory step failed and rollback is in progress.
    Compensating,

    /// Rollback finished after a mandatory step failure (terminal).
    Compensated,

    /// The engine itself rejected or aborted the run (terminal).
    Failed,
}

impl SagaStatus {
    /// Returns true if no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "Started",
            SagaStatus::Completed => "Completed",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A step lifecycle transition, as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// An execution attempt began.
    Started,

    /// An execution attempt succeeded.
    Completed,

    /// An execution or compensation attempt failed.
    Failed,

    /// A compensation attempt began.
    Compensating,

    /// A compensation attempt succeeded.
    Compensated,
}

impl StepStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "Started",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
            StepStatus::Compensating => "Compensating",
            StepStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
