//! Plan-approval and verification gates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plan approval decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// No decision has been recorded.
    #[default]
    Pending,
    /// The plan was approved.
    Approved,
    /// The plan was rejected.
    Rejected,
}

impl ApprovalState {
    /// Returns the canonical document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Verification has not been recorded.
    #[default]
    Pending,
    /// Verification passed.
    Ok,
    /// Verification found problems that need rework.
    NeedsRework,
}

impl VerificationState {
    /// Returns the canonical document representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::NeedsRework => "needs_rework",
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gate value together with who last changed it and when.
///
/// Absent gates deserialise as `pending` with null metadata, so every task
/// has a well-defined gate value even if it was never set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "S: Deserialize<'de> + Default"))]
pub struct TaskGate<S> {
    /// Current gate state.
    pub state: S,
    /// When the state was last recorded.
    pub updated_at: Option<DateTime<Utc>>,
    /// Who last recorded the state.
    pub updated_by: Option<String>,
    /// Free-text note attached to the decision.
    pub note: Option<String>,
}

impl<S: Default> TaskGate<S> {
    /// Creates a pending gate with no metadata.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: S::default(),
            updated_at: None,
            updated_by: None,
            note: None,
        }
    }
}

impl<S> TaskGate<S> {
    /// Creates a gate recording a decision.
    #[must_use]
    pub fn recorded(
        state: S,
        at: DateTime<Utc>,
        by: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            state,
            updated_at: Some(at),
            updated_by: Some(by.into()),
            note,
        }
    }
}

impl<S: Default> Default for TaskGate<S> {
    fn default() -> Self {
        Self::pending()
    }
}

/// Plan approval gate.
pub type PlanApproval = TaskGate<ApprovalState>;

/// Verification gate.
pub type Verification = TaskGate<VerificationState>;
