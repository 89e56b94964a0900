use std::fmt;

/// Errors surfaced by the orchestration core. Only `InvalidDuration` ever
/// reaches the end user (as a corrective prompt); quota refusals are
/// converted to fallback replies by the usage gate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("duration must be between {min} and {max} minutes")]
    InvalidDuration { min: u32, max: u32 },

    #[error("{scope} daily quota exceeded")]
    QuotaExceeded { scope: QuotaScope },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    /// Per-user daily generation call cap.
    PerUser,
    /// Global daily spend ceiling across all users.
    Global,
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::PerUser => write!(f, "per-user"),
            QuotaScope::Global => write!(f, "global"),
        }
    }
}
