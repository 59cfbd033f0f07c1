//! Error kinds shared by the trust network aggregates.
//!
//! Validation errors are recoverable: the caller may retry with corrected
//! input and no state has changed. `InvariantViolation` is fatal and is
//! logged where it is raised.

/// Result type for trust network operations.
pub type TrustResult<T> = Result<T, TrustError>;

/// Trust network errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    /// Code missing, foreign, or already used.
    #[error("Invite code is invalid or has already been used")]
    InvalidCode,

    #[error("Applicant name must not be blank")]
    EmptyName,

    /// Name would put a member id into the public audit log.
    #[error("Applicant name must not contain a member id")]
    InvalidName,

    #[error("Member has already voted in this poll")]
    AlreadyVoted,

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(u32),

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Member is suspended: {0}")]
    MemberSuspended(String),

    #[error("Poll is closed")]
    PollClosed,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The store refused a change; nothing was committed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrustError {
    /// Build an invariant violation and log it for operator attention.
    pub fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "trust network invariant violated");
        Self::InvariantViolation(detail)
    }

    /// Whether the caller may retry with corrected input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }

    /// Stable machine-readable kind, used by the API layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCode => "InvalidCode",
            Self::EmptyName => "EmptyName",
            Self::InvalidName => "InvalidName",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::UnknownCandidate(_) => "UnknownCandidate",
            Self::UnknownMember(_) => "UnknownMember",
            Self::MemberSuspended(_) => "MemberSuspended",
            Self::PollClosed => "PollClosed",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::Storage(_) => "Storage",
        }
    }
}
