pub mod attendance;
pub mod face;
pub mod ledger;
pub mod sinks;
pub mod workflow;

#[cfg(test)]
pub(crate) mod fixtures;

use uuid::Uuid;

use crate::auth::Role;
use crate::store::StoreError;

pub use attendance::AttendanceService;
pub use ledger::LeaveLedger;
pub use workflow::LeaveWorkflow;

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub company_id: Uuid,
    pub role: Role,
}

/// Coarse classification callers map onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Forbidden,
    InsufficientBalance,
    ExternalFailure,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("cannot apply for leave on past dates")]
    PastDate,

    #[error("insufficient leave balance: {available} day(s) available, {requested} requested")]
    InsufficientBalance {
        available: crate::models::days::Days,
        requested: crate::models::days::Days,
    },

    #[error("a leave request already covers some of these dates")]
    OverlappingRequest,

    #[error("leave request is not pending")]
    NotPending,

    #[error("you are not the approver for the current stage")]
    NotAuthorized,

    #[error("this approval stage has already been actioned")]
    AlreadyActioned,

    #[error("only the employee who applied can cancel this request")]
    NotOwner,

    #[error("leave request can no longer be cancelled")]
    NotCancellable,

    #[error("cannot cancel leave that has already started")]
    AlreadyStarted,

    #[error("already punched in today")]
    AlreadyPunchedIn,

    #[error("no punch-in recorded for today")]
    NotPunchedIn,

    #[error("already punched out today")]
    AlreadyPunchedOut,

    #[error("an attendance record already exists for this date")]
    DuplicateRecord,

    #[error("face not registered; register a face before using face punch")]
    FaceNotRegistered,

    #[error("face verification failed (confidence {confidence})")]
    FaceMismatch { confidence: u8 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("access denied")]
    Forbidden,

    #[error("external service failed: {0}")]
    External(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::PastDate | DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::OverlappingRequest
            | DomainError::NotPending
            | DomainError::NotCancellable
            | DomainError::AlreadyStarted
            | DomainError::NotPunchedIn
            | DomainError::AlreadyActioned
            | DomainError::AlreadyPunchedIn
            | DomainError::AlreadyPunchedOut
            | DomainError::DuplicateRecord => ErrorKind::Conflict,
            DomainError::NotAuthorized | DomainError::NotOwner | DomainError::Forbidden => {
                ErrorKind::Forbidden
            }
            DomainError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            DomainError::FaceNotRegistered
            | DomainError::FaceMismatch { .. }
            | DomainError::External(_) => ErrorKind::ExternalFailure,
            DomainError::Store(StoreError::VersionConflict) => ErrorKind::Conflict,
            DomainError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::PastDate => "PAST_DATE",
            DomainError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            DomainError::OverlappingRequest => "OVERLAPPING_REQUEST",
            DomainError::NotPending => "NOT_PENDING",
            DomainError::NotAuthorized => "NOT_AUTHORIZED",
            DomainError::AlreadyActioned => "ALREADY_ACTIONED",
            DomainError::NotOwner => "NOT_OWNER",
            DomainError::NotCancellable => "NOT_CANCELLABLE",
            DomainError::AlreadyStarted => "ALREADY_STARTED",
            DomainError::AlreadyPunchedIn => "ALREADY_PUNCHED_IN",
            DomainError::NotPunchedIn => "NOT_PUNCHED_IN",
            DomainError::AlreadyPunchedOut => "ALREADY_PUNCHED_OUT",
            DomainError::DuplicateRecord => "DUPLICATE_RECORD",
            DomainError::FaceNotRegistered => "FACE_NOT_REGISTERED",
            DomainError::FaceMismatch { .. } => "FACE_MISMATCH",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::Forbidden => "FORBIDDEN",
            DomainError::External(_) => "EXTERNAL_FAILURE",
            DomainError::Store(StoreError::VersionConflict) => "CONCURRENT_MODIFICATION",
            DomainError::Store(_) => "INTERNAL_ERROR",
        }
    }
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;
