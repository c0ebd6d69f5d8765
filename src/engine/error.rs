use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Room is out of service or cannot host the party.
    RoomUnavailable(&'static str),
    /// Requested dates overlap the given committed booking.
    DateConflict(Ulid),
    InvalidDateRange(&'static str),
    InvalidAmount,
    UnknownAddon(Ulid),
    /// Payment would push the ledger past the booking total.
    OverpaymentRejected { remaining: Decimal },
    AlreadyCancelled(Ulid),
    /// Booking is in a terminal state that cancellation cannot leave.
    NotCancellable(BookingStatus),
    /// Less than the required notice remains before check-in.
    TooCloseToCheckIn { notice_left_ms: i64 },
    NotCompletable(BookingStatus),
    LimitExceeded(&'static str),
    Persistence(String),
}

/// Coarse taxonomy the wire layer maps responses from. Only Persistence
/// failures are worth retrying with the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Persistence,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_)
            | EngineError::DateConflict(_)
            | EngineError::OverpaymentRejected { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::NotCancellable(_)
            | EngineError::TooCloseToCheckIn { .. }
            | EngineError::NotCompletable(_) => ErrorKind::Conflict,
            EngineError::RoomUnavailable(_)
            | EngineError::InvalidDateRange(_)
            | EngineError::InvalidAmount
            | EngineError::UnknownAddon(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::RoomUnavailable(msg) => write!(f, "room unavailable: {msg}"),
            EngineError::DateConflict(id) => {
                write!(f, "dates conflict with existing booking: {id}")
            }
            EngineError::InvalidDateRange(msg) => write!(f, "invalid date range: {msg}"),
            EngineError::InvalidAmount => write!(f, "payment amount must be positive"),
            EngineError::UnknownAddon(id) => write!(f, "unknown addon: {id}"),
            EngineError::OverpaymentRejected { remaining } => {
                write!(f, "overpayment rejected: {remaining} remaining on booking")
            }
            EngineError::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            EngineError::NotCancellable(status) => {
                write!(f, "booking cannot be cancelled from status {status:?}")
            }
            EngineError::TooCloseToCheckIn { notice_left_ms } => {
                write!(
                    f,
                    "too close to check-in: only {notice_left_ms}ms of notice left"
                )
            }
            EngineError::NotCompletable(status) => {
                write!(f, "booking cannot be completed from status {status:?}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
