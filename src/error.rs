//! Error types for servpool.
//!
//! All errors are strongly typed using thiserror. Invalid arguments are
//! rejected before any state is touched; illegal-state errors signal a
//! modelling bug and are expected to abort the enclosing simulation step.
//! Expected races (two subsystems terminating the same service) are not
//! errors at all: those operations return `Option`/`bool` instead.

use thiserror::Error;

use crate::pool::resource::ResourceId;
use crate::timer::TimerId;

/// Validation errors raised for arguments outside their domain.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Efficiency outside `[0, 1]` or not a number.
    #[error("Efficiency {value} is out of range [0.0, 1.0]")]
    EfficiencyOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Negative or NaN duration.
    #[error("Duration {value} must be a non-negative number")]
    InvalidDuration {
        /// The rejected value.
        value: f64,
    },

    /// Capacity schedule with a bad start, period or empty capacity list.
    #[error("Invalid capacity schedule: {reason}")]
    InvalidSchedule {
        /// What was wrong.
        reason: String,
    },

    /// Pool configuration rejected by `PoolConfig::validate`.
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// Snapshot whose counters or resource lists do not agree.
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot {
        /// What was wrong.
        reason: String,
    },
}

/// Illegal-state errors: the operation is not allowed in the current state.
#[derive(Debug, Error)]
pub enum StateError {
    /// `serve` with `free == 0`.
    #[error("Pool '{pool}' has no free capacity")]
    NoFreeCapacity {
        /// Pool name.
        pool: String,
    },

    /// `serve_with` targeting a resource that is busy, unavailable or
    /// detached.
    #[error("Resource {id} is not idle and available in pool '{pool}'")]
    ResourceNotIdle {
        /// Requested resource.
        id: ResourceId,
        /// Pool name.
        pool: String,
    },

    /// Handle outside the resource arena.
    #[error("Resource {id} does not exist")]
    UnknownResource {
        /// Requested handle.
        id: ResourceId,
    },

    /// A phase was completed twice.
    #[error("Timer {id}: {phase} phase already completed")]
    PhaseAlreadyCompleted {
        /// Affected timer.
        id: TimerId,
        /// `"contact"` or `"after-contact"`.
        phase: &'static str,
    },

    /// After-contact work completed before the contact.
    #[error("Timer {id}: contact phase is not completed")]
    ContactNotCompleted {
        /// Affected timer.
        id: TimerId,
    },

    /// Listener registration changed from inside a notification.
    #[error("Cannot modify listeners while broadcasting")]
    Broadcasting,

    /// In-flight enumeration or snapshot on a pool built without
    /// timer retention.
    #[error("Pool '{pool}' does not retain in-flight timers")]
    RetentionDisabled {
        /// Pool name.
        pool: String,
    },

    /// Aggregate snapshot restored into a detailed pool or the reverse.
    #[error("Snapshot kind mismatch: expected {expected}, got {actual}")]
    SnapshotMismatch {
        /// Kind of the receiving pool.
        expected: &'static str,
        /// Kind of the snapshot.
        actual: &'static str,
    },

    /// Second write of a resource identifier.
    #[error("Resource identifier already set to {current}")]
    IdAlreadySet {
        /// The identifier already assigned.
        current: u32,
    },

    /// Operation the pool kind does not offer.
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
    },
}

/// Top-level error type for servpool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// An argument was rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The pool was in the wrong state for the call.
    #[error("Illegal state: {0}")]
    State(#[from] StateError),

    /// Broken internal bookkeeping.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the inconsistency.
        message: String,
    },
}

impl PoolError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an illegal-state error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
