//! Scheduler boundary.
//!
//! Pools never own the event engine. Every mutating operation receives a
//! `&mut dyn Scheduler`, arms future callbacks as [`Wakeup`] values, and the
//! driver hands each wakeup back to the owning pool's `handle` method when its
//! virtual time is reached.

/// Reference event queue implementing [`Scheduler`].
pub mod queue;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timer::TimerId;

pub use queue::EventQueue;

/// Virtual simulation time.
pub type SimTime = f64;

/// Identifies a pool within a model; also the index work units use to look up
/// their default service times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolKey(pub usize);

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

/// Handle of a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey(pub u64);

/// Callback payload delivered back to a pool when its scheduled time arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// The current phase of a service timer reached its scheduled end.
    PhaseEnd {
        /// Owning pool.
        pool: PoolKey,
        /// Timer whose phase ends.
        timer: TimerId,
        /// Pool generation when armed.
        generation: u64,
    },
    /// A capacity schedule period boundary.
    CapacityChange {
        /// Owning pool.
        pool: PoolKey,
        /// Pool generation when armed.
        generation: u64,
        /// Period that begins.
        period: usize,
    },
}

impl Wakeup {
    /// Pool this wakeup must be routed to.
    #[must_use]
    pub const fn pool(&self) -> PoolKey {
        match self {
            Self::PhaseEnd { pool, .. } | Self::CapacityChange { pool, .. } => *pool,
        }
    }

    /// Pool generation stamped when the wakeup was armed.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::PhaseEnd { generation, .. } | Self::CapacityChange { generation, .. } => *generation,
        }
    }
}

/// Discrete-event scheduler consumed by pools.
///
/// Implementations must deliver wakeups in non-decreasing virtual-time order.
/// The pools guarantee `delay` is finite and `>= 0`.
pub trait Scheduler {
    /// Current virtual time.
    fn now(&self) -> SimTime;

    /// Arm `wakeup` to fire `delay` time units from now.
    fn schedule(&mut self, wakeup: Wakeup, delay: SimTime) -> EventKey;

    /// Remove a pending event. Returns false if it already fired or was cancelled.
    fn cancel(&mut self, key: EventKey) -> bool;
}

/// Clamp a generated delay to something a scheduler accepts.
pub(crate) fn clamp_delay(delay: SimTime) -> SimTime {
    if delay.is_nan() || delay < 0.0 {
        0.0
    } else {
        delay
    }
}
