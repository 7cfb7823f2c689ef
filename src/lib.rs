//! # servpool - Service-agent pools for discrete-event simulation
//!
//! servpool models the capacity side of a contact center: pools of agents
//! that serve work units in two timed phases (contact, then after-contact
//! work), driven by an external discrete-event scheduler.
//!
//! ## Core Concepts
//!
//! - **Pool**: aggregate capacity counters with efficiency and ghost accounting
//! - **DetailedPool**: individually addressable agents with oldest-first
//!   eviction and longest-idle-first selection
//! - **ServiceTimer**: the two-phase state machine of one service
//! - **Snapshot**: a point-in-time capture restorable into a fresh pool
//!
//! Everything runs on one logical thread. Pools never hold the scheduler;
//! it is passed into every mutating call, and fired [`Wakeup`]s are handed
//! back to the owning pool's `handle`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use servpool::{ConstantDuration, EventQueue, Pool, PoolConfig, PoolKey, ServicePool};
//!
//! let mut queue = EventQueue::new();
//! let mut pool = Pool::new(PoolKey(0), &PoolConfig::named("sales", 3))?;
//! pool.set_contact_time_generator(0, Some(Box::new(ConstantDuration::new(120.0)?)));
//!
//! let progress = pool.serve(&mut queue, call)?;
//! queue.run(|q, wakeup| {
//!     if let Ok(Some(done)) = pool.handle(q, wakeup) {
//!         // hand the unit back to the router
//!     }
//! });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod duration;
pub mod error;
pub mod listener;
pub mod pool;
pub mod scheduler;
pub mod snapshot;
pub mod timer;
pub mod work;

// Re-export primary types at crate root for convenience
pub use config::{CapacitySchedule, PoolConfig};
pub use duration::{
    CompetingCauses, ConstantDuration, DefaultAfterContactTime, DefaultContactTime, DurationGenerator,
    FnDuration, PhaseKind,
};
pub use error::{PoolError, PoolResult, StateError, ValidationError};
pub use listener::{BroadcastGuard, Broadcaster, PoolListener, ResourceListener};
pub use pool::{AnyPool, DetailedPool, Pool, Resource, ResourceId, ResourceRole, ServicePool};
pub use scheduler::{EventKey, EventQueue, PoolKey, Scheduler, SimTime, Wakeup};
pub use snapshot::{AnySnapshot, DetailedPoolSnapshot, PoolSnapshot, ResourceSnapshot, SnapshotId};
pub use timer::{PhaseOutcome, ServiceRecord, ServiceTimer, TimerId, TimerPhase, TimerProgress};
pub use work::WorkUnit;
