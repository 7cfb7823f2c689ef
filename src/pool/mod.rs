//! Service pools.
//!
//! Two variants share one capability interface, [`ServicePool`]:
//!
//! - [`Pool`]: aggregate counters only; ghosts are a number.
//! - [`DetailedPool`]: individually addressable [`Resource`]s held in idle,
//!   busy and ghost collections.
//!
//! [`AnyPool`] is the tagged variant over both, for code that owns pools of
//! either kind.
//!
//! Invariant for every reachable state: `capacity + ghost == busy + idle`,
//! with `free <= capacity`.

use std::rc::Rc;

use crate::config::CapacitySchedule;
use crate::duration::DurationGenerator;
use crate::error::{PoolResult, StateError};
use crate::listener::PoolListener;
use crate::scheduler::{PoolKey, Scheduler, Wakeup};
use crate::snapshot::AnySnapshot;
use crate::timer::{ServiceTimer, TimerId, TimerProgress};
use crate::work::WorkUnit;

pub mod aggregate;
pub mod detailed;
pub mod resource;
pub(crate) mod service;
pub(crate) mod state;

pub use aggregate::Pool;
pub use detailed::DetailedPool;
pub use resource::{Resource, ResourceId, ResourceRole};

/// Operations common to aggregate and detailed pools.
pub trait ServicePool<W: WorkUnit> {
    /// Routing key stamped on every wakeup this pool schedules.
    fn key(&self) -> PoolKey;

    /// Name from the pool's configuration.
    fn name(&self) -> &str;

    /// Incremented by every `init`.
    fn generation(&self) -> u64;

    /// Nominal capacity, ghosts excluded.
    fn capacity(&self) -> usize;

    /// Capacity able to accept work right now.
    fn free(&self) -> usize;

    /// Units in service, ghosts included.
    fn busy(&self) -> usize;

    /// Busy count for one work category.
    fn busy_for(&self, category: usize) -> usize;

    /// Removed capacity still finishing its service.
    fn ghost(&self) -> usize;

    /// Capacity not serving anything, derived.
    fn idle(&self) -> usize {
        (self.capacity() + self.ghost()).saturating_sub(self.busy())
    }

    /// Fraction of nominal capacity that accepts work.
    fn efficiency(&self) -> f64;

    /// Whether `in_flight()` and snapshots are available.
    fn retains_timers(&self) -> bool;

    /// Pending service by handle.
    fn timer(&self, id: TimerId) -> Option<&ServiceTimer<W>>;

    /// Every pending service, in creation order.
    ///
    /// # Errors
    ///
    /// `StateError::RetentionDisabled` unless the pool retains timers.
    fn in_flight(&self) -> PoolResult<Vec<&ServiceTimer<W>>>;

    /// Start a new replication: drop every service and invalidate their
    /// pending wakeups.
    fn init(&mut self, sched: &mut dyn Scheduler) -> PoolResult<()>;

    /// Change the nominal capacity. Busy units that no longer fit become
    /// ghosts and leave once their service ends.
    fn set_capacity(&mut self, sched: &mut dyn Scheduler, capacity: usize) -> PoolResult<()>;

    /// # Errors
    ///
    /// `ValidationError::EfficiencyOutOfRange` outside `[0, 1]`.
    fn set_efficiency(&mut self, sched: &mut dyn Scheduler, efficiency: f64) -> PoolResult<()>;

    /// Assign capacity to `unit`.
    ///
    /// # Errors
    ///
    /// `StateError::NoFreeCapacity` when nothing is free.
    fn serve(&mut self, sched: &mut dyn Scheduler, unit: W) -> PoolResult<TimerProgress<W>>;

    /// End the contact phase of `id` early with outcome `code`.
    ///
    /// Returns `None` if the timer is not pending in this pool or its
    /// contact phase is already over.
    fn end_contact(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<TimerProgress<W>>>;

    /// End the after-contact phase of `id` early with outcome `code`.
    ///
    /// Returns `None` if the timer is not pending in this pool or is still in
    /// contact.
    fn end_service(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<ServiceTimer<W>>>;

    /// Process a wakeup fired by the scheduler. Obsolete wakeups yield `None`.
    fn handle(&mut self, sched: &mut dyn Scheduler, wakeup: Wakeup) -> PoolResult<Option<TimerProgress<W>>>;

    /// # Errors
    ///
    /// `StateError::Broadcasting` from inside a notification.
    fn add_listener(&mut self, listener: Rc<dyn PoolListener<W>>) -> PoolResult<()>;

    /// # Errors
    ///
    /// `StateError::Broadcasting` from inside a notification.
    fn remove_listener(&mut self, listener: &Rc<dyn PoolListener<W>>) -> PoolResult<bool>;

    /// Register the contact-time cause for outcome `code`.
    fn set_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>);

    /// Register the after-contact-time cause for outcome `code`.
    fn set_after_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>);

    /// Drive the capacity from `schedule`, now and on every `init`.
    fn attach_schedule(&mut self, sched: &mut dyn Scheduler, schedule: CapacitySchedule) -> PoolResult<()>;

    /// Resource-level view, for detailed pools only.
    fn as_detailed(&self) -> Option<&DetailedPool<W>> {
        None
    }

    /// Mutable resource-level view, for detailed pools only.
    fn as_detailed_mut(&mut self) -> Option<&mut DetailedPool<W>> {
        None
    }
}

/// A pool of either kind.
#[derive(Debug)]
pub enum AnyPool<W: WorkUnit> {
    /// Counters only.
    Aggregate(Pool<W>),
    /// Addressable resources.
    Detailed(DetailedPool<W>),
}

macro_rules! dispatch {
    ($self:expr, $pool:ident => $body:expr) => {
        match $self {
            AnyPool::Aggregate($pool) => $body,
            AnyPool::Detailed($pool) => $body,
        }
    };
}

impl<W: WorkUnit> AnyPool<W> {
    /// `"aggregate"` or `"detailed"`, as used in snapshot mismatch errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Detailed(_) => "detailed",
        }
    }

    /// # Errors
    ///
    /// `StateError::RetentionDisabled` unless the pool retains timers.
    pub fn snapshot(&self, sched: &dyn Scheduler) -> PoolResult<AnySnapshot<W>> {
        match self {
            Self::Aggregate(pool) => pool.snapshot(sched).map(AnySnapshot::Aggregate),
            Self::Detailed(pool) => pool.snapshot(sched).map(AnySnapshot::Detailed),
        }
    }

    /// # Errors
    ///
    /// `StateError::SnapshotMismatch` when the snapshot kind differs from the
    /// pool kind.
    pub fn restore(&mut self, sched: &mut dyn Scheduler, snapshot: &AnySnapshot<W>) -> PoolResult<()> {
        match (self, snapshot) {
            (Self::Aggregate(pool), AnySnapshot::Aggregate(s)) => pool.restore(sched, s),
            (Self::Detailed(pool), AnySnapshot::Detailed(s)) => pool.restore(sched, s),
            (pool, s) => Err(StateError::SnapshotMismatch {
                expected: pool.kind(),
                actual: s.kind(),
            }
            .into()),
        }
    }
}

impl<W: WorkUnit> From<Pool<W>> for AnyPool<W> {
    fn from(pool: Pool<W>) -> Self {
        Self::Aggregate(pool)
    }
}

impl<W: WorkUnit> From<DetailedPool<W>> for AnyPool<W> {
    fn from(pool: DetailedPool<W>) -> Self {
        Self::Detailed(pool)
    }
}

impl<W: WorkUnit> ServicePool<W> for AnyPool<W> {
    fn key(&self) -> PoolKey {
        dispatch!(self, p => p.key())
    }

    fn name(&self) -> &str {
        dispatch!(self, p => p.name())
    }

    fn generation(&self) -> u64 {
        dispatch!(self, p => p.generation())
    }

    fn capacity(&self) -> usize {
        dispatch!(self, p => p.capacity())
    }

    fn free(&self) -> usize {
        dispatch!(self, p => p.free())
    }

    fn busy(&self) -> usize {
        dispatch!(self, p => p.busy())
    }

    fn busy_for(&self, category: usize) -> usize {
        dispatch!(self, p => p.busy_for(category))
    }

    fn ghost(&self) -> usize {
        dispatch!(self, p => p.ghost())
    }

    fn idle(&self) -> usize {
        dispatch!(self, p => p.idle())
    }

    fn efficiency(&self) -> f64 {
        dispatch!(self, p => p.efficiency())
    }

    fn retains_timers(&self) -> bool {
        dispatch!(self, p => p.retains_timers())
    }

    fn timer(&self, id: TimerId) -> Option<&ServiceTimer<W>> {
        dispatch!(self, p => p.timer(id))
    }

    fn in_flight(&self) -> PoolResult<Vec<&ServiceTimer<W>>> {
        dispatch!(self, p => p.in_flight())
    }

    fn init(&mut self, sched: &mut dyn Scheduler) -> PoolResult<()> {
        dispatch!(self, p => p.init(sched))
    }

    /// Change the nominal capacity. Busy units that no longer fit become
    /// ghosts and leave once their service ends.
    fn set_capacity(&mut self, sched: &mut dyn Scheduler, capacity: usize) -> PoolResult<()> {
        dispatch!(self, p => p.set_capacity(sched, capacity))
    }

    fn set_efficiency(&mut self, sched: &mut dyn Scheduler, efficiency: f64) -> PoolResult<()> {
        dispatch!(self, p => p.set_efficiency(sched, efficiency))
    }

    fn serve(&mut self, sched: &mut dyn Scheduler, unit: W) -> PoolResult<TimerProgress<W>> {
        dispatch!(self, p => p.serve(sched, unit))
    }

    fn end_contact(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<TimerProgress<W>>> {
        dispatch!(self, p => p.end_contact(sched, id, code))
    }

    fn end_service(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<ServiceTimer<W>>> {
        dispatch!(self, p => p.end_service(sched, id, code))
    }

    fn handle(&mut self, sched: &mut dyn Scheduler, wakeup: Wakeup) -> PoolResult<Option<TimerProgress<W>>> {
        dispatch!(self, p => p.handle(sched, wakeup))
    }

    fn add_listener(&mut self, listener: Rc<dyn PoolListener<W>>) -> PoolResult<()> {
        dispatch!(self, p => p.add_listener(listener))
    }

    fn remove_listener(&mut self, listener: &Rc<dyn PoolListener<W>>) -> PoolResult<bool> {
        dispatch!(self, p => p.remove_listener(listener))
    }

    fn set_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        dispatch!(self, p => p.set_contact_time_generator(code, generator))
    }

    fn set_after_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        dispatch!(self, p => p.set_after_contact_time_generator(code, generator))
    }

    fn attach_schedule(&mut self, sched: &mut dyn Scheduler, schedule: CapacitySchedule) -> PoolResult<()> {
        dispatch!(self, p => p.attach_schedule(sched, schedule))
    }

    fn as_detailed(&self) -> Option<&DetailedPool<W>> {
        match self {
            Self::Aggregate(_) => None,
            Self::Detailed(pool) => Some(pool),
        }
    }

    fn as_detailed_mut(&mut self) -> Option<&mut DetailedPool<W>> {
        match self {
            Self::Aggregate(_) => None,
            Self::Detailed(pool) => Some(pool),
        }
    }
}
