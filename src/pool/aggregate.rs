//! Aggregate pool: capacity tracked as counters only.

use std::rc::Rc;

use tracing::debug;

use crate::config::{check_efficiency, CapacitySchedule, PoolConfig};
use crate::duration::DurationGenerator;
use crate::error::{PoolResult, StateError, ValidationError};
use crate::listener::PoolListener;
use crate::scheduler::{PoolKey, Scheduler, SimTime, Wakeup};
use crate::snapshot::PoolSnapshot;
use crate::timer::{PhaseOutcome, ServiceTimer, TimerId, TimerProgress};
use crate::work::WorkUnit;

use super::resource::ResourceId;
use super::service::{self, notify_pool, ServiceHost};
use super::state::PoolCore;
use super::ServicePool;

/// Capacity reachable with `total` agents at `efficiency`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn effective_capacity(total: usize, efficiency: f64) -> usize {
    (total as f64 * efficiency).round() as usize
}

/// Pool whose agents are interchangeable.
///
/// When capacity drops below the busy count, the shortfall is held as ghost
/// capacity that disappears as services complete.
#[derive(Debug)]
pub struct Pool<W: WorkUnit> {
    core: PoolCore<W>,
    initial: usize,
    total: usize,
    free: usize,
    ghost: usize,
    efficiency: f64,
}

impl<W: WorkUnit> Pool<W> {
    /// Create a pool from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `config` does not validate.
    pub fn new(key: PoolKey, config: &PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            core: PoolCore::new(key, config),
            initial: config.capacity,
            total: config.capacity,
            free: effective_capacity(config.capacity, config.efficiency),
            ghost: 0,
            efficiency: config.efficiency,
        })
    }

    /// Capture the pool state.
    ///
    /// # Errors
    ///
    /// `StateError::RetentionDisabled` unless the pool retains timers.
    pub fn snapshot(&self, sched: &dyn Scheduler) -> PoolResult<PoolSnapshot<W>> {
        let timers = self.in_flight()?.into_iter().map(ServiceTimer::detached_clone).collect();
        let snapshot = PoolSnapshot::capture(sched.now(), self.total, self.free, self.ghost, self.efficiency, timers);
        debug!(pool = %self.core.name, snapshot = %snapshot.id, timers = snapshot.timers.len(), "snapshot captured");
        Ok(snapshot)
    }

    /// Re-initialise the pool and load `snapshot` into it. In-flight services
    /// are re-created and fire at their original absolute times.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidSnapshot` if the counters are inconsistent.
    pub fn restore(&mut self, sched: &mut dyn Scheduler, snapshot: &PoolSnapshot<W>) -> PoolResult<()> {
        snapshot.validate()?;
        let expected = effective_capacity(snapshot.total, snapshot.efficiency);
        if snapshot.free + snapshot.timers.len() != expected + snapshot.ghost {
            return Err(ValidationError::InvalidSnapshot {
                reason: format!(
                    "free {} + busy {} does not match capacity {} + ghost {}",
                    snapshot.free,
                    snapshot.timers.len(),
                    expected,
                    snapshot.ghost
                ),
            }
            .into());
        }

        self.init(sched)?;
        self.efficiency = snapshot.efficiency;
        self.total = snapshot.total;
        for timer in &snapshot.timers {
            service::reinstate(self, sched, timer)?;
        }
        self.free = snapshot.free;
        self.ghost = snapshot.ghost;

        debug!(
            pool = %self.core.name,
            snapshot = %snapshot.id,
            total = self.total,
            free = self.free,
            busy = self.core.busy(),
            ghost = self.ghost,
            "snapshot restored"
        );
        notify_pool(self, sched, |l, p, s| l.pool_changed(p, s));
        Ok(())
    }
}

impl<W: WorkUnit> ServiceHost<W> for Pool<W> {
    fn core(&self) -> &PoolCore<W> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PoolCore<W> {
        &mut self.core
    }

    fn draw_contact(&mut self, _resource: Option<ResourceId>, unit: &W) -> PhaseOutcome {
        let key = self.core.key;
        self.core.contact_causes.sample(key, unit, None)
    }

    fn release_capacity(&mut self, _timer: &ServiceTimer<W>, _now: SimTime) -> bool {
        if self.ghost > 0 {
            self.ghost -= 1;
            true
        } else {
            self.free += 1;
            false
        }
    }
}

impl<W: WorkUnit> ServicePool<W> for Pool<W> {
    fn key(&self) -> PoolKey {
        self.core.key
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn generation(&self) -> u64 {
        self.core.generation
    }

    fn capacity(&self) -> usize {
        self.total
    }

    fn free(&self) -> usize {
        self.free
    }

    fn busy(&self) -> usize {
        self.core.busy()
    }

    fn busy_for(&self, category: usize) -> usize {
        self.core.busy_for(category)
    }

    fn ghost(&self) -> usize {
        self.ghost
    }

    fn efficiency(&self) -> f64 {
        self.efficiency
    }

    fn retains_timers(&self) -> bool {
        self.core.retain_timers
    }

    fn timer(&self, id: TimerId) -> Option<&ServiceTimer<W>> {
        self.core.timers.get(&id)
    }

    fn in_flight(&self) -> PoolResult<Vec<&ServiceTimer<W>>> {
        if !self.core.retain_timers {
            return Err(StateError::RetentionDisabled {
                pool: self.core.name.clone(),
            }
            .into());
        }
        Ok(self.core.in_flight().collect())
    }

    fn init(&mut self, sched: &mut dyn Scheduler) -> PoolResult<()> {
        self.core.reset(sched);
        self.total = self.initial;
        self.ghost = 0;
        self.free = effective_capacity(self.total, self.efficiency);
        debug!(pool = %self.core.name, generation = self.core.generation, total = self.total, free = self.free, "pool initialised");

        notify_pool(self, sched, |l, p, s| l.init(p, s));
        service::arm_schedule(self, sched)
    }

    fn set_capacity(&mut self, sched: &mut dyn Scheduler, capacity: usize) -> PoolResult<()> {
        let target = effective_capacity(capacity, self.efficiency);
        let busy = self.core.busy();
        let (free, ghost) = if target >= busy { (target - busy, 0) } else { (0, busy - target) };
        self.ghost = ghost;
        if capacity == self.total && free == self.free {
            return Ok(());
        }
        self.total = capacity;
        self.free = free;

        debug!(pool = %self.core.name, total = self.total, free, busy, ghost, "capacity changed");
        notify_pool(self, sched, |l, p, s| l.pool_changed(p, s));
        Ok(())
    }

    fn set_efficiency(&mut self, sched: &mut dyn Scheduler, efficiency: f64) -> PoolResult<()> {
        check_efficiency(efficiency)?;
        self.efficiency = efficiency;
        self.set_capacity(sched, self.total)
    }

    fn serve(&mut self, sched: &mut dyn Scheduler, unit: W) -> PoolResult<TimerProgress<W>> {
        if self.free == 0 {
            return Err(StateError::NoFreeCapacity {
                pool: self.core.name.clone(),
            }
            .into());
        }
        self.free -= 1;
        service::start(self, sched, unit, None)
    }

    fn end_contact(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<TimerProgress<W>>> {
        service::end_contact(self, sched, id, code)
    }

    fn end_service(&mut self, sched: &mut dyn Scheduler, id: TimerId, code: usize) -> PoolResult<Option<ServiceTimer<W>>> {
        service::end_service(self, sched, id, code)
    }

    fn handle(&mut self, sched: &mut dyn Scheduler, wakeup: Wakeup) -> PoolResult<Option<TimerProgress<W>>> {
        service::handle(self, sched, wakeup)
    }

    fn add_listener(&mut self, listener: Rc<dyn PoolListener<W>>) -> PoolResult<()> {
        Ok(self.core.listeners.add(listener)?)
    }

    fn remove_listener(&mut self, listener: &Rc<dyn PoolListener<W>>) -> PoolResult<bool> {
        Ok(self.core.listeners.remove(listener)?)
    }

    fn set_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        self.core.contact_causes.set(code, generator);
    }

    fn set_after_contact_time_generator(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        self.core.after_contact_causes.set(code, generator);
    }

    fn attach_schedule(&mut self, sched: &mut dyn Scheduler, schedule: CapacitySchedule) -> PoolResult<()> {
        service::attach_schedule(self, sched, schedule)
    }
}
