//! Detailed pool: capacity made of individually addressable resources.
//!
//! Attached resources live in three ordered collections:
//!
//! - `idle`: waiting for work, in the order they became idle.
//! - `busy`: serving a unit, ghosts included.
//! - `ghosts`: removed from the pool but still finishing their unit.
//!
//! Capacity is `|idle| + |busy| - |ghosts|` and is only ever changed by moving
//! resources between collections.

use std::rc::Rc;

use tracing::debug;

use crate::config::{CapacitySchedule, PoolConfig};
use crate::duration::DurationGenerator;
use crate::error::{PoolResult, StateError, ValidationError};
use crate::listener::{PoolListener, ResourceListener};
use crate::scheduler::{PoolKey, Scheduler, SimTime, Wakeup};
use crate::snapshot::{DetailedPoolSnapshot, PoolSnapshot, ResourceSnapshot};
use crate::timer::{PhaseOutcome, ServiceTimer, TimerId, TimerProgress};
use crate::work::WorkUnit;

use super::resource::{Resource, ResourceId};
use super::service::{self, notify_pool, ServiceHost, Stage};
use super::state::PoolCore;
use super::ServicePool;

fn remove_ordered(ids: &mut Vec<ResourceId>, id: ResourceId) -> bool {
    match ids.iter().position(|&r| r == id) {
        Some(pos) => {
            ids.remove(pos);
            true
        }
        None => false,
    }
}

/// Pool of identifiable agents with oldest-first eviction and
/// longest-idle-first selection.
#[derive(Debug)]
pub struct DetailedPool<W: WorkUnit> {
    core: PoolCore<W>,
    initial: usize,
    resources: Vec<Resource<W>>,
    idle: Vec<ResourceId>,
    busy: Vec<ResourceId>,
    ghosts: Vec<ResourceId>,
    free: usize,
    bulk_change: bool,
}

impl<W: WorkUnit> DetailedPool<W> {
    /// Create a pool with `config.capacity` fresh resources admitted at time 0.
    ///
    /// # Errors
    ///
    /// `ValidationError` for an invalid configuration;
    /// `StateError::Unsupported` for an efficiency other than 1.
    pub fn new(key: PoolKey, config: &PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        if config.efficiency != 1.0 {
            return Err(StateError::Unsupported {
                operation: "efficiency below 1 on a detailed pool",
            }
            .into());
        }
        let mut pool = Self {
            core: PoolCore::new(key, config),
            initial: config.capacity,
            resources: Vec::with_capacity(config.capacity),
            idle: Vec::with_capacity(config.capacity),
            busy: Vec::new(),
            ghosts: Vec::new(),
            free: 0,
            bulk_change: false,
        };
        for _ in 0..config.capacity {
            let id = pool.new_resource();
            let resource = &mut pool.resources[id.0];
            resource.attached = true;
            resource.stamp_admission(0.0);
            pool.idle.push(id);
            pool.free += 1;
        }
        Ok(pool)
    }

    /// Create an unattached resource in this pool's arena.
    pub fn new_resource(&mut self) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(Resource::new(id));
        id
    }

    /// Resource by handle, attached or not.
    #[must_use]
    pub fn resource(&self, id: ResourceId) -> Option<&Resource<W>> {
        self.resources.get(id.0)
    }

    /// Mutable access for identity, overrides and listeners. Membership and
    /// availability go through the pool.
    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource<W>> {
        self.resources.get_mut(id.0)
    }

    /// Every resource ever created by this pool, attached or not.
    pub fn resources(&self) -> impl Iterator<Item = &Resource<W>> {
        self.resources.iter()
    }

    /// Idle resources in selection order, unavailable ones included.
    #[must_use]
    pub fn idle_resources(&self) -> &[ResourceId] {
        &self.idle
    }

    /// Busy resources, ghosts included.
    #[must_use]
    pub fn busy_resources(&self) -> &[ResourceId] {
        &self.busy
    }

    /// Ghosts in the order they were ghosted.
    #[must_use]
    pub fn ghost_resources(&self) -> &[ResourceId] {
        &self.ghosts
    }

    /// # Errors
    ///
    /// `StateError::UnknownResource` for a handle not issued by this pool.
    pub fn add_resource_listener(&mut self, id: ResourceId, listener: Rc<dyn ResourceListener<W>>) -> PoolResult<()> {
        self.slot_mut(id)?.add_listener(listener)
    }

    fn slot_mut(&mut self, id: ResourceId) -> PoolResult<&mut Resource<W>> {
        self.resources.get_mut(id.0).ok_or_else(|| StateError::UnknownResource { id }.into())
    }

    fn changed(&mut self, sched: &mut dyn Scheduler, id: ResourceId) {
        if let Some(resource) = self.resources.get(id.0) {
            resource.notify(|l, r| l.resource_changed(r));
        }
        if !self.bulk_change {
            debug!(pool = %self.core.name, total = self.capacity(), free = self.free, ghost = self.ghosts.len(), "membership changed");
            notify_pool(self, sched, |l, p, s| l.pool_changed(p, s));
        }
    }

    /// Admit `id` into the pool.
    ///
    /// A ghost of this pool is reinstated and keeps serving; any other
    /// resource joins the tail of the idle collection. Returns `false` if the
    /// resource is already attached.
    ///
    /// # Errors
    ///
    /// `StateError::UnknownResource` for a handle not issued by this pool.
    pub fn add_resource(&mut self, sched: &mut dyn Scheduler, id: ResourceId) -> PoolResult<bool> {
        let now = sched.now();
        let resource = self.slot_mut(id)?;
        if resource.attached {
            return Ok(false);
        }
        resource.attached = true;
        resource.stamp_admission(now);
        if resource.ghost {
            resource.ghost = false;
            remove_ordered(&mut self.ghosts, id);
        } else {
            resource.idle_since = now;
            if resource.available {
                self.free += 1;
            }
            self.idle.push(id);
        }
        self.changed(sched, id);
        Ok(true)
    }

    /// Take `id` out of the pool.
    ///
    /// An idle resource leaves at once; a busy one becomes a ghost until its
    /// service completes. Returns `false` if the resource is not attached.
    ///
    /// # Errors
    ///
    /// `StateError::UnknownResource` for a handle not issued by this pool.
    pub fn remove_resource(&mut self, sched: &mut dyn Scheduler, id: ResourceId) -> PoolResult<bool> {
        let resource = self.slot_mut(id)?;
        if !resource.attached {
            return Ok(false);
        }
        resource.attached = false;
        if resource.timer.is_some() {
            resource.ghost = true;
            self.ghosts.push(id);
        } else {
            if resource.available {
                self.free -= 1;
            }
            remove_ordered(&mut self.idle, id);
        }
        self.changed(sched, id);
        Ok(true)
    }

    /// Mark `id` available or unavailable for new work. Pool listeners hear
    /// about it only while the resource is attached.
    ///
    /// # Errors
    ///
    /// `StateError::UnknownResource` for a handle not issued by this pool.
    pub fn set_available(&mut self, sched: &mut dyn Scheduler, id: ResourceId, available: bool) -> PoolResult<()> {
        let resource = self.slot_mut(id)?;
        if resource.available == available {
            return Ok(());
        }
        resource.available = available;
        if !resource.attached {
            resource.notify(|l, r| l.resource_changed(r));
            return Ok(());
        }
        if resource.timer.is_none() {
            if available {
                self.free += 1;
            } else {
                self.free -= 1;
            }
        }
        let bulk = std::mem::replace(&mut self.bulk_change, false);
        self.changed(sched, id);
        self.bulk_change = bulk;
        Ok(())
    }

    /// The available idle resource that has been idle the longest.
    #[must_use]
    pub fn select_server(&self) -> Option<ResourceId> {
        self.idle.iter().copied().find(|id| self.resources[id.0].available)
    }

    /// Serve `unit` on a specific resource.
    ///
    /// # Errors
    ///
    /// `StateError::ResourceNotIdle` unless `id` is idle and available here.
    pub fn serve_with(&mut self, sched: &mut dyn Scheduler, unit: W, id: ResourceId) -> PoolResult<TimerProgress<W>> {
        let resource = self.resources.get(id.0).ok_or(StateError::UnknownResource { id })?;
        let position = self.idle.iter().position(|&r| r == id);
        let Some(position) = position.filter(|_| resource.available) else {
            return Err(StateError::ResourceNotIdle {
                id,
                pool: self.core.name.clone(),
            }
            .into());
        };
        self.idle.remove(position);
        self.busy.push(id);
        self.free -= 1;
        service::start(self, sched, unit, Some(id))
    }

    /// Oldest-admitted resource among `candidates`; the first one wins ties.
    fn oldest(&self, candidates: impl Iterator<Item = ResourceId>) -> Option<ResourceId> {
        let mut best: Option<(ResourceId, SimTime)> = None;
        for id in candidates {
            let admitted = self.resources[id.0].admitted_at();
            if best.map_or(true, |(_, t)| admitted < t) {
                best = Some((id, admitted));
            }
        }
        best.map(|(id, _)| id)
    }

    fn eviction_victim(&self) -> Option<ResourceId> {
        self.oldest(self.idle.iter().copied()).or_else(|| {
            self.oldest(self.busy.iter().copied().filter(|id| !self.resources[id.0].ghost))
        })
    }

    /// Move resources until the capacity is `target`, without pool-level
    /// notifications. Growth reactivates ghosts, then re-admits detached
    /// resources in handle order, then creates new ones.
    fn resize(&mut self, sched: &mut dyn Scheduler, target: usize) -> PoolResult<()> {
        let bulk = std::mem::replace(&mut self.bulk_change, true);
        let result = self.resize_unguarded(sched, target);
        self.bulk_change = bulk;
        result
    }

    fn resize_unguarded(&mut self, sched: &mut dyn Scheduler, target: usize) -> PoolResult<()> {
        while self.capacity() < target {
            let detached = self.resources.iter().find(|r| !r.attached && !r.ghost).map(Resource::handle);
            let id = match (self.ghosts.first(), detached) {
                (Some(&ghost), _) => ghost,
                (None, Some(detached)) => detached,
                (None, None) => self.new_resource(),
            };
            self.add_resource(sched, id)?;
        }
        while self.capacity() > target {
            let Some(victim) = self.eviction_victim() else {
                break;
            };
            self.remove_resource(sched, victim)?;
        }
        Ok(())
    }

    /// Capture the pool state, including every attached or ghost resource.
    ///
    /// # Errors
    ///
    /// `StateError::RetentionDisabled` unless the pool retains timers.
    pub fn snapshot(&self, sched: &dyn Scheduler) -> PoolResult<DetailedPoolSnapshot<W>> {
        let timers = self.in_flight()?.into_iter().map(ServiceTimer::detached_clone).collect();
        let capture = |ids: &[ResourceId]| -> Vec<ResourceSnapshot> {
            ids.iter().map(|id| ResourceSnapshot::capture(&self.resources[id.0])).collect()
        };
        let snapshot = DetailedPoolSnapshot {
            base: PoolSnapshot::capture(sched.now(), self.capacity(), self.free, self.ghosts.len(), 1.0, timers),
            idle: capture(&self.idle),
            busy: capture(&self.busy),
            ghosts: self.ghosts.clone(),
        };
        debug!(
            pool = %self.core.name,
            snapshot = %snapshot.base.id,
            idle = snapshot.idle.len(),
            busy = snapshot.busy.len(),
            "snapshot captured"
        );
        Ok(snapshot)
    }

    /// Re-initialise the pool and rebuild it from `snapshot`.
    ///
    /// Resources keep their handles; the arena grows if the snapshot names a
    /// handle this pool never issued. Resources not named by the snapshot are
    /// left unattached.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidSnapshot` if the snapshot is inconsistent.
    pub fn restore(&mut self, sched: &mut dyn Scheduler, snapshot: &DetailedPoolSnapshot<W>) -> PoolResult<()> {
        snapshot.validate()?;
        self.init(sched)?;

        for resource in &mut self.resources {
            resource.attached = false;
            resource.ghost = false;
            resource.timer = None;
        }
        self.idle.clear();
        self.busy.clear();
        self.ghosts.clear();
        self.free = 0;

        let highest = snapshot.idle.iter().chain(&snapshot.busy).map(|s| s.resource.0).max();
        while highest.is_some_and(|h| self.resources.len() <= h) {
            self.new_resource();
        }
        for captured in &snapshot.idle {
            captured.apply(&mut self.resources[captured.resource.0]);
            if captured.available {
                self.free += 1;
            }
            self.idle.push(captured.resource);
        }
        for captured in &snapshot.busy {
            captured.apply(&mut self.resources[captured.resource.0]);
            self.busy.push(captured.resource);
        }
        self.ghosts = snapshot.ghosts.clone();

        for captured in &snapshot.base.timers {
            let id = service::reinstate(self, sched, captured)?;
            let Some(resource) = captured.resource().and_then(|r| self.resources.get_mut(r.0)) else {
                return Err(ValidationError::InvalidSnapshot {
                    reason: format!("timer {} has no resource", captured.id()),
                }
                .into());
            };
            resource.timer = Some(id);
        }

        debug!(
            pool = %self.core.name,
            snapshot = %snapshot.base.id,
            total = self.capacity(),
            free = self.free,
            busy = self.core.busy(),
            ghost = self.ghosts.len(),
            "snapshot restored"
        );
        for id in self.idle.iter().chain(&self.busy) {
            self.resources[id.0].notify(|l, r| l.resource_changed(r));
        }
        notify_pool(self, sched, |l, p, s| l.pool_changed(p, s));
        Ok(())
    }
}

impl<W: WorkUnit> ServiceHost<W> for DetailedPool<W> {
    fn core(&self) -> &PoolCore<W> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PoolCore<W> {
        &mut self.core
    }

    fn draw_contact(&mut self, resource: Option<ResourceId>, unit: &W) -> PhaseOutcome {
        let key = self.core.key;
        let primary = resource
            .and_then(|id| self.resources.get_mut(id.0))
            .and_then(|r| r.overrides.get_mut(&unit.category()))
            .map(|g| &mut **g);
        self.core.contact_causes.sample(key, unit, primary)
    }

    fn assign(&mut self, timer: &ServiceTimer<W>) {
        if let Some(resource) = timer.resource().and_then(|id| self.resources.get_mut(id.0)) {
            resource.timer = Some(timer.id());
        }
    }

    fn release_capacity(&mut self, timer: &ServiceTimer<W>, now: SimTime) -> bool {
        let Some(id) = timer.resource() else {
            return false;
        };
        let Some(resource) = self.resources.get_mut(id.0) else {
            return false;
        };
        resource.timer = None;
        remove_ordered(&mut self.busy, id);
        if resource.ghost {
            resource.ghost = false;
            remove_ordered(&mut self.ghosts, id);
            return true;
        }
        resource.idle_since = now;
        if resource.available {
            self.free += 1;
        }
        self.idle.push(id);
        false
    }

    fn notify_resource(&self, stage: Stage, timer: &ServiceTimer<W>) {
        let Some(resource) = timer.resource().and_then(|id| self.resources.get(id.0)) else {
            return;
        };
        resource.notify(|l, r| match stage {
            Stage::Begin => l.begin_service(r, timer),
            Stage::EndContact => l.end_contact(r, timer),
            Stage::EndService => l.end_service(r, timer),
        });
    }
}

impl<W: WorkUnit> ServicePool<W> for DetailedPool<W> {
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
        self.idle.len() + self.busy.len() - self.ghosts.len()
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
        self.ghosts.len()
    }

    fn efficiency(&self) -> f64 {
        1.0
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
        let now = sched.now();
        self.core.reset(sched);

        for id in self.ghosts.drain(..) {
            let resource = &mut self.resources[id.0];
            resource.ghost = false;
            resource.timer = None;
        }
        for id in self.busy.drain(..) {
            let resource = &mut self.resources[id.0];
            resource.timer = None;
            if resource.attached {
                self.idle.push(id);
            }
        }
        for resource in &mut self.resources {
            resource.init_overrides();
        }
        for id in &self.idle {
            self.resources[id.0].idle_since = now;
        }
        self.free = self.idle.iter().filter(|id| self.resources[id.0].available).count();
        self.resize(sched, self.initial)?;

        debug!(pool = %self.core.name, generation = self.core.generation, total = self.capacity(), free = self.free, "pool initialised");
        for id in &self.idle {
            self.resources[id.0].notify(|l, r| l.init(r));
        }
        notify_pool(self, sched, |l, p, s| l.init(p, s));
        service::arm_schedule(self, sched)
    }

    fn set_capacity(&mut self, sched: &mut dyn Scheduler, capacity: usize) -> PoolResult<()> {
        let before = (self.capacity(), self.free);
        self.resize(sched, capacity)?;
        if (self.capacity(), self.free) == before {
            return Ok(());
        }
        debug!(
            pool = %self.core.name,
            total = self.capacity(),
            free = self.free,
            busy = self.core.busy(),
            ghost = self.ghosts.len(),
            "capacity changed"
        );
        notify_pool(self, sched, |l, p, s| l.pool_changed(p, s));
        Ok(())
    }

    fn set_efficiency(&mut self, _sched: &mut dyn Scheduler, efficiency: f64) -> PoolResult<()> {
        crate::config::check_efficiency(efficiency)?;
        if efficiency != 1.0 {
            return Err(StateError::Unsupported {
                operation: "efficiency below 1 on a detailed pool",
            }
            .into());
        }
        Ok(())
    }

    fn serve(&mut self, sched: &mut dyn Scheduler, unit: W) -> PoolResult<TimerProgress<W>> {
        let Some(id) = self.select_server() else {
            return Err(StateError::NoFreeCapacity {
                pool: self.core.name.clone(),
            }
            .into());
        };
        self.serve_with(sched, unit, id)
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

    fn as_detailed(&self) -> Option<&DetailedPool<W>> {
        Some(self)
    }

    fn as_detailed_mut(&mut self) -> Option<&mut DetailedPool<W>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::ConstantDuration;
    use crate::scheduler::EventQueue;

    #[derive(Debug, Clone)]
    struct Chat;

    impl WorkUnit for Chat {
        fn category(&self) -> usize {
            0
        }

        fn default_contact_time(&self, _pool: PoolKey) -> Option<f64> {
            Some(4.0)
        }

        fn default_after_contact_time(&self, _pool: PoolKey) -> Option<f64> {
            Some(0.0)
        }
    }

    fn pool(capacity: usize) -> DetailedPool<Chat> {
        DetailedPool::new(PoolKey(1), &PoolConfig::named("chat", capacity)).unwrap()
    }

    #[test]
    fn new_pool_is_all_idle() {
        let p = pool(3);
        assert_eq!(p.capacity(), 3);
        assert_eq!(p.free(), 3);
        assert_eq!(p.idle_resources(), &[ResourceId(0), ResourceId(1), ResourceId(2)]);
        assert!(p.resources().all(|r| r.first_assigned_at() == Some(0.0)));
    }

    #[test]
    fn efficiency_is_fixed() {
        let cfg = PoolConfig::named("chat", 1).with_efficiency(0.5);
        assert!(DetailedPool::<Chat>::new(PoolKey(1), &cfg).unwrap_err().is_state());

        let mut q = EventQueue::new();
        let mut p = pool(1);
        p.set_efficiency(&mut q, 1.0).unwrap();
        assert!(p.set_efficiency(&mut q, 0.9).unwrap_err().is_state());
        assert!(p.set_efficiency(&mut q, 2.0).unwrap_err().is_validation());
    }

    #[test]
    fn add_and_remove_are_soft() {
        let mut q = EventQueue::new();
        let mut p = pool(1);
        assert!(!p.add_resource(&mut q, ResourceId(0)).unwrap());
        assert!(p.remove_resource(&mut q, ResourceId(0)).unwrap());
        assert!(!p.remove_resource(&mut q, ResourceId(0)).unwrap());
        assert_eq!(p.capacity(), 0);
        assert!(p.add_resource(&mut q, ResourceId(0)).unwrap());
        assert!(p.add_resource(&mut q, ResourceId(9)).unwrap_err().is_state());
    }

    #[test]
    fn busy_resource_returns_to_idle_tail() {
        let mut q = EventQueue::new();
        let mut p = pool(2);
        let progress = p.serve(&mut q, Chat).unwrap();
        assert_eq!(p.resource(ResourceId(0)).and_then(Resource::timer), Some(progress.id()));
        assert_eq!(p.idle_resources(), &[ResourceId(1)]);

        q.run(|q, w| {
            p.handle(q, w).unwrap();
        });
        assert_eq!(p.idle_resources(), &[ResourceId(1), ResourceId(0)]);
        assert_eq!(p.resource(ResourceId(0)).map(Resource::idle_since), Some(4.0));
        assert_eq!(p.free(), 2);
    }

    #[test]
    fn per_resource_override_replaces_code_zero() {
        let mut q = EventQueue::new();
        let mut p = pool(2);
        p.set_contact_time_generator(1, Some(Box::new(ConstantDuration::new(9.0).unwrap())));
        if let Some(r) = p.resource_mut(ResourceId(1)) {
            r.set_contact_time_override(0, Some(Box::new(ConstantDuration::new(2.0).unwrap())));
        }
        let slow = p.serve_with(&mut q, Chat, ResourceId(0)).unwrap().id();
        let fast = p.serve_with(&mut q, Chat, ResourceId(1)).unwrap().id();
        assert_eq!(p.timer(slow).map(|t| t.record().scheduled_contact), Some(PhaseOutcome::new(4.0, 0)));
        assert_eq!(p.timer(fast).map(|t| t.record().scheduled_contact), Some(PhaseOutcome::new(2.0, 0)));
    }

    #[test]
    fn serve_with_rejects_busy_or_unavailable() {
        let mut q = EventQueue::new();
        let mut p = pool(2);
        p.serve_with(&mut q, Chat, ResourceId(0)).unwrap();
        assert!(p.serve_with(&mut q, Chat, ResourceId(0)).unwrap_err().is_state());
        p.set_available(&mut q, ResourceId(1), false).unwrap();
        assert_eq!(p.free(), 0);
        assert!(p.serve(&mut q, Chat).unwrap_err().is_state());
        assert!(p.serve_with(&mut q, Chat, ResourceId(1)).unwrap_err().is_state());
    }

    #[test]
    fn init_drops_ghosts_and_restores_capacity() {
        let mut q = EventQueue::new();
        let mut p = pool(2);
        p.serve(&mut q, Chat).unwrap();
        p.serve(&mut q, Chat).unwrap();
        p.set_capacity(&mut q, 0).unwrap();
        assert_eq!(p.ghost(), 2);

        p.init(&mut q).unwrap();
        assert_eq!((p.capacity(), p.free(), p.busy(), p.ghost()), (2, 2, 0, 0));
        assert!(p.busy_resources().is_empty());
        q.run(|q, w| {
            assert!(p.handle(q, w).unwrap().is_none());
        });
        assert_eq!(p.free(), 2);
    }
}
