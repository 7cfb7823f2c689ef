//! State shared by aggregate and detailed pools.

use std::collections::BTreeMap;

use crate::config::{CapacitySchedule, PoolConfig};
use crate::duration::{CompetingCauses, PhaseKind};
use crate::listener::{Broadcaster, PoolListener};
use crate::scheduler::{EventKey, PoolKey, Scheduler};
use crate::timer::{ServiceTimer, TimerId};
use crate::work::WorkUnit;

/// Timer arena, duration policies, listeners and the generation counter.
#[derive(Debug)]
pub(crate) struct PoolCore<W: WorkUnit> {
    pub(crate) key: PoolKey,
    pub(crate) name: String,
    pub(crate) retain_timers: bool,
    pub(crate) generation: u64,
    next_seq: u64,
    /// Services whose current phase is pending. A timer leaves the arena only
    /// while a phase is being completed, so begin and end-contact listeners
    /// find it here.
    pub(crate) timers: BTreeMap<TimerId, ServiceTimer<W>>,
    pub(crate) contact_causes: CompetingCauses<W>,
    pub(crate) after_contact_causes: CompetingCauses<W>,
    pub(crate) listeners: Broadcaster<dyn PoolListener<W>>,
    busy: usize,
    busy_by_category: Vec<usize>,
    pub(crate) schedule: Option<CapacitySchedule>,
    pub(crate) schedule_event: Option<EventKey>,
}

impl<W: WorkUnit> PoolCore<W> {
    pub(crate) fn new(key: PoolKey, config: &PoolConfig) -> Self {
        Self {
            key,
            name: config.name.clone(),
            retain_timers: config.retain_timers,
            generation: 0,
            next_seq: 0,
            timers: BTreeMap::new(),
            contact_causes: CompetingCauses::new(PhaseKind::Contact),
            after_contact_causes: CompetingCauses::new(PhaseKind::AfterContact),
            listeners: Broadcaster::new(),
            busy: 0,
            busy_by_category: Vec::new(),
            schedule: None,
            schedule_event: None,
        }
    }

    pub(crate) fn next_timer_id(&mut self) -> TimerId {
        let id = TimerId::new(self.key, self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Invalidate every outstanding timer and clear busy accounting.
    ///
    /// Pending scheduler events are left in place; they are discarded when
    /// they fire because their generation no longer matches.
    pub(crate) fn reset(&mut self, sched: &mut dyn Scheduler) {
        self.generation += 1;
        self.timers.clear();
        self.busy = 0;
        self.busy_by_category.clear();
        self.contact_causes.init();
        self.after_contact_causes.init();
        if let Some(event) = self.schedule_event.take() {
            sched.cancel(event);
        }
    }

    pub(crate) fn busy(&self) -> usize {
        self.busy
    }

    pub(crate) fn busy_for(&self, category: usize) -> usize {
        self.busy_by_category.get(category).copied().unwrap_or(0)
    }

    pub(crate) fn acquire(&mut self, category: usize) {
        if self.busy_by_category.len() <= category {
            self.busy_by_category.resize(category + 1, 0);
        }
        self.busy_by_category[category] += 1;
        self.busy += 1;
    }

    pub(crate) fn release(&mut self, category: usize) {
        if let Some(count) = self.busy_by_category.get_mut(category) {
            *count = count.saturating_sub(1);
        }
        self.busy = self.busy.saturating_sub(1);
    }

    pub(crate) fn in_flight(&self) -> impl Iterator<Item = &ServiceTimer<W>> {
        self.timers.values()
    }
}
