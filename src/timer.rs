//! Two-phase service timers.
//!
//! A [`ServiceTimer`] follows one work unit through its service:
//!
//! ```text
//! Contact ──complete_contact──▶ AfterContact ──complete_service──▶ Done
//! ```
//!
//! Either phase may be scheduled with zero duration (completed synchronously
//! by the pool), with infinite duration (completed only by an explicit
//! termination), or anything in between. A timer is obsolete once its pool's
//! generation has moved past the generation stamped at creation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PoolResult, StateError};
use crate::pool::resource::ResourceId;
use crate::scheduler::{EventKey, PoolKey, SimTime};

/// Handle of a service timer: owning pool plus a sequence number the pool
/// never reuses, not even across `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId {
    pool: PoolKey,
    seq: u64,
}

impl TimerId {
    /// Pools mint their own handles; this is for restoring and testing.
    #[must_use]
    pub const fn new(pool: PoolKey, seq: u64) -> Self {
        Self { pool, seq }
    }

    /// Pool that issued this handle.
    #[must_use]
    pub const fn pool(&self) -> PoolKey {
        self.pool
    }

    /// Position in the pool's creation order.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pool, self.seq)
    }
}

/// Duration and outcome code of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Phase length; `f64::INFINITY` when no cause applies.
    pub duration: SimTime,
    /// Index of the cause that ends (or ended) the phase.
    pub code: usize,
}

impl PhaseOutcome {
    /// Outcome that never ends on its own.
    pub const UNBOUNDED: Self = Self {
        duration: f64::INFINITY,
        code: 0,
    };

    /// Outcome ending after `duration` with `code`.
    #[must_use]
    pub const fn new(duration: SimTime, code: usize) -> Self {
        Self { duration, code }
    }

    /// True when the phase must be armed with the scheduler.
    #[must_use]
    pub fn needs_arming(&self) -> bool {
        self.duration.is_finite() && self.duration > 0.0
    }
}

/// Times and outcome codes of a service.
///
/// Effective values are `None` until the matching phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Time capacity was assigned.
    pub begin_time: SimTime,
    /// Contact outcome drawn at the start.
    pub scheduled_contact: PhaseOutcome,
    /// How the contact actually ended.
    pub effective_contact: Option<PhaseOutcome>,
    /// After-contact outcome, drawn when the contact ends.
    pub scheduled_after_contact: Option<PhaseOutcome>,
    /// How the after-contact work actually ended.
    pub effective_after_contact: Option<PhaseOutcome>,
    /// Set when the after-contact phase completes on a ghost.
    pub was_ghost: bool,
}

impl ServiceRecord {
    pub(crate) fn new(begin_time: SimTime, scheduled_contact: PhaseOutcome) -> Self {
        Self {
            begin_time,
            scheduled_contact,
            effective_contact: None,
            scheduled_after_contact: None,
            effective_after_contact: None,
            was_ghost: false,
        }
    }

    /// True once the contact phase has ended.
    #[must_use]
    pub const fn contact_done(&self) -> bool {
        self.effective_contact.is_some()
    }

    /// True once both phases have ended.
    #[must_use]
    pub const fn service_done(&self) -> bool {
        self.effective_after_contact.is_some()
    }

    /// Absolute time at which the pending phase is due to end, if it ever does.
    #[must_use]
    pub fn due_at(&self) -> Option<SimTime> {
        let due = match (self.effective_contact, self.scheduled_after_contact) {
            _ if self.service_done() => return None,
            (None, _) => self.begin_time + self.scheduled_contact.duration,
            (Some(contact), Some(after)) => self.begin_time + contact.duration + after.duration,
            (Some(_), None) => return None,
        };
        due.is_finite().then_some(due)
    }
}

/// Current phase of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Talking to the customer.
    Contact,
    /// Wrap-up work after the contact.
    AfterContact,
    /// Both phases over.
    Done,
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contact => write!(f, "contact"),
            Self::AfterContact => write!(f, "after-contact"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// One in-progress or finished service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTimer<W> {
    id: TimerId,
    #[serde(skip)]
    pool: Option<PoolKey>,
    resource: Option<ResourceId>,
    generation: u64,
    unit: W,
    record: ServiceRecord,
    #[serde(skip)]
    event: Option<EventKey>,
}

impl<W> ServiceTimer<W> {
    pub(crate) fn new(
        id: TimerId,
        pool: PoolKey,
        resource: Option<ResourceId>,
        generation: u64,
        unit: W,
        record: ServiceRecord,
    ) -> Self {
        Self {
            id,
            pool: Some(pool),
            resource,
            generation,
            unit,
            record,
            event: None,
        }
    }

    /// Handle used for explicit termination and lookups.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// Owning pool; `None` for detached (snapshot) copies.
    #[must_use]
    pub const fn pool(&self) -> Option<PoolKey> {
        self.pool
    }

    /// Resource serving the unit, for detailed pools.
    #[must_use]
    pub const fn resource(&self) -> Option<ResourceId> {
        self.resource
    }

    /// Pool generation at creation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The unit being served.
    #[must_use]
    pub const fn unit(&self) -> &W {
        &self.unit
    }

    /// Mutable access to the unit being served.
    pub fn unit_mut(&mut self) -> &mut W {
        &mut self.unit
    }

    /// Takes the work unit back once the service is over.
    pub fn into_unit(self) -> W {
        self.unit
    }

    /// Times and outcome codes so far.
    #[must_use]
    pub const fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// See [`ServiceRecord::begin_time`].
    #[must_use]
    pub const fn begin_time(&self) -> SimTime {
        self.record.begin_time
    }

    /// See [`ServiceRecord::contact_done`].
    #[must_use]
    pub const fn contact_done(&self) -> bool {
        self.record.contact_done()
    }

    /// See [`ServiceRecord::service_done`].
    #[must_use]
    pub const fn service_done(&self) -> bool {
        self.record.service_done()
    }

    /// True if the service ended on a ghost resource.
    #[must_use]
    pub const fn was_ghost(&self) -> bool {
        self.record.was_ghost
    }

    /// Current phase, derived from the record.
    #[must_use]
    pub const fn phase(&self) -> TimerPhase {
        if self.record.service_done() {
            TimerPhase::Done
        } else if self.record.contact_done() {
            TimerPhase::AfterContact
        } else {
            TimerPhase::Contact
        }
    }

    /// True once the pool generation moved past this timer's stamp.
    #[must_use]
    pub const fn is_obsolete(&self, pool_generation: u64) -> bool {
        self.generation != pool_generation
    }

    /// Pending scheduler event, if the current phase is armed.
    #[must_use]
    pub const fn event(&self) -> Option<EventKey> {
        self.event
    }

    pub(crate) fn set_event(&mut self, event: Option<EventKey>) {
        self.event = event;
    }

    pub(crate) fn take_event(&mut self) -> Option<EventKey> {
        self.event.take()
    }

    pub(crate) fn record_mut(&mut self) -> &mut ServiceRecord {
        &mut self.record
    }

    /// Split borrow used to notify the unit about its own record.
    pub(crate) fn unit_and_record(&mut self) -> (&mut W, &ServiceRecord) {
        (&mut self.unit, &self.record)
    }

    /// Marks the contact phase complete at `now` with outcome `code`.
    pub(crate) fn finish_contact(&mut self, now: SimTime, code: usize) -> PoolResult<()> {
        if self.record.contact_done() {
            return Err(StateError::PhaseAlreadyCompleted {
                id: self.id,
                phase: "contact",
            }
            .into());
        }
        let elapsed = (now - self.record.begin_time).max(0.0);
        self.record.effective_contact = Some(PhaseOutcome::new(elapsed, code));
        Ok(())
    }

    /// Marks the after-contact phase complete at `now` with outcome `code`.
    pub(crate) fn finish_service(&mut self, now: SimTime, code: usize, was_ghost: bool) -> PoolResult<()> {
        let Some(contact) = self.record.effective_contact else {
            return Err(StateError::ContactNotCompleted { id: self.id }.into());
        };
        if self.record.service_done() {
            return Err(StateError::PhaseAlreadyCompleted {
                id: self.id,
                phase: "after-contact",
            }
            .into());
        }
        let elapsed = (now - self.record.begin_time - contact.duration).max(0.0);
        self.record.effective_after_contact = Some(PhaseOutcome::new(elapsed, code));
        self.record.was_ghost = was_ghost;
        Ok(())
    }
}

impl<W: Clone> ServiceTimer<W> {
    /// Deep copy for snapshots: the unit is cloned, the pool link and the
    /// pending scheduler event are dropped.
    #[must_use]
    pub fn detached_clone(&self) -> Self {
        Self {
            id: self.id,
            pool: None,
            resource: self.resource,
            generation: self.generation,
            unit: self.unit.clone(),
            record: self.record,
            event: None,
        }
    }
}

/// Where a service stands after an operation that may complete phases
/// synchronously.
#[derive(Debug)]
pub enum TimerProgress<W> {
    /// Still in flight; look it up with the pool's `timer` accessor.
    Pending(TimerId),
    /// Both phases completed; the unit is handed back.
    Finished(ServiceTimer<W>),
    /// A listener ended the service while it was being driven; the finished
    /// timer went to that listener's `end_service` call.
    Completed(TimerId),
    /// The pool was re-initialised by a listener while this service was being
    /// driven; a copy of the unit is handed back as listeners last saw it.
    Discarded(ServiceTimer<W>),
}

impl<W> TimerProgress<W> {
    /// True once both phases are over, wherever the timer ended up.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Completed(_))
    }

    /// Id of the service, pending or finished.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        match self {
            Self::Pending(id) | Self::Completed(id) => *id,
            Self::Finished(timer) | Self::Discarded(timer) => timer.id,
        }
    }

    /// The finished timer, if the service is over.
    #[must_use]
    pub fn finished(self) -> Option<ServiceTimer<W>> {
        match self {
            Self::Finished(timer) => Some(timer),
            Self::Pending(_) | Self::Completed(_) | Self::Discarded(_) => None,
        }
    }
}
