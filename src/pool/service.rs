//! Service driver shared by both pool variants.
//!
//! A timer sits in the pool's arena whenever listeners are told about it, so
//! they can look it up or end it early. Zero-length phases complete inside
//! the same call that started them, without a scheduler round-trip.

use tracing::trace;

use crate::config::CapacitySchedule;
use crate::error::{PoolError, PoolResult, ValidationError};
use crate::listener::PoolListener;
use crate::scheduler::{clamp_delay, PoolKey, Scheduler, SimTime, Wakeup};
use crate::timer::{PhaseOutcome, ServiceRecord, ServiceTimer, TimerId, TimerPhase, TimerProgress};
use crate::work::WorkUnit;

use super::resource::ResourceId;
use super::state::PoolCore;
use super::ServicePool;

/// Point of a service lifecycle reported to resource listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Begin,
    EndContact,
    EndService,
}

/// Variant-specific accounting plugged into the shared driver.
pub(crate) trait ServiceHost<W: WorkUnit>: ServicePool<W> + Sized {
    fn core(&self) -> &PoolCore<W>;

    fn core_mut(&mut self) -> &mut PoolCore<W>;

    /// Contact outcome for `unit`, honouring per-resource overrides.
    fn draw_contact(&mut self, resource: Option<ResourceId>, unit: &W) -> PhaseOutcome;

    /// Link a freshly created timer to its resource.
    fn assign(&mut self, _timer: &ServiceTimer<W>) {}

    /// Give the capacity held by `timer` back. Returns true if it was held by
    /// a ghost.
    fn release_capacity(&mut self, timer: &ServiceTimer<W>, now: SimTime) -> bool;

    fn notify_resource(&self, _stage: Stage, _timer: &ServiceTimer<W>) {}
}

/// Broadcast to the pool's listeners in registration order.
pub(crate) fn notify_pool<W, H, F>(host: &mut H, sched: &mut dyn Scheduler, f: F)
where
    W: WorkUnit,
    H: ServiceHost<W>,
    F: Fn(&dyn PoolListener<W>, &mut dyn ServicePool<W>, &mut dyn Scheduler),
{
    let (listeners, _guard) = host.core().listeners.begin();
    for listener in &listeners {
        f(listener.as_ref(), &mut *host, &mut *sched);
    }
}

fn arm<W>(pool: PoolKey, sched: &mut dyn Scheduler, timer: &mut ServiceTimer<W>, phase: PhaseOutcome) {
    if phase.needs_arming() {
        let wakeup = Wakeup::PhaseEnd {
            pool,
            timer: timer.id(),
            generation: timer.generation(),
        };
        timer.set_event(Some(sched.schedule(wakeup, phase.duration)));
    }
}

fn park<W: WorkUnit, H: ServiceHost<W>>(host: &mut H, timer: ServiceTimer<W>) {
    host.core_mut().timers.insert(timer.id(), timer);
}

/// Next step for a parked timer once listeners have seen it.
enum Resume<W> {
    /// Still ours and due now: drive the next completion.
    Run(ServiceTimer<W>),
    Done(TimerProgress<W>),
}

/// Look at a parked timer after a broadcast. A listener may have ended the
/// phase itself, finished the service, or re-initialised the pool.
fn resume<W: WorkUnit, H: ServiceHost<W>>(host: &mut H, view: ServiceTimer<W>, phase: TimerPhase, due_now: bool) -> Resume<W> {
    let id = view.id();
    if view.is_obsolete(host.core().generation) {
        return Resume::Done(TimerProgress::Discarded(view));
    }
    let core = host.core_mut();
    match core.timers.get(&id).map(ServiceTimer::phase) {
        None => Resume::Done(TimerProgress::Completed(id)),
        Some(current) if current == phase && due_now => match core.timers.remove(&id) {
            Some(timer) => Resume::Run(timer),
            None => Resume::Done(TimerProgress::Completed(id)),
        },
        Some(_) => Resume::Done(TimerProgress::Pending(id)),
    }
}

/// Start serving `unit`. The caller has already claimed the capacity.
pub(crate) fn start<W, H>(
    host: &mut H,
    sched: &mut dyn Scheduler,
    unit: W,
    resource: Option<ResourceId>,
) -> PoolResult<TimerProgress<W>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let now = sched.now();
    let contact = host.draw_contact(resource, &unit);

    let core = host.core_mut();
    let key = core.key;
    let id = core.next_timer_id();
    core.acquire(unit.category());
    let mut timer = ServiceTimer::new(id, key, resource, core.generation, unit, ServiceRecord::new(now, contact));

    arm(key, sched, &mut timer, contact);
    host.assign(&timer);
    {
        let (unit, record) = timer.unit_and_record();
        unit.begin_service(key, record);
    }
    trace!(pool = %key, timer = %id, contact = contact.duration, code = contact.code, "service started");

    let view = timer.clone();
    park(host, timer);
    host.notify_resource(Stage::Begin, &view);
    notify_pool(host, sched, |l, p, s| l.begin_service(p, s, &view));
    match resume(host, view, TimerPhase::Contact, contact.duration == 0.0) {
        Resume::Run(timer) => complete_contact(host, sched, timer, None),
        Resume::Done(progress) => Ok(progress),
    }
}

/// Complete the contact phase, then draw and arm (or run) the after-contact phase.
///
/// `code` overrides the scheduled outcome (explicit termination).
pub(crate) fn complete_contact<W, H>(
    host: &mut H,
    sched: &mut dyn Scheduler,
    mut timer: ServiceTimer<W>,
    code: Option<usize>,
) -> PoolResult<TimerProgress<W>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let now = sched.now();
    let key = host.core().key;
    if let Some(code) = code {
        timer.record_mut().scheduled_contact.code = code;
    }
    let effective_code = timer.record().scheduled_contact.code;
    timer.finish_contact(now, effective_code)?;

    let after = match timer.record().scheduled_after_contact {
        Some(preset) => preset,
        None => {
            let drawn = host.core_mut().after_contact_causes.sample(key, timer.unit(), None);
            timer.record_mut().scheduled_after_contact = Some(drawn);
            drawn
        }
    };
    arm(key, sched, &mut timer, after);
    {
        let (unit, record) = timer.unit_and_record();
        unit.end_contact(key, record);
    }
    trace!(pool = %key, timer = %timer.id(), after_contact = after.duration, code = after.code, "contact ended");

    let view = timer.clone();
    park(host, timer);
    host.notify_resource(Stage::EndContact, &view);
    notify_pool(host, sched, |l, p, s| l.end_contact(p, s, &view));
    match resume(host, view, TimerPhase::AfterContact, after.duration == 0.0) {
        Resume::Run(timer) => complete_service(host, sched, timer, None).map(TimerProgress::Finished),
        Resume::Done(progress) => Ok(progress),
    }
}

/// Complete the after-contact phase and release the capacity.
pub(crate) fn complete_service<W, H>(
    host: &mut H,
    sched: &mut dyn Scheduler,
    mut timer: ServiceTimer<W>,
    code: Option<usize>,
) -> PoolResult<ServiceTimer<W>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let now = sched.now();
    let key = host.core().key;
    if let (Some(code), Some(after)) = (code, timer.record_mut().scheduled_after_contact.as_mut()) {
        after.code = code;
    }
    let effective_code = timer.record().scheduled_after_contact.map_or(0, |a| a.code);
    timer.finish_service(now, effective_code, false)?;

    let was_ghost = host.release_capacity(&timer, now);
    timer.record_mut().was_ghost = was_ghost;
    host.core_mut().release(timer.unit().category());
    {
        let (unit, record) = timer.unit_and_record();
        unit.end_service(key, record);
    }
    trace!(pool = %key, timer = %timer.id(), was_ghost, "service ended");

    host.notify_resource(Stage::EndService, &timer);
    notify_pool(host, sched, |l, p, s| l.end_service(p, s, &timer));
    Ok(timer)
}

/// Explicit early end of the contact phase.
pub(crate) fn end_contact<W, H>(
    host: &mut H,
    sched: &mut dyn Scheduler,
    id: TimerId,
    code: usize,
) -> PoolResult<Option<TimerProgress<W>>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    if id.pool() != host.core().key {
        return Ok(None);
    }
    if !host.core().timers.get(&id).is_some_and(|t| !t.contact_done()) {
        return Ok(None);
    }
    let Some(mut timer) = host.core_mut().timers.remove(&id) else {
        return Ok(None);
    };
    if let Some(event) = timer.take_event() {
        sched.cancel(event);
    }
    complete_contact(host, sched, timer, Some(code)).map(Some)
}

/// Explicit early end of the after-contact phase.
pub(crate) fn end_service<W, H>(
    host: &mut H,
    sched: &mut dyn Scheduler,
    id: TimerId,
    code: usize,
) -> PoolResult<Option<ServiceTimer<W>>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    if id.pool() != host.core().key {
        return Ok(None);
    }
    if !host.core().timers.get(&id).is_some_and(ServiceTimer::contact_done) {
        return Ok(None);
    }
    let Some(mut timer) = host.core_mut().timers.remove(&id) else {
        return Ok(None);
    };
    if let Some(event) = timer.take_event() {
        sched.cancel(event);
    }
    complete_service(host, sched, timer, Some(code)).map(Some)
}

/// Scheduler callback entry point.
pub(crate) fn handle<W, H>(host: &mut H, sched: &mut dyn Scheduler, wakeup: Wakeup) -> PoolResult<Option<TimerProgress<W>>>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let core = host.core();
    if wakeup.pool() != core.key || wakeup.generation() != core.generation {
        trace!(pool = %core.key, ?wakeup, current = core.generation, "discarding obsolete wakeup");
        return Ok(None);
    }

    match wakeup {
        Wakeup::PhaseEnd { timer, .. } => {
            let Some(mut fired) = host.core_mut().timers.remove(&timer) else {
                trace!(timer = %timer, "discarding wakeup for a timer no longer in flight");
                return Ok(None);
            };
            fired.set_event(None);
            match fired.phase() {
                TimerPhase::Contact => complete_contact(host, sched, fired, None).map(Some),
                TimerPhase::AfterContact => complete_service(host, sched, fired, None).map(|t| Some(TimerProgress::Finished(t))),
                TimerPhase::Done => Err(PoolError::internal(format!("timer {timer} fired after completion"))),
            }
        }
        Wakeup::CapacityChange { period, .. } => {
            host.core_mut().schedule_event = None;
            apply_period(host, sched, period)?;
            Ok(None)
        }
    }
}

pub(crate) fn attach_schedule<W, H>(host: &mut H, sched: &mut dyn Scheduler, schedule: CapacitySchedule) -> PoolResult<()>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    schedule.validate()?;
    host.core_mut().schedule = Some(schedule);
    arm_schedule(host, sched)
}

/// Apply the period in force now (if any) and arm the next boundary.
pub(crate) fn arm_schedule<W, H>(host: &mut H, sched: &mut dyn Scheduler) -> PoolResult<()>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let Some(schedule) = host.core().schedule.clone() else {
        return Ok(());
    };
    if let Some(event) = host.core_mut().schedule_event.take() {
        sched.cancel(event);
    }
    match schedule.period_at(sched.now()) {
        Some(period) => apply_period(host, sched, period),
        None => {
            arm_boundary(host.core_mut(), sched, &schedule, 0);
            Ok(())
        }
    }
}

fn apply_period<W, H>(host: &mut H, sched: &mut dyn Scheduler, period: usize) -> PoolResult<()>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let Some(schedule) = host.core().schedule.clone() else {
        return Ok(());
    };
    if let Some(capacity) = schedule.capacity(period) {
        host.set_capacity(sched, capacity)?;
    }
    arm_boundary(host.core_mut(), sched, &schedule, period + 1);
    Ok(())
}

fn arm_boundary<W: WorkUnit>(core: &mut PoolCore<W>, sched: &mut dyn Scheduler, schedule: &CapacitySchedule, period: usize) {
    if period >= schedule.capacities.len() {
        return;
    }
    let wakeup = Wakeup::CapacityChange {
        pool: core.key,
        generation: core.generation,
        period,
    };
    let delay = clamp_delay(schedule.boundary(period) - sched.now());
    core.schedule_event = Some(sched.schedule(wakeup, delay));
}

/// Re-create a captured in-flight service in `host`, armed at its original
/// absolute due time. Returns the new timer id.
pub(crate) fn reinstate<W, H>(host: &mut H, sched: &mut dyn Scheduler, captured: &ServiceTimer<W>) -> PoolResult<TimerId>
where
    W: WorkUnit,
    H: ServiceHost<W>,
{
    let record = *captured.record();
    if record.service_done() {
        return Err(ValidationError::InvalidSnapshot {
            reason: format!("timer {} is already finished", captured.id()),
        }
        .into());
    }

    let now = sched.now();
    let core = host.core_mut();
    let key = core.key;
    let id = core.next_timer_id();
    let unit = captured.unit().clone();
    core.acquire(unit.category());
    let mut timer = ServiceTimer::new(id, key, captured.resource(), core.generation, unit, record);

    if let Some(due) = record.due_at() {
        let wakeup = Wakeup::PhaseEnd {
            pool: key,
            timer: id,
            generation: timer.generation(),
        };
        timer.set_event(Some(sched.schedule(wakeup, clamp_delay(due - now))));
    }
    {
        let (unit, record) = timer.unit_and_record();
        unit.begin_service(key, record);
    }
    core.timers.insert(id, timer);
    Ok(id)
}
