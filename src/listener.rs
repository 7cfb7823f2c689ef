//! Ordered listener broadcast with a reentrancy guard.
//!
//! Pools and resources hold their observers in a [`Broadcaster`]. While a
//! broadcast is running, registering or removing listeners is an illegal-state
//! error. Notifications may nest (a listener may call back into the pool,
//! which notifies again); the `broadcasting` flag is restored by a drop guard
//! on every exit path, unwinding included, so a failed listener never leaves
//! the entity locked.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::StateError;
use crate::pool::resource::Resource;
use crate::pool::ServicePool;
use crate::scheduler::Scheduler;
use crate::timer::ServiceTimer;
use crate::work::WorkUnit;

/// Observer of a pool.
///
/// Callbacks receive the pool and the scheduler so they may drive the pool
/// further, e.g. serve the next queued unit from `end_service`.
pub trait PoolListener<W: WorkUnit> {
    /// Capacity, efficiency or membership changed.
    fn pool_changed(&self, _pool: &mut dyn ServicePool<W>, _sched: &mut dyn Scheduler) {}

    /// A unit was assigned capacity.
    fn begin_service(&self, _pool: &mut dyn ServicePool<W>, _sched: &mut dyn Scheduler, _timer: &ServiceTimer<W>) {}

    /// The contact phase of a service completed.
    fn end_contact(&self, _pool: &mut dyn ServicePool<W>, _sched: &mut dyn Scheduler, _timer: &ServiceTimer<W>) {}

    /// The after-contact phase completed; the capacity has been released.
    fn end_service(&self, _pool: &mut dyn ServicePool<W>, _sched: &mut dyn Scheduler, _timer: &ServiceTimer<W>) {}

    /// The pool was re-initialised.
    fn init(&self, _pool: &mut dyn ServicePool<W>, _sched: &mut dyn Scheduler) {}
}

/// Observer of one resource of a detailed pool.
pub trait ResourceListener<W: WorkUnit> {
    /// Availability or pool membership changed.
    fn resource_changed(&self, _resource: &Resource<W>) {}

    /// The resource started serving `timer`.
    fn begin_service(&self, _resource: &Resource<W>, _timer: &ServiceTimer<W>) {}

    /// Contact over; after-contact work begins.
    fn end_contact(&self, _resource: &Resource<W>, _timer: &ServiceTimer<W>) {}

    /// The resource is free again (or evicted, if it was a ghost).
    fn end_service(&self, _resource: &Resource<W>, _timer: &ServiceTimer<W>) {}

    /// The owning pool was re-initialised.
    fn init(&self, _resource: &Resource<W>) {}
}

/// Restores the broadcasting flag to its previous value when dropped.
#[must_use = "the broadcast ends when the guard is dropped"]
pub struct BroadcastGuard {
    flag: Rc<Cell<bool>>,
    previous: bool,
}

impl Drop for BroadcastGuard {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Ordered listener registry.
pub struct Broadcaster<L: ?Sized> {
    listeners: Vec<Rc<L>>,
    broadcasting: Rc<Cell<bool>>,
}

impl<L: ?Sized> Default for Broadcaster<L> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            broadcasting: Rc::new(Cell::new(false)),
        }
    }
}

impl<L: ?Sized> fmt::Debug for Broadcaster<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("listeners", &self.listeners.len())
            .field("broadcasting", &self.broadcasting.get())
            .finish()
    }
}

impl<L: ?Sized> Broadcaster<L> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True when nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// True while a broadcast, possibly nested, is running.
    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting.get()
    }

    /// Appends `listener`; registering the same listener twice is a no-op.
    ///
    /// # Errors
    ///
    /// `StateError::Broadcasting` while a notification is in progress.
    pub fn add(&mut self, listener: Rc<L>) -> Result<(), StateError> {
        if self.is_broadcasting() {
            return Err(StateError::Broadcasting);
        }
        if !self.listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            self.listeners.push(listener);
        }
        Ok(())
    }

    /// Removes `listener`, returning whether it was registered.
    ///
    /// # Errors
    ///
    /// `StateError::Broadcasting` while a notification is in progress.
    pub fn remove(&mut self, listener: &Rc<L>) -> Result<bool, StateError> {
        if self.is_broadcasting() {
            return Err(StateError::Broadcasting);
        }
        let before = self.listeners.len();
        self.listeners.retain(|l| !Rc::ptr_eq(l, listener));
        Ok(self.listeners.len() != before)
    }

    /// Starts a broadcast: returns the listeners in registration order and a
    /// guard that ends the broadcast when dropped.
    ///
    /// The returned list is detached from the registry, so the owner can be
    /// borrowed mutably while iterating it.
    pub fn begin(&self) -> (Vec<Rc<L>>, BroadcastGuard) {
        let previous = self.broadcasting.replace(true);
        let guard = BroadcastGuard {
            flag: Rc::clone(&self.broadcasting),
            previous,
        };
        (self.listeners.clone(), guard)
    }
}
