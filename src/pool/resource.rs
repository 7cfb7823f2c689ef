//! Individually identifiable capacity units (agents) of a detailed pool.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::duration::DurationGenerator;
use crate::error::{PoolResult, StateError};
use crate::listener::{Broadcaster, ResourceListener};
use crate::scheduler::SimTime;
use crate::timer::TimerId;
use crate::work::WorkUnit;

/// Stable handle of a resource inside its pool's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub usize);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// What a resource is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    /// Not part of the pool.
    Unattached,
    /// In the pool, waiting for work.
    Idle,
    /// In the pool, serving a unit.
    Busy,
    /// Removed from the pool but still finishing its current unit.
    Ghost,
}

/// One capacity unit.
pub struct Resource<W> {
    handle: ResourceId,
    id: Option<u32>,
    pub(crate) available: bool,
    pub(crate) ghost: bool,
    pub(crate) attached: bool,
    pub(crate) timer: Option<TimerId>,
    pub(crate) idle_since: SimTime,
    pub(crate) first_assigned_at: Option<SimTime>,
    pub(crate) last_assigned_at: Option<SimTime>,
    pub(crate) overrides: HashMap<usize, Box<dyn DurationGenerator<W>>>,
    pub(crate) listeners: Broadcaster<dyn ResourceListener<W>>,
}

impl<W> fmt::Debug for Resource<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("available", &self.available)
            .field("ghost", &self.ghost)
            .field("attached", &self.attached)
            .field("timer", &self.timer)
            .field("idle_since", &self.idle_since)
            .field("first_assigned_at", &self.first_assigned_at)
            .field("last_assigned_at", &self.last_assigned_at)
            .finish_non_exhaustive()
    }
}

impl<W: WorkUnit> Resource<W> {
    pub(crate) fn new(handle: ResourceId) -> Self {
        Self {
            handle,
            id: None,
            available: true,
            ghost: false,
            attached: false,
            timer: None,
            idle_since: 0.0,
            first_assigned_at: None,
            last_assigned_at: None,
            overrides: HashMap::new(),
            listeners: Broadcaster::new(),
        }
    }

    /// Arena handle, fixed at creation.
    #[must_use]
    pub const fn handle(&self) -> ResourceId {
        self.handle
    }

    /// User-assigned identifier, if any.
    #[must_use]
    pub const fn id(&self) -> Option<u32> {
        self.id
    }

    /// Assign the user identifier. It can be set once.
    ///
    /// # Errors
    ///
    /// `StateError::IdAlreadySet` if an identifier was already assigned.
    pub fn set_id(&mut self, id: u32) -> PoolResult<()> {
        if let Some(current) = self.id {
            return Err(StateError::IdAlreadySet { current }.into());
        }
        self.id = Some(id);
        Ok(())
    }

    pub(crate) fn restore_id(&mut self, id: Option<u32>) {
        self.id = id;
    }

    /// Unavailable resources stay in the pool but are never selected.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    /// Evicted while busy; leaves the pool when its service ends.
    #[must_use]
    pub const fn is_ghost(&self) -> bool {
        self.ghost
    }

    /// True while the resource counts towards its pool's capacity.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// True while serving a unit.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.timer.is_some()
    }

    /// Service currently assigned to this resource.
    #[must_use]
    pub const fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Derived from membership, ghost flag and assignment.
    #[must_use]
    pub const fn role(&self) -> ResourceRole {
        match (self.attached, self.ghost, self.timer.is_some()) {
            (_, true, _) => ResourceRole::Ghost,
            (false, false, _) => ResourceRole::Unattached,
            (true, false, true) => ResourceRole::Busy,
            (true, false, false) => ResourceRole::Idle,
        }
    }

    /// Time the resource last became idle.
    #[must_use]
    pub const fn idle_since(&self) -> SimTime {
        self.idle_since
    }

    /// Earliest admission into the pool.
    #[must_use]
    pub const fn first_assigned_at(&self) -> Option<SimTime> {
        self.first_assigned_at
    }

    /// Latest admission into the pool.
    #[must_use]
    pub const fn last_assigned_at(&self) -> Option<SimTime> {
        self.last_assigned_at
    }

    /// Admission time used to rank eviction candidates; never-admitted
    /// resources rank oldest.
    pub(crate) fn admitted_at(&self) -> SimTime {
        self.first_assigned_at.unwrap_or(f64::NEG_INFINITY)
    }

    pub(crate) fn stamp_admission(&mut self, now: SimTime) {
        if self.first_assigned_at.map_or(true, |t| t > now) {
            self.first_assigned_at = Some(now);
        }
        self.last_assigned_at = Some(now);
    }

    /// Contact-time source used instead of the pool's code-0 cause when this
    /// resource serves units of `category`. `None` clears the override.
    pub fn set_contact_time_override(&mut self, category: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        match generator {
            Some(generator) => {
                self.overrides.insert(category, generator);
            }
            None => {
                self.overrides.remove(&category);
            }
        }
    }

    pub(crate) fn init_overrides(&mut self) {
        for generator in self.overrides.values_mut() {
            generator.init();
        }
    }

    /// # Errors
    ///
    /// `StateError::Broadcasting` while this resource is notifying.
    pub fn add_listener(&mut self, listener: Rc<dyn ResourceListener<W>>) -> PoolResult<()> {
        Ok(self.listeners.add(listener)?)
    }

    /// # Errors
    ///
    /// `StateError::Broadcasting` while this resource is notifying.
    pub fn remove_listener(&mut self, listener: &Rc<dyn ResourceListener<W>>) -> PoolResult<bool> {
        Ok(self.listeners.remove(listener)?)
    }

    /// Broadcast to this resource's listeners.
    pub(crate) fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn ResourceListener<W>, &Self),
    {
        let (listeners, _guard) = self.listeners.begin();
        for listener in &listeners {
            f(listener.as_ref(), self);
        }
    }
}
