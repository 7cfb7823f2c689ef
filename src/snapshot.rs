//! Point-in-time captures of pool state.
//!
//! A snapshot owns deep copies of every in-flight service and no reference
//! into the pool it came from. Restoring re-initialises the target pool and
//! rebuilds it; the busy count always equals the number of restored services.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::check_efficiency;
use crate::error::ValidationError;
use crate::pool::resource::{Resource, ResourceId};
use crate::scheduler::SimTime;
use crate::timer::ServiceTimer;
use crate::work::WorkUnit;

/// Stable identifier for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Create a new random snapshot ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidSnapshot { reason: reason.into() }
}

/// Aggregate counters plus copies of every in-flight service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot<W> {
    /// Unique per capture.
    pub id: SnapshotId,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    /// Simulated capture time.
    pub sim_time: SimTime,
    /// Nominal capacity.
    pub total: usize,
    /// Free capacity.
    pub free: usize,
    /// Ghost count.
    pub ghost: usize,
    /// Efficiency in force.
    pub efficiency: f64,
    /// Detached copies, in creation order.
    pub timers: Vec<ServiceTimer<W>>,
}

impl<W> PoolSnapshot<W> {
    pub(crate) fn capture(
        sim_time: SimTime,
        total: usize,
        free: usize,
        ghost: usize,
        efficiency: f64,
        timers: Vec<ServiceTimer<W>>,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            captured_at: Utc::now(),
            sim_time,
            total,
            free,
            ghost,
            efficiency,
            timers,
        }
    }

    /// Number of services that were in flight.
    #[must_use]
    pub fn busy(&self) -> usize {
        self.timers.len()
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidSnapshot` when the ghost count exceeds the
    /// services in flight or a captured service is already finished.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_efficiency(self.efficiency)?;
        if self.ghost > self.timers.len() {
            return Err(invalid(format!("{} ghosts but only {} services in flight", self.ghost, self.timers.len())));
        }
        if let Some(done) = self.timers.iter().find(|t| t.service_done()) {
            return Err(invalid(format!("timer {} is already finished", done.id())));
        }
        Ok(())
    }
}

/// State of one resource at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Arena handle; restore reuses the same slot.
    pub resource: ResourceId,
    /// User identifier.
    pub id: Option<u32>,
    /// Availability flag.
    pub available: bool,
    /// Ghost flag.
    pub ghost: bool,
    /// Time the resource last became idle.
    pub idle_since: SimTime,
    /// Earliest admission.
    pub first_assigned_at: Option<SimTime>,
    /// Latest admission.
    pub last_assigned_at: Option<SimTime>,
}

impl ResourceSnapshot {
    pub(crate) fn capture<W: WorkUnit>(resource: &Resource<W>) -> Self {
        Self {
            resource: resource.handle(),
            id: resource.id(),
            available: resource.available,
            ghost: resource.ghost,
            idle_since: resource.idle_since,
            first_assigned_at: resource.first_assigned_at,
            last_assigned_at: resource.last_assigned_at,
        }
    }

    /// Load the captured state into `resource`, leaving it without a timer.
    pub(crate) fn apply<W: WorkUnit>(&self, resource: &mut Resource<W>) {
        resource.restore_id(self.id);
        resource.available = self.available;
        resource.ghost = self.ghost;
        resource.attached = !self.ghost;
        resource.timer = None;
        resource.idle_since = self.idle_since;
        resource.first_assigned_at = self.first_assigned_at;
        resource.last_assigned_at = self.last_assigned_at;
    }
}

/// Detailed pool capture: the aggregate part plus every idle, busy and ghost
/// resource in collection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedPoolSnapshot<W> {
    /// Counters and in-flight services.
    pub base: PoolSnapshot<W>,
    /// Idle resources in selection order.
    pub idle: Vec<ResourceSnapshot>,
    /// Busy resources, ghosts included.
    pub busy: Vec<ResourceSnapshot>,
    /// Ghost handles in ghosting order.
    pub ghosts: Vec<ResourceId>,
}

impl<W> DetailedPoolSnapshot<W> {
    /// Check the counters, resource lists and timer ownership agree.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidSnapshot` naming the first inconsistency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.base.validate()?;

        let mut seen = HashSet::new();
        if let Some(dup) = self.idle.iter().chain(&self.busy).find(|r| !seen.insert(r.resource)) {
            return Err(invalid(format!("resource {} captured twice", dup.resource)));
        }
        if self.idle.iter().any(|r| r.ghost) {
            return Err(invalid("idle resource flagged as ghost"));
        }
        let busy: HashSet<ResourceId> = self.busy.iter().map(|r| r.resource).collect();
        let flagged: HashSet<ResourceId> = self.busy.iter().filter(|r| r.ghost).map(|r| r.resource).collect();
        let ghosts: HashSet<ResourceId> = self.ghosts.iter().copied().collect();
        if ghosts != flagged || ghosts.len() != self.ghosts.len() {
            return Err(invalid("ghost list does not match busy resources flagged as ghosts"));
        }
        if self.base.timers.len() != self.busy.len() {
            return Err(invalid(format!(
                "{} services in flight for {} busy resources",
                self.base.timers.len(),
                self.busy.len()
            )));
        }
        let mut serving = HashSet::new();
        for timer in &self.base.timers {
            match timer.resource() {
                Some(r) if busy.contains(&r) && serving.insert(r) => {}
                _ => return Err(invalid(format!("timer {} is not held by exactly one busy resource", timer.id()))),
            }
        }
        if self.base.total + self.ghosts.len() != self.idle.len() + self.busy.len() {
            return Err(invalid(format!(
                "total {} does not match {} idle and {} busy resources",
                self.base.total,
                self.idle.len(),
                self.busy.len()
            )));
        }
        Ok(())
    }
}

/// Snapshot of either pool kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnySnapshot<W> {
    /// Taken from a `Pool`.
    Aggregate(PoolSnapshot<W>),
    /// Taken from a `DetailedPool`.
    Detailed(DetailedPoolSnapshot<W>),
}

impl<W> AnySnapshot<W> {
    /// `"aggregate"` or `"detailed"`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Detailed(_) => "detailed",
        }
    }

    /// The aggregate part, common to both kinds.
    #[must_use]
    pub const fn base(&self) -> &PoolSnapshot<W> {
        match self {
            Self::Aggregate(s) => s,
            Self::Detailed(s) => &s.base,
        }
    }
}
