//! Work units ("contacts") served by pools.

use std::fmt;

use crate::scheduler::PoolKey;
use crate::timer::ServiceRecord;

/// A discrete unit of work handled by one unit of pool capacity.
///
/// Pools take ownership of the unit for the duration of its service and hand
/// it back inside the finished [`ServiceTimer`](crate::ServiceTimer).
/// `Clone` must be a deep copy: snapshots keep their own copy of every unit
/// in flight.
pub trait WorkUnit: Clone + fmt::Debug + 'static {
    /// Work category, used for per-category busy counters and per-resource
    /// service time overrides.
    fn category(&self) -> usize;

    /// Default contact (phase 1) duration when served by `pool`.
    ///
    /// `None` means this unit has no default for that pool.
    fn default_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        None
    }

    /// Default after-contact (phase 2) duration when served by `pool`.
    fn default_after_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        None
    }

    /// Called once the unit has been assigned capacity, and again when a
    /// snapshot restore re-creates the in-flight service.
    fn begin_service(&mut self, _pool: PoolKey, _record: &ServiceRecord) {}

    /// Called when the contact phase completes.
    fn end_contact(&mut self, _pool: PoolKey, _record: &ServiceRecord) {}

    /// Called when the after-contact phase completes.
    fn end_service(&mut self, _pool: PoolKey, _record: &ServiceRecord) {}
}
