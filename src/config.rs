//! Pool configuration and periodic capacity schedules.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::scheduler::SimTime;

/// Construction-time settings of a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Human-readable name, used in errors and logs.
    pub name: String,
    /// Initial number of capacity units (agents).
    pub capacity: usize,
    /// Fraction of nominal capacity able to accept work.
    pub efficiency: f64,
    /// Keep an index of in-flight timers; required for snapshots.
    pub retain_timers: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 0,
            efficiency: 1.0,
            retain_timers: false,
        }
    }
}

impl PoolConfig {
    /// Config with the given name and capacity, other fields defaulted.
    #[must_use]
    pub fn named(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            ..Self::default()
        }
    }

    /// Set the initial efficiency.
    #[must_use]
    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.efficiency = efficiency;
        self
    }

    /// Keep in-flight timers indexed, enabling `in_flight()` and snapshots.
    #[must_use]
    pub fn retaining_timers(mut self) -> Self {
        self.retain_timers = true;
        self
    }

    /// Validate the configuration.
    ///
    /// This must be called before constructing a pool.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidConfig` for a blank name, or
    /// `EfficiencyOutOfRange`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "name must not be empty".to_string(),
            });
        }
        check_efficiency(self.efficiency)
    }
}

pub(crate) fn check_efficiency(efficiency: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&efficiency) {
        return Err(ValidationError::EfficiencyOutOfRange { value: efficiency });
    }
    Ok(())
}

/// Capacity that changes at fixed simulated instants.
///
/// Period `i` covers `[start + i * period, start + (i + 1) * period)`; the
/// last entry stays in force after the final boundary. Before `start` the
/// pool keeps whatever capacity it had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySchedule {
    /// Start of period 0.
    pub start: SimTime,
    /// Length of every period.
    pub period: SimTime,
    /// Capacity per period.
    pub capacities: Vec<usize>,
}

impl CapacitySchedule {
    /// Unvalidated schedule; pools validate it when it is attached.
    #[must_use]
    pub fn new(start: SimTime, period: SimTime, capacities: Vec<usize>) -> Self {
        Self {
            start,
            period,
            capacities,
        }
    }

    /// # Errors
    ///
    /// `ValidationError::InvalidSchedule` for an empty capacity list, a
    /// non-finite start or a non-positive period.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacities.is_empty() {
            return Err(ValidationError::InvalidSchedule {
                reason: "at least one period is required".to_string(),
            });
        }
        if !self.start.is_finite() {
            return Err(ValidationError::InvalidSchedule {
                reason: format!("start must be finite, got {}", self.start),
            });
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(ValidationError::InvalidSchedule {
                reason: format!("period must be > 0, got {}", self.period),
            });
        }
        Ok(())
    }

    /// Start time of period `index`.
    #[must_use]
    pub fn boundary(&self, index: usize) -> SimTime {
        self.start + index as f64 * self.period
    }

    /// Period in force at `t`, if the schedule has started.
    #[must_use]
    pub fn period_at(&self, t: SimTime) -> Option<usize> {
        if t < self.start || self.capacities.is_empty() {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = ((t - self.start) / self.period).floor() as usize;
        Some(index.min(self.capacities.len() - 1))
    }

    /// Capacity of period `period`.
    #[must_use]
    pub fn capacity(&self, period: usize) -> Option<usize> {
        self.capacities.get(period).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        PoolConfig::default().validate().unwrap();
    }

    #[test]
    fn config_rejects_bad_efficiency() {
        assert!(PoolConfig::named("a", 1).with_efficiency(1.2).validate().is_err());
        assert!(PoolConfig::named("a", 1).with_efficiency(-0.1).validate().is_err());
        assert!(PoolConfig::named("a", 1).with_efficiency(f64::NAN).validate().is_err());
        assert!(PoolConfig::named(" ", 1).validate().is_err());
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let cfg: PoolConfig = serde_json::from_str(r#"{"name":"sales","capacity":4}"#).unwrap();
        assert_eq!(cfg.capacity, 4);
        assert_eq!(cfg.efficiency, 1.0);
        assert!(!cfg.retain_timers);
    }

    #[test]
    fn schedule_periods() {
        let s = CapacitySchedule::new(10.0, 5.0, vec![2, 4, 1]);
        s.validate().unwrap();
        assert_eq!(s.period_at(9.9), None);
        assert_eq!(s.period_at(10.0), Some(0));
        assert_eq!(s.period_at(17.0), Some(1));
        assert_eq!(s.period_at(500.0), Some(2));
    }

    #[test]
    fn schedule_validation() {
        assert!(CapacitySchedule::new(0.0, 1.0, vec![]).validate().is_err());
        assert!(CapacitySchedule::new(0.0, 0.0, vec![1]).validate().is_err());
        assert!(CapacitySchedule::new(f64::NAN, 1.0, vec![1]).validate().is_err());
    }
}
