//! Service duration sources.
//!
//! Each phase of a service draws its length from a set of competing causes,
//! one generator per outcome code. The smallest finite value wins and its
//! code becomes the phase outcome. When no cause yields a finite value the
//! phase is unbounded and only an explicit termination ends it.

use std::fmt;

use crate::error::ValidationError;
use crate::scheduler::PoolKey;
use crate::timer::PhaseOutcome;
use crate::work::WorkUnit;

/// Source of phase durations for one outcome code.
///
/// `None` means "this cause does not apply" and is never confused with a
/// legitimate zero duration.
pub trait DurationGenerator<W> {
    /// Reset internal state at the start of a replication.
    fn init(&mut self) {}

    /// Next duration for `unit`.
    fn next(&mut self, unit: &W) -> Option<f64>;
}

/// Always yields the same duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantDuration(f64);

impl ConstantDuration {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDuration` if `value` is negative or NaN.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || value < 0.0 {
            return Err(ValidationError::InvalidDuration { value });
        }
        Ok(Self(value))
    }

    /// The fixed duration.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }
}

impl<W> DurationGenerator<W> for ConstantDuration {
    fn next(&mut self, _unit: &W) -> Option<f64> {
        Some(self.0)
    }
}

fn check_multiplier(multiplier: f64) -> Result<f64, ValidationError> {
    if multiplier.is_nan() || multiplier < 0.0 {
        return Err(ValidationError::InvalidDuration { value: multiplier });
    }
    Ok(multiplier)
}

/// The unit's own default contact time for a pool, scaled by a multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultContactTime {
    pool: PoolKey,
    multiplier: f64,
}

impl DefaultContactTime {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDuration` for a negative or NaN multiplier.
    pub fn new(pool: PoolKey, multiplier: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            pool,
            multiplier: check_multiplier(multiplier)?,
        })
    }
}

impl<W: WorkUnit> DurationGenerator<W> for DefaultContactTime {
    fn next(&mut self, unit: &W) -> Option<f64> {
        unit.default_contact_time(self.pool).map(|d| d * self.multiplier)
    }
}

/// The unit's own default after-contact time for a pool, scaled by a multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultAfterContactTime {
    pool: PoolKey,
    multiplier: f64,
}

impl DefaultAfterContactTime {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDuration` for a negative or NaN multiplier.
    pub fn new(pool: PoolKey, multiplier: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            pool,
            multiplier: check_multiplier(multiplier)?,
        })
    }
}

impl<W: WorkUnit> DurationGenerator<W> for DefaultAfterContactTime {
    fn next(&mut self, unit: &W) -> Option<f64> {
        unit.default_after_contact_time(self.pool).map(|d| d * self.multiplier)
    }
}

/// Adapts a closure into a generator.
pub struct FnDuration<F>(pub F);

impl<F> fmt::Debug for FnDuration<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnDuration")
    }
}

impl<W, F> DurationGenerator<W> for FnDuration<F>
where
    F: FnMut(&W) -> Option<f64>,
{
    fn next(&mut self, unit: &W) -> Option<f64> {
        (self.0)(unit)
    }
}

/// Which of the unit's defaults stands in for an unregistered code-0 cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Falls back to `WorkUnit::default_contact_time`.
    Contact,
    /// Falls back to `WorkUnit::default_after_contact_time`.
    AfterContact,
}

/// Minimum-of-competing-causes policy for one phase.
pub struct CompetingCauses<W> {
    kind: PhaseKind,
    causes: Vec<Option<Box<dyn DurationGenerator<W>>>>,
}

impl<W> fmt::Debug for CompetingCauses<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<usize> = self
            .causes
            .iter()
            .enumerate()
            .filter_map(|(code, c)| c.as_ref().map(|_| code))
            .collect();
        f.debug_struct("CompetingCauses")
            .field("kind", &self.kind)
            .field("registered", &registered)
            .finish()
    }
}

impl<W: WorkUnit> CompetingCauses<W> {
    /// Empty policy; code 0 defers to the unit's default for `kind`.
    #[must_use]
    pub fn new(kind: PhaseKind) -> Self {
        Self {
            kind,
            causes: Vec::new(),
        }
    }

    /// Number of outcome codes that may compete.
    #[must_use]
    pub fn len(&self) -> usize {
        self.causes.len().max(1)
    }

    /// True when no generator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.causes.iter().all(Option::is_none)
    }

    /// Register (or clear, with `None`) the generator for `code`.
    pub fn set(&mut self, code: usize, generator: Option<Box<dyn DurationGenerator<W>>>) {
        if self.causes.len() <= code {
            self.causes.resize_with(code + 1, || None);
        }
        self.causes[code] = generator;
        while matches!(self.causes.last(), Some(None)) {
            self.causes.pop();
        }
    }

    /// Reset every registered generator for a new replication.
    pub fn init(&mut self) {
        for generator in self.causes.iter_mut().flatten() {
            generator.init();
        }
    }

    /// Draw the phase outcome for `unit` served by `pool`.
    ///
    /// `primary` replaces the code-0 cause (per-resource overrides).
    pub fn sample(
        &mut self,
        pool: PoolKey,
        unit: &W,
        mut primary: Option<&mut (dyn DurationGenerator<W> + 'static)>,
    ) -> PhaseOutcome {
        let mut best: Option<PhaseOutcome> = None;
        for code in 0..self.len() {
            let value = match (code, primary.as_deref_mut(), self.causes.get_mut(code)) {
                (0, Some(generator), _) => generator.next(unit),
                (_, _, Some(Some(generator))) => generator.next(unit),
                (0, None, _) => match self.kind {
                    PhaseKind::Contact => unit.default_contact_time(pool),
                    PhaseKind::AfterContact => unit.default_after_contact_time(pool),
                },
                _ => None,
            };
            let Some(value) = value.filter(|v| v.is_finite()) else {
                continue;
            };
            let value = value.max(0.0);
            if best.map_or(true, |b| value < b.duration) {
                best = Some(PhaseOutcome::new(value, code));
            }
        }
        best.unwrap_or(PhaseOutcome::UNBOUNDED)
    }
}
