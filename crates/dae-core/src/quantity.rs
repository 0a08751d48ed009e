//! Measured quantities with units and analytically propagated variance.
//!
//! Every count, sum and derived value in a reduction is carried as a
//! [`MeasuredQuantity`]: a value, its variance and a physical [`Unit`].
//! Arithmetic propagates variance with first-order rules and refuses to mix
//! incompatible units.
//!
//! # Example
//!
//! ```rust,ignore
//! use dae_core::quantity::{MeasuredQuantity, Unit};
//!
//! let det = MeasuredQuantity::counts(6000.0).with_extra_variance(0.5);
//! let mon = MeasuredQuantity::counts(15000.0);
//! let intensity = det.div(&mon)?;
//! assert!((intensity.value - 0.4).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DaeError, DaeResult};

/// Physical unit attached to a quantity or interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Neutron or event counts.
    Counts,
    /// Pure number.
    Dimensionless,
    /// Time of flight.
    Microseconds,
    /// Neutron wavelength.
    Angstrom,
    /// Flight path length.
    Metres,
    /// Integrated proton charge.
    MicroampHours,
    /// Frame counters.
    Frames,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::Counts => "counts",
            Unit::Dimensionless => "dimensionless",
            Unit::Microseconds => "µs",
            Unit::Angstrom => "Å",
            Unit::Metres => "m",
            Unit::MicroampHours => "µAh",
            Unit::Frames => "frames",
        };
        write!(f, "{}", label)
    }
}

/// A value with variance and unit.
///
/// The variance is always `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredQuantity {
    /// Central value.
    pub value: f64,
    /// Variance (σ²) of the value.
    pub variance: f64,
    /// Physical unit.
    pub unit: Unit,
}

impl MeasuredQuantity {
    /// Create a quantity, clamping negative variance to zero.
    pub fn new(value: f64, variance: f64, unit: Unit) -> Self {
        Self {
            value,
            variance: variance.max(0.0),
            unit,
        }
    }

    /// Raw counts with Poisson variance equal to the value.
    pub fn counts(value: f64) -> Self {
        Self::new(value, value, Unit::Counts)
    }

    /// A dimensionless value with no uncertainty.
    pub fn exact(value: f64) -> Self {
        Self::new(value, 0.0, Unit::Dimensionless)
    }

    /// Additive identity in the given unit.
    pub fn zero(unit: Unit) -> Self {
        Self::new(0.0, 0.0, unit)
    }

    /// Build from a value and standard deviation.
    pub fn from_stddev(value: f64, stddev: f64, unit: Unit) -> Self {
        Self::new(value, stddev * stddev, unit)
    }

    /// Standard deviation, `sqrt(variance)`.
    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Return a copy with `extra` added to the variance.
    pub fn with_extra_variance(self, extra: f64) -> Self {
        Self::new(self.value, self.variance + extra, self.unit)
    }

    /// Multiply by an exact factor; variance scales with its square.
    pub fn scale(self, factor: f64) -> Self {
        Self::new(
            self.value * factor,
            self.variance * factor * factor,
            self.unit,
        )
    }

    fn require_same_unit(&self, other: &Self) -> DaeResult<()> {
        if self.unit != other.unit {
            return Err(DaeError::UnitMismatch {
                expected: self.unit,
                actual: other.unit,
            });
        }
        Ok(())
    }

    /// Sum of two independent quantities.
    pub fn add(&self, other: &Self) -> DaeResult<Self> {
        self.require_same_unit(other)?;
        Ok(Self::new(
            self.value + other.value,
            self.variance + other.variance,
            self.unit,
        ))
    }

    /// Difference of two independent quantities.
    pub fn sub(&self, other: &Self) -> DaeResult<Self> {
        self.require_same_unit(other)?;
        Ok(Self::new(
            self.value - other.value,
            self.variance + other.variance,
            self.unit,
        ))
    }

    /// Ratio `self / other` with first-order variance propagation:
    /// `var = va/b² + a²·vb/b⁴`.
    ///
    /// Equal units cancel to [`Unit::Dimensionless`]; dividing by a
    /// dimensionless quantity keeps the numerator unit. Any other combination
    /// is a [`DaeError::UnitMismatch`]. A zero denominator is a
    /// [`DaeError::Configuration`] error.
    pub fn div(&self, other: &Self) -> DaeResult<Self> {
        let unit = if self.unit == other.unit {
            Unit::Dimensionless
        } else if other.unit == Unit::Dimensionless {
            self.unit
        } else {
            return Err(DaeError::UnitMismatch {
                expected: self.unit,
                actual: other.unit,
            });
        };

        if other.value == 0.0 {
            return Err(DaeError::Configuration(
                "Cannot divide by a zero-valued quantity".into(),
            ));
        }

        let b2 = other.value * other.value;
        let variance = self.variance / b2 + self.value * self.value * other.variance / (b2 * b2);
        Ok(Self::new(self.value / other.value, variance, unit))
    }
}

/// Polarisation `(a - b) / (a + b)` with variance from partial derivatives.
///
/// `∂P/∂a = 2b/(a+b)²` and `∂P/∂b = -2a/(a+b)²`, so
/// `var = (2b/(a+b)²)²·va + (2a/(a+b)²)²·vb`. The result is dimensionless.
pub fn polarisation(a: &MeasuredQuantity, b: &MeasuredQuantity) -> DaeResult<MeasuredQuantity> {
    a.require_same_unit(b)?;

    let sum = a.value + b.value;
    if sum == 0.0 {
        return Err(DaeError::Configuration(
            "Cannot calculate polarisation; zero intensity sum".into(),
        ));
    }

    let sum2 = sum * sum;
    let partial_a = 2.0 * b.value / sum2;
    let partial_b = -2.0 * a.value / sum2;
    let variance = partial_a * partial_a * a.variance + partial_b * partial_b * b.variance;

    Ok(MeasuredQuantity::new(
        (a.value - b.value) / sum,
        variance,
        Unit::Dimensionless,
    ))
}

/// Immutable `(lower, upper)` bound with a unit. Always `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    lower: f64,
    upper: f64,
    unit: Unit,
}

impl Interval {
    /// Create an interval, rejecting non-finite or non-increasing bounds.
    pub fn new(lower: f64, upper: f64, unit: Unit) -> DaeResult<Self> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(DaeError::Configuration(format!(
                "Interval bounds must be finite, got [{}, {}]",
                lower, upper
            )));
        }
        if lower >= upper {
            return Err(DaeError::Configuration(format!(
                "Interval lower bound {} must be below upper bound {}",
                lower, upper
            )));
        }
        Ok(Self { lower, upper, unit })
    }

    /// Lower bound.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper bound.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Unit of both bounds.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Fail unless this interval is expressed in `unit`.
    pub fn require_unit(&self, unit: Unit) -> DaeResult<()> {
        if self.unit != unit {
            return Err(DaeError::UnitMismatch {
                expected: unit,
                actual: self.unit,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] {}", self.lower, self.upper, self.unit)
    }
}
