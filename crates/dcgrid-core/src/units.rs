//! Unit newtypes for DC grid quantities.
//!
//! Low-voltage DC planning mixes kilowatts, volts, amperes and per-unit voltage
//! magnitudes in the same expressions. Raw `f64` values make it easy to add a
//! current to a power, or to feed an absolute voltage where a per-unit value is
//! expected (droop curves are indexed in p.u., catalogues in kW and A). The
//! wrappers below catch those mistakes at compile time.
//!
//! All types are `#[repr(transparent)]` and cost nothing at runtime.
//!
//! # Usage
//!
//! ```
//! use dcgrid_core::units::{Amperes, Kilowatts, PerUnit, Volts};
//!
//! let p = Kilowatts(1.0);
//! let v = Volts(48.0);
//!
//! let total = p + Kilowatts(0.5);
//! assert_eq!(total.value(), 1.5);
//!
//! // I = P / V
//! let i: Amperes = p.current_at(v);
//! assert!((i.value() - 1000.0 / 48.0).abs() < 1e-12);
//!
//! // This would NOT compile - different units
//! // let wrong = p + v;
//! let _ = PerUnit::ONE;
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Mul<$type> for f64 {
            type Output = $type;
            fn mul(self, rhs: $type) -> Self::Output {
                <$type>::new(self * rhs.0)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            #[inline]
            pub fn clamp(self, min: Self, max: Self) -> Self {
                Self(self.0.clamp(min.0, max.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

// =============================================================================
// Power
// =============================================================================

/// Active power in kilowatts (kW)
///
/// Consumer convention for loads and storage (positive = drawing power),
/// producer convention for generators and external grids.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilowatts(pub f64);

impl_unit_ops!(Kilowatts, "kW");

impl Kilowatts {
    pub const ZERO: Self = Self(0.0);

    /// Current drawn at a given DC voltage: I = P / V
    #[inline]
    pub fn current_at(self, voltage: Volts) -> Amperes {
        if voltage.0.abs() < 1e-12 {
            Amperes(0.0)
        } else {
            Amperes(self.0 * 1000.0 / voltage.0)
        }
    }

    /// Energy delivered over `hours`, in kWh
    #[inline]
    pub fn over_hours(self, hours: f64) -> f64 {
        self.0 * hours
    }
}

// =============================================================================
// Voltage
// =============================================================================

/// Voltage magnitude in per-unit of the bus nominal voltage
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

impl PerUnit {
    pub const ONE: Self = Self(1.0);
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn to_volts(self, nominal: Volts) -> Volts {
        Volts(self.0 * nominal.0)
    }
}

/// Absolute DC voltage in volts (V)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Volts(pub f64);

impl_unit_ops!(Volts, "V");

impl Volts {
    #[inline]
    pub fn to_per_unit(self, nominal: Volts) -> PerUnit {
        if nominal.0.abs() < 1e-12 {
            PerUnit(0.0)
        } else {
            PerUnit(self.0 / nominal.0)
        }
    }

    /// True when the nominal voltage is still unknown (0 V placeholder bus)
    #[inline]
    pub fn is_unset(self) -> bool {
        self.0.abs() < 1e-12
    }
}

// =============================================================================
// Current
// =============================================================================

/// Current in amperes (A)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Amperes(pub f64);

impl_unit_ops!(Amperes, "A");

impl Amperes {
    /// Loading of a conductor as a percentage of its ampacity
    #[inline]
    pub fn loading_percent(self, ampacity: Amperes) -> f64 {
        if ampacity.0.abs() < 1e-12 {
            0.0
        } else {
            self.0.abs() / ampacity.0 * 100.0
        }
    }
}
