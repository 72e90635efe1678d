//! Numeric value abstraction.
//!
//! Every price, indicator output and rule parameter flows through [`Num`], so
//! the representation (binary `f64` or arbitrary-precision decimal) is chosen
//! once per series through a [`NumFactory`] and never mixed inside one
//! evaluation.
//!
//! [`Num::NaN`] is the single "missing / undefined" value. It absorbs every
//! arithmetic operation and compares false against everything, which is how
//! indicators report warm-up gaps without conflating them with the cache's
//! "not yet computed" state.

use crate::domain::error::EngineError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, Copy)]
pub enum Num {
    Double(f64),
    Decimal(Decimal),
    NaN,
}

impl Num {
    /// Wraps an `f64`, folding a non-finite input into [`Num::NaN`].
    pub fn double(value: f64) -> Num {
        if value.is_finite() {
            Num::Double(value)
        } else {
            Num::NaN
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Num::NaN)
    }

    pub fn factory(&self) -> Option<NumFactory> {
        match self {
            Num::Double(_) => Some(NumFactory::Double),
            Num::Decimal(_) => Some(NumFactory::Decimal),
            Num::NaN => None,
        }
    }

    /// Lossy conversion; `NaN` maps to `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        match self {
            Num::Double(v) => v,
            Num::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Num::NaN => f64::NAN,
        }
    }

    pub fn to_decimal(self) -> Option<Decimal> {
        match self {
            Num::Double(v) => Decimal::from_f64(v),
            Num::Decimal(d) => Some(d),
            Num::NaN => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Num::Double(v) => *v == 0.0,
            Num::Decimal(d) => d.is_zero(),
            Num::NaN => false,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Num::Double(v) => *v < 0.0,
            Num::Decimal(d) => d.is_sign_negative() && !d.is_zero(),
            Num::NaN => false,
        }
    }

    pub fn abs(self) -> Num {
        match self {
            Num::Double(v) => Num::Double(v.abs()),
            Num::Decimal(d) => Num::Decimal(d.abs()),
            Num::NaN => Num::NaN,
        }
    }

    /// Square root; negative inputs give `NaN`.
    pub fn sqrt(self) -> Num {
        match self {
            Num::Double(v) => Num::double(v.sqrt()),
            Num::Decimal(d) => d.sqrt().map(Num::Decimal).unwrap_or(Num::NaN),
            Num::NaN => Num::NaN,
        }
    }

    pub fn powi(self, exponent: i64) -> Num {
        match self {
            Num::Double(v) => match i32::try_from(exponent) {
                Ok(e) => Num::double(v.powi(e)),
                Err(_) => Num::NaN,
            },
            Num::Decimal(d) => d.checked_powi(exponent).map(Num::Decimal).unwrap_or(Num::NaN),
            Num::NaN => Num::NaN,
        }
    }

    /// Larger of the two; `NaN` on either side wins.
    pub fn max(self, other: Num) -> Num {
        match self.partial_cmp(&other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => Num::NaN,
        }
    }

    /// Smaller of the two; `NaN` on either side wins.
    pub fn min(self, other: Num) -> Num {
        match self.partial_cmp(&other) {
            Some(Ordering::Greater) => other,
            Some(_) => self,
            None => Num::NaN,
        }
    }

    /// Converts `other` into this value's representation.
    fn align(self, other: Num) -> Option<(Num, Num)> {
        match (self, other) {
            (Num::NaN, _) | (_, Num::NaN) => None,
            (Num::Double(_), Num::Decimal(d)) => d.to_f64().map(|v| (self, Num::Double(v))),
            (Num::Decimal(_), Num::Double(v)) => Decimal::from_f64(v).map(|d| (self, Num::Decimal(d))),
            _ => Some((self, other)),
        }
    }

    fn combine(
        self,
        rhs: Num,
        double: fn(f64, f64) -> f64,
        decimal: fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Num {
        match self.align(rhs) {
            Some((Num::Double(a), Num::Double(b))) => Num::double(double(a, b)),
            Some((Num::Decimal(a), Num::Decimal(b))) => {
                decimal(a, b).map(Num::Decimal).unwrap_or(Num::NaN)
            }
            _ => Num::NaN,
        }
    }
}

impl Add for Num {
    type Output = Num;

    fn add(self, rhs: Num) -> Num {
        self.combine(rhs, |a, b| a + b, Decimal::checked_add)
    }
}

impl Sub for Num {
    type Output = Num;

    fn sub(self, rhs: Num) -> Num {
        self.combine(rhs, |a, b| a - b, Decimal::checked_sub)
    }
}

impl Mul for Num {
    type Output = Num;

    fn mul(self, rhs: Num) -> Num {
        self.combine(rhs, |a, b| a * b, Decimal::checked_mul)
    }
}

impl Div for Num {
    type Output = Num;

    /// Division by zero yields `NaN` in both representations.
    fn div(self, rhs: Num) -> Num {
        self.combine(
            rhs,
            |a, b| if b == 0.0 { f64::NAN } else { a / b },
            Decimal::checked_div,
        )
    }
}

impl Neg for Num {
    type Output = Num;

    fn neg(self) -> Num {
        match self {
            Num::Double(v) => Num::Double(-v),
            Num::Decimal(d) => Num::Decimal(-d),
            Num::NaN => Num::NaN,
        }
    }
}

impl PartialEq for Num {
    fn eq(&self, other: &Num) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Num {
    fn partial_cmp(&self, other: &Num) -> Option<Ordering> {
        match self.align(*other)? {
            (Num::Double(a), Num::Double(b)) => a.partial_cmp(&b),
            (Num::Decimal(a), Num::Decimal(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

impl fmt::Display for Num {
    /// Canonical text form: decimals lose trailing zeros and integral doubles
    /// print without a fractional part, so `5`, `5.0` and `5.00` all render as `5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Double(v) => write!(f, "{v}"),
            Num::Decimal(d) => write!(f, "{}", d.normalize()),
            Num::NaN => write!(f, "NaN"),
        }
    }
}

/// Constructs [`Num`] values bound to one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumFactory {
    #[default]
    Decimal,
    Double,
}

impl NumFactory {
    pub fn num_of(&self, value: f64) -> Num {
        match self {
            NumFactory::Double => Num::double(value),
            NumFactory::Decimal => Decimal::from_f64(value)
                .map(Num::Decimal)
                .unwrap_or(Num::NaN),
        }
    }

    pub fn num_of_i64(&self, value: i64) -> Num {
        match self {
            NumFactory::Double => Num::Double(value as f64),
            NumFactory::Decimal => Num::Decimal(Decimal::from(value)),
        }
    }

    /// Parses text in this factory's representation. `"NaN"` is accepted.
    pub fn parse(&self, input: &str) -> Result<Num, EngineError> {
        let text = input.trim();
        if text.eq_ignore_ascii_case("nan") {
            return Ok(Num::NaN);
        }
        let err = || EngineError::NumParse {
            input: input.to_string(),
        };
        match self {
            NumFactory::Double => text.parse::<f64>().map(Num::double).map_err(|_| err()),
            NumFactory::Decimal => Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map(Num::Decimal)
                .map_err(|_| err()),
        }
    }

    /// Converts an existing value into this representation.
    pub fn convert(&self, value: Num) -> Num {
        match (self, value) {
            (_, Num::NaN) => Num::NaN,
            (NumFactory::Double, v) => Num::double(v.to_f64()),
            (NumFactory::Decimal, v) => v.to_decimal().map(Num::Decimal).unwrap_or(Num::NaN),
        }
    }

    pub fn zero(&self) -> Num {
        self.num_of_i64(0)
    }

    pub fn one(&self) -> Num {
        self.num_of_i64(1)
    }

    pub fn hundred(&self) -> Num {
        self.num_of_i64(100)
    }

    pub fn nan(&self) -> Num {
        Num::NaN
    }

    pub fn name(&self) -> &'static str {
        match self {
            NumFactory::Double => "double",
            NumFactory::Decimal => "decimal",
        }
    }
}

impl FromStr for NumFactory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "double" => Ok(NumFactory::Double),
            "decimal" => Ok(NumFactory::Decimal),
            other => Err(EngineError::NumParse {
                input: other.to_string(),
            }),
        }
    }
}
