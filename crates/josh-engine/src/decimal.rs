//! Arbitrary-precision decimal arithmetic.
//!
//! Stored as `coefficient * 10^exponent` over a `BigInt` coefficient, the same
//! representation as the General Decimal Arithmetic specification. Division
//! rounds to a fixed "decimal128-equivalent" context: 34 significant digits,
//! round-half-even, chosen and tested explicitly rather than left implicit.

use std::{cmp::Ordering, fmt, str::FromStr};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

/// Significant digits carried through division, matching IEEE 754 decimal128.
pub const DECIMAL128_PRECISION: u32 = 34;

/// An arbitrary-precision decimal number: `coefficient * 10^exponent`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    coefficient: BigInt,
    exponent: i32,
}

impl Decimal {
    pub fn new(coefficient: BigInt, exponent: i32) -> Self {
        Self { coefficient, exponent }
    }

    pub fn from_i64(v: i64) -> Self {
        Self { coefficient: BigInt::from(v), exponent: 0 }
    }

    pub fn zero() -> Self {
        Self::from_i64(0)
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.coefficient.is_negative()
    }

    pub fn coefficient(&self) -> &BigInt {
        &self.coefficient
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Aligns two decimals to the smaller (more precise) exponent, returning
    /// their rescaled coefficients at that common exponent.
    fn align(a: &Self, b: &Self) -> (BigInt, BigInt, i32) {
        let exp = a.exponent.min(b.exponent);
        let ca = &a.coefficient * BigInt::from(10).pow((a.exponent - exp) as u32);
        let cb = &b.coefficient * BigInt::from(10).pow((b.exponent - exp) as u32);
        (ca, cb, exp)
    }

    pub fn add(&self, other: &Self) -> Self {
        let (ca, cb, exp) = Self::align(self, other);
        Self { coefficient: ca + cb, exponent: exp }
    }

    pub fn sub(&self, other: &Self) -> Self {
        let (ca, cb, exp) = Self::align(self, other);
        Self { coefficient: ca - cb, exponent: exp }
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self {
            coefficient: &self.coefficient * &other.coefficient,
            exponent: self.exponent + other.exponent,
        }
    }

    pub fn neg(&self) -> Self {
        Self { coefficient: -&self.coefficient, exponent: self.exponent }
    }

    /// Divides, rounding the result to `DECIMAL128_PRECISION` significant
    /// digits using round-half-even.
    ///
    /// # Errors
    /// Returns `None` if `other` is zero.
    pub fn div(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        if self.is_zero() {
            return Some(Self::zero());
        }

        // Scale the numerator up so the division carries enough significant
        // digits before rounding back down to the target precision.
        let shift = (DECIMAL128_PRECISION as i32) + digit_count(&other.coefficient) - digit_count(&self.coefficient) + 2;
        let shift = shift.max(0) as u32;
        let scaled_num = &self.coefficient * BigInt::from(10).pow(shift);
        let (mut quotient, remainder) = scaled_num.div_rem(&other.coefficient);
        let result_exponent = self.exponent - other.exponent - shift as i32;

        // Round-half-even on the truncated division above: compare 2*|remainder| to |divisor|.
        let twice_remainder = (&remainder * 2).abs();
        let divisor_abs = other.coefficient.abs();
        let round_up = match twice_remainder.cmp(&divisor_abs) {
            Ordering::Greater => true,
            Ordering::Equal => quotient.clone() % BigInt::from(2) != BigInt::zero(),
            Ordering::Less => false,
        };
        if round_up {
            quotient += if quotient.is_negative() == remainder.is_negative() || remainder.is_zero() {
                BigInt::from(1)
            } else {
                BigInt::from(-1)
            };
        }

        let raw = Self { coefficient: quotient, exponent: result_exponent };
        Some(raw.round_to_precision(DECIMAL128_PRECISION))
    }

    /// Rounds (round-half-even) so the coefficient has at most `precision`
    /// significant digits, increasing the exponent as needed.
    #[must_use]
    pub fn round_to_precision(&self, precision: u32) -> Self {
        let digits = digit_count(&self.coefficient);
        if digits <= precision as i32 {
            return self.clone();
        }
        let drop = (digits - precision as i32) as u32;
        let divisor = BigInt::from(10).pow(drop);
        let (mut q, r) = self.coefficient.div_rem(&divisor);
        let twice_r = (&r * 2).abs();
        let round_up = match twice_r.cmp(&divisor) {
            Ordering::Greater => true,
            Ordering::Equal => &q % BigInt::from(2) != BigInt::zero(),
            Ordering::Less => false,
        };
        if round_up {
            q += if q.is_negative() { BigInt::from(-1) } else { BigInt::from(1) };
        }
        Self { coefficient: q, exponent: self.exponent + drop as i32 }
    }

    pub fn to_f64(&self) -> f64 {
        self.coefficient.to_f64().unwrap_or(f64::NAN) * 10f64.powi(self.exponent)
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.exponent >= 0 {
            (&self.coefficient * BigInt::from(10).pow(self.exponent as u32)).to_i64()
        } else {
            let divisor = BigInt::from(10).pow((-self.exponent) as u32);
            if (&self.coefficient % &divisor).is_zero() { (&self.coefficient / &divisor).to_i64() } else { None }
        }
    }
}

/// Number of base-10 digits in `n`'s magnitude (0 has 1 digit).
fn digit_count(n: &BigInt) -> i32 {
    if n.is_zero() {
        return 1;
    }
    n.abs().to_string().len() as i32
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ca, cb, _) = Self::align(self, other);
        ca.cmp(&cb)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent >= 0 {
            write!(f, "{}{}", self.coefficient, "0".repeat(self.exponent as usize))
        } else {
            let digits = self.coefficient.abs().to_string();
            let point = (-self.exponent) as usize;
            let sign = if self.coefficient.is_negative() { "-" } else { "" };
            if digits.len() <= point {
                write!(f, "{sign}0.{}{}", "0".repeat(point - digits.len()), digits)
            } else {
                let (int_part, frac_part) = digits.split_at(digits.len() - point);
                write!(f, "{sign}{int_part}.{frac_part}")
            }
        }
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid decimal literal: {s}"));
        }
        let digits = format!("{int_part}{frac_part}");
        let coefficient = BigInt::from_str(&digits).map_err(|e| e.to_string())? * sign;
        Ok(Self { coefficient, exponent: -(frac_part.len() as i32) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let d: Decimal = "3.50".parse().unwrap();
        assert_eq!(d.to_string(), "3.50");
    }

    #[test]
    fn add_aligns_exponents() {
        let a: Decimal = "1.5".parse().unwrap();
        let b: Decimal = "0.25".parse().unwrap();
        assert_eq!(a.add(&b).to_string(), "1.75");
    }

    #[test]
    fn division_half_even_rounding() {
        let a = Decimal::from_i64(7);
        let b = Decimal::from_i64(2);
        let result = a.div(&b).unwrap();
        assert_eq!(result.to_f64(), 3.5);
    }

    #[test]
    fn division_by_zero_is_none() {
        assert!(Decimal::from_i64(1).div(&Decimal::zero()).is_none());
    }

    #[test]
    fn ordering_across_exponents() {
        let a: Decimal = "1.50".parse().unwrap();
        let b: Decimal = "1.5".parse().unwrap();
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}
