//! Fixed-width monetary amounts
//!
//! Every balance, voting power, reserve and treasury figure is an [`Amount`]:
//! an unsigned integer count of the smallest unit of its asset. All
//! arithmetic is checked. The scale (token decimals) is explicit and only
//! enters at the edges, through [`Amount::from_decimal`] and
//! [`Amount::to_decimal`].
//!
//! On the wire amounts are decimal strings, since they routinely exceed the
//! 53-bit integer range of JSON consumers.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;

/// Largest mantissa a `Decimal` can hold (2^96 - 1)
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Largest scale a `Decimal` supports
const DECIMAL_MAX_SCALE: u8 = 28;

/// Unsigned amount in the smallest unit of an asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Largest representable amount
    pub const MAX: Amount = Amount(u128::MAX);

    /// Create from raw units
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw units
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `whole * 10^decimals`
    pub fn from_units(whole: u128, decimals: u8) -> Result<Self> {
        let factor = pow10(decimals)?;
        whole
            .checked_mul(factor)
            .map(Amount)
            .ok_or_else(|| Error::Overflow(format!("{} * 10^{}", whole, decimals)))
    }

    /// Convert a human-scale decimal (e.g. `1.5` tokens) into raw units.
    ///
    /// Rejects negative values and values carrying more fractional digits
    /// than `decimals`.
    pub fn from_decimal(value: Decimal, decimals: u8) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(Error::InvalidAmount(format!("negative amount {}", value)));
        }
        if decimals > DECIMAL_MAX_SCALE {
            return Err(Error::InvalidAmount(format!(
                "scale {} exceeds {}",
                decimals, DECIMAL_MAX_SCALE
            )));
        }

        let scaled = value
            .checked_mul(Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0))
            .ok_or_else(|| Error::Overflow(format!("{} at scale {}", value, decimals)))?;

        if !scaled.fract().is_zero() {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} fractional digits",
                value, decimals
            )));
        }

        scaled
            .to_u128()
            .map(Amount)
            .ok_or_else(|| Error::Overflow(format!("{} at scale {}", value, decimals)))
    }

    /// Convert raw units into a human-scale decimal
    pub fn to_decimal(&self, decimals: u8) -> Result<Decimal> {
        if decimals > DECIMAL_MAX_SCALE {
            return Err(Error::InvalidAmount(format!(
                "scale {} exceeds {}",
                decimals, DECIMAL_MAX_SCALE
            )));
        }
        if self.0 > DECIMAL_MAX_MANTISSA {
            return Err(Error::Overflow(format!("{} exceeds decimal range", self.0)));
        }
        Ok(Decimal::from_i128_with_scale(self.0 as i128, decimals as u32))
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| Error::Overflow(format!("{} + {}", self.0, other.0)))
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| Error::Underflow(format!("{} - {}", self.0, other.0)))
    }

    /// Subtraction floored at zero
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `floor(self * numerator / denominator)` without intermediate overflow
    /// when the result itself fits.
    pub fn checked_mul_div(self, numerator: u128, denominator: u128) -> Result<Amount> {
        if denominator == 0 {
            return Err(Error::DivisionByZero(format!(
                "{} * {} / 0",
                self.0, numerator
            )));
        }

        if let Some(product) = self.0.checked_mul(numerator) {
            return Ok(Amount(product / denominator));
        }

        let overflow = || Error::Overflow(format!("{} * {} / {}", self.0, numerator, denominator));
        let whole = (self.0 / denominator)
            .checked_mul(numerator)
            .ok_or_else(overflow)?;
        let part = (self.0 % denominator)
            .checked_mul(numerator)
            .ok_or_else(overflow)?
            / denominator;

        whole.checked_add(part).map(Amount).ok_or_else(overflow)
    }

    /// Share of `total` this amount represents, as a fraction in `[0, ∞)`.
    ///
    /// Returns zero when `total` is zero. Operands wider than a `Decimal`
    /// mantissa are scaled down together, which keeps 28 significant digits.
    pub fn ratio_of(self, total: Amount) -> Decimal {
        if total.is_zero() {
            return Decimal::ZERO;
        }

        let (mut n, mut d) = (self.0, total.0);
        while n > DECIMAL_MAX_MANTISSA || d > DECIMAL_MAX_MANTISSA {
            n /= 10;
            d /= 10;
        }
        if d == 0 {
            return Decimal::MAX;
        }

        Decimal::from_i128_with_scale(n as i128, 0)
            .checked_div(Decimal::from_i128_with_scale(d as i128, 0))
            .unwrap_or(Decimal::MAX)
    }

    /// Apply a non-negative fraction, rounding down
    pub fn mul_fraction(self, fraction: Decimal) -> Result<Amount> {
        if fraction.is_sign_negative() && !fraction.is_zero() {
            return Err(Error::InvalidAmount(format!("negative fraction {}", fraction)));
        }
        let mantissa = fraction.mantissa() as u128;
        let scale = pow10(fraction.scale() as u8)?;
        self.checked_mul_div(mantissa, scale)
    }

    /// Integer square root of `self * other`, used for initial pool shares.
    ///
    /// Falls back to `isqrt(self) * isqrt(other)` when the product overflows.
    pub fn geometric_mean(self, other: Amount) -> Amount {
        match self.0.checked_mul(other.0) {
            Some(product) => Amount(isqrt(product)),
            None => Amount(isqrt(self.0).saturating_mul(isqrt(other.0))),
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value as u128)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Amount(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Amount)
            .map_err(|e| Error::InvalidAmount(format!("{:?}: {}", s, e)))
    }
}

/// Saturating sum; callers that need overflow detection fold with
/// [`Amount::checked_add`].
impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
        Ok(Amount(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
        u128::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom(format!("negative amount {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            deserializer.deserialize_u128(AmountVisitor)
        }
    }
}

fn pow10(exp: u8) -> Result<u128> {
    10u128
        .checked_pow(exp as u32)
        .ok_or_else(|| Error::Overflow(format!("10^{}", exp)))
}

fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Newton iteration from an overestimate
    let mut x = 1u128 << ((128 - n.leading_zeros()).div_ceil(2));
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}
