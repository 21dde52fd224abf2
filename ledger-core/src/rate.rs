//! Basis-point rates and percentages

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis points in 100%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Fee rate in basis points, `0..=10000`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Bps(u32);

impl Bps {
    /// Zero rate
    pub const ZERO: Bps = Bps(0);

    /// 100%
    pub const MAX: Bps = Bps(BPS_DENOMINATOR);

    /// Create, rejecting values above 10000
    pub fn new(value: u32) -> Result<Self> {
        if value > BPS_DENOMINATOR {
            return Err(Error::InvalidRate(format!(
                "{}bp exceeds {}bp",
                value, BPS_DENOMINATOR
            )));
        }
        Ok(Self(value))
    }

    /// Create, capping at 10000
    pub fn saturating(value: u32) -> Self {
        Self(value.min(BPS_DENOMINATOR))
    }

    /// Raw basis points
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Rate as a fraction (`30bp` -> `0.003`)
    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    /// Shift by a signed delta, floored at zero and capped at 10000
    pub fn offset(&self, delta: i64) -> Bps {
        let shifted = (self.0 as i64).saturating_add(delta);
        Bps(shifted.clamp(0, BPS_DENOMINATOR as i64) as u32)
    }

    /// Clamp into `[min, max]`
    pub fn clamp_to(&self, min: Bps, max: Bps) -> Bps {
        Bps(self.0.clamp(min.0, max.0.max(min.0)))
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

impl<'de> Deserialize<'de> for Bps {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = u32::deserialize(deserializer)?;
        Bps::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Percentage in `0..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    /// 0%
    pub const ZERO: Percent = Percent(Decimal::ZERO);

    /// 100%
    pub const HUNDRED: Percent = Percent(Decimal::ONE_HUNDRED);

    /// Create, rejecting values outside `0..=100`
    pub fn new(value: Decimal) -> Result<Self> {
        if (value.is_sign_negative() && !value.is_zero()) || value > Decimal::ONE_HUNDRED {
            return Err(Error::InvalidRate(format!("{}% outside 0..=100", value)));
        }
        Ok(Self(value))
    }

    /// From a whole number of percent
    pub fn from_int(value: u32) -> Result<Self> {
        Self::new(Decimal::from(value))
    }

    /// From a fraction in `0..=1`, capping at 100%
    pub fn from_fraction(fraction: Decimal) -> Self {
        Self(fraction.max(Decimal::ZERO).min(Decimal::ONE) * Decimal::ONE_HUNDRED)
    }

    /// Value in percent
    pub fn get(&self) -> Decimal {
        self.0
    }

    /// Value as a fraction (`20%` -> `0.2`)
    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = <Decimal as Deserialize>::deserialize(deserializer)?;
        Percent::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bps_bounds() {
        assert!(Bps::new(10_000).is_ok());
        assert!(Bps::new(10_001).is_err());
        assert_eq!(Bps::saturating(20_000), Bps::MAX);
    }

    #[test]
    fn test_bps_offset_and_clamp() {
        let rate = Bps::new(30).unwrap();
        assert_eq!(rate.offset(5).get(), 35);
        assert_eq!(rate.offset(-50).get(), 0);

        let min = Bps::new(10).unwrap();
        let max = Bps::new(100).unwrap();
        assert_eq!(Bps::new(150).unwrap().clamp_to(min, max), max);
        assert_eq!(Bps::new(5).unwrap().clamp_to(min, max), min);
    }

    #[test]
    fn test_bps_fraction() {
        assert_eq!(Bps::new(30).unwrap().as_fraction(), Decimal::new(3, 3));
    }

    #[test]
    fn test_percent() {
        assert!(Percent::from_int(101).is_err());
        assert!(Percent::new(Decimal::new(-1, 0)).is_err());

        let p = Percent::from_int(20).unwrap();
        assert_eq!(p.as_fraction(), Decimal::new(2, 1));
        assert_eq!(Percent::from_fraction(Decimal::new(75, 2)).get(), Decimal::from(75));
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Bps>("10001").is_err());
        assert_eq!(serde_json::from_str::<Bps>("30").unwrap().get(), 30);
        assert!(serde_json::from_str::<Percent>("\"150\"").is_err());
        assert!(serde_json::from_str::<Percent>("-1").is_err());
    }

    #[test]
    fn test_percent_json() {
        let p = Percent::new(Decimal::new(125, 1)).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(serde_json::from_str::<Percent>(&json).unwrap(), p);
        assert_eq!(serde_json::from_str::<Percent>("60").unwrap(), Percent::from_int(60).unwrap());
    }
}
