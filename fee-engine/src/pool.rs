//! Pool identity, fee parameters and creation/configuration rules

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount, Bps, Percent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One side of a token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// Token contract address
    pub address: Address,
    /// Ticker symbol
    pub symbol: String,
    /// Decimal places of the raw unit
    pub decimals: u8,
}

/// Live fee state of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeParameters {
    /// Fee rate currently charged
    pub current_fee_rate: Bps,
    /// Lower bound for any adjustment
    pub min_fee_rate: Bps,
    /// Upper bound for any adjustment
    pub max_fee_rate: Bps,
    /// Base adjustment increment
    pub step: Bps,
    /// Minimum seconds between adjustments
    pub cooldown_secs: u64,
    /// When the rate last changed
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_adjustment_at: Option<DateTime<Utc>>,
}

impl FeeParameters {
    /// Seconds left before the next adjustment is allowed, if any
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let last = self.last_adjustment_at?;
        let elapsed = (now - last).num_seconds().max(0) as u64;
        if elapsed < self.cooldown_secs {
            Some(self.cooldown_secs - elapsed)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_fee_rate > self.max_fee_rate {
            return Err(Error::InvalidConfig(format!(
                "min fee {} above max fee {}",
                self.min_fee_rate, self.max_fee_rate
            )));
        }
        if self.current_fee_rate < self.min_fee_rate || self.current_fee_rate > self.max_fee_rate {
            return Err(Error::InvalidConfig(format!(
                "fee {} outside [{}, {}]",
                self.current_fee_rate, self.min_fee_rate, self.max_fee_rate
            )));
        }
        if self.step == Bps::ZERO {
            return Err(Error::InvalidConfig("step must be positive".to_string()));
        }
        Ok(())
    }
}

/// Thresholds that drive automatic fee adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAdjustmentParams {
    /// 24h volume at or above which fees rise (zero disables)
    pub volume_threshold: Amount,
    /// Volatility (%) at or above which fees rise (zero disables)
    pub volatility_threshold: Decimal,
    /// Liquidity below which fees rise (zero disables)
    pub liquidity_threshold: Amount,
    /// Multiplier on `step` per breached threshold
    pub adjustment_factor: Decimal,
    /// Cap on a single adjustment, as a percentage of the current rate
    pub max_adjustment_percent: Percent,
    /// Fraction of a threshold that trips the opposite signal
    #[serde(default = "default_lower_band")]
    pub lower_band_percent: Percent,
}

/// Largest multiple of the step a single breach may contribute
pub const MAX_ADJUSTMENT_FACTOR: Decimal = Decimal::ONE_HUNDRED;

fn default_lower_band() -> Percent {
    Percent::new(Decimal::from(50)).unwrap_or(Percent::ZERO)
}

impl FeeAdjustmentParams {
    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if self.volatility_threshold.is_sign_negative() && !self.volatility_threshold.is_zero() {
            return Err(Error::InvalidConfig("negative volatility threshold".to_string()));
        }
        let factor = self.adjustment_factor;
        if factor <= Decimal::ZERO || factor > MAX_ADJUSTMENT_FACTOR {
            return Err(Error::InvalidConfig(format!(
                "adjustment factor {} must be in (0, {}]",
                factor, MAX_ADJUSTMENT_FACTOR
            )));
        }
        if self.max_adjustment_percent == Percent::ZERO {
            return Err(Error::InvalidConfig("max adjustment percent must be positive".to_string()));
        }
        let band = self.lower_band_percent;
        if band == Percent::ZERO || band == Percent::HUNDRED {
            return Err(Error::InvalidConfig(format!(
                "lower band {} must be strictly between 0% and 100%",
                band
            )));
        }
        Ok(())
    }
}

impl Default for FeeAdjustmentParams {
    fn default() -> Self {
        Self {
            volume_threshold: Amount::new(1_000_000),
            volatility_threshold: Decimal::from(5),
            liquidity_threshold: Amount::new(100_000),
            adjustment_factor: Decimal::ONE,
            max_adjustment_percent: Percent::new(Decimal::from(50)).unwrap_or(Percent::HUNDRED),
            lower_band_percent: default_lower_band(),
        }
    }
}

/// Parameters for registering a new pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolCreationParams {
    /// First token
    pub token_a: TokenInfo,
    /// Second token
    pub token_b: TokenInfo,
    /// Starting fee rate
    pub initial_fee_rate: Bps,
    /// Fee floor
    pub min_fee_rate: Bps,
    /// Fee ceiling
    pub max_fee_rate: Bps,
    /// Adjustment step
    pub fee_adjustment_step: Bps,
    /// Cooldown between adjustments, seconds
    pub fee_adjustment_cooldown: u64,
    /// Automatic adjustment thresholds
    pub fee_adjustment_params: FeeAdjustmentParams,
    /// Whether market signals adjust fees automatically
    pub enable_dynamic_fee: bool,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Display description
    #[serde(default)]
    pub description: Option<String>,
}

impl PoolCreationParams {
    /// Check ranges and token distinctness
    pub fn validate(&self) -> Result<()> {
        if self.token_a.address == self.token_b.address {
            return Err(Error::InvalidConfig(format!(
                "token pair must be distinct, got {} twice",
                self.token_a.address
            )));
        }
        self.fee_parameters(None).validate()?;
        self.fee_adjustment_params.validate()
    }

    /// Pool address derived from the unordered token pair
    pub fn pool_address(&self) -> Address {
        let (lo, hi) = if self.token_a.address <= self.token_b.address {
            (&self.token_a.address, &self.token_b.address)
        } else {
            (&self.token_b.address, &self.token_a.address)
        };
        Address::derive("pool", &[lo.as_str(), hi.as_str()])
    }

    fn fee_parameters(&self, last_adjustment_at: Option<DateTime<Utc>>) -> FeeParameters {
        FeeParameters {
            current_fee_rate: self.initial_fee_rate,
            min_fee_rate: self.min_fee_rate,
            max_fee_rate: self.max_fee_rate,
            step: self.fee_adjustment_step,
            cooldown_secs: self.fee_adjustment_cooldown,
            last_adjustment_at,
        }
    }
}

/// Reconfiguration applied through an executed governance proposal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfigUpdate {
    /// New fee floor
    #[serde(default)]
    pub min_fee_rate: Option<Bps>,
    /// New fee ceiling
    #[serde(default)]
    pub max_fee_rate: Option<Bps>,
    /// New step
    #[serde(default)]
    pub step: Option<Bps>,
    /// New cooldown
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    /// New thresholds
    #[serde(default)]
    pub fee_adjustment_params: Option<FeeAdjustmentParams>,
    /// Toggle automatic adjustment
    #[serde(default)]
    pub dynamic_fee_enabled: Option<bool>,
}

impl PoolConfigUpdate {
    /// True if nothing would change
    pub fn is_empty(&self) -> bool {
        *self == PoolConfigUpdate::default()
    }
}

/// A dynamic-fee liquidity pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Pool address
    pub address: Address,
    /// First token
    pub token_a: TokenInfo,
    /// Second token
    pub token_b: TokenInfo,
    /// Display name
    pub name: Option<String>,
    /// Display description
    pub description: Option<String>,
    /// Account that registered the pool
    pub creator: Address,
    /// Registration time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Fee state
    pub fees: FeeParameters,
    /// Automatic adjustment thresholds
    pub adjustment_params: FeeAdjustmentParams,
    /// Whether market signals adjust fees automatically
    pub dynamic_fee_enabled: bool,
    /// Reserve of token A
    pub reserve_a: Amount,
    /// Reserve of token B
    pub reserve_b: Amount,
    /// Outstanding liquidity shares
    pub total_shares: Amount,
}

impl Pool {
    /// Build a pool from validated creation parameters
    pub fn from_params(
        params: PoolCreationParams,
        creator: Address,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        params.validate()?;

        Ok(Self {
            address: params.pool_address(),
            fees: params.fee_parameters(None),
            token_a: params.token_a,
            token_b: params.token_b,
            name: params.name,
            description: params.description,
            creator,
            created_at: now,
            adjustment_params: params.fee_adjustment_params,
            dynamic_fee_enabled: params.enable_dynamic_fee,
            reserve_a: Amount::ZERO,
            reserve_b: Amount::ZERO,
            total_shares: Amount::ZERO,
        })
    }

    /// Current fee rate
    pub fn fee_rate(&self) -> Bps {
        self.fees.current_fee_rate
    }

    /// Whether the pool holds any liquidity
    pub fn is_active(&self) -> bool {
        !self.total_shares.is_zero()
    }

    /// Check the fee-band invariant
    pub fn check_invariants(&self) -> Result<()> {
        self.fees
            .validate()
            .map_err(|e| Error::Corrupted(format!("pool {}: {}", self.address, e)))
    }

    /// Apply a configuration update. The current rate is re-clamped into
    /// the new band; the new band must still be well-formed.
    pub fn apply_config(&mut self, update: &PoolConfigUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(Error::InvalidConfig("empty pool config update".to_string()));
        }

        let mut fees = self.fees.clone();
        if let Some(min) = update.min_fee_rate {
            fees.min_fee_rate = min;
        }
        if let Some(max) = update.max_fee_rate {
            fees.max_fee_rate = max;
        }
        if let Some(step) = update.step {
            fees.step = step;
        }
        if let Some(cooldown) = update.cooldown_secs {
            fees.cooldown_secs = cooldown;
        }
        if fees.min_fee_rate > fees.max_fee_rate {
            return Err(Error::InvalidConfig(format!(
                "min fee {} above max fee {}",
                fees.min_fee_rate, fees.max_fee_rate
            )));
        }
        fees.current_fee_rate = fees
            .current_fee_rate
            .clamp_to(fees.min_fee_rate, fees.max_fee_rate);
        fees.validate()?;

        if let Some(params) = &update.fee_adjustment_params {
            params.validate()?;
        }

        // All checks passed
        self.fees = fees;
        if let Some(params) = &update.fee_adjustment_params {
            self.adjustment_params = params.clone();
        }
        if let Some(enabled) = update.dynamic_fee_enabled {
            self.dynamic_fee_enabled = enabled;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn token(seed: u64, symbol: &str) -> TokenInfo {
        TokenInfo {
            address: Address::from_seed(seed),
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    /// min=10bp, max=100bp, current=30bp, step=5bp, cooldown=3600s
    pub fn params() -> PoolCreationParams {
        PoolCreationParams {
            token_a: token(0xa, "WETH"),
            token_b: token(0xb, "USDC"),
            initial_fee_rate: Bps::saturating(30),
            min_fee_rate: Bps::saturating(10),
            max_fee_rate: Bps::saturating(100),
            fee_adjustment_step: Bps::saturating(5),
            fee_adjustment_cooldown: 3600,
            fee_adjustment_params: FeeAdjustmentParams::default(),
            enable_dynamic_fee: true,
            name: Some("WETH/USDC".to_string()),
            description: None,
        }
    }

    pub fn pool(now: DateTime<Utc>) -> Pool {
        Pool::from_params(params(), Address::from_seed(1), now).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_creation_validation() {
        assert!(params().validate().is_ok());

        let mut p = params();
        p.initial_fee_rate = Bps::saturating(5);
        assert!(p.validate().is_err());

        let mut p = params();
        p.fee_adjustment_step = Bps::ZERO;
        assert!(p.validate().is_err());

        let mut p = params();
        p.token_b = p.token_a.clone();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_adjustment_factor_bounded() {
        let mut p = params();
        p.fee_adjustment_params.adjustment_factor = MAX_ADJUSTMENT_FACTOR;
        assert!(p.validate().is_ok());

        p.fee_adjustment_params.adjustment_factor = Decimal::MAX;
        let err = p.fee_adjustment_params.validate().unwrap_err();
        assert_eq!(err.reason(), "INVALID_POOL_CONFIG");
        assert!(Pool::from_params(p, Address::from_seed(1), Utc::now()).is_err());
    }

    #[test]
    fn test_adjustment_params_json() {
        let params = FeeAdjustmentParams {
            adjustment_factor: Decimal::new(15, 1),
            max_adjustment_percent: Percent::from_int(25).unwrap(),
            ..FeeAdjustmentParams::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("maxAdjustmentPercent").is_some());
        assert_eq!(serde_json::from_value::<FeeAdjustmentParams>(json).unwrap(), params);
    }

    #[test]
    fn test_pool_address_ignores_token_order() {
        let a = params();
        let mut b = params();
        std::mem::swap(&mut b.token_a, &mut b.token_b);
        assert_eq!(a.pool_address(), b.pool_address());
    }

    #[test]
    fn test_cooldown_remaining() {
        let now = Utc::now();
        let mut pool = pool(now);
        assert_eq!(pool.fees.cooldown_remaining(now), None);

        pool.fees.last_adjustment_at = Some(now);
        let later = now + chrono::Duration::seconds(600);
        assert_eq!(pool.fees.cooldown_remaining(later), Some(3000));

        let after = now + chrono::Duration::seconds(3600);
        assert_eq!(pool.fees.cooldown_remaining(after), None);
    }

    #[test]
    fn test_apply_config_reclamps_current_rate() {
        let mut pool = pool(Utc::now());
        let update = PoolConfigUpdate {
            min_fee_rate: Some(Bps::saturating(40)),
            ..Default::default()
        };
        pool.apply_config(&update).unwrap();
        assert_eq!(pool.fee_rate().get(), 40);
        assert!(pool.check_invariants().is_ok());
    }

    #[test]
    fn test_apply_config_rejects_inverted_band() {
        let mut pool = pool(Utc::now());
        let before = pool.clone();
        let update = PoolConfigUpdate {
            min_fee_rate: Some(Bps::saturating(200)),
            ..Default::default()
        };
        assert!(pool.apply_config(&update).is_err());
        assert_eq!(pool, before);
    }
}
