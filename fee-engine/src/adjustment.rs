//! Fee adjustment from market signals
//!
//! Each signal is compared with its threshold in [`FeeAdjustmentParams`]:
//!
//! | signal     | raises fee (`+δ`)        | lowers fee (`-δ`)                |
//! |------------|--------------------------|----------------------------------|
//! | volume     | `>= threshold`           | `<= threshold * band`            |
//! | volatility | `>= threshold`           | `<= threshold * band`            |
//! | liquidity  | `< threshold`            | `>= threshold / band`            |
//!
//! with `δ = step * adjustment_factor`. The aggregate is capped at
//! `max_adjustment_percent` of the current rate, rounded half away from
//! zero to whole basis points, and clamped into `[min, max]`.
//!
//! A zero threshold disables its signal.

use crate::pool::{FeeAdjustmentParams, Pool};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{new_record_id, Address, Amount, Bps};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Why a fee rate changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeAdjustmentReason {
    /// Volume at or above threshold
    VolumeIncrease,
    /// Volume in the lower band
    VolumeDecrease,
    /// Volatility at or above threshold
    HighVolatility,
    /// Volatility in the lower band
    LowVolatility,
    /// Liquidity well above threshold
    LiquidityIncrease,
    /// Liquidity below threshold
    LiquidityDecrease,
    /// Executed governance proposal
    GovernanceVote,
    /// Guardian emergency action
    EmergencyAdjustment,
    /// Operator adjustment
    ManualAdjustment,
}

impl FeeAdjustmentReason {
    /// Stable label used in metrics and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeAdjustmentReason::VolumeIncrease => "VOLUME_INCREASE",
            FeeAdjustmentReason::VolumeDecrease => "VOLUME_DECREASE",
            FeeAdjustmentReason::HighVolatility => "HIGH_VOLATILITY",
            FeeAdjustmentReason::LowVolatility => "LOW_VOLATILITY",
            FeeAdjustmentReason::LiquidityIncrease => "LIQUIDITY_INCREASE",
            FeeAdjustmentReason::LiquidityDecrease => "LIQUIDITY_DECREASE",
            FeeAdjustmentReason::GovernanceVote => "GOVERNANCE_VOTE",
            FeeAdjustmentReason::EmergencyAdjustment => "EMERGENCY_ADJUSTMENT",
            FeeAdjustmentReason::ManualAdjustment => "MANUAL_ADJUSTMENT",
        }
    }

    /// Signal-driven, as opposed to directed
    pub fn is_automatic(&self) -> bool {
        !matches!(
            self,
            FeeAdjustmentReason::GovernanceVote
                | FeeAdjustmentReason::EmergencyAdjustment
                | FeeAdjustmentReason::ManualAdjustment
        )
    }
}

/// Market telemetry for one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSignals {
    /// Trailing 24h volume
    pub volume_24h: Amount,
    /// Volatility estimate in percent
    pub volatility: Decimal,
    /// Current liquidity
    pub liquidity: Amount,
    /// Price change in percent (may be negative)
    pub price_change: Decimal,
}

impl MarketSignals {
    /// Reject negative volatility
    pub fn validate(&self) -> Result<()> {
        if self.volatility.is_sign_negative() && !self.volatility.is_zero() {
            return Err(Error::InvalidSignal(format!(
                "volatility {} is negative",
                self.volatility
            )));
        }
        Ok(())
    }
}

/// Signals that were in effect when a record was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSnapshot {
    /// Volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Amount>,
    /// Volatility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Decimal>,
    /// Liquidity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<Amount>,
    /// Price change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change: Option<Decimal>,
}

impl From<&MarketSignals> for TriggerSnapshot {
    fn from(s: &MarketSignals) -> Self {
        Self {
            volume: Some(s.volume_24h),
            volatility: Some(s.volatility),
            liquidity: Some(s.liquidity),
            price_change: Some(s.price_change),
        }
    }
}

/// Immutable record of one fee change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAdjustmentRecord {
    /// Record id
    pub adjustment_id: Uuid,
    /// Pool address
    pub pool: Address,
    /// Rate before
    pub previous_fee_rate: Bps,
    /// Rate after
    pub new_fee_rate: Bps,
    /// Attributed reason
    pub reason: FeeAdjustmentReason,
    /// Signals at evaluation time
    pub trigger_params: TriggerSnapshot,
    /// When the change took effect
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Who caused it
    pub adjuster: Address,
    /// Signal-driven
    pub is_automatic: bool,
}

/// A breached threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breach {
    /// Reason attributed if this is the first breach moving with the net change
    pub reason: FeeAdjustmentReason,
    /// `+1` raises the fee, `-1` lowers it
    pub direction: i8,
}

/// Breached thresholds in priority order (volume, volatility, liquidity)
pub fn detect_breaches(params: &FeeAdjustmentParams, signals: &MarketSignals) -> Vec<Breach> {
    let band = params.lower_band_percent.as_fraction();
    let mut breaches = Vec::with_capacity(3);

    if !params.volume_threshold.is_zero() {
        let lower = params.volume_threshold.mul_fraction(band).unwrap_or(Amount::ZERO);
        if signals.volume_24h >= params.volume_threshold {
            breaches.push(Breach { reason: FeeAdjustmentReason::VolumeIncrease, direction: 1 });
        } else if signals.volume_24h <= lower {
            breaches.push(Breach { reason: FeeAdjustmentReason::VolumeDecrease, direction: -1 });
        }
    }

    if !params.volatility_threshold.is_zero() {
        let lower = params.volatility_threshold * band;
        if signals.volatility >= params.volatility_threshold {
            breaches.push(Breach { reason: FeeAdjustmentReason::HighVolatility, direction: 1 });
        } else if signals.volatility <= lower {
            breaches.push(Breach { reason: FeeAdjustmentReason::LowVolatility, direction: -1 });
        }
    }

    if !params.liquidity_threshold.is_zero() {
        let upper = divide_by_fraction(params.liquidity_threshold, band);
        if signals.liquidity < params.liquidity_threshold {
            breaches.push(Breach { reason: FeeAdjustmentReason::LiquidityDecrease, direction: 1 });
        } else if signals.liquidity >= upper {
            breaches.push(Breach { reason: FeeAdjustmentReason::LiquidityIncrease, direction: -1 });
        }
    }

    breaches
}

/// `amount / fraction`, saturating at `Amount::MAX`
fn divide_by_fraction(amount: Amount, fraction: Decimal) -> Amount {
    let mantissa = fraction.mantissa().unsigned_abs();
    let scale = 10u128.pow(fraction.scale());
    amount.checked_mul_div(scale, mantissa).unwrap_or(Amount::MAX)
}

/// Signed whole-bp delta for a set of breaches before clamping
pub fn aggregate_delta(pool: &Pool, breaches: &[Breach]) -> Result<i64> {
    let overflow = || Error::InvalidConfig(format!("fee delta overflow for pool {}", pool.address));
    let params = &pool.adjustment_params;

    let delta = Decimal::from(pool.fees.step.get())
        .checked_mul(params.adjustment_factor)
        .ok_or_else(overflow)?;
    let raw = breaches.iter().try_fold(Decimal::ZERO, |acc, b| {
        delta
            .checked_mul(Decimal::from(b.direction))
            .and_then(|d| acc.checked_add(d))
            .ok_or_else(overflow)
    })?;

    // Cap relative to the current rate; a zero rate uses one step as its base
    let base = pool.fees.current_fee_rate.get().max(pool.fees.step.get());
    let cap = Decimal::from(base)
        .checked_mul(params.max_adjustment_percent.as_fraction())
        .ok_or_else(overflow)?;
    let capped = raw.max(-cap).min(cap);

    capped
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(overflow)
}

/// First breach, in priority order, pushing the same way as the net delta
fn attribute(breaches: &[Breach], delta: i64) -> Option<FeeAdjustmentReason> {
    let sign = delta.signum();
    breaches
        .iter()
        .find(|b| i64::from(b.direction).signum() == sign)
        .or(breaches.first())
        .map(|b| b.reason)
}

/// Evaluate market signals against a pool and apply the resulting change.
///
/// Returns `Ok(None)` without touching the pool when dynamic fees are
/// disabled, the cooldown is active, no threshold is breached, or the
/// clamped rate equals the current one.
pub fn evaluate(
    pool: &mut Pool,
    signals: &MarketSignals,
    now: DateTime<Utc>,
    adjuster: &Address,
) -> Result<Option<FeeAdjustmentRecord>> {
    signals.validate()?;

    if !pool.dynamic_fee_enabled {
        return Ok(None);
    }
    if let Some(remaining) = pool.fees.cooldown_remaining(now) {
        debug!(pool = %pool.address, remaining, "Fee evaluation inside cooldown");
        return Ok(None);
    }

    let breaches = detect_breaches(&pool.adjustment_params, signals);
    if breaches.is_empty() {
        return Ok(None);
    }

    let delta = aggregate_delta(pool, &breaches)?;
    let previous = pool.fees.current_fee_rate;
    let new_rate = previous
        .offset(delta)
        .clamp_to(pool.fees.min_fee_rate, pool.fees.max_fee_rate);

    if new_rate == previous {
        return Ok(None);
    }
    let Some(reason) = attribute(&breaches, delta) else {
        return Ok(None);
    };

    Ok(Some(commit(
        pool,
        new_rate,
        reason,
        TriggerSnapshot::from(signals),
        now,
        adjuster,
    )))
}

/// Non-signal adjustment source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectedAdjustment {
    /// Executed fee-adjustment proposal
    Governance,
    /// Emergency proposal or guardian action; bypasses cooldown
    Emergency,
    /// Operator adjustment
    Manual,
}

impl DirectedAdjustment {
    /// Reason recorded for this source
    pub fn reason(&self) -> FeeAdjustmentReason {
        match self {
            DirectedAdjustment::Governance => FeeAdjustmentReason::GovernanceVote,
            DirectedAdjustment::Emergency => FeeAdjustmentReason::EmergencyAdjustment,
            DirectedAdjustment::Manual => FeeAdjustmentReason::ManualAdjustment,
        }
    }
}

/// Move a pool's fee toward `target`, clamped into its band.
///
/// Enforces the cooldown unless `source` is [`DirectedAdjustment::Emergency`].
/// Returns `Ok(None)` when the clamped target equals the current rate.
pub fn apply_directed(
    pool: &mut Pool,
    target: Bps,
    source: DirectedAdjustment,
    now: DateTime<Utc>,
    adjuster: &Address,
) -> Result<Option<FeeAdjustmentRecord>> {
    if source != DirectedAdjustment::Emergency {
        if let Some(remaining_secs) = pool.fees.cooldown_remaining(now) {
            return Err(Error::CooldownActive { remaining_secs });
        }
    }

    let previous = pool.fees.current_fee_rate;
    let new_rate = target.clamp_to(pool.fees.min_fee_rate, pool.fees.max_fee_rate);
    if new_rate == previous {
        return Ok(None);
    }

    Ok(Some(commit(
        pool,
        new_rate,
        source.reason(),
        TriggerSnapshot::default(),
        now,
        adjuster,
    )))
}

fn commit(
    pool: &mut Pool,
    new_rate: Bps,
    reason: FeeAdjustmentReason,
    trigger_params: TriggerSnapshot,
    now: DateTime<Utc>,
    adjuster: &Address,
) -> FeeAdjustmentRecord {
    let previous = pool.fees.current_fee_rate;
    pool.fees.current_fee_rate = new_rate;
    pool.fees.last_adjustment_at = Some(now);

    debug!(
        pool = %pool.address,
        from = previous.get(),
        to = new_rate.get(),
        reason = reason.as_str(),
        "Fee rate adjusted"
    );

    FeeAdjustmentRecord {
        adjustment_id: new_record_id(),
        pool: pool.address.clone(),
        previous_fee_rate: previous,
        new_fee_rate: new_rate,
        reason,
        trigger_params,
        timestamp: now,
        adjuster: adjuster.clone(),
        is_automatic: reason.is_automatic(),
    }
}
