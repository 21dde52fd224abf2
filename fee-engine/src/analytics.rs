//! Rolling pool analytics
//!
//! Time-ordered market samples and fee-rate points per pool, pruned to a
//! retention window. Everything here is a read model: the aggregator never
//! mutates pools.

use crate::adjustment::MarketSignals;
use crate::pool::Pool;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use ledger_core::{Address, Amount, Bps};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One market observation for a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSample {
    /// Observation time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Volume traded since the previous sample
    pub volume: Amount,
    /// Trades since the previous sample
    pub trades: u32,
    /// Liquidity at observation time
    pub liquidity: Amount,
    /// Price of token A in token B
    pub price: Decimal,
    /// Fee revenue since the previous sample
    pub fee_revenue: Amount,
    /// Volatility estimate in percent
    pub volatility: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct FeePoint {
    at: DateTime<Utc>,
    rate: Bps,
}

#[derive(Debug, Default)]
struct PoolSeries {
    samples: VecDeque<MarketSample>,
    fee_rates: VecDeque<FeePoint>,
    lp_rewards: Amount,
}

impl PoolSeries {
    fn sample_at(&self, t: DateTime<Utc>) -> Option<&MarketSample> {
        self.samples.iter().rev().find(|s| s.timestamp <= t)
    }

    fn rate_at(&self, t: DateTime<Utc>) -> Option<Bps> {
        self.fee_rates.iter().rev().find(|p| p.at <= t).map(|p| p.rate)
    }

    fn window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &MarketSample> {
        self.samples
            .iter()
            .filter(move |s| s.timestamp > from && s.timestamp <= to)
    }

    fn volume(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Amount {
        self.window(from, to).map(|s| s.volume).sum()
    }

    fn fee_revenue(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Amount {
        self.window(from, to).map(|s| s.fee_revenue).sum()
    }

    fn trades(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        self.window(from, to).fold(0u32, |acc, s| acc.saturating_add(s.trades))
    }

    /// Time-weighted mean fee rate over `[from, to]`
    fn average_rate(&self, from: DateTime<Utc>, to: DateTime<Utc>, fallback: Bps) -> Decimal {
        let Some(first) = self.fee_rates.front() else {
            return Decimal::from(fallback.get());
        };
        let start = from.max(first.at);
        if start >= to {
            return Decimal::from(self.rate_at(to).unwrap_or(fallback).get());
        }

        let span = Decimal::from((to - start).num_milliseconds());
        if span.is_zero() {
            return Decimal::from(self.rate_at(to).unwrap_or(fallback).get());
        }

        let mut rate = self.rate_at(start).unwrap_or(first.rate);
        let mut cursor = start;
        let mut weighted = Decimal::ZERO;
        for point in self.fee_rates.iter().filter(|p| p.at > start && p.at <= to) {
            let held = Decimal::from((point.at - cursor).num_milliseconds());
            weighted += Decimal::from(rate.get()) * held;
            rate = point.rate;
            cursor = point.at;
        }
        weighted += Decimal::from(rate.get()) * Decimal::from((to - cursor).num_milliseconds());

        (weighted / span).round_dp(2)
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
        // Keep the rate in effect at the cutoff
        while self.fee_rates.len() > 1 && self.fee_rates[1].at <= cutoff {
            self.fee_rates.pop_front();
        }
    }
}

/// Current headline figures for a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    /// Trailing 24h volume
    pub volume_24h: Amount,
    /// Trailing 24h trade count
    pub transactions_24h: u32,
    /// Latest observed liquidity
    pub current_liquidity: Amount,
    /// Time-weighted 7d fee rate, bp
    pub avg_fee_rate_7d: Decimal,
    /// Time-weighted 30d fee rate, bp
    pub avg_fee_rate_30d: Decimal,
    /// Latest observed price
    pub current_price: Decimal,
    /// Price change over 24h, percent
    pub price_change_24h: Decimal,
    /// Price change over 7d, percent
    pub price_change_7d: Decimal,
    /// Price change over 30d, percent
    pub price_change_30d: Decimal,
    /// Lifetime fees credited to liquidity providers
    #[serde(rename = "totalLPRewards")]
    pub total_lp_rewards: Amount,
    /// Trailing 24h fee revenue
    pub fee_revenue: Amount,
}

/// Analytics window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalyticsPeriod {
    /// One day
    #[serde(rename = "1d")]
    OneDay,
    /// Seven days
    #[serde(rename = "7d")]
    SevenDays,
    /// Thirty days
    #[serde(rename = "30d")]
    ThirtyDays,
    /// Ninety days
    #[serde(rename = "90d")]
    NinetyDays,
}

impl AnalyticsPeriod {
    /// Window length
    pub fn duration(&self) -> Duration {
        match self {
            AnalyticsPeriod::OneDay => Duration::days(1),
            AnalyticsPeriod::SevenDays => Duration::days(7),
            AnalyticsPeriod::ThirtyDays => Duration::days(30),
            AnalyticsPeriod::NinetyDays => Duration::days(90),
        }
    }
}

/// Series selectable in [`PoolAnalytics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    /// Liquidity
    Liquidity,
    /// Volume
    Volume,
    /// Fee rate
    FeeRate,
    /// Price
    Price,
}

impl MetricKind {
    /// Every series
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Liquidity,
        MetricKind::Volume,
        MetricKind::FeeRate,
        MetricKind::Price,
    ];
}

/// One point of a history series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Point time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Value
    pub value: Decimal,
}

/// Current value, changes and history of one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    /// Value now
    pub current: Decimal,
    /// Change over 24h, percent
    pub change_24h: Decimal,
    /// Change over 7d, percent
    pub change_7d: Decimal,
    /// Points inside the period
    pub history: Vec<HistoryRecord>,
}

/// Selected series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSet {
    /// Liquidity series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<MetricSeries>,
    /// Volume series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<MetricSeries>,
    /// Fee-rate series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<MetricSeries>,
    /// Price series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<MetricSeries>,
}

/// Risk score (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(u8);

impl RiskScore {
    /// Create new risk score (0-100)
    pub fn new(score: u8) -> Self {
        Self(score.min(100))
    }

    /// Get raw score
    pub fn score(&self) -> u8 {
        self.0
    }

    /// Check if high risk (>= 75)
    pub fn is_high_risk(&self) -> bool {
        self.0 >= 75
    }

    /// Check if low risk (< 50)
    pub fn is_low_risk(&self) -> bool {
        self.0 < 50
    }
}

/// Period analytics for one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAnalytics {
    /// Pool address
    pub pool_address: Address,
    /// Window
    pub period: AnalyticsPeriod,
    /// Selected series
    pub metrics: MetricSet,
    /// Composite risk
    pub risk_score: RiskScore,
    /// Operator hints
    pub recommendations: Vec<String>,
}

/// Totals across every pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    /// Registered pools
    pub total_pools: usize,
    /// Pools with liquidity or recent volume
    pub active_pools: usize,
    /// Sum of latest liquidity
    pub total_liquidity: Amount,
    /// Sum of 24h volume
    pub total_volume_24h: Amount,
    /// Sum of 24h fee revenue
    pub total_fees_24h: Amount,
    /// Mean current fee rate, bp
    pub average_fee_rate: Decimal,
    /// Pool with the highest 24h volume
    pub most_active_pool: Option<Address>,
    /// Pool with the highest 24h fee revenue per unit of liquidity
    pub highest_yield_pool: Option<Address>,
    /// Total liquidity change over 24h, percent
    pub liquidity_change_24h: Decimal,
    /// Total volume change against the previous 24h, percent
    pub volume_change_24h: Decimal,
    /// Mean fee rate change over 24h, percent
    pub fee_rate_change_24h: Decimal,
}

/// Percent change from `before` to `now`, zero when `before` is zero
fn change_pct(now: Decimal, before: Decimal) -> Decimal {
    if before.is_zero() {
        return Decimal::ZERO;
    }
    now.checked_sub(before)
        .and_then(|d| d.checked_div(before))
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::MAX, |pct| pct.round_dp(4))
}

fn amount_change_pct(now: Amount, before: Amount) -> Decimal {
    if before.is_zero() {
        return Decimal::ZERO;
    }
    (now.ratio_of(before) - Decimal::ONE)
        .checked_mul(Decimal::ONE_HUNDRED)
        .map_or(Decimal::MAX, |pct| pct.round_dp(4))
}

fn to_dec(amount: Amount) -> Decimal {
    amount.to_decimal(0).unwrap_or(Decimal::MAX)
}

/// Per-pool rolling series
#[derive(Debug)]
pub struct AnalyticsAggregator {
    retention: Duration,
    series: HashMap<Address, PoolSeries>,
}

impl AnalyticsAggregator {
    /// Create with a retention window
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            series: HashMap::new(),
        }
    }

    /// Append a market sample. Samples must arrive in time order.
    pub fn record_sample(&mut self, pool: &Address, sample: MarketSample) -> Result<()> {
        if sample.volatility.is_sign_negative() && !sample.volatility.is_zero() {
            return Err(Error::InvalidSignal(format!(
                "volatility {} is negative",
                sample.volatility
            )));
        }
        if sample.price.is_sign_negative() {
            return Err(Error::InvalidSignal(format!("price {} is negative", sample.price)));
        }

        let series = self.series.entry(pool.clone()).or_default();
        if let Some(last) = series.samples.back() {
            if sample.timestamp < last.timestamp {
                return Err(Error::InvalidSignal(format!(
                    "sample at {} precedes last sample at {}",
                    sample.timestamp, last.timestamp
                )));
            }
        }

        let cutoff = sample.timestamp - self.retention;
        series.samples.push_back(sample);
        series.prune(cutoff);
        Ok(())
    }

    /// Record a fee-rate change (or the initial rate)
    pub fn record_fee_rate(&mut self, pool: &Address, rate: Bps, at: DateTime<Utc>) {
        let series = self.series.entry(pool.clone()).or_default();
        series.fee_rates.push_back(FeePoint { at, rate });
    }

    /// Add fees credited to liquidity providers
    pub fn record_lp_rewards(&mut self, pool: &Address, amount: Amount) {
        let series = self.series.entry(pool.clone()).or_default();
        series.lp_rewards = series.lp_rewards.checked_add(amount).unwrap_or(Amount::MAX);
    }

    /// Drop points older than the retention window
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        for series in self.series.values_mut() {
            series.prune(cutoff);
        }
    }

    /// Trailing 24h volume
    pub fn volume_24h(&self, pool: &Address, now: DateTime<Utc>) -> Amount {
        self.series
            .get(pool)
            .map(|s| s.volume(now - Duration::hours(24), now))
            .unwrap_or(Amount::ZERO)
    }

    /// Latest observed liquidity
    pub fn liquidity(&self, pool: &Address, now: DateTime<Utc>) -> Amount {
        self.series
            .get(pool)
            .and_then(|s| s.sample_at(now))
            .map(|s| s.liquidity)
            .unwrap_or(Amount::ZERO)
    }

    /// Fee-engine input built from the latest sample and trailing volume
    pub fn signals(&self, pool: &Address, now: DateTime<Utc>) -> Option<MarketSignals> {
        let series = self.series.get(pool)?;
        let latest = series.sample_at(now)?;
        let day_ago = series.sample_at(now - Duration::hours(24));

        Some(MarketSignals {
            volume_24h: series.volume(now - Duration::hours(24), now),
            volatility: latest.volatility,
            liquidity: latest.liquidity,
            price_change: day_ago
                .map(|s| change_pct(latest.price, s.price))
                .unwrap_or(Decimal::ZERO),
        })
    }

    /// Headline metrics for a pool
    pub fn pool_metrics(&self, pool: &Pool, now: DateTime<Utc>) -> PoolMetrics {
        let empty = PoolSeries::default();
        let series = self.series.get(&pool.address).unwrap_or(&empty);
        let day = now - Duration::hours(24);
        let current_price = series.sample_at(now).map(|s| s.price).unwrap_or(Decimal::ZERO);
        let price_change = |back: Duration| {
            series
                .sample_at(now - back)
                .map(|s| change_pct(current_price, s.price))
                .unwrap_or(Decimal::ZERO)
        };

        PoolMetrics {
            volume_24h: series.volume(day, now),
            transactions_24h: series.trades(day, now),
            current_liquidity: series.sample_at(now).map(|s| s.liquidity).unwrap_or(Amount::ZERO),
            avg_fee_rate_7d: series.average_rate(now - Duration::days(7), now, pool.fee_rate()),
            avg_fee_rate_30d: series.average_rate(now - Duration::days(30), now, pool.fee_rate()),
            current_price,
            price_change_24h: price_change(Duration::hours(24)),
            price_change_7d: price_change(Duration::days(7)),
            price_change_30d: price_change(Duration::days(30)),
            total_lp_rewards: series.lp_rewards,
            fee_revenue: series.fee_revenue(day, now),
        }
    }

    /// Period analytics with the selected series
    pub fn pool_analytics(
        &self,
        pool: &Pool,
        period: AnalyticsPeriod,
        metrics: &[MetricKind],
        now: DateTime<Utc>,
    ) -> PoolAnalytics {
        let empty = PoolSeries::default();
        let series = self.series.get(&pool.address).unwrap_or(&empty);
        let start = now - period.duration();
        let day = Duration::hours(24);
        let week = Duration::days(7);

        let mut set = MetricSet::default();
        for kind in metrics {
            match kind {
                MetricKind::Liquidity => {
                    let at = |t| series.sample_at(t).map(|s| s.liquidity).unwrap_or(Amount::ZERO);
                    set.liquidity = Some(MetricSeries {
                        current: to_dec(at(now)),
                        change_24h: amount_change_pct(at(now), at(now - day)),
                        change_7d: amount_change_pct(at(now), at(now - week)),
                        history: series
                            .window(start, now)
                            .map(|s| HistoryRecord {
                                timestamp: s.timestamp,
                                value: to_dec(s.liquidity),
                            })
                            .collect(),
                    });
                }
                MetricKind::Volume => {
                    let current = series.volume(now - day, now);
                    set.volume = Some(MetricSeries {
                        current: to_dec(current),
                        change_24h: amount_change_pct(
                            current,
                            series.volume(now - day - day, now - day),
                        ),
                        change_7d: amount_change_pct(
                            current,
                            series.volume(now - week - day, now - week),
                        ),
                        history: series
                            .window(start, now)
                            .map(|s| HistoryRecord {
                                timestamp: s.timestamp,
                                value: to_dec(s.volume),
                            })
                            .collect(),
                    });
                }
                MetricKind::FeeRate => {
                    let current = Decimal::from(pool.fee_rate().get());
                    let at = |t| Decimal::from(series.rate_at(t).unwrap_or(pool.fee_rate()).get());
                    set.fee_rate = Some(MetricSeries {
                        current,
                        change_24h: change_pct(current, at(now - day)),
                        change_7d: change_pct(current, at(now - week)),
                        history: series
                            .fee_rates
                            .iter()
                            .filter(|p| p.at > start && p.at <= now)
                            .map(|p| HistoryRecord {
                                timestamp: p.at,
                                value: Decimal::from(p.rate.get()),
                            })
                            .collect(),
                    });
                }
                MetricKind::Price => {
                    let at = |t| series.sample_at(t).map(|s| s.price).unwrap_or(Decimal::ZERO);
                    set.price = Some(MetricSeries {
                        current: at(now),
                        change_24h: change_pct(at(now), at(now - day)),
                        change_7d: change_pct(at(now), at(now - week)),
                        history: series
                            .window(start, now)
                            .map(|s| HistoryRecord { timestamp: s.timestamp, value: s.price })
                            .collect(),
                    });
                }
            }
        }

        let (risk_score, recommendations) = assess_risk(pool, series, now);

        PoolAnalytics {
            pool_address: pool.address.clone(),
            period,
            metrics: set,
            risk_score,
            recommendations,
        }
    }

    /// Totals across `pools`
    pub fn global_stats<'a>(
        &self,
        pools: impl IntoIterator<Item = &'a Pool>,
        now: DateTime<Utc>,
    ) -> GlobalStats {
        let empty = PoolSeries::default();
        let day = Duration::hours(24);

        let mut stats = GlobalStats {
            total_pools: 0,
            active_pools: 0,
            total_liquidity: Amount::ZERO,
            total_volume_24h: Amount::ZERO,
            total_fees_24h: Amount::ZERO,
            average_fee_rate: Decimal::ZERO,
            most_active_pool: None,
            highest_yield_pool: None,
            liquidity_change_24h: Decimal::ZERO,
            volume_change_24h: Decimal::ZERO,
            fee_rate_change_24h: Decimal::ZERO,
        };

        let mut liquidity_before = Amount::ZERO;
        let mut volume_before = Amount::ZERO;
        let mut rate_sum = Decimal::ZERO;
        let mut rate_sum_before = Decimal::ZERO;
        let mut best_volume = (Amount::ZERO, None);
        let mut best_yield = (Decimal::ZERO, None);

        for pool in pools {
            let series = self.series.get(&pool.address).unwrap_or(&empty);
            let liquidity = series.sample_at(now).map(|s| s.liquidity).unwrap_or(Amount::ZERO);
            let volume = series.volume(now - day, now);
            let fees = series.fee_revenue(now - day, now);

            stats.total_pools += 1;
            if pool.is_active() || !volume.is_zero() {
                stats.active_pools += 1;
            }
            stats.total_liquidity = stats
                .total_liquidity
                .checked_add(liquidity)
                .unwrap_or(Amount::MAX);
            stats.total_volume_24h = stats
                .total_volume_24h
                .checked_add(volume)
                .unwrap_or(Amount::MAX);
            stats.total_fees_24h = stats.total_fees_24h.checked_add(fees).unwrap_or(Amount::MAX);

            liquidity_before = liquidity_before
                .checked_add(
                    series
                        .sample_at(now - day)
                        .map(|s| s.liquidity)
                        .unwrap_or(Amount::ZERO),
                )
                .unwrap_or(Amount::MAX);
            volume_before = volume_before
                .checked_add(series.volume(now - day - day, now - day))
                .unwrap_or(Amount::MAX);

            rate_sum += Decimal::from(pool.fee_rate().get());
            let rate_before = series.rate_at(now - day).unwrap_or(pool.fee_rate());
            rate_sum_before += Decimal::from(rate_before.get());

            if volume > best_volume.0 {
                best_volume = (volume, Some(pool.address.clone()));
            }
            let yield_ratio = fees.ratio_of(liquidity);
            if yield_ratio > best_yield.0 {
                best_yield = (yield_ratio, Some(pool.address.clone()));
            }
        }

        if stats.total_pools > 0 {
            let n = Decimal::from(stats.total_pools as u64);
            stats.average_fee_rate = (rate_sum / n).round_dp(2);
            stats.fee_rate_change_24h = change_pct(rate_sum / n, rate_sum_before / n);
        }
        stats.liquidity_change_24h = amount_change_pct(stats.total_liquidity, liquidity_before);
        stats.volume_change_24h = amount_change_pct(stats.total_volume_24h, volume_before);
        stats.most_active_pool = best_volume.1;
        stats.highest_yield_pool = best_yield.1;
        stats
    }
}

fn assess_risk(pool: &Pool, series: &PoolSeries, now: DateTime<Utc>) -> (RiskScore, Vec<String>) {
    let mut score = 0u32;
    let mut recommendations = Vec::new();
    let params = &pool.adjustment_params;

    if let Some(latest) = series.sample_at(now) {
        if !params.volatility_threshold.is_zero() {
            // Up to 40 points, full at twice the threshold
            let ratio = params
                .volatility_threshold
                .checked_mul(Decimal::TWO)
                .and_then(|full| latest.volatility.checked_div(full))
                .unwrap_or(Decimal::ONE);
            let points = (ratio.min(Decimal::ONE) * Decimal::from(40)).round();
            score += points.to_u32().unwrap_or(0).min(40);
            if latest.volatility >= params.volatility_threshold {
                recommendations
                    .push("Volatility above threshold: consider widening the fee band".to_string());
            }
        }

        if !params.liquidity_threshold.is_zero() && latest.liquidity < params.liquidity_threshold {
            score += 30;
            recommendations
                .push("Liquidity below threshold: incentivize liquidity providers".to_string());
        }

        if let Some(day_ago) = series.sample_at(now - Duration::hours(24)) {
            if change_pct(latest.price, day_ago.price).abs() > Decimal::TEN {
                score += 15;
                recommendations
                    .push("Price moved more than 10% in 24h: monitor impermanent loss".to_string());
            }
        }
    } else {
        recommendations.push("No market data recorded yet".to_string());
    }

    if pool.fees.current_fee_rate == pool.fees.max_fee_rate {
        score += 15;
        recommendations.push("Fee rate pinned at maximum: review max fee rate".to_string());
    } else if pool.fees.current_fee_rate == pool.fees.min_fee_rate && pool.dynamic_fee_enabled {
        recommendations.push("Fee rate pinned at minimum: review min fee rate".to_string());
    }

    (RiskScore::new(score.min(100) as u8), recommendations)
}
