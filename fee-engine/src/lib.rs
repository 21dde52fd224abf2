//! Fee Engine
//!
//! Dynamic-fee liquidity pools: market-signal driven fee adjustment,
//! liquidity positions, and rolling pool analytics.
//!
//! # Invariants
//!
//! - `min_fee_rate <= current_fee_rate <= max_fee_rate <= 10000bp` for every pool
//! - At most one automatic adjustment per cooldown window
//! - Fee adjustment history is append-only
//! - `Σ position shares == pool.total_shares`

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod adjustment;
pub mod analytics;
pub mod error;
pub mod liquidity;
pub mod pool;
pub mod registry;

pub use adjustment::{
    apply_directed, evaluate, DirectedAdjustment, FeeAdjustmentReason, FeeAdjustmentRecord,
    MarketSignals, TriggerSnapshot,
};
pub use analytics::{
    AnalyticsAggregator, AnalyticsPeriod, GlobalStats, HistoryRecord, MarketSample, MetricKind,
    MetricSeries, MetricSet, PoolAnalytics, PoolMetrics, RiskScore,
};
pub use error::{Error, Result};
pub use liquidity::{LiquidityPosition, PositionId, Withdrawal};
pub use pool::{
    FeeAdjustmentParams, FeeParameters, Pool, PoolConfigUpdate, PoolCreationParams, TokenInfo,
    MAX_ADJUSTMENT_FACTOR,
};
pub use registry::{PoolFilter, PoolRegistry, PoolSortBy, SortOrder, DEFAULT_PAGE_SIZE};
