//! Pool registry: pools, fee history and liquidity positions
//!
//! Single owner of every [`Pool`] and [`LiquidityPosition`]. All checks for
//! a mutation run before the first write, so a rejected command leaves the
//! registry untouched.

use crate::adjustment::{self, DirectedAdjustment, FeeAdjustmentRecord, MarketSignals};
use crate::analytics::AnalyticsAggregator;
use crate::liquidity::{LiquidityPosition, PositionId, Withdrawal};
use crate::pool::{Pool, PoolConfigUpdate, PoolCreationParams};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount, Bps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Pool list sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolSortBy {
    /// Latest observed liquidity
    Liquidity,
    /// Trailing 24h volume
    Volume,
    /// Current fee rate
    FeeRate,
    /// Registration time
    #[default]
    CreatedAt,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    #[default]
    Desc,
}

/// Pool list filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolFilter {
    /// Either token's symbol, case-insensitive
    pub token_symbol: Option<String>,
    /// Minimum liquidity
    pub min_liquidity: Option<Amount>,
    /// Maximum liquidity
    pub max_liquidity: Option<Amount>,
    /// Minimum current fee
    pub min_fee_rate: Option<Bps>,
    /// Maximum current fee
    pub max_fee_rate: Option<Bps>,
    /// Dynamic fee flag
    pub is_dynamic_fee_enabled: Option<bool>,
    /// Sort key
    pub sort_by: PoolSortBy,
    /// Sort direction
    pub sort_order: SortOrder,
    /// Page size (default 20)
    pub page_size: Option<usize>,
    /// 1-based page (default 1)
    pub page: Option<usize>,
}

/// Default page size for listings
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Owner of pools, fee history and positions
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: BTreeMap<Address, Pool>,
    history: Vec<FeeAdjustmentRecord>,
    positions: BTreeMap<PositionId, LiquidityPosition>,
}

impl PoolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool
    pub fn create_pool(
        &mut self,
        params: PoolCreationParams,
        creator: Address,
        now: DateTime<Utc>,
    ) -> Result<&Pool> {
        let pool = Pool::from_params(params, creator, now)?;
        if self.pools.contains_key(&pool.address) {
            return Err(Error::PoolExists(format!(
                "{}/{} at {}",
                pool.token_a.symbol, pool.token_b.symbol, pool.address
            )));
        }

        info!(
            pool = %pool.address,
            pair = %format!("{}/{}", pool.token_a.symbol, pool.token_b.symbol),
            fee = pool.fee_rate().get(),
            "Pool created"
        );

        let address = pool.address.clone();
        Ok(&*self.pools.entry(address).or_insert(pool))
    }

    /// Look up a pool
    pub fn get(&self, address: &Address) -> Result<&Pool> {
        self.pools
            .get(address)
            .ok_or_else(|| Error::PoolNotFound(address.to_string()))
    }

    fn get_mut(&mut self, address: &Address) -> Result<&mut Pool> {
        self.pools
            .get_mut(address)
            .ok_or_else(|| Error::PoolNotFound(address.to_string()))
    }

    /// All pools in address order
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    /// Number of pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// No pools registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Filter, sort and page pools. Returns the page and the total match count.
    pub fn list(
        &self,
        filter: &PoolFilter,
        analytics: &AnalyticsAggregator,
        now: DateTime<Utc>,
    ) -> (Vec<Pool>, usize) {
        let symbol = filter.token_symbol.as_ref().map(|s| s.to_ascii_lowercase());

        let mut matches: Vec<(&Pool, Amount, Amount)> = self
            .pools
            .values()
            .map(|p| {
                let liquidity = analytics.liquidity(&p.address, now);
                (p, liquidity, analytics.volume_24h(&p.address, now))
            })
            .filter(|(p, liquidity, _)| {
                symbol.as_ref().map_or(true, |s| {
                    p.token_a.symbol.to_ascii_lowercase() == *s
                        || p.token_b.symbol.to_ascii_lowercase() == *s
                }) && filter.min_liquidity.map_or(true, |m| *liquidity >= m)
                    && filter.max_liquidity.map_or(true, |m| *liquidity <= m)
                    && filter.min_fee_rate.map_or(true, |m| p.fee_rate() >= m)
                    && filter.max_fee_rate.map_or(true, |m| p.fee_rate() <= m)
                    && filter
                        .is_dynamic_fee_enabled
                        .map_or(true, |d| p.dynamic_fee_enabled == d)
            })
            .collect();

        matches.sort_by(|a, b| {
            let ord = match filter.sort_by {
                PoolSortBy::Liquidity => a.1.cmp(&b.1),
                PoolSortBy::Volume => a.2.cmp(&b.2),
                PoolSortBy::FeeRate => a.0.fee_rate().cmp(&b.0.fee_rate()),
                PoolSortBy::CreatedAt => a.0.created_at.cmp(&b.0.created_at),
            }
            .then_with(|| a.0.address.cmp(&b.0.address));
            match filter.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matches.len();
        let page_size = filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let page = filter.page.unwrap_or(1).max(1);
        let items = matches
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(|(p, _, _)| p.clone())
            .collect();

        (items, total)
    }

    /// Run automatic fee evaluation for a pool
    pub fn evaluate_fee(
        &mut self,
        address: &Address,
        signals: &MarketSignals,
        now: DateTime<Utc>,
        adjuster: &Address,
    ) -> Result<Option<FeeAdjustmentRecord>> {
        let pool = self.get_mut(address)?;
        let record = adjustment::evaluate(pool, signals, now, adjuster)?;
        pool.check_invariants()?;
        Ok(self.append(record))
    }

    /// Directed (governance, emergency or manual) fee change
    pub fn adjust_fee(
        &mut self,
        address: &Address,
        target: Bps,
        source: DirectedAdjustment,
        now: DateTime<Utc>,
        adjuster: &Address,
    ) -> Result<Option<FeeAdjustmentRecord>> {
        let pool = self.get_mut(address)?;
        let record = adjustment::apply_directed(pool, target, source, now, adjuster)?;
        pool.check_invariants()?;
        Ok(self.append(record))
    }

    fn append(&mut self, record: Option<FeeAdjustmentRecord>) -> Option<FeeAdjustmentRecord> {
        if let Some(record) = &record {
            self.history.push(record.clone());
        }
        record
    }

    /// Reconfigure a pool
    pub fn update_config(&mut self, address: &Address, update: &PoolConfigUpdate) -> Result<&Pool> {
        let pool = self.get_mut(address)?;
        pool.apply_config(update)?;
        info!(pool = %address, fee = pool.fee_rate().get(), "Pool reconfigured");
        Ok(&*pool)
    }

    /// Fee adjustment history of a pool, oldest first
    pub fn history(&self, address: &Address) -> impl Iterator<Item = &FeeAdjustmentRecord> {
        let address = address.clone();
        self.history.iter().filter(move |r| r.pool == address)
    }

    /// Deposit into a pool. One position per (user, pool); later deposits
    /// top up the existing position.
    pub fn add_liquidity(
        &mut self,
        user: &Address,
        address: &Address,
        amount_a: Amount,
        amount_b: Amount,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPosition> {
        let pool = self.get(address)?;
        if amount_a.is_zero() || amount_b.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "both token amounts must be positive".to_string(),
            )
            .into());
        }

        let minted = if pool.total_shares.is_zero() {
            amount_a.geometric_mean(amount_b)
        } else {
            let by_a = amount_a.checked_mul_div(pool.total_shares.raw(), pool.reserve_a.raw())?;
            let by_b = amount_b.checked_mul_div(pool.total_shares.raw(), pool.reserve_b.raw())?;
            by_a.min(by_b)
        };
        if minted.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "deposit too small to mint shares".to_string(),
            )
            .into());
        }

        let reserve_a = pool.reserve_a.checked_add(amount_a)?;
        let reserve_b = pool.reserve_b.checked_add(amount_b)?;
        let total_shares = pool.total_shares.checked_add(minted)?;

        let existing = self
            .positions
            .values()
            .find(|p| p.user == *user && p.pool == *address)
            .map(|p| p.position_id);
        let mut position = match existing {
            Some(id) => self
                .positions
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::PositionNotFound(id.to_string()))?,
            None => LiquidityPosition::open(user.clone(), address.clone(), now),
        };
        position.amount_a = position.amount_a.checked_add(amount_a)?;
        position.amount_b = position.amount_b.checked_add(amount_b)?;
        position.liquidity_shares = position.liquidity_shares.checked_add(minted)?;
        position.last_updated = now;

        // All checks passed
        let pool = self.get_mut(address)?;
        pool.reserve_a = reserve_a;
        pool.reserve_b = reserve_b;
        pool.total_shares = total_shares;
        self.positions.insert(position.position_id, position.clone());

        debug!(pool = %address, user = %user.short(), shares = %minted, "Liquidity added");
        Ok(position.with_share(total_shares))
    }

    /// Burn `shares` from a position and pay out the pro-rata reserves.
    /// A position that reaches zero shares is destroyed and its unclaimed
    /// rewards are paid out with it.
    pub fn remove_liquidity(
        &mut self,
        user: &Address,
        position_id: PositionId,
        shares: Amount,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal> {
        let position = self.owned_position(user, position_id)?.clone();
        if shares.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "shares must be positive".to_string(),
            )
            .into());
        }
        if shares > position.liquidity_shares {
            return Err(Error::InsufficientShares {
                requested: shares.to_string(),
                held: position.liquidity_shares.to_string(),
            });
        }

        let pool = self.get(&position.pool)?;
        let total = pool.total_shares.raw();
        let out_a = pool.reserve_a.checked_mul_div(shares.raw(), total)?;
        let out_b = pool.reserve_b.checked_mul_div(shares.raw(), total)?;
        let reserve_a = pool.reserve_a.checked_sub(out_a)?;
        let reserve_b = pool.reserve_b.checked_sub(out_b)?;
        let total_shares = pool.total_shares.checked_sub(shares)?;

        let held = position.liquidity_shares.raw();
        let principal_a = position.amount_a.checked_mul_div(shares.raw(), held)?;
        let principal_b = position.amount_b.checked_mul_div(shares.raw(), held)?;
        let remaining = position.liquidity_shares.checked_sub(shares)?;
        let closed = remaining.is_zero();

        // All checks passed
        let pool = self.get_mut(&position.pool)?;
        pool.reserve_a = reserve_a;
        pool.reserve_b = reserve_b;
        pool.total_shares = total_shares;

        let rewards_paid = if closed {
            self.positions.remove(&position_id);
            position.unclaimed_rewards
        } else {
            if let Some(p) = self.positions.get_mut(&position_id) {
                p.liquidity_shares = remaining;
                p.amount_a = p.amount_a.saturating_sub(principal_a);
                p.amount_b = p.amount_b.saturating_sub(principal_b);
                p.last_updated = now;
            }
            Amount::ZERO
        };

        debug!(position = %position_id, shares = %shares, closed, "Liquidity removed");

        Ok(Withdrawal {
            position_id,
            shares_burned: shares,
            amount_a: out_a,
            amount_b: out_b,
            rewards_paid,
            position_closed: closed,
        })
    }

    /// Credit `fees` to a pool's positions pro rata by shares.
    /// Returns the amount actually credited; rounding dust is not credited.
    pub fn accrue_fees(
        &mut self,
        address: &Address,
        fees: Amount,
        now: DateTime<Utc>,
    ) -> Result<Amount> {
        let total = self.get(address)?.total_shares;
        if total.is_zero() || fees.is_zero() {
            return Ok(Amount::ZERO);
        }

        let mut credits = Vec::new();
        for position in self.positions.values().filter(|p| p.pool == *address) {
            let credit = fees.checked_mul_div(position.liquidity_shares.raw(), total.raw())?;
            credits.push((
                position.position_id,
                position.accumulated_fees.checked_add(credit)?,
                position.unclaimed_rewards.checked_add(credit)?,
                credit,
            ));
        }

        let mut credited = Amount::ZERO;
        for (id, accumulated, unclaimed, credit) in credits {
            if let Some(p) = self.positions.get_mut(&id) {
                p.accumulated_fees = accumulated;
                p.unclaimed_rewards = unclaimed;
                p.last_updated = now;
                credited = credited.checked_add(credit)?;
            }
        }
        Ok(credited)
    }

    /// Pay out a position's unclaimed rewards
    pub fn claim_rewards(
        &mut self,
        user: &Address,
        position_id: PositionId,
        now: DateTime<Utc>,
    ) -> Result<Amount> {
        self.owned_position(user, position_id)?;
        let position = self
            .positions
            .get_mut(&position_id)
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;
        let paid = std::mem::replace(&mut position.unclaimed_rewards, Amount::ZERO);
        position.last_updated = now;
        Ok(paid)
    }

    fn owned_position(
        &self,
        user: &Address,
        position_id: PositionId,
    ) -> Result<&LiquidityPosition> {
        let position = self
            .positions
            .get(&position_id)
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;
        if position.user != *user {
            return Err(Error::NotPositionOwner(position_id.to_string()));
        }
        Ok(position)
    }

    /// One position with derived share fields
    pub fn position(&self, position_id: PositionId) -> Result<LiquidityPosition> {
        let position = self
            .positions
            .get(&position_id)
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;
        let total = self.get(&position.pool)?.total_shares;
        Ok(position.with_share(total))
    }

    /// Positions filtered by owner and/or pool, with derived share fields
    pub fn positions(
        &self,
        user: Option<&Address>,
        pool: Option<&Address>,
    ) -> Vec<LiquidityPosition> {
        self.positions
            .values()
            .filter(|p| user.map_or(true, |u| p.user == *u) && pool.map_or(true, |a| p.pool == *a))
            .map(|p| {
                let total = self
                    .pools
                    .get(&p.pool)
                    .map(|pool| pool.total_shares)
                    .unwrap_or(Amount::ZERO);
                p.with_share(total)
            })
            .collect()
    }

    /// Verify fee bands and share accounting for every pool
    pub fn check_invariants(&self) -> Result<()> {
        for pool in self.pools.values() {
            pool.check_invariants()?;
            let held: Amount = self
                .positions
                .values()
                .filter(|p| p.pool == pool.address)
                .map(|p| p.liquidity_shares)
                .sum();
            if held != pool.total_shares {
                return Err(Error::Corrupted(format!(
                    "pool {} has {} shares outstanding but positions hold {}",
                    pool.address, pool.total_shares, held
                )));
            }
        }
        Ok(())
    }
}
