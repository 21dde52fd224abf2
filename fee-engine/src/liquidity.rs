//! Liquidity positions

use chrono::{DateTime, Utc};
use ledger_core::{Address, Amount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position identifier
pub type PositionId = Uuid;

/// One account's stake in one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPosition {
    /// Position id
    pub position_id: PositionId,
    /// Owner
    pub user: Address,
    /// Pool address
    pub pool: Address,
    /// Token A principal still attributed to the position
    pub amount_a: Amount,
    /// Token B principal still attributed to the position
    pub amount_b: Amount,
    /// Shares held
    pub liquidity_shares: Amount,
    /// Pool-wide shares at read time
    pub total_liquidity_shares: Amount,
    /// `liquidity_shares / total_liquidity_shares` in percent, at read time
    pub share_percentage: Decimal,
    /// Opened at
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Last mutation
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_updated: DateTime<Utc>,
    /// Lifetime fees credited
    pub accumulated_fees: Amount,
    /// Fees credited but not yet claimed
    pub unclaimed_rewards: Amount,
}

impl LiquidityPosition {
    pub(crate) fn open(user: Address, pool: Address, now: DateTime<Utc>) -> Self {
        Self {
            position_id: ledger_core::new_record_id(),
            user,
            pool,
            amount_a: Amount::ZERO,
            amount_b: Amount::ZERO,
            liquidity_shares: Amount::ZERO,
            total_liquidity_shares: Amount::ZERO,
            share_percentage: Decimal::ZERO,
            created_at: now,
            last_updated: now,
            accumulated_fees: Amount::ZERO,
            unclaimed_rewards: Amount::ZERO,
        }
    }

    /// Copy with the derived share fields filled in for `total_shares`
    pub fn with_share(&self, total_shares: Amount) -> Self {
        let mut view = self.clone();
        view.total_liquidity_shares = total_shares;
        view.share_percentage = self
            .liquidity_shares
            .ratio_of(total_shares)
            .checked_mul(Decimal::ONE_HUNDRED)
            .map_or(Decimal::MAX, |pct| pct.round_dp(6));
        view
    }
}

/// Outcome of a remove-liquidity command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    /// Position drawn from
    pub position_id: PositionId,
    /// Shares burned
    pub shares_burned: Amount,
    /// Token A paid out
    pub amount_a: Amount,
    /// Token B paid out
    pub amount_b: Amount,
    /// Unclaimed rewards paid out because the position closed
    pub rewards_paid: Amount,
    /// Position was destroyed
    pub position_closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_percentage() {
        let mut position =
            LiquidityPosition::open(Address::from_seed(1), Address::from_seed(2), Utc::now());
        position.liquidity_shares = Amount::new(250);

        let view = position.with_share(Amount::new(1000));
        assert_eq!(view.share_percentage, Decimal::from(25));
        assert_eq!(view.total_liquidity_shares, Amount::new(1000));

        assert_eq!(position.with_share(Amount::ZERO).share_percentage, Decimal::ZERO);
    }
}
