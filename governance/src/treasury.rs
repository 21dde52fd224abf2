//! Treasury ledger
//!
//! Append-only expenditures and revenues over a fixed budget split into
//! category allocations. A spend is capped by its category allocation;
//! emergency spends may overflow into the unallocated remainder. Every
//! non-emergency spend needs an executed treasury-management proposal and
//! may not exceed what that proposal authorized.
//!
//! A treasury loaded with a broken invariant is frozen: reads still work,
//! every mutation fails with [`Error::TreasuryCorrupted`].

use crate::proposal::{Proposal, ProposalId, ProposalStatus, ProposalType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{new_record_id, Address, Amount, Hash32};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Spending category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenditureType {
    /// Protocol development
    Development,
    /// Marketing
    Marketing,
    /// Running costs
    Operations,
    /// Ecosystem grants
    Grants,
    /// Liquidity mining incentives
    LiquidityIncentives,
    /// Emergency response; may overflow its allocation
    Emergency,
}

impl ExpenditureType {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenditureType::Development => "DEVELOPMENT",
            ExpenditureType::Marketing => "MARKETING",
            ExpenditureType::Operations => "OPERATIONS",
            ExpenditureType::Grants => "GRANTS",
            ExpenditureType::LiquidityIncentives => "LIQUIDITY_INCENTIVES",
            ExpenditureType::Emergency => "EMERGENCY",
        }
    }
}

/// Income source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueType {
    /// Swap fees
    TradingFees,
    /// Protocol fee share
    ProtocolFees,
    /// Investment returns
    Investment,
    /// Donations
    Donation,
    /// Anything else
    Other,
}

/// Kind of asset held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Native ether
    #[serde(rename = "ETH")]
    Eth,
    /// ERC-20 token
    #[serde(rename = "ERC20")]
    Erc20,
    /// Pool share token
    #[serde(rename = "LP_TOKEN")]
    LpToken,
}

/// Asset holding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryAsset {
    /// Kind
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    /// Token address
    pub address: Address,
    /// Ticker
    pub symbol: String,
    /// Units held
    pub amount: Amount,
    /// Value in accounting units
    pub value: Amount,
    /// Unit price
    pub price: Decimal,
}

/// Spend request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenditureRequest {
    /// Category
    #[serde(rename = "type")]
    pub expenditure_type: ExpenditureType,
    /// Value spent
    pub amount: Amount,
    /// Asset paid out
    pub asset: Address,
    /// Payee
    pub recipient: Address,
    /// Purpose
    pub reason: String,
    /// Authorizing proposal
    #[serde(default)]
    pub proposal_id: Option<ProposalId>,
}

/// Recorded expenditure; immutable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryExpenditure {
    /// Record id
    pub expenditure_id: Uuid,
    /// Category
    #[serde(rename = "type")]
    pub expenditure_type: ExpenditureType,
    /// Value spent
    pub amount: Amount,
    /// Asset paid out
    pub asset: Address,
    /// Payee
    pub recipient: Address,
    /// Purpose
    pub reason: String,
    /// Authorizing proposal
    pub proposal_id: Option<ProposalId>,
    /// Recorded at
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Recording transaction
    pub tx_hash: Hash32,
}

/// Recorded revenue; immutable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryRevenue {
    /// Record id
    pub revenue_id: Uuid,
    /// Source kind
    #[serde(rename = "type")]
    pub revenue_type: RevenueType,
    /// Value received
    pub amount: Amount,
    /// Asset received
    pub asset: Address,
    /// Payer
    pub source: Address,
    /// Recorded at
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Recording transaction
    pub tx_hash: Hash32,
}

/// Revenue input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueRequest {
    /// Source kind
    #[serde(rename = "type")]
    pub revenue_type: RevenueType,
    /// Value received
    pub amount: Amount,
    /// Asset received
    pub asset: Address,
    /// Payer
    pub source: Address,
}

/// One category's slice of the budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAllocation {
    /// Category
    pub category: ExpenditureType,
    /// Allocated
    pub amount: Amount,
    /// Share of the total budget, percent
    pub percentage: Decimal,
    /// Spent so far
    pub used_amount: Amount,
    /// `amount - used`, floored at zero
    pub remaining_amount: Amount,
}

impl CategoryAllocation {
    fn overflow(&self) -> Amount {
        self.used_amount.saturating_sub(self.amount)
    }
}

/// Budget split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAllocation {
    /// Total budget
    pub total_budget: Amount,
    /// Sum of category allocations
    pub allocated_amount: Amount,
    /// Unallocated remainder not yet drawn by emergency spends
    pub available_budget: Amount,
    /// Per-category allocations
    pub categories: Vec<CategoryAllocation>,
}

/// Category budget in a genesis definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBudget {
    /// Category
    pub category: ExpenditureType,
    /// Allocated
    pub amount: Amount,
}

/// Initial treasury definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryGenesis {
    /// Treasury address
    pub address: Address,
    /// Opening value
    pub total_value: Amount,
    /// Total budget
    pub total_budget: Amount,
    /// Category allocations
    pub categories: Vec<CategoryBudget>,
}

impl Default for TreasuryGenesis {
    fn default() -> Self {
        let split = [
            (ExpenditureType::Development, 300_000u128),
            (ExpenditureType::Marketing, 100_000),
            (ExpenditureType::Operations, 150_000),
            (ExpenditureType::Grants, 150_000),
            (ExpenditureType::LiquidityIncentives, 200_000),
            (ExpenditureType::Emergency, 50_000),
        ];
        Self {
            address: Address::derive("treasury", &["genesis"]),
            total_value: Amount::new(1_000_000),
            total_budget: Amount::new(1_000_000),
            categories: split
                .into_iter()
                .map(|(category, amount)| CategoryBudget {
                    category,
                    amount: Amount::new(amount),
                })
                .collect(),
        }
    }
}

/// Treasury state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treasury {
    address: Address,
    total_value: Amount,
    assets: Vec<TreasuryAsset>,
    expenditures: Vec<TreasuryExpenditure>,
    revenues: Vec<TreasuryRevenue>,
    budget: BudgetAllocation,
    #[serde(default)]
    frozen: Option<String>,
}

fn percentage(part: Amount, total: Amount) -> Decimal {
    part.ratio_of(total)
        .checked_mul(Decimal::ONE_HUNDRED)
        .map_or(Decimal::MAX, |pct| pct.round_dp(2))
}

impl Treasury {
    /// Open a treasury from its genesis definition
    pub fn new(genesis: TreasuryGenesis) -> Result<Self> {
        let mut categories: Vec<CategoryAllocation> = Vec::with_capacity(genesis.categories.len());
        for entry in &genesis.categories {
            if categories.iter().any(|c| c.category == entry.category) {
                return Err(Error::InvalidParameters(format!(
                    "duplicate budget category {}",
                    entry.category.as_str()
                )));
            }
            categories.push(CategoryAllocation {
                category: entry.category,
                amount: entry.amount,
                percentage: percentage(entry.amount, genesis.total_budget),
                used_amount: Amount::ZERO,
                remaining_amount: entry.amount,
            });
        }
        let allocated: Amount = categories.iter().map(|c| c.amount).sum();
        if allocated > genesis.total_budget {
            return Err(Error::InvalidParameters(format!(
                "allocations {} exceed total budget {}",
                allocated, genesis.total_budget
            )));
        }

        Ok(Self {
            address: genesis.address,
            total_value: genesis.total_value,
            assets: Vec::new(),
            expenditures: Vec::new(),
            revenues: Vec::new(),
            budget: BudgetAllocation {
                total_budget: genesis.total_budget,
                allocated_amount: allocated,
                available_budget: genesis.total_budget.saturating_sub(allocated),
                categories,
            },
            frozen: None,
        })
    }

    /// Adopt previously persisted state, freezing it if an invariant is broken
    pub fn restore(mut self) -> Self {
        if let Err(e) = self.check_invariants() {
            error!(treasury = %self.address.short(), error = %e, "Treasury frozen on load");
            self.frozen = Some(e.to_string());
        }
        self
    }

    /// Refuse every further write
    pub fn freeze(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(treasury = %self.address.short(), reason = %reason, "Treasury frozen");
        self.frozen = Some(reason);
    }

    /// Treasury address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current value
    pub fn total_value(&self) -> Amount {
        self.total_value
    }

    /// Asset holdings
    pub fn assets(&self) -> &[TreasuryAsset] {
        &self.assets
    }

    /// Expenditures, oldest first
    pub fn expenditures(&self) -> &[TreasuryExpenditure] {
        &self.expenditures
    }

    /// Revenues, oldest first
    pub fn revenues(&self) -> &[TreasuryRevenue] {
        &self.revenues
    }

    /// Budget split
    pub fn budget(&self) -> &BudgetAllocation {
        &self.budget
    }

    /// Reason the treasury was frozen, if it was
    pub fn frozen_reason(&self) -> Option<&str> {
        self.frozen.as_deref()
    }

    fn ensure_writable(&self) -> Result<()> {
        match &self.frozen {
            Some(reason) => Err(Error::TreasuryCorrupted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Total already spent under `proposal`
    pub fn spent_under(&self, proposal: ProposalId) -> Amount {
        self.expenditures
            .iter()
            .filter(|e| e.proposal_id == Some(proposal))
            .map(|e| e.amount)
            .sum()
    }

    /// Validate an expenditure without recording it. Returns the category
    /// index and the amount drawn from the unallocated remainder.
    pub fn check_expenditure(
        &self,
        request: &ExpenditureRequest,
        proposal: Option<&Proposal>,
    ) -> Result<(usize, Amount)> {
        self.ensure_writable()?;
        if request.amount.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "expenditure amount must be positive".to_string(),
            )
            .into());
        }

        self.check_authorization(request, proposal)?;

        let index = self
            .budget
            .categories
            .iter()
            .position(|c| c.category == request.expenditure_type)
            .ok_or_else(|| Error::UnknownCategory(request.expenditure_type.as_str().to_string()))?;
        let category = &self.budget.categories[index];
        let used = category.used_amount.checked_add(request.amount)?;

        let overflow = if used <= category.amount {
            Amount::ZERO
        } else if request.expenditure_type == ExpenditureType::Emergency {
            let drawn = used.saturating_sub(category.amount).saturating_sub(category.overflow());
            if drawn > self.budget.available_budget {
                return Err(Error::CategoryCapExceeded(format!(
                    "emergency spend needs {} from the unallocated budget but {} remains",
                    drawn, self.budget.available_budget
                )));
            }
            drawn
        } else {
            return Err(Error::CategoryCapExceeded(format!(
                "{}: used {} + {} exceeds allocation {}",
                category.category.as_str(),
                category.used_amount,
                request.amount,
                category.amount
            )));
        };

        if request.amount > self.total_value {
            return Err(Error::InsufficientTreasuryFunds(format!(
                "spend {} exceeds treasury value {}",
                request.amount, self.total_value
            )));
        }
        Ok((index, overflow))
    }

    fn check_authorization(
        &self,
        request: &ExpenditureRequest,
        proposal: Option<&Proposal>,
    ) -> Result<()> {
        let is_emergency = request.expenditure_type == ExpenditureType::Emergency;
        let Some(id) = request.proposal_id else {
            if is_emergency {
                return Ok(());
            }
            return Err(Error::UnauthorizedExpenditure(format!(
                "{} spend of {} references no proposal",
                request.expenditure_type.as_str(),
                request.amount
            )));
        };

        let proposal = proposal
            .filter(|p| p.proposal_id == id)
            .ok_or_else(|| {
                Error::UnauthorizedExpenditure(format!("proposal {} not supplied", id))
            })?;
        if proposal.status != ProposalStatus::Executed {
            return Err(Error::UnauthorizedExpenditure(format!(
                "proposal {} is {}, not EXECUTED",
                id,
                proposal.status.as_str()
            )));
        }
        if !is_emergency && proposal.proposal_type != ProposalType::TreasuryManagement {
            return Err(Error::UnauthorizedExpenditure(format!(
                "proposal {} is {}, not TREASURY_MANAGEMENT",
                id,
                proposal.proposal_type.as_str()
            )));
        }

        let authorized = proposal.execution_data.as_ref().map_or(Amount::ZERO, |d| d.value);
        let total = self.spent_under(id).checked_add(request.amount)?;
        if total > authorized {
            return Err(Error::UnauthorizedExpenditure(format!(
                "proposal {} authorized {} but {} would be spent",
                id, authorized, total
            )));
        }
        Ok(())
    }

    /// Record an expenditure
    pub fn record_expenditure(
        &mut self,
        request: ExpenditureRequest,
        proposal: Option<&Proposal>,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<TreasuryExpenditure> {
        let (index, overflow) = match self.check_expenditure(&request, proposal) {
            Ok(checked) => checked,
            Err(e) => {
                warn!(
                    category = request.expenditure_type.as_str(),
                    amount = %request.amount,
                    reason = e.reason(),
                    "Expenditure rejected"
                );
                return Err(e);
            }
        };

        let total_value = self.total_value.checked_sub(request.amount)?;
        let available = self.budget.available_budget.checked_sub(overflow)?;
        let category = &self.budget.categories[index];
        let used = category.used_amount.checked_add(request.amount)?;

        // All checks passed
        self.total_value = total_value;
        self.budget.available_budget = available;
        let category = &mut self.budget.categories[index];
        category.used_amount = used;
        category.remaining_amount = category.amount.saturating_sub(used);

        let record = TreasuryExpenditure {
            expenditure_id: new_record_id(),
            expenditure_type: request.expenditure_type,
            amount: request.amount,
            asset: request.asset,
            recipient: request.recipient,
            reason: request.reason,
            proposal_id: request.proposal_id,
            timestamp: now,
            tx_hash,
        };
        self.expenditures.push(record.clone());

        info!(
            category = record.expenditure_type.as_str(),
            amount = %record.amount,
            overflow = %overflow,
            proposal = ?record.proposal_id,
            "Expenditure recorded"
        );
        Ok(record)
    }

    /// Record incoming value
    pub fn record_revenue(
        &mut self,
        request: RevenueRequest,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<TreasuryRevenue> {
        self.ensure_writable()?;
        if request.amount.is_zero() {
            return Err(ledger_core::Error::InvalidAmount(
                "revenue amount must be positive".to_string(),
            )
            .into());
        }
        let total_value = self.total_value.checked_add(request.amount)?;

        self.total_value = total_value;
        let record = TreasuryRevenue {
            revenue_id: new_record_id(),
            revenue_type: request.revenue_type,
            amount: request.amount,
            asset: request.asset,
            source: request.source,
            timestamp: now,
            tx_hash,
        };
        self.revenues.push(record.clone());

        info!(kind = ?record.revenue_type, amount = %record.amount, "Revenue recorded");
        Ok(record)
    }

    /// Insert or replace the holding of an asset
    pub fn upsert_asset(&mut self, asset: TreasuryAsset) -> Result<()> {
        self.ensure_writable()?;
        match self.assets.iter_mut().find(|a| a.address == asset.address) {
            Some(existing) => *existing = asset,
            None => self.assets.push(asset),
        }
        Ok(())
    }

    /// Verify the budget arithmetic
    pub fn check_invariants(&self) -> Result<()> {
        let budget = &self.budget;
        let allocated: Amount = budget.categories.iter().map(|c| c.amount).sum();
        if allocated != budget.allocated_amount {
            return Err(Error::TreasuryCorrupted(format!(
                "allocations sum to {} but {} is recorded",
                allocated, budget.allocated_amount
            )));
        }
        if allocated > budget.total_budget {
            return Err(Error::TreasuryCorrupted(format!(
                "allocations {} exceed total budget {}",
                allocated, budget.total_budget
            )));
        }

        let used: Amount = budget.categories.iter().map(|c| c.used_amount).sum();
        if used > budget.total_budget {
            return Err(Error::TreasuryCorrupted(format!(
                "spent {} exceeds total budget {}",
                used, budget.total_budget
            )));
        }

        let overflow: Amount = budget.categories.iter().map(|c| c.overflow()).sum();
        let expected_available = budget
            .total_budget
            .saturating_sub(allocated)
            .saturating_sub(overflow);
        if expected_available != budget.available_budget {
            return Err(Error::TreasuryCorrupted(format!(
                "available budget {} should be {}",
                budget.available_budget, expected_available
            )));
        }

        let mut per_category: BTreeMap<ExpenditureType, Amount> = BTreeMap::new();
        for e in &self.expenditures {
            let entry = per_category.entry(e.expenditure_type).or_insert(Amount::ZERO);
            *entry = entry.checked_add(e.amount)?;
        }
        for c in &budget.categories {
            let spent = per_category.get(&c.category).copied().unwrap_or(Amount::ZERO);
            if spent != c.used_amount {
                return Err(Error::TreasuryCorrupted(format!(
                    "{} records {} used but expenditures sum to {}",
                    c.category.as_str(),
                    c.used_amount,
                    spent
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{ExecutionAction, ExecutionData, ExecutionTarget};
    use crate::tally::VotingResult;
    use ledger_core::{ErrorCode, Percent};

    fn genesis() -> TreasuryGenesis {
        TreasuryGenesis {
            address: Address::from_seed(0x7ea5),
            total_value: Amount::new(5000),
            total_budget: Amount::new(2000),
            categories: vec![
                CategoryBudget {
                    category: ExpenditureType::Grants,
                    amount: Amount::new(1000),
                },
                CategoryBudget {
                    category: ExpenditureType::Emergency,
                    amount: Amount::new(200),
                },
            ],
        }
    }

    fn request(kind: ExpenditureType, amount: u128, proposal: Option<u64>) -> ExpenditureRequest {
        ExpenditureRequest {
            expenditure_type: kind,
            amount: Amount::new(amount),
            asset: Address::from_seed(0xa),
            recipient: Address::from_seed(0xcafe),
            reason: "grant round".to_string(),
            proposal_id: proposal.map(ProposalId),
        }
    }

    fn spend(
        treasury: &mut Treasury,
        kind: ExpenditureType,
        amount: u128,
        proposal: Option<&Proposal>,
    ) -> Result<TreasuryExpenditure> {
        let request = request(kind, amount, proposal.map(|p| p.proposal_id.0));
        treasury.record_expenditure(request, proposal, Hash32::default(), Utc::now())
    }

    fn executed_proposal(id: u64, value: u128) -> Proposal {
        let request = request(ExpenditureType::Grants, value, Some(id));
        let action = ExecutionAction::TreasuryExpenditure(request);
        Proposal {
            proposal_id: ProposalId(id),
            title: "Grants".to_string(),
            description: "Fund grants".to_string(),
            proposal_type: ProposalType::TreasuryManagement,
            status: ProposalStatus::Executed,
            proposer: Address::from_seed(1),
            created_at: Utc::now(),
            voting_start_time: None,
            voting_end_time: None,
            execution_time: None,
            options: crate::proposal::default_options(),
            results: VotingResult::new(&crate::proposal::default_options(), Percent::ZERO),
            execution_data: Some(ExecutionData {
                target: ExecutionTarget::Treasury,
                action,
                value: Amount::new(value),
                is_executed: true,
                tx_hash: None,
                executed_at: None,
            }),
            related_pools: Vec::new(),
            proposal_hash: Hash32::default(),
            is_executed: true,
            execution_tx_hash: None,
            eligible_voting_power: Amount::ZERO,
        }
    }

    #[test]
    fn test_category_cap() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        let proposal = executed_proposal(1, 2000);

        spend(&mut treasury, ExpenditureType::Grants, 500, Some(&proposal)).unwrap();
        let err = spend(&mut treasury, ExpenditureType::Grants, 600, Some(&proposal)).unwrap_err();

        assert!(matches!(err, Error::CategoryCapExceeded(_)));
        assert_eq!(err.code(), ErrorCode::ResourceConflict);
        assert_eq!(treasury.budget().categories[0].used_amount, Amount::new(500));
        assert_eq!(treasury.budget().categories[0].remaining_amount, Amount::new(500));
        assert_eq!(treasury.total_value(), Amount::new(4500));
    }

    #[test]
    fn test_requires_executed_treasury_proposal() {
        let mut treasury = Treasury::new(genesis()).unwrap();

        let err = spend(&mut treasury, ExpenditureType::Grants, 10, None).unwrap_err();
        assert!(matches!(err, Error::UnauthorizedExpenditure(_)));

        let mut pending = executed_proposal(2, 100);
        pending.status = ProposalStatus::Succeeded;
        let err = spend(&mut treasury, ExpenditureType::Grants, 10, Some(&pending)).unwrap_err();
        assert!(matches!(err, Error::UnauthorizedExpenditure(_)));
    }

    #[test]
    fn test_spend_limited_to_authorized_value() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        let proposal = executed_proposal(3, 100);

        spend(&mut treasury, ExpenditureType::Grants, 60, Some(&proposal)).unwrap();
        let err = spend(&mut treasury, ExpenditureType::Grants, 60, Some(&proposal)).unwrap_err();
        assert!(matches!(err, Error::UnauthorizedExpenditure(_)));
        assert_eq!(treasury.spent_under(ProposalId(3)), Amount::new(60));
    }

    #[test]
    fn test_emergency_overflows_into_available_budget() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        assert_eq!(treasury.budget().available_budget, Amount::new(800));

        spend(&mut treasury, ExpenditureType::Emergency, 500, None).unwrap();
        assert_eq!(treasury.budget().available_budget, Amount::new(500));

        let err = spend(&mut treasury, ExpenditureType::Emergency, 600, None).unwrap_err();
        assert!(matches!(err, Error::CategoryCapExceeded(_)));
        treasury.check_invariants().unwrap();
    }

    #[test]
    fn test_cannot_spend_more_than_held() {
        let mut g = genesis();
        g.total_value = Amount::new(50);
        let mut treasury = Treasury::new(g).unwrap();
        let err = spend(&mut treasury, ExpenditureType::Emergency, 100, None).unwrap_err();
        assert!(matches!(err, Error::InsufficientTreasuryFunds(_)));
    }

    #[test]
    fn test_over_allocated_genesis_rejected() {
        let mut g = genesis();
        g.total_budget = Amount::new(1000);
        assert!(Treasury::new(g).is_err());
    }

    #[test]
    fn test_corrupted_state_is_frozen() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        treasury.budget.allocated_amount = Amount::new(1);
        let mut treasury = treasury.restore();

        assert!(treasury.frozen_reason().is_some());
        let revenue = RevenueRequest {
            revenue_type: RevenueType::TradingFees,
            amount: Amount::new(10),
            asset: Address::from_seed(0xa),
            source: Address::from_seed(0xb),
        };
        let err = treasury.record_revenue(revenue, Hash32::default(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_frozen_treasury_refuses_spending() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        treasury.freeze("halted by operator");

        let err = spend(&mut treasury, ExpenditureType::Emergency, 10, None).unwrap_err();
        assert_eq!(err.reason(), "TREASURY_CORRUPTED");
        assert_eq!(treasury.frozen_reason(), Some("halted by operator"));
        assert!(treasury.expenditures().is_empty());
    }

    #[test]
    fn test_revenue_and_assets() {
        let mut treasury = Treasury::new(genesis()).unwrap();
        let revenue = RevenueRequest {
            revenue_type: RevenueType::ProtocolFees,
            amount: Amount::new(250),
            asset: Address::from_seed(0xa),
            source: Address::from_seed(0xb),
        };
        treasury.record_revenue(revenue, Hash32::default(), Utc::now()).unwrap();
        assert_eq!(treasury.total_value(), Amount::new(5250));

        let asset = TreasuryAsset {
            asset_type: AssetType::Erc20,
            address: Address::from_seed(0xa),
            symbol: "USDC".to_string(),
            amount: Amount::new(100),
            value: Amount::new(100),
            price: Decimal::ONE,
        };
        treasury.upsert_asset(asset.clone()).unwrap();
        treasury
            .upsert_asset(TreasuryAsset {
                amount: Amount::new(300),
                ..asset
            })
            .unwrap();
        assert_eq!(treasury.assets().len(), 1);
        assert_eq!(treasury.assets()[0].amount, Amount::new(300));
    }
}
