//! Engine state and command dispatch
//!
//! [`EngineState`] owns every component. It is mutated only by the actor
//! task; handle reads take the read side of the surrounding lock.
//!
//! Every command first closes proposals whose voting window has ended
//! (lazy finalization), then runs its own checks, then mutates. A command
//! that fails leaves its component untouched; the sweep it triggered still
//! stands and its events are still published.

use crate::api::{TxReceipt, TxStatus};
use crate::command::{Command, CommandResult, Outcome};
use crate::event::Event;
use crate::metrics::{ENGINE_FEE_ADJUSTMENTS_TOTAL, ENGINE_VOTES_TOTAL};
use crate::{Config, Error, Result};
use chrono::{DateTime, Duration, Utc};
use fee_engine::{
    AnalyticsAggregator, DirectedAdjustment, FeeAdjustmentRecord, MarketSample, Pool, PoolFilter,
    PoolRegistry,
};
use governance::{
    ExpenditureType, GovernanceParameters, ProposalBook, StatusChange, Treasury, VoteChoice,
    VotingPowerLedger,
};
use ledger_core::{transaction_hash, Address, Amount, Hash32};
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// Result of processing one command
#[derive(Debug)]
pub struct Processed {
    /// Events from proposals closed before the command ran
    pub swept: Vec<Event>,
    /// The command's own result; on success `events` includes `swept`
    pub result: Result<CommandResult>,
}

/// Everything the engine owns
#[derive(Debug)]
pub struct EngineState {
    pub(crate) pools: PoolRegistry,
    pub(crate) analytics: AnalyticsAggregator,
    pub(crate) voting: VotingPowerLedger,
    pub(crate) proposals: ProposalBook,
    pub(crate) treasury: Treasury,
    pub(crate) params: GovernanceParameters,
    guardians: BTreeSet<Address>,
    sequence: u64,
    gas_price: Amount,
}

impl EngineState {
    /// Build the initial state from configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let retention = Duration::hours(config.analytics.retention_hours as i64);
        Ok(Self {
            pools: PoolRegistry::new(),
            analytics: AnalyticsAggregator::new(retention),
            voting: VotingPowerLedger::new(),
            proposals: ProposalBook::new(),
            treasury: Treasury::new(config.treasury.clone())?,
            params: config.governance.clone(),
            guardians: config.guardians.iter().cloned().collect(),
            sequence: 0,
            gas_price: config.gas_price,
        })
    }

    /// Replace the treasury with persisted state. A treasury whose budget
    /// arithmetic does not hold is adopted frozen.
    pub fn adopt_treasury(&mut self, treasury: Treasury) {
        self.treasury = treasury.restore();
        if let Some(reason) = self.treasury.frozen_reason() {
            error!(reason, "Adopted treasury is frozen");
        }
    }

    /// Pools, positions and fee history
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Market series
    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.analytics
    }

    /// Balances and delegations
    pub fn voting(&self) -> &VotingPowerLedger {
        &self.voting
    }

    /// Proposals and votes
    pub fn proposals(&self) -> &ProposalBook {
        &self.proposals
    }

    /// Treasury ledger
    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    /// Governance parameters in force
    pub fn params(&self) -> &GovernanceParameters {
        &self.params
    }

    /// Filtered, sorted page of pools
    pub fn list_pools(&self, filter: &PoolFilter, now: DateTime<Utc>) -> (Vec<Pool>, usize) {
        self.pools.list(filter, &self.analytics, now)
    }

    /// Committed commands so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether `address` may issue guardian commands
    pub fn is_guardian(&self, address: &Address) -> bool {
        self.guardians.contains(address)
    }

    fn require_guardian(&self, caller: &Address, action: &str) -> Result<()> {
        if self.is_guardian(caller) {
            Ok(())
        } else {
            Err(Error::NotGuardian(format!("{} may not {}", caller, action)))
        }
    }

    /// Close every proposal whose voting window has ended
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<StatusChange> {
        self.proposals.finalize_due(&mut self.voting, &self.params, now)
    }

    /// Sweep, then apply `command`
    pub fn process(&mut self, command: Command, now: DateTime<Utc>) -> Processed {
        let changes = self.sweep(now);
        let swept: Vec<Event> = changes.iter().cloned().map(Event::ProposalStatusChanged).collect();

        let result = self.commit(command, changes, now).map(|(receipt, outcome, events)| {
            let mut all = swept.clone();
            all.extend(events);
            CommandResult {
                receipt,
                outcome,
                events: all,
            }
        });

        Processed { swept, result }
    }

    fn commit(
        &mut self,
        command: Command,
        swept: Vec<StatusChange>,
        now: DateTime<Utc>,
    ) -> Result<(TxReceipt, Outcome, Vec<Event>)> {
        let payload = serde_json::to_vec(&command)?;
        let sequence = self.sequence + 1;
        let tx_hash = transaction_hash(sequence, command.kind(), &payload);
        let gas_used = command.gas_used();

        let (outcome, events) = self.apply(command, swept, tx_hash, now)?;

        // Committed
        self.sequence = sequence;
        Ok((
            TxReceipt {
                transaction_hash: tx_hash,
                gas_used,
                gas_price: self.gas_price,
                status: TxStatus::Confirmed,
            },
            outcome,
            events,
        ))
    }

    fn apply(
        &mut self,
        command: Command,
        swept: Vec<StatusChange>,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<(Outcome, Vec<Event>)> {
        match command {
            Command::CreatePool { creator, params } => {
                let pool = self.pools.create_pool(*params, creator, now)?.clone();
                self.analytics.record_fee_rate(&pool.address, pool.fee_rate(), now);
                Ok((
                    Outcome::PoolCreated(Box::new(pool.clone())),
                    vec![Event::PoolCreated(Box::new(pool))],
                ))
            }

            Command::SubmitMarketSample { pool, sample, reporter } => {
                self.submit_sample(pool, sample, reporter, now)
            }

            Command::AdjustFee {
                caller,
                pool,
                new_fee_rate,
                emergency,
            } => {
                self.require_guardian(&caller, "adjust fees directly")?;
                let source = if emergency {
                    DirectedAdjustment::Emergency
                } else {
                    DirectedAdjustment::Manual
                };
                let record = self.pools.adjust_fee(&pool, new_fee_rate, source, now, &caller)?;
                let events = self.note_adjustment(record.as_ref());
                Ok((Outcome::FeeAdjusted(record), events))
            }

            Command::AddLiquidity {
                user,
                pool,
                amount_a,
                amount_b,
            } => {
                let position = self.pools.add_liquidity(&user, &pool, amount_a, amount_b, now)?;
                Ok((
                    Outcome::LiquidityAdded(position.clone()),
                    vec![Event::LiquidityAdded(position)],
                ))
            }

            Command::RemoveLiquidity {
                user,
                position_id,
                shares,
            } => {
                let pool = self.pools.position(position_id)?.pool;
                let withdrawal = self.pools.remove_liquidity(&user, position_id, shares, now)?;
                Ok((
                    Outcome::LiquidityRemoved(withdrawal.clone()),
                    vec![Event::LiquidityRemoved {
                        user,
                        pool,
                        withdrawal,
                    }],
                ))
            }

            Command::AccrueFees { pool, fees } => {
                let credited = self.pools.accrue_fees(&pool, fees, now)?;
                self.analytics.record_lp_rewards(&pool, credited);
                Ok((
                    Outcome::FeesAccrued(credited),
                    vec![Event::FeesAccrued { pool, fees, credited }],
                ))
            }

            Command::ClaimRewards { user, position_id } => {
                let amount = self.pools.claim_rewards(&user, position_id, now)?;
                Ok((
                    Outcome::RewardsClaimed(amount),
                    vec![Event::RewardsClaimed {
                        user,
                        position_id,
                        amount,
                    }],
                ))
            }

            Command::SyncBalance {
                user,
                token_balance,
                staked_balance,
            } => {
                let power = self.voting.sync_balance(&user, token_balance, staked_balance)?;
                Ok((
                    Outcome::BalanceSynced(power.clone()),
                    vec![Event::VotingPowerUpdated(power)],
                ))
            }

            Command::Delegate {
                delegator,
                delegatee,
                amount,
            } => {
                let delegation = self.voting.apply_delegation(&delegator, &delegatee, amount, now)?;
                let mut events = vec![Event::DelegationChanged(delegation.clone())];
                events.extend(self.power_events(&[&delegator, &delegatee])?);
                Ok((Outcome::Delegated(delegation), events))
            }

            Command::CancelDelegation { delegator } => {
                let delegation = self.voting.cancel_delegation(&delegator, now)?;
                let mut events = vec![Event::DelegationChanged(delegation.clone())];
                events.extend(self.power_events(&[&delegator, &delegation.delegatee])?);
                Ok((Outcome::DelegationCancelled(delegation), events))
            }

            Command::SubmitDraft { proposer, draft } => {
                let id = self.proposals.submit_draft(*draft, &proposer, now)?;
                let proposal = Box::new(self.proposals.get(id)?.clone());
                Ok((
                    Outcome::DraftSubmitted(proposal.clone()),
                    vec![Event::ProposalCreated(proposal)],
                ))
            }

            Command::ActivateProposal { caller, proposal_id } => {
                let change = self
                    .proposals
                    .activate(proposal_id, &caller, &self.voting, &self.params, now)?;
                let proposal = Box::new(self.proposals.get(proposal_id)?.clone());
                Ok((
                    Outcome::ProposalActivated(proposal),
                    vec![Event::ProposalStatusChanged(change)],
                ))
            }

            Command::CreateProposal { proposer, draft } => {
                let id = self
                    .proposals
                    .create(*draft, &proposer, &self.voting, &self.params, now)?;
                let proposal = Box::new(self.proposals.get(id)?.clone());
                Ok((
                    Outcome::ProposalCreated(proposal.clone()),
                    vec![Event::ProposalCreated(proposal)],
                ))
            }

            Command::CastVote {
                voter,
                proposal_id,
                selected_options,
                reason,
            } => {
                let vote = self.proposals.cast_vote(
                    &mut self.voting,
                    &self.params,
                    proposal_id,
                    &voter,
                    selected_options,
                    reason,
                    now,
                )?;
                if let Ok(choice) = vote.choice(self.proposals.get(proposal_id)?) {
                    ENGINE_VOTES_TOTAL.with_label_values(&[choice_label(choice)]).inc();
                }
                Ok((Outcome::VoteCast(vote.clone()), vec![Event::VoteCast(vote)]))
            }

            Command::CancelProposal { caller, proposal_id } => {
                let is_guardian = self.is_guardian(&caller);
                let change = self
                    .proposals
                    .cancel(&mut self.voting, proposal_id, &caller, is_guardian)?;
                let proposal = Box::new(self.proposals.get(proposal_id)?.clone());
                Ok((
                    Outcome::ProposalCancelled(proposal),
                    vec![Event::ProposalStatusChanged(change)],
                ))
            }

            Command::ExecuteProposal { caller, proposal_id } => {
                let events = self.execute_proposal(proposal_id, &caller, tx_hash, now)?;
                let proposal = Box::new(self.proposals.get(proposal_id)?.clone());
                Ok((Outcome::ProposalExecuted(proposal), events))
            }

            Command::FinalizeProposals => {
                debug!(closed = swept.len(), "Finalize requested");
                Ok((Outcome::ProposalsFinalized(swept), Vec::new()))
            }

            Command::RecordExpenditure { caller, request } => {
                let unreferenced = request.proposal_id.is_none();
                if unreferenced && request.expenditure_type == ExpenditureType::Emergency {
                    self.require_guardian(&caller, "post an unreferenced emergency expenditure")?;
                }
                let proposal = match request.proposal_id {
                    Some(id) => Some(self.proposals.get(id)?.clone()),
                    None => None,
                };
                let record = self.update_treasury(|t| {
                    t.record_expenditure(request, proposal.as_ref(), tx_hash, now)
                })?;
                Ok((
                    Outcome::ExpenditureRecorded(record.clone()),
                    vec![Event::TreasuryExpenditure(record)],
                ))
            }

            Command::RecordRevenue { request } => {
                let record = self.update_treasury(|t| t.record_revenue(request, tx_hash, now))?;
                Ok((
                    Outcome::RevenueRecorded(record.clone()),
                    vec![Event::TreasuryRevenue(record)],
                ))
            }

            Command::UpsertTreasuryAsset { caller, asset } => {
                self.require_guardian(&caller, "update treasury holdings")?;
                self.treasury.upsert_asset(asset.clone())?;
                Ok((
                    Outcome::AssetUpserted(asset.clone()),
                    vec![Event::TreasuryAssetUpdated(asset)],
                ))
            }
        }
    }

    fn submit_sample(
        &mut self,
        pool: Address,
        sample: MarketSample,
        reporter: Address,
        now: DateTime<Utc>,
    ) -> Result<(Outcome, Vec<Event>)> {
        self.pools.get(&pool)?;
        if sample.timestamp > now {
            return Err(fee_engine::Error::InvalidSignal(format!(
                "sample at {} is ahead of engine time {}",
                sample.timestamp, now
            ))
            .into());
        }
        self.analytics.record_sample(&pool, sample.clone())?;
        let mut events = vec![Event::MarketSampleRecorded {
            pool: pool.clone(),
            sample,
        }];

        let record = match self.analytics.signals(&pool, now) {
            Some(signals) => self.pools.evaluate_fee(&pool, &signals, now, &reporter)?,
            None => None,
        };
        events.extend(self.note_adjustment(record.as_ref()));
        Ok((Outcome::SampleRecorded(record), events))
    }

    /// Track an adjustment in analytics and metrics
    pub(crate) fn note_adjustment(&mut self, record: Option<&FeeAdjustmentRecord>) -> Vec<Event> {
        let Some(record) = record else {
            return Vec::new();
        };
        self.analytics
            .record_fee_rate(&record.pool, record.new_fee_rate, record.timestamp);
        ENGINE_FEE_ADJUSTMENTS_TOTAL
            .with_label_values(&[record.reason.as_str()])
            .inc();
        info!(
            pool = %record.pool,
            from = record.previous_fee_rate.get(),
            to = record.new_fee_rate.get(),
            reason = record.reason.as_str(),
            "Fee adjusted"
        );
        vec![Event::FeeAdjusted(record.clone())]
    }

    fn power_events(&self, users: &[&Address]) -> Result<Vec<Event>> {
        users
            .iter()
            .map(|u| Ok(Event::VotingPowerUpdated(self.voting.snapshot(u)?)))
            .collect()
    }

    /// Apply a treasury write to a copy and commit it only if the budget
    /// arithmetic still holds. A broken copy freezes the live treasury.
    pub(crate) fn update_treasury<T>(
        &mut self,
        write: impl FnOnce(&mut Treasury) -> governance::Result<T>,
    ) -> Result<T> {
        let mut next = self.treasury.clone();
        let value = write(&mut next)?;
        if let Err(e) = next.check_invariants() {
            error!(error = %e, "Treasury invariant broken; freezing treasury");
            self.treasury.freeze(e.to_string());
            return Err(e.into());
        }
        self.treasury = next;
        Ok(value)
    }
}

fn choice_label(choice: VoteChoice) -> &'static str {
    match choice {
        VoteChoice::For => "for",
        VoteChoice::Against => "against",
        VoteChoice::Abstain => "abstain",
    }
}
