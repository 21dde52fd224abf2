//! Proposal execution
//!
//! Two phases. The preflight runs every check the action would run,
//! against the live state or a clone of the affected entity, without
//! mutating anything. Only then is the proposal stamped Executed and the
//! action applied. If the apply step still fails, the saved proposal is
//! put back so it stays Succeeded and can be retried.

use crate::event::Event;
use crate::state::EngineState;
use crate::Result;
use chrono::{DateTime, Utc};
use fee_engine::{DirectedAdjustment, Pool};
use governance::{ExecutionAction, Proposal, ProposalId, ProposalStatus};
use ledger_core::{Address, Hash32};
use tracing::{info, warn};

impl EngineState {
    /// Execute a Succeeded proposal. Anyone may trigger it.
    pub(crate) fn execute_proposal(
        &mut self,
        id: ProposalId,
        caller: &Address,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let data = self.proposals.check_execution(id, &self.params, now)?;
        let proposal = self.proposals.get(id)?.clone();
        if let Some(data) = &data {
            self.preflight(&proposal, &data.action, now)?;
        }

        // All checks passed
        let change = self.proposals.mark_executed(id, tx_hash, now)?;
        let mut events = vec![Event::ProposalStatusChanged(change)];

        if let Some(data) = data {
            match self.apply_action(&proposal, data.action, tx_hash, now) {
                Ok(applied) => events.extend(applied),
                Err(e) => {
                    warn!(
                        proposal = %id,
                        reason = e.reason(),
                        error = %e,
                        "Execution failed after preflight; proposal restored"
                    );
                    self.proposals.restore(proposal);
                    return Err(e);
                }
            }
        }

        info!(proposal = %id, by = %caller.short(), tx = %tx_hash, "Proposal action applied");
        Ok(events)
    }

    fn preflight(
        &self,
        proposal: &Proposal,
        action: &ExecutionAction,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match action {
            ExecutionAction::AdjustFee { pool, .. } => {
                let pool = self.pools.get(pool)?;
                if !proposal.proposal_type.is_emergency() {
                    if let Some(remaining_secs) = pool.fees.cooldown_remaining(now) {
                        return Err(fee_engine::Error::CooldownActive { remaining_secs }.into());
                    }
                }
            }
            ExecutionAction::CreatePool(params) => {
                params.validate()?;
                let address = params.pool_address();
                if self.pools.get(&address).is_ok() {
                    return Err(fee_engine::Error::PoolExists(address.to_string()).into());
                }
            }
            ExecutionAction::UpdatePoolConfig { pool, update } => {
                let mut scratch: Pool = self.pools.get(pool)?.clone();
                scratch.apply_config(update)?;
            }
            ExecutionAction::UpdateGovernanceParameters(params) => params.validate()?,
            ExecutionAction::TreasuryExpenditure(request) => {
                let mut request = request.clone();
                request.proposal_id = Some(proposal.proposal_id);
                let mut executed = proposal.clone();
                executed.status = ProposalStatus::Executed;
                self.treasury.check_expenditure(&request, Some(&executed))?;
            }
            ExecutionAction::Signal => {}
        }
        Ok(())
    }

    fn apply_action(
        &mut self,
        proposal: &Proposal,
        action: ExecutionAction,
        tx_hash: Hash32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        match action {
            ExecutionAction::AdjustFee { pool, new_fee_rate } => {
                let source = if proposal.proposal_type.is_emergency() {
                    DirectedAdjustment::Emergency
                } else {
                    DirectedAdjustment::Governance
                };
                let record = self
                    .pools
                    .adjust_fee(&pool, new_fee_rate, source, now, &proposal.proposer)?;
                Ok(self.note_adjustment(record.as_ref()))
            }
            ExecutionAction::CreatePool(params) => {
                let pool = self.pools.create_pool(*params, proposal.proposer.clone(), now)?.clone();
                self.analytics.record_fee_rate(&pool.address, pool.fee_rate(), now);
                Ok(vec![Event::PoolCreated(Box::new(pool))])
            }
            ExecutionAction::UpdatePoolConfig { pool, update } => {
                let before = self.pools.get(&pool)?.fee_rate();
                let updated = self.pools.update_config(&pool, &update)?.clone();
                if updated.fee_rate() != before {
                    // Re-clamped into a narrowed band
                    self.analytics.record_fee_rate(&pool, updated.fee_rate(), now);
                }
                Ok(vec![Event::PoolConfigUpdated(Box::new(updated))])
            }
            ExecutionAction::UpdateGovernanceParameters(params) => {
                params.validate()?;
                self.params = params.clone();
                info!(proposal = %proposal.proposal_id, "Governance parameters replaced");
                Ok(vec![Event::GovernanceParametersUpdated(params)])
            }
            ExecutionAction::TreasuryExpenditure(mut request) => {
                request.proposal_id = Some(proposal.proposal_id);
                let executed = self.proposals.get(proposal.proposal_id)?.clone();
                let record = self.update_treasury(|t| {
                    t.record_expenditure(request, Some(&executed), tx_hash, now)
                })?;
                Ok(vec![Event::TreasuryExpenditure(record)])
            }
            ExecutionAction::Signal => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::command::{Command, Outcome};
    use crate::state::EngineState;
    use crate::Config;
    use chrono::{Duration, Utc};
    use governance::{
        ExecutionAction, ExpenditureRequest, ExpenditureType, GovernanceParameters, ProposalDraft,
        ProposalId, ProposalStatus, ProposalType,
    };
    use ledger_core::{Address, Amount, ErrorCode, Percent};

    fn params() -> GovernanceParameters {
        GovernanceParameters {
            proposal_threshold: Amount::new(10),
            voting_period: 3600,
            execution_delay: 600,
            passing_threshold: Percent::from_int(60).unwrap(),
            quorum_threshold: Percent::from_int(20).unwrap(),
            emergency_threshold: Percent::from_int(75).unwrap(),
            emergency_execution_delay: 0,
            max_proposals: 5,
            proposal_cooldown: 0,
        }
    }

    fn spend(amount: u128) -> ProposalDraft {
        ProposalDraft {
            title: "Fund audit".to_string(),
            description: "Security audit of the router".to_string(),
            proposal_type: ProposalType::TreasuryManagement,
            options: Vec::new(),
            execution_action: Some(ExecutionAction::TreasuryExpenditure(ExpenditureRequest {
                expenditure_type: ExpenditureType::Development,
                amount: Amount::new(amount),
                asset: Address::from_seed(500),
                recipient: Address::from_seed(501),
                reason: "audit".to_string(),
                proposal_id: None,
            })),
            authorized_value: Amount::ZERO,
            related_pools: Vec::new(),
        }
    }

    fn passed(
        state: &mut EngineState,
        draft: ProposalDraft,
        start: chrono::DateTime<Utc>,
    ) -> ProposalId {
        let voter = Address::from_seed(1);
        state
            .process(
                Command::SyncBalance {
                    user: voter.clone(),
                    token_balance: Amount::new(1000),
                    staked_balance: Amount::ZERO,
                },
                start,
            )
            .result
            .unwrap();
        let created = state
            .process(
                Command::CreateProposal {
                    proposer: voter.clone(),
                    draft: Box::new(draft),
                },
                start,
            )
            .result
            .unwrap();
        let id = match created.outcome {
            Outcome::ProposalCreated(p) => p.proposal_id,
            other => panic!("unexpected outcome {:?}", other),
        };
        state
            .process(
                Command::CastVote {
                    voter,
                    proposal_id: id,
                    selected_options: vec!["for".to_string()],
                    reason: None,
                },
                start,
            )
            .result
            .unwrap();
        id
    }

    #[test]
    fn test_treasury_proposal_executes_once() {
        let config = Config {
            governance: params(),
            ..Config::default()
        };
        let mut state = EngineState::new(&config).unwrap();
        let start = Utc::now();
        let id = passed(&mut state, spend(1_000), start);

        let early = state
            .process(
                Command::ExecuteProposal {
                    caller: Address::from_seed(2),
                    proposal_id: id,
                },
                start + Duration::seconds(3600),
            )
            .result
            .unwrap_err();
        assert_eq!(early.reason(), "EXECUTION_DELAY_PENDING");

        let ready = start + Duration::seconds(4200);
        let executed = state
            .process(
                Command::ExecuteProposal {
                    caller: Address::from_seed(2),
                    proposal_id: id,
                },
                ready,
            )
            .result
            .unwrap();
        assert_eq!(state.proposals().get(id).unwrap().status, ProposalStatus::Executed);
        assert_eq!(state.treasury().spent_under(id), Amount::new(1_000));
        assert_eq!(
            state.proposals().get(id).unwrap().execution_tx_hash,
            Some(executed.receipt.transaction_hash)
        );

        let again = state
            .process(
                Command::ExecuteProposal {
                    caller: Address::from_seed(2),
                    proposal_id: id,
                },
                ready,
            )
            .result
            .unwrap_err();
        assert_eq!(again.code(), ErrorCode::ResourceConflict);
    }

    #[test]
    fn test_failed_preflight_leaves_proposal_succeeded() {
        let config = Config {
            governance: params(),
            ..Config::default()
        };
        let mut state = EngineState::new(&config).unwrap();
        let start = Utc::now();
        // Development is allocated 300k in the default genesis
        let id = passed(&mut state, spend(900_000), start);

        let err = state
            .process(
                Command::ExecuteProposal {
                    caller: Address::from_seed(2),
                    proposal_id: id,
                },
                start + Duration::seconds(4200),
            )
            .result
            .unwrap_err();
        assert_eq!(err.reason(), "CATEGORY_CAP_EXCEEDED");
        let proposal = state.proposals().get(id).unwrap();
        assert_eq!(proposal.status, ProposalStatus::Succeeded);
        assert!(!proposal.is_executed);
        assert!(state.treasury().expenditures().is_empty());
    }
}
