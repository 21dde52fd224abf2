//! Single-writer engine actor
//!
//! ```text
//!   EngineHandle (Clone) ── mpsc (bounded) ──▶ EngineActor (one task)
//!          │                                        │
//!          │ read()                                  │ write()
//!          ▼                                        ▼
//!      RwLock<EngineState> ◀────────────────────────┘
//!                                                   │
//!                                                   ▼ publish after commit
//!                                               EventBus
//! ```
//!
//! Commands are applied strictly in mailbox order, so per-entity history
//! is appended in arrival order. Reads take the read lock and see the last
//! committed state. A submitted command can be cancelled until the actor
//! dequeues it.

use crate::api::{ApiError, Page};
use crate::clock::Clock;
use crate::command::{Command, CommandResult};
use crate::event::Event;
use crate::metrics::{ENGINE_COMMANDS_TOTAL, ENGINE_COMMAND_DURATION, ENGINE_EVENTS_PUBLISHED_TOTAL};
use crate::state::EngineState;
use crate::{Config, Error, Result};
use chrono::{DateTime, Utc};
use event_bus::{BusConfig, Channel, EventBus, Subscriber};
use fee_engine::{
    AnalyticsPeriod, FeeAdjustmentRecord, GlobalStats, LiquidityPosition, MetricKind, Pool,
    PoolAnalytics, PoolFilter, PoolMetrics, PositionId, DEFAULT_PAGE_SIZE,
};
use governance::{
    Delegation, GovernanceParameters, GovernanceStats, Proposal, ProposalFilter, ProposalId,
    Treasury, Vote, VotingPower,
};
use ledger_core::Address;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Message sent to the engine actor
#[derive(Debug)]
pub enum EngineMessage {
    /// Apply a command
    Apply {
        /// Command
        command: Command,
        /// Set by the caller to withdraw the command before it is applied
        cancelled: Arc<AtomicBool>,
        /// Reply
        response: oneshot::Sender<Result<CommandResult>>,
    },

    /// Stop after the messages already queued ahead of this one
    Shutdown,
}

/// Actor that owns all writes
pub struct EngineActor {
    state: Arc<RwLock<EngineState>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    mailbox: mpsc::Receiver<EngineMessage>,
}

impl EngineActor {
    /// Create new actor
    pub fn new(
        state: Arc<RwLock<EngineState>>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        mailbox: mpsc::Receiver<EngineMessage>,
    ) -> Self {
        Self {
            state,
            bus,
            clock,
            mailbox,
        }
    }

    /// Run the actor loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Engine actor started");
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                EngineMessage::Shutdown => break,
                EngineMessage::Apply {
                    command,
                    cancelled,
                    response,
                } => self.handle(command, &cancelled, response),
            }
        }
        info!("Engine actor stopped");
    }

    fn handle(
        &self,
        command: Command,
        cancelled: &AtomicBool,
        response: oneshot::Sender<Result<CommandResult>>,
    ) {
        let kind = command.kind();
        if cancelled.load(Ordering::Acquire) || response.is_closed() {
            debug!(command = kind, "Command cancelled before apply");
            ENGINE_COMMANDS_TOTAL.with_label_values(&[kind, "cancelled"]).inc();
            let _ = response.send(Err(Error::Cancelled));
            return;
        }

        let timer = ENGINE_COMMAND_DURATION.with_label_values(&[kind]).start_timer();
        let now = self.clock.now();
        let processed = self.state.write().process(command, now);
        timer.observe_duration();

        match &processed.result {
            Ok(result) => {
                ENGINE_COMMANDS_TOTAL.with_label_values(&[kind, "success"]).inc();
                self.publish(&result.events, now);
            }
            Err(e) => {
                ENGINE_COMMANDS_TOTAL.with_label_values(&[kind, "failed"]).inc();
                warn!(
                    command = kind,
                    code = e.code().as_u16(),
                    reason = e.reason(),
                    error = %e,
                    "Command rejected"
                );
                self.publish(&processed.swept, now);
            }
        }

        let _ = response.send(processed.result);
    }

    fn publish(&self, events: &[Event], now: DateTime<Utc>) {
        for event in events {
            match event.to_message(now) {
                Ok(message) => {
                    let channel = message.channel;
                    self.bus.publish(message);
                    ENGINE_EVENTS_PUBLISHED_TOTAL
                        .with_label_values(&[channel.as_str()])
                        .inc();
                }
                Err(e) => error!(event = event.event_type(), error = %e, "Failed to encode event"),
            }
        }
    }
}

/// Command awaiting its turn in the mailbox
#[derive(Debug)]
pub struct PendingCommand {
    cancelled: Arc<AtomicBool>,
    response: oneshot::Receiver<Result<CommandResult>>,
}

impl PendingCommand {
    /// Withdraw the command. Has no effect once the actor has applied it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Wait for the result
    pub async fn wait(self) -> std::result::Result<CommandResult, ApiError> {
        match self.response.await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(Error::Unavailable("engine dropped the command".to_string()).into()),
        }
    }
}

/// Handle to the engine (cloneable)
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
    state: Arc<RwLock<EngineState>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.sender.is_closed())
            .field("clock", &self.clock)
            .finish()
    }
}

fn mailbox_closed() -> ApiError {
    Error::Unavailable("engine mailbox closed".to_string()).into()
}

impl EngineHandle {
    /// Queue a command without waiting for its result
    pub async fn submit(&self, command: Command) -> std::result::Result<PendingCommand, ApiError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(EngineMessage::Apply {
                command,
                cancelled: cancelled.clone(),
                response: tx,
            })
            .await
            .map_err(|_| mailbox_closed())?;

        Ok(PendingCommand {
            cancelled,
            response: rx,
        })
    }

    /// Apply a command and wait for its result
    pub async fn apply(&self, command: Command) -> std::result::Result<CommandResult, ApiError> {
        self.submit(command).await?.wait().await
    }

    /// Stop the actor. Commands queued before this call are still applied.
    pub async fn shutdown(&self) -> std::result::Result<(), ApiError> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| mailbox_closed())
    }

    /// Subscribe to a push channel
    pub fn subscribe(&self, channel: Channel) -> Subscriber {
        self.bus.subscribe(channel)
    }

    /// Current time as the engine sees it
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // Reads

    /// One pool
    pub fn pool(&self, address: &Address) -> std::result::Result<Pool, ApiError> {
        read(&self.state, |s| Ok(s.pools().get(address)?.clone()))
    }

    /// Filtered, sorted page of pools
    pub fn list_pools(&self, filter: &PoolFilter) -> Page<Pool> {
        let (items, total) = self.state.read().list_pools(filter, self.clock.now());
        Page::new(items, total, page_of(filter.page), size_of(filter.page_size))
    }

    /// Fee adjustment history of a pool, oldest first
    pub fn fee_history(
        &self,
        address: &Address,
    ) -> std::result::Result<Vec<FeeAdjustmentRecord>, ApiError> {
        read(&self.state, |s| {
            s.pools().get(address)?;
            Ok(s.pools().history(address).cloned().collect())
        })
    }

    /// One liquidity position
    pub fn position(&self, id: PositionId) -> std::result::Result<LiquidityPosition, ApiError> {
        read(&self.state, |s| Ok(s.pools().position(id)?))
    }

    /// Positions filtered by owner and/or pool
    pub fn positions(
        &self,
        user: Option<&Address>,
        pool: Option<&Address>,
    ) -> Vec<LiquidityPosition> {
        self.state.read().pools().positions(user, pool)
    }

    /// Headline metrics of a pool
    pub fn pool_metrics(&self, address: &Address) -> std::result::Result<PoolMetrics, ApiError> {
        let now = self.clock.now();
        read(&self.state, |s| {
            let pool = s.pools().get(address)?;
            Ok(s.analytics().pool_metrics(pool, now))
        })
    }

    /// Time series and summary of a pool over a period
    pub fn pool_analytics(
        &self,
        address: &Address,
        period: AnalyticsPeriod,
        metrics: &[MetricKind],
    ) -> std::result::Result<PoolAnalytics, ApiError> {
        let now = self.clock.now();
        read(&self.state, |s| {
            let pool = s.pools().get(address)?;
            Ok(s.analytics().pool_analytics(pool, period, metrics, now))
        })
    }

    /// Totals across all pools
    pub fn global_stats(&self) -> GlobalStats {
        let state = self.state.read();
        state.analytics().global_stats(state.pools().pools(), self.clock.now())
    }

    /// One proposal
    pub fn proposal(&self, id: ProposalId) -> std::result::Result<Proposal, ApiError> {
        read(&self.state, |s| Ok(s.proposals().get(id)?.clone()))
    }

    /// Filtered, sorted page of proposals
    pub fn list_proposals(&self, filter: &ProposalFilter) -> Page<Proposal> {
        let (items, total) = self.state.read().proposals().list(filter);
        Page::new(items, total, page_of(filter.page), size_of(filter.page_size))
    }

    /// Counted votes on a proposal
    pub fn votes(&self, id: ProposalId) -> std::result::Result<Vec<Vote>, ApiError> {
        read(&self.state, |s| Ok(s.proposals().votes(id)?))
    }

    /// An account's voting power
    pub fn voting_power(&self, user: &Address) -> std::result::Result<VotingPower, ApiError> {
        read(&self.state, |s| Ok(s.voting().snapshot(user)?))
    }

    /// Every delegation an account took part in, oldest first
    pub fn delegations(&self, user: &Address) -> Vec<Delegation> {
        self.state.read().voting().delegations().history(user).cloned().collect()
    }

    /// Governance parameters in force
    pub fn governance_parameters(&self) -> GovernanceParameters {
        self.state.read().params().clone()
    }

    /// Governance-wide statistics
    pub fn governance_stats(&self) -> GovernanceStats {
        let state = self.state.read();
        state.proposals().stats(state.voting())
    }

    /// Treasury snapshot
    pub fn treasury(&self) -> Treasury {
        self.state.read().treasury().clone()
    }
}

fn read<T>(
    state: &RwLock<EngineState>,
    f: impl FnOnce(&EngineState) -> Result<T>,
) -> std::result::Result<T, ApiError> {
    f(&state.read()).map_err(ApiError::from)
}

fn page_of(page: Option<usize>) -> usize {
    page.unwrap_or(1).max(1)
}

fn size_of(page_size: Option<usize>) -> usize {
    page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
}

/// Build the engine state and start the actor
pub fn spawn_engine(config: Config, clock: Arc<dyn Clock>) -> Result<EngineHandle> {
    let state = Arc::new(RwLock::new(EngineState::new(&config)?));
    let bus = EventBus::new(BusConfig {
        channel_capacity: config.event_bus.channel_capacity,
    });
    let (sender, mailbox) = mpsc::channel(config.mailbox_capacity);

    let actor = EngineActor::new(state.clone(), bus.clone(), clock.clone(), mailbox);
    tokio::spawn(actor.run());

    info!(
        service = %config.service_name,
        version = %config.service_version,
        guardians = config.guardians.len(),
        mailbox = config.mailbox_capacity,
        "Engine spawned"
    );

    Ok(EngineHandle {
        sender,
        state,
        bus,
        clock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::Outcome;
    use event_bus::Delivery;
    use ledger_core::{Amount, ErrorCode};

    fn sync(user: u64, balance: u128) -> Command {
        Command::SyncBalance {
            user: Address::from_seed(user),
            token_balance: Amount::new(balance),
            staked_balance: Amount::ZERO,
        }
    }

    #[tokio::test]
    async fn test_apply_and_read_back() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let handle = spawn_engine(Config::default(), clock).unwrap();

        let result = handle.apply(sync(1, 150)).await.unwrap();
        assert!(matches!(result.outcome, Outcome::BalanceSynced(_)));

        let power = handle.voting_power(&Address::from_seed(1)).unwrap();
        assert_eq!(power.total_voting_power, Amount::new(150));
    }

    #[tokio::test]
    async fn test_events_published_after_commit() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let handle = spawn_engine(Config::default(), clock).unwrap();
        let mut votes = handle.subscribe(Channel::VoteUpdates);

        handle.apply(sync(7, 10)).await.unwrap();

        match votes.recv().await.unwrap() {
            Delivery::Message(msg) => {
                assert_eq!(msg.event_type, "voting_power_updated");
                assert_eq!(msg.key, Address::from_seed(7).to_string());
            }
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_command_is_not_applied() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let state = Arc::new(RwLock::new(EngineState::new(&Config::default()).unwrap()));
        let (sender, mailbox) = mpsc::channel(8);
        let handle = EngineHandle {
            sender,
            state: state.clone(),
            bus: EventBus::default(),
            clock: clock.clone(),
        };

        // Queue before the actor runs so the cancel lands first
        let pending = handle.submit(sync(1, 100)).await.unwrap();
        pending.cancel();
        let actor = EngineActor::new(state, handle.bus.clone(), clock, mailbox);
        tokio::spawn(actor.run());

        let err = pending.wait().await.unwrap_err();
        assert_eq!(err.reason(), Some("COMMAND_CANCELLED"));
        assert_eq!(
            handle.voting_power(&Address::from_seed(1)).unwrap().total_voting_power,
            Amount::ZERO
        );
    }

    #[tokio::test]
    async fn test_closed_mailbox_is_unavailable() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let handle = spawn_engine(Config::default(), clock).unwrap();
        handle.shutdown().await.unwrap();

        // Either the send fails or the queued command is dropped with the mailbox
        let err = handle.apply(sync(1, 1)).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::ServiceUnavailable));
    }
}
