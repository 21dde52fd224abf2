//! Fee Governance Engine
//!
//! Ties the pool registry, analytics, voting-power ledger, proposal book and
//! treasury together behind one command interface.
//!
//! # Architecture
//!
//! - **Single writer**: one actor task applies commands in mailbox order
//! - **Concurrent reads**: handles read the last committed state under a `RwLock`
//! - **Lazy time**: voting windows and cooldowns are evaluated at the next command
//! - **Events after commit**: every change is published on the event bus
//!
//! Every command returns `Result<CommandResult, ApiError>`; nothing unwinds
//! across the command boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod actor;
pub mod api;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
mod execution;
pub mod metrics;
pub mod state;

pub use actor::{spawn_engine, EngineActor, EngineHandle, EngineMessage, PendingCommand};
pub use api::{ApiError, ApiResponse, Method, Page, Route, TxReceipt, TxStatus, ROUTES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandResult, Outcome};
pub use config::{AnalyticsConfig, Config, EventBusConfig, LoggingConfig};
pub use error::{Error, Result};
pub use event::Event;
pub use state::{EngineState, Processed};
