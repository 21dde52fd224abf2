//! In-process event bus
//!
//! Fan-out pub/sub over the five push channels:
//! - One broadcast channel per [`Channel`], any number of subscribers
//! - Non-blocking publish; messages without subscribers are dropped
//! - Lagging subscribers lose the oldest messages and are told how many
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use error::{Error, Result};
pub use message::Message;
pub use publisher::{BusConfig, EventBus, DEFAULT_CHANNEL_CAPACITY};
pub use subscriber::{Delivery, MessageHandler, Subscriber};
pub use types::Channel;
