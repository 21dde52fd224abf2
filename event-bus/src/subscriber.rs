//! Channel subscriber

use crate::{
    message::Message,
    metrics::{EVENT_LAGGED_TOTAL, EVENT_PROCESS_DURATION, EVENT_RECEIVE_TOTAL},
    types::Channel,
    Error, Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{error, info, warn};

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle incoming message
    async fn handle(&self, message: Arc<Message>) -> Result<()>;
}

/// What a receive produced
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Next message
    Message(Arc<Message>),
    /// This many oldest messages were dropped before the next one
    Lagged(u64),
}

/// Receiving end of one channel
#[derive(Debug)]
pub struct Subscriber {
    channel: Channel,
    receiver: broadcast::Receiver<Arc<Message>>,
}

impl Subscriber {
    pub(crate) fn new(channel: Channel, receiver: broadcast::Receiver<Arc<Message>>) -> Self {
        Self { channel, receiver }
    }

    /// Channel subscribed to
    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn lagged(&self, skipped: u64) -> Delivery {
        warn!("Subscriber on {} lagged, {} messages dropped", self.channel, skipped);
        EVENT_LAGGED_TOTAL
            .with_label_values(&[self.channel.as_str()])
            .inc_by(skipped as f64);
        Delivery::Lagged(skipped)
    }

    /// Wait for the next delivery
    pub async fn recv(&mut self) -> Result<Delivery> {
        match self.receiver.recv().await {
            Ok(message) => {
                EVENT_RECEIVE_TOTAL
                    .with_label_values(&[self.channel.as_str(), "received"])
                    .inc();
                Ok(Delivery::Message(message))
            }
            Err(RecvError::Lagged(skipped)) => Ok(self.lagged(skipped)),
            Err(RecvError::Closed) => Err(Error::Closed(self.channel)),
        }
    }

    /// Next delivery if one is ready
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.receiver.try_recv() {
            Ok(message) => Some(Delivery::Message(message)),
            Err(TryRecvError::Lagged(skipped)) => Some(self.lagged(skipped)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Feed every message to `handler` until the bus is dropped
    pub async fn run<H>(mut self, handler: Arc<H>)
    where
        H: MessageHandler + 'static,
    {
        info!("Subscriber loop started on {}", self.channel);
        loop {
            let message = match self.recv().await {
                Ok(Delivery::Message(m)) => m,
                Ok(Delivery::Lagged(_)) => continue,
                Err(_) => break,
            };

            let start = Instant::now();
            let status = match handler.handle(message.clone()).await {
                Ok(()) => "success",
                Err(e) => {
                    error!("Handler failed for message {}: {}", message.id, e);
                    "error"
                }
            };
            EVENT_PROCESS_DURATION
                .with_label_values(&[self.channel.as_str()])
                .observe(start.elapsed().as_secs_f64());
            EVENT_RECEIVE_TOTAL
                .with_label_values(&[self.channel.as_str(), status])
                .inc();
        }
        info!("Subscriber loop on {} stopped", self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::EventBus;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: Arc<Message>) -> Result<()> {
            self.seen.lock().await.push(message.key.clone());
            if message.key == "bad" {
                return Err(Error::Handler("rejected".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_until_bus_dropped() {
        let bus = EventBus::default();
        let sub = bus.subscribe(Channel::ProposalUpdates);
        let recorder = Arc::new(Recorder::default());
        let task = tokio::spawn(sub.run(recorder.clone()));

        for key in ["1", "bad", "2"] {
            let channel = Channel::ProposalUpdates;
            bus.publish(Message::new(channel, "status", key, json!({}), Utc::now()));
        }
        drop(bus);
        task.await.unwrap();

        assert_eq!(*recorder.seen.lock().await, vec!["1", "bad", "2"]);
    }
}
