//! In-process publisher

use crate::{
    message::Message,
    metrics::EVENT_PUBLISH_TOTAL,
    subscriber::Subscriber,
    types::Channel,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default per-channel buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Bus configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Messages buffered per channel before slow subscribers start lagging
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Fan-out bus with one broadcast channel per [`Channel`]
///
/// Publishing never blocks and never fails: a message with no subscribers
/// is dropped, and a subscriber that falls more than `channel_capacity`
/// messages behind loses the oldest ones.
#[derive(Debug, Clone)]
pub struct EventBus {
    senders: Arc<[broadcast::Sender<Arc<Message>>; 5]>,
}

impl EventBus {
    /// Create new bus
    pub fn new(config: BusConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let senders = Channel::ALL.map(|_| broadcast::channel(capacity).0);
        Self {
            senders: Arc::new(senders),
        }
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<Arc<Message>> {
        &self.senders[channel.index()]
    }

    /// Publish message. Returns how many subscribers will see it.
    pub fn publish(&self, message: Message) -> usize {
        let channel = message.channel;
        trace!(
            "Publishing message {} ({}) to {}",
            message.id, message.event_type, channel
        );

        match self.sender(channel).send(Arc::new(message)) {
            Ok(receivers) => {
                EVENT_PUBLISH_TOTAL
                    .with_label_values(&[channel.as_str(), "delivered"])
                    .inc();
                receivers
            }
            Err(_) => {
                EVENT_PUBLISH_TOTAL
                    .with_label_values(&[channel.as_str(), "no_subscribers"])
                    .inc();
                0
            }
        }
    }

    /// Publish in order
    pub fn publish_all(&self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages.into_iter().map(|m| self.publish(m)).sum()
    }

    /// Subscribe to one channel
    pub fn subscribe(&self, channel: Channel) -> Subscriber {
        debug!("New subscriber on {}", channel);
        Subscriber::new(channel, self.sender(channel).subscribe())
    }

    /// Current subscriber count of a channel
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.sender(channel).receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::Delivery;
    use chrono::Utc;
    use serde_json::json;

    fn msg(channel: Channel, n: u64) -> Message {
        Message::new(channel, "test", n.to_string(), json!({ "n": n }), Utc::now())
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = EventBus::default();
        let mut a = bus.subscribe(Channel::PoolUpdates);
        let mut b = bus.subscribe(Channel::PoolUpdates);

        assert_eq!(bus.publish(msg(Channel::PoolUpdates, 1)), 2);

        for sub in [&mut a, &mut b] {
            match sub.recv().await.unwrap() {
                Delivery::Message(m) => assert_eq!(m.data["n"], 1),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = EventBus::default();
        let mut votes = bus.subscribe(Channel::VoteUpdates);

        bus.publish(msg(Channel::PoolUpdates, 1));
        bus.publish(msg(Channel::VoteUpdates, 2));

        match votes.recv().await.unwrap() {
            Delivery::Message(m) => assert_eq!(m.channel, Channel::VoteUpdates),
            other => panic!("unexpected {:?}", other),
        }
        assert!(votes.try_recv().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(msg(Channel::AnalyticsUpdates, 1)), 0);
        assert_eq!(bus.subscriber_count(Channel::AnalyticsUpdates), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let bus = EventBus::new(BusConfig { channel_capacity: 2 });
        let mut slow = bus.subscribe(Channel::LiquidityUpdates);

        bus.publish_all((1..=5).map(|n| msg(Channel::LiquidityUpdates, n)));

        assert!(matches!(slow.recv().await.unwrap(), Delivery::Lagged(3)));
        match slow.recv().await.unwrap() {
            Delivery::Message(m) => assert_eq!(m.data["n"], 4),
            other => panic!("unexpected {:?}", other),
        }
    }
}
