//! Publish/subscribe fanout distributing lobby events across instances.
//!
//! One logical topic per lobby code. The in-memory implementation backs a
//! single process; a broker-backed implementation (e.g. Redis pub/sub) can
//! slot in behind the same trait without touching the core, which is why
//! the topic naming keeps the `lobby:{CODE}:events` convention.

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::dto::event::EventEnvelope;

/// Result alias for fanout operations.
pub type FanoutResult<T> = Result<T, FanoutError>;

/// Error raised by fanout backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// The backend rejected the publish.
    #[error("fanout publish failed: {0}")]
    Publish(String),
}

/// Topic name for a lobby's event channel.
pub fn lobby_topic(code: &str) -> String {
    format!("lobby:{code}:events")
}

/// Abstraction over the pub/sub transport for lobby events.
///
/// Events published to one topic are delivered to its subscribers in publish
/// order; no ordering holds across topics.
pub trait FanoutChannel: Send + Sync {
    /// Publish an event to a topic, returning the number of subscribers
    /// that received it.
    fn publish(&self, topic: String, event: EventEnvelope)
    -> BoxFuture<'static, FanoutResult<usize>>;

    /// Register a new subscriber for a topic.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<EventEnvelope>;

    /// Drop a topic and disconnect its subscribers (lobby teardown).
    fn drop_topic(&self, topic: &str);
}

/// In-process fanout backed by one Tokio broadcast channel per topic.
pub struct InMemoryFanout {
    topics: DashMap<String, broadcast::Sender<EventEnvelope>>,
    capacity: usize,
}

impl InMemoryFanout {
    /// Create a fanout whose per-topic channels hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<EventEnvelope> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl FanoutChannel for InMemoryFanout {
    fn publish(
        &self,
        topic: String,
        event: EventEnvelope,
    ) -> BoxFuture<'static, FanoutResult<usize>> {
        let sender = self.sender_for(&topic);
        Box::pin(async move {
            // A send error only means nobody is subscribed right now.
            Ok(sender.send(event).unwrap_or(0))
        })
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<EventEnvelope> {
        self.sender_for(topic).subscribe()
    }

    fn drop_topic(&self, topic: &str) {
        self.topics.remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use crate::dto::event::ServerEvent;

    use super::*;

    fn event(total_questions: usize) -> EventEnvelope {
        EventEnvelope::broadcast(ServerEvent::GameStarted { total_questions })
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let fanout = InMemoryFanout::new(16);
        let topic = lobby_topic("ABCD");
        let mut rx = fanout.subscribe(&topic);

        for n in 1..=3 {
            fanout.publish(topic.clone(), event(n)).await.unwrap();
        }

        for expected in 1..=3 {
            match rx.recv().await.unwrap().event {
                ServerEvent::GameStarted { total_questions } => {
                    assert_eq!(total_questions, expected)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let fanout = InMemoryFanout::new(16);
        let mut abcd = fanout.subscribe(&lobby_topic("ABCD"));
        let _wxyz = fanout.subscribe(&lobby_topic("WXYZ"));

        fanout
            .publish(lobby_topic("WXYZ"), event(5))
            .await
            .unwrap();

        assert!(matches!(
            abcd.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_reports_zero() {
        let fanout = InMemoryFanout::new(16);
        let delivered = fanout
            .publish(lobby_topic("ABCD"), event(1))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn dropping_a_topic_closes_its_subscribers() {
        let fanout = InMemoryFanout::new(16);
        let topic = lobby_topic("ABCD");
        let mut rx = fanout.subscribe(&topic);

        fanout.drop_topic(&topic);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
