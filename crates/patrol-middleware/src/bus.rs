//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message without any single subscriber blocking the publisher.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::StateMachine`] | State entry/exit and status changes |
//! | [`Topic::Requests`] | Patrol requests accepted by the dispatcher |
//! | [`Topic::Navigation`] | Navigation goal results |
//!
//! Every event is also mirrored onto a firehose channel, see
//! [`EventBus::subscribe_all`].

use patrol_types::Event;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// State entry/exit and agent status changes.
    StateMachine,
    /// Incoming patrol requests.
    Requests,
    /// Navigation goal results.
    Navigation,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    firehose: broadcast::Sender<Event>,
    state_machine: broadcast::Sender<Event>,
    requests: broadcast::Sender<Event>,
    navigation: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every channel independently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a Tokio broadcast restriction).
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        let (state_machine, _) = broadcast::channel(capacity);
        let (requests, _) = broadcast::channel(capacity);
        let (navigation, _) = broadcast::channel(capacity);
        Self {
            firehose,
            state_machine,
            requests,
            navigation,
        }
    }

    /// Publish `event` to `topic` and to the firehose.
    ///
    /// Returns the number of topic subscribers handed the event.  Having no
    /// subscribers is the normal headless condition and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        let _ = self.firehose.send(event.clone());
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "no subscribers on topic");
                0
            }
        }
    }

    /// Subscribe to a single [`Topic`].
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe_all(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.firehose.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::StateMachine => &self.state_machine,
            Topic::Requests => &self.requests,
            Topic::Navigation => &self.navigation,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to one topic, or to the firehose.
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped.  The caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The topic this receiver is bound to; `None` for the firehose.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}
