//! # Event Bus System
//!
//! Broadcasts playback notifications to any number of observers using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────┐  now_playing / stop  ┌──────────┐   subscribe   ┌────────────┐
//! │ Coordinator ├─────────────────────>│ EventBus ├──────────────>│ Subscriber │
//! └─────────────┘                      └──────────┘               └────────────┘
//! ```
//!
//! [`EventBus`] implements [`NotificationSink`], so the coordinator publishes
//! without knowing who listens. Publishing never blocks; with no subscribers
//! the notification is simply dropped.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::events::{EventBus, EventStream};
//!
//! let bus = EventBus::default();
//! let mut roon_only = EventStream::new(bus.subscribe())
//!     .filter(|n| n.source.as_str() == "roon");
//!
//! tokio::spawn(async move {
//!     while let Ok(notification) = roon_only.recv().await {
//!         println!("{}", serde_json::to_string(&notification).unwrap());
//!     }
//! });
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   notifications. Keep receiving; late joiners can ask the coordinator for
//!   the current snapshot.
//! - **`RecvError::Closed`**: every sender was dropped.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::notify::{NotificationSink, PlaybackNotification};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, Receiver};
use tracing::trace;

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Broadcast channel for playback notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlaybackNotification>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of notifications buffered per subscriber
    /// before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes to all current subscribers, returning how many received it.
    pub fn emit(&self, notification: PlaybackNotification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Each call creates an independent receiver for future notifications.
    pub fn subscribe(&self) -> Receiver<PlaybackNotification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl NotificationSink for EventBus {
    fn broadcast(&self, notification: PlaybackNotification) -> BridgeResult<()> {
        let kind = notification.kind;
        let receivers = self.emit(notification);
        trace!(?kind, receivers, "Notification published");
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type NotificationFilter = Box<dyn Fn(&PlaybackNotification) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<PlaybackNotification>,
    filter: Option<NotificationFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<PlaybackNotification>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only notifications matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlaybackNotification) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, notification: &PlaybackNotification) -> bool {
        self.filter.as_ref().map_or(true, |f| f(notification))
    }

    /// Receives the next notification that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`,
    /// `RecvError::Closed` once all senders are gone.
    pub async fn recv(&mut self) -> Result<PlaybackNotification, RecvError> {
        loop {
            let notification = self.receiver.recv().await?;
            if self.matches(&notification) {
                return Ok(notification);
            }
        }
    }

    /// Non-blocking receive. `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<PlaybackNotification, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => {
                    if self.matches(&notification) {
                        return Some(Ok(notification));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
