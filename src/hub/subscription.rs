//! Subscriber feeds handed out by the hub
//!
//! A `Subscription` is the receiving half of one subscriber feed. The hub keeps
//! the sending half; dropping it (on unsubscribe or shutdown) closes the feed.

use std::fmt;

use tokio::sync::mpsc;

/// Identity of a subscriber feed within one hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Live feed of payloads published after registration
///
/// Owned by the caller. Once the hub unregisters the feed, `recv()` drains any
/// payload already accepted and then returns `None`.
pub struct Subscription<T> {
    id: SubscriberId,
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub(super) fn new(id: SubscriberId, rx: mpsc::Receiver<T>) -> Self {
        Self { id, rx }
    }

    /// Identity used to unsubscribe this feed
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next payload
    ///
    /// Returns `None` once the feed has been closed by the hub.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take a payload if one is ready, without waiting
    pub fn try_recv(&mut self) -> Result<T, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Whether the hub has closed this feed
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.rx.is_closed())
            .finish()
    }
}
