//! Single-owner broadcast hub
//!
//! A `Hub` fans one publisher feed out to any number of subscriber feeds. The
//! subscriber set lives inside a control loop task; callers talk to it through
//! a bounded command channel, so publish, subscribe, unsubscribe and shutdown
//! are totally ordered without any shared lock.
//!
//! # Backpressure
//!
//! Each feed buffers `HubConfig::feed_capacity` payloads. When a feed is full
//! the control loop waits on it, which stalls delivery to every other feed of
//! the same hub until the slow reader catches up, is unsubscribed, or the hub
//! shuts down. Publishers see this as `publish().await` taking longer.
//!
//! ```text
//!   publish ──►┌──────────────┐──► feed 1 ──► Subscription
//!   subscribe ►│ control loop │──► feed 2 ──► Subscription
//! unsubscribe ►│  (one task)  │──► feed N ──► Subscription
//!    shutdown ►└──────────────┘
//! ```

mod actor;
pub mod config;
pub mod error;
pub mod subscription;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use actor::{Command, HubActor};

pub use config::HubConfig;
pub use error::HubError;
pub use subscription::{SubscriberId, Subscription};

/// Handle to a broadcast hub
///
/// Cloning the handle shares the same control loop. The loop stops on
/// `shutdown()` or once every handle has been dropped; either way every
/// remaining feed is closed.
pub struct Hub<T> {
    commands: mpsc::Sender<Command<T>>,
    active: Arc<AtomicUsize>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Create a hub with default configuration
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration and start its control loop
    pub fn with_config(config: HubConfig) -> Self {
        // Fields can be set directly, bypassing the clamping setters
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let active = Arc::new(AtomicUsize::new(0));

        let actor = HubActor::new(rx, config.feed_capacity.max(1), Arc::clone(&active));
        tokio::spawn(actor.run());

        Self {
            commands: tx,
            active,
        }
    }

    /// Deliver `payload` to every currently registered subscriber
    ///
    /// Resolves once every feed has accepted the payload (or was removed while
    /// delivery waited on it). Fails with `HubError::Closed` if the hub stops
    /// before delivery completes.
    pub async fn publish(&self, payload: T) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Publish {
            payload,
            delivered: tx,
        })
        .await?;

        rx.await.map_err(|_| HubError::Closed)
    }

    /// Register a new feed; it sees only payloads published after this returns
    pub async fn subscribe(&self) -> Result<Subscription<T>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Subscribe { reply: tx }).await?;

        rx.await.map_err(|_| HubError::Closed)
    }

    /// Remove a feed and close it
    ///
    /// Once this returns nothing more will be delivered to `subscription`.
    /// Unknown handles are ignored, and a stopped hub has already closed
    /// every feed, so this never fails.
    pub async fn unsubscribe(&self, subscription: &Subscription<T>) {
        let (tx, rx) = oneshot::channel();
        let command = Command::Unsubscribe {
            id: subscription.id(),
            done: tx,
        };

        if self.send(command).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Number of registered feeds right now
    pub fn active_subscribers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the control loop and close every remaining feed
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.send(Command::Shutdown).await;
    }

    /// Whether the control loop has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command<T>) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Closed)
    }
}

impl<T: Clone + Send + 'static> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready_ok, task};

    use super::*;

    async fn recv_within(sub: &mut Subscription<u32>) -> Option<u32> {
        timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for payload")
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let hub = Hub::new();
        let mut a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();

        assert_ok!(hub.publish(7).await);

        assert_eq!(recv_within(&mut a).await, Some(7));
        assert_eq!(recv_within(&mut b).await, Some(7));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub: Hub<u32> = Hub::new();

        assert_ok!(hub.publish(1).await);
        assert_eq!(hub.active_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_sees_only_later_payloads() {
        let hub = Hub::new();
        let mut early = hub.subscribe().await.unwrap();

        hub.publish(1).await.unwrap();
        let mut late = hub.subscribe().await.unwrap();
        hub.publish(2).await.unwrap();

        assert_eq!(recv_within(&mut early).await, Some(1));
        assert_eq!(recv_within(&mut early).await, Some(2));
        assert_eq!(recv_within(&mut late).await, Some(2));
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_zero_capacities_set_directly() {
        let hub = Hub::with_config(HubConfig {
            feed_capacity: 0,
            command_capacity: 0,
        });
        let mut sub = hub.subscribe().await.unwrap();

        assert_ok!(hub.publish(4).await);
        assert_eq!(recv_within(&mut sub).await, Some(4));
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let hub = Hub::with_config(HubConfig::default().feed_capacity(8));
        let mut sub = hub.subscribe().await.unwrap();

        for i in 0..5 {
            hub.publish(i).await.unwrap();
        }

        for i in 0..5 {
            assert_eq!(recv_within(&mut sub).await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_feed() {
        let hub = Hub::new();
        let mut sub = hub.subscribe().await.unwrap();
        assert_eq!(hub.active_subscribers(), 1);

        hub.unsubscribe(&sub).await;
        assert_eq!(hub.active_subscribers(), 0);

        hub.publish(9).await.unwrap();

        // Closed and empty: no payload after unsubscribe
        assert_eq!(recv_within(&mut sub).await, None);
        assert!(sub.is_closed());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_handle_is_noop() {
        let hub = Hub::new();
        let other: Hub<u32> = Hub::new();
        let _kept = hub.subscribe().await.unwrap();
        let stranger = other.subscribe().await.unwrap();

        hub.unsubscribe(&stranger).await;

        assert_eq!(hub.active_subscribers(), 1);
        assert_eq!(other.active_subscribers(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_unsubscribe_count() {
        let hub: Hub<u32> = Hub::new();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move { hub.subscribe().await.unwrap() }));
        }

        let mut subs = Vec::new();
        for task in tasks {
            subs.push(task.await.unwrap());
        }
        assert_eq!(hub.active_subscribers(), 20);

        let removed: Vec<_> = subs.drain(..7).collect();
        let mut tasks = Vec::new();
        for sub in removed {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move { hub.unsubscribe(&sub).await }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.active_subscribers(), 13);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_count_includes_subscriber_once_subscribed() {
        let hub: Hub<u32> = Hub::new();

        for round in 1..=200 {
            let handle = hub.clone();
            let (sub, seen) = tokio::spawn(async move {
                let sub = handle.subscribe().await.unwrap();
                (sub, handle.active_subscribers())
            })
            .await
            .unwrap();

            assert_eq!(seen, 1, "round {}", round);
            hub.unsubscribe(&sub).await;
        }
    }

    #[tokio::test]
    async fn test_abandoned_subscribe_not_counted() {
        let hub: Hub<u32> = Hub::new();

        let mut pending = task::spawn(hub.subscribe());
        assert_pending!(pending.poll());
        drop(pending);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.active_subscribers(), 0);
        assert_ok!(hub.publish(1).await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_feeds() {
        let hub: Hub<u32> = Hub::new();
        let mut a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();

        hub.shutdown().await;

        assert_eq!(recv_within(&mut a).await, None);
        assert_eq!(recv_within(&mut b).await, None);
        assert_eq!(hub.active_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_operations_after_shutdown() {
        let hub: Hub<u32> = Hub::new();
        let sub = hub.subscribe().await.unwrap();

        hub.shutdown().await;
        hub.shutdown().await;

        assert_err!(hub.publish(1).await);
        assert_eq!(hub.subscribe().await.unwrap_err(), HubError::Closed);
        hub.unsubscribe(&sub).await;
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_subscription_does_not_block_others() {
        let hub = Hub::new();
        let dropped = hub.subscribe().await.unwrap();
        let mut kept = hub.subscribe().await.unwrap();
        drop(dropped);

        hub.publish(3).await.unwrap();

        assert_eq!(recv_within(&mut kept).await, Some(3));
        assert_eq!(hub.active_subscribers(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_stalls_until_unsubscribed() {
        let hub = Hub::new();
        let mut stalled = hub.subscribe().await.unwrap();
        let mut reader = hub.subscribe().await.unwrap();

        // Fills the single slot of both feeds
        hub.publish(1).await.unwrap();
        assert_eq!(recv_within(&mut reader).await, Some(1));

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(2).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!publisher.is_finished());

        hub.unsubscribe(&stalled).await;

        let result = timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publish still blocked")
            .unwrap();
        assert_ok!(result);

        assert_eq!(recv_within(&mut reader).await, Some(2));

        // The payload accepted before unsubscribing is still readable, then the feed ends
        assert_eq!(recv_within(&mut stalled).await, Some(1));
        assert_eq!(recv_within(&mut stalled).await, None);
    }

    #[tokio::test]
    async fn test_publish_pending_until_reader_drains() {
        let hub = Hub::new();
        let mut sub = hub.subscribe().await.unwrap();
        hub.publish(1).await.unwrap();

        let mut publish = task::spawn(hub.publish(2));
        assert_pending!(publish.poll());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_pending!(publish.poll());

        assert_eq!(recv_within(&mut sub).await, Some(1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(publish.is_woken());
        assert_ready_ok!(publish.poll());
        assert_eq!(recv_within(&mut sub).await, Some(2));
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_publish() {
        let hub = Hub::new();
        let _stalled = hub.subscribe().await.unwrap();
        hub.publish(1).await.unwrap();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(2).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        hub.shutdown().await;

        let result = timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publish still blocked")
            .unwrap();
        assert_eq!(result, Err(HubError::Closed));
    }
}
