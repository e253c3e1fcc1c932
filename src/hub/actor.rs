//! Hub control loop
//!
//! One task owns the subscriber set. Every mutation and every delivery happens
//! here, in the order the commands arrive, so nothing ever races with delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::subscription::{SubscriberId, Subscription};

/// Subscriber identities are unique across hubs so a stray handle never
/// matches a feed it does not own.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Messages accepted by the control loop
pub(super) enum Command<T> {
    Subscribe {
        reply: oneshot::Sender<Subscription<T>>,
    },
    Unsubscribe {
        id: SubscriberId,
        done: oneshot::Sender<()>,
    },
    Publish {
        payload: T,
        delivered: oneshot::Sender<()>,
    },
    Shutdown,
}

enum Flow {
    Continue,
    Stop,
}

/// State owned by the control loop task
pub(super) struct HubActor<T> {
    commands: mpsc::Receiver<Command<T>>,
    /// Commands that arrived while a delivery was waiting on a slow feed
    backlog: VecDeque<Command<T>>,
    feeds: HashMap<SubscriberId, mpsc::Sender<T>>,
    feed_capacity: usize,
    active: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> HubActor<T> {
    pub(super) fn new(
        commands: mpsc::Receiver<Command<T>>,
        feed_capacity: usize,
        active: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            commands,
            backlog: VecDeque::new(),
            feeds: HashMap::new(),
            feed_capacity,
            active,
        }
    }

    /// Run until shutdown or until every hub handle is dropped
    pub(super) async fn run(mut self) {
        while let Some(command) = self.next_command().await {
            if let Flow::Stop = self.apply(command).await {
                break;
            }
        }

        self.close_all();
    }

    async fn next_command(&mut self) -> Option<Command<T>> {
        match self.backlog.pop_front() {
            Some(command) => Some(command),
            None => self.commands.recv().await,
        }
    }

    async fn apply(&mut self, command: Command<T>) -> Flow {
        match command {
            Command::Subscribe { reply } => {
                self.register(reply);
                Flow::Continue
            }
            Command::Unsubscribe { id, done } => {
                self.remove(id);
                let _ = done.send(());
                Flow::Continue
            }
            Command::Publish { payload, delivered } => {
                let flow = self.deliver(payload).await;
                // An interrupted delivery is reported to the publisher as closed
                if let Flow::Continue = flow {
                    let _ = delivered.send(());
                }
                flow
            }
            Command::Shutdown => Flow::Stop,
        }
    }

    fn register(&mut self, reply: oneshot::Sender<Subscription<T>>) {
        let id = SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.feed_capacity);

        // Counted before the caller can observe its handle
        self.feeds.insert(id, tx);
        self.active.store(self.feeds.len(), Ordering::Release);

        // The caller may have stopped waiting for its handle
        if reply.send(Subscription::new(id, rx)).is_err() {
            self.feeds.remove(&id);
            self.active.store(self.feeds.len(), Ordering::Release);
            return;
        }

        tracing::debug!(
            subscriber = %id,
            subscribers = self.feeds.len(),
            "Subscriber added"
        );
    }

    /// Drop the feed's sender, which closes it for the reader
    fn remove(&mut self, id: SubscriberId) {
        if self.feeds.remove(&id).is_some() {
            self.active.store(self.feeds.len(), Ordering::Release);

            tracing::debug!(
                subscriber = %id,
                subscribers = self.feeds.len(),
                "Subscriber removed"
            );
        }
    }

    /// Hand `payload` to every registered feed, one at a time
    ///
    /// A full feed holds up the whole delivery. While waiting, unsubscribe and
    /// shutdown are still honoured; anything else is queued behind this payload.
    async fn deliver(&mut self, payload: T) -> Flow {
        let targets: Vec<SubscriberId> = self.feeds.keys().copied().collect();

        for id in targets {
            let released = {
                let Some(feed) = self.feeds.get(&id).cloned() else {
                    continue;
                };
                let send = feed.send(payload.clone());
                tokio::pin!(send);

                loop {
                    tokio::select! {
                        biased;

                        result = &mut send => {
                            if result.is_err() {
                                tracing::warn!(subscriber = %id, "Subscriber feed dropped, removing");
                                self.remove(id);
                            }
                            break None;
                        }
                        command = self.commands.recv() => match command {
                            Some(Command::Unsubscribe { id: target, done }) => {
                                self.remove(target);
                                if target == id {
                                    break Some(done);
                                }
                                let _ = done.send(());
                            }
                            Some(Command::Shutdown) | None => return Flow::Stop,
                            Some(other) => self.backlog.push_back(other),
                        },
                    }
                }
            };

            // Acknowledge only after the pending send and its sender clone are gone
            if let Some(done) = released {
                let _ = done.send(());
            }
        }

        Flow::Continue
    }

    fn close_all(&mut self) {
        let closed = self.feeds.len();
        self.feeds.clear();
        self.backlog.clear();
        self.active.store(0, Ordering::Release);

        tracing::debug!(closed_feeds = closed, "Hub stopped");
    }
}
