//! Quaver Bus
//!
//! In-process publish/subscribe, used to decouple the stores and the player
//! from whatever observes them.
//!
//! Each subscriber gets its own unbounded queue and worker task, so a slow
//! subscriber never blocks publishers or other subscribers. Messages arrive
//! at each subscriber in publish order; there is no ordering guarantee
//! *across* subscribers.
//!
//! # Example
//!
//! ```rust
//! use quaver_bus::PubSub;
//!
//! #[derive(Debug)]
//! struct Ping(u32);
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = PubSub::new();
//! bus.subscribe(|ping: &Ping| println!("ping {}", ping.0), false);
//! bus.publish(Ping(1));
//! bus.join().await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::Notify;

/// A message that can be published on the bus.
///
/// Implemented automatically for any `'static` type that is `Send + Sync`
/// and printable; messages need no manual trait impls.
pub trait Message: Send + Sync + fmt::Debug + 'static {
    /// The message as `Any`, for downcasting to its concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Send + Sync + fmt::Debug + 'static> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Callback = Box<dyn Fn(&Arc<dyn Message>) + Send + 'static>;

struct Subscriber {
    /// `None` matches every message.
    filter: Option<TypeId>,
    sender: mpsc::UnboundedSender<Arc<dyn Message>>,
}

#[derive(Default)]
struct LastMessages {
    by_type: HashMap<TypeId, Arc<dyn Message>>,
    overall: Option<Arc<dyn Message>>,
}

struct Shared {
    subscribers: Mutex<Vec<Subscriber>>,
    last: Mutex<LastMessages>,
    /// Deliveries enqueued but not yet processed, across all subscribers.
    pending: AtomicUsize,
    idle: Notify,
}

/// The message bus.
///
/// Cheap to clone; clones share the same subscribers and queues. Dropping
/// the last clone shuts the worker tasks down once their queues drain.
#[derive(Clone)]
pub struct PubSub {
    shared: Arc<Shared>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    /// Creates a bus with no subscribers.
    ///
    /// Must be called from within a tokio runtime, as must [`subscribe`]
    /// (worker tasks are spawned there).
    ///
    /// [`subscribe`]: PubSub::subscribe
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(Vec::new()),
                last: Mutex::new(LastMessages::default()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Publishes a message to every matching subscriber.
    ///
    /// Returns once the message is enqueued everywhere; callbacks run later
    /// on the subscribers' worker tasks.
    pub fn publish<M: Message>(&self, message: M) {
        let message: Arc<dyn Message> = Arc::new(message);
        let type_id = (*message).as_any().type_id();

        let subscribers = lock_unpoisoned(&self.shared.subscribers);
        {
            let mut last = lock_unpoisoned(&self.shared.last);
            last.by_type.insert(type_id, Arc::clone(&message));
            last.overall = Some(Arc::clone(&message));
        }
        for subscriber in subscribers.iter() {
            if subscriber.filter.is_none() || subscriber.filter == Some(type_id) {
                self.enqueue(subscriber, Arc::clone(&message));
            }
        }
    }

    /// Subscribes a callback to messages of type `M`.
    ///
    /// With `want_last_message`, the most recently published `M` (if any) is
    /// replayed to the new subscriber before anything published later.
    pub fn subscribe<M: Message>(
        &self,
        callback: impl Fn(&M) + Send + 'static,
        want_last_message: bool,
    ) {
        let callback: Callback = Box::new(move |message| {
            if let Some(typed) = (**message).as_any().downcast_ref::<M>() {
                callback(typed);
            }
        });
        self.add_subscriber(Some(TypeId::of::<M>()), callback, want_last_message);
    }

    /// Subscribes a callback to every message, regardless of type.
    ///
    /// With `want_last_message`, the most recently published message of any
    /// type is replayed first.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&Arc<dyn Message>) + Send + 'static,
        want_last_message: bool,
    ) {
        self.add_subscriber(None, Box::new(callback), want_last_message);
    }

    fn add_subscriber(&self, filter: Option<TypeId>, callback: Callback, want_last_message: bool) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Arc<dyn Message>>();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
                    tracing::error!(?message, "subscriber callback panicked");
                }
                if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    shared.idle.notify_waiters();
                }
            }
        });

        // Holding the subscriber list lock keeps the replayed message ahead
        // of any concurrent publish.
        let mut subscribers = lock_unpoisoned(&self.shared.subscribers);
        let subscriber = Subscriber { filter, sender };
        if want_last_message {
            let last = lock_unpoisoned(&self.shared.last);
            let replay = match filter {
                Some(type_id) => last.by_type.get(&type_id),
                None => last.overall.as_ref(),
            };
            if let Some(message) = replay {
                self.enqueue(&subscriber, Arc::clone(message));
            }
        }
        subscribers.push(subscriber);
    }

    fn enqueue(&self, subscriber: &Subscriber, message: Arc<dyn Message>) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if subscriber.sender.send(message).is_err()
            && self.shared.pending.fetch_sub(1, Ordering::AcqRel) == 1
        {
            self.shared.idle.notify_waiters();
        }
    }

    /// Waits until every subscriber has processed every message enqueued so
    /// far.
    ///
    /// Deadlocks if a callback publishes while `join` is waiting and that
    /// publish never drains; don't publish from callbacks you `join` on.
    pub async fn join(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Callback panics poison these mutexes from the caller's point of view;
/// the protected state is still consistent, so keep going.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Count(u32);

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Other(&'static str);

    fn collector<M: Message + Clone>() -> (Arc<Mutex<Vec<M>>>, impl Fn(&M) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |message: &M| {
            sink.lock().unwrap().push(message.clone());
        })
    }

    #[tokio::test]
    async fn messages_arrive_in_publish_order() {
        let bus = PubSub::new();
        let (seen, callback) = collector::<Count>();
        bus.subscribe(callback, false);
        for i in 0..1000 {
            bus.publish(Count(i));
        }
        bus.join().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);
        assert!(seen.iter().enumerate().all(|(i, c)| c.0 == u32::try_from(i).unwrap()));
    }

    #[tokio::test]
    async fn typed_subscribers_only_see_their_type() {
        let bus = PubSub::new();
        let (counts, count_callback) = collector::<Count>();
        let (others, other_callback) = collector::<Other>();
        bus.subscribe(count_callback, false);
        bus.subscribe(other_callback, false);
        bus.publish(Count(1));
        bus.publish(Other("x"));
        bus.publish(Count(2));
        bus.join().await;
        assert_eq!(*counts.lock().unwrap(), vec![Count(1), Count(2)]);
        assert_eq!(*others.lock().unwrap(), vec![Other("x")]);
    }

    #[tokio::test]
    async fn subscribe_all_sees_every_type() {
        let bus = PubSub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_all(
            move |message| sink.lock().unwrap().push(format!("{message:?}")),
            false,
        );
        bus.publish(Count(1));
        bus.publish(Other("x"));
        bus.join().await;
        assert_eq!(*seen.lock().unwrap(), vec!["Count(1)", "Other(\"x\")"]);
    }

    #[tokio::test]
    async fn panicking_callback_stays_subscribed() {
        let bus = PubSub::new();
        let (seen, callback) = collector::<Count>();
        bus.subscribe(
            move |message: &Count| {
                assert!(message.0 != 1, "injected failure");
                callback(message);
            },
            false,
        );
        bus.publish(Count(0));
        bus.publish(Count(1));
        bus.publish(Count(2));
        bus.join().await;
        assert_eq!(*seen.lock().unwrap(), vec![Count(0), Count(2)]);
    }

    #[tokio::test]
    async fn want_last_message_replays_latest_of_type() {
        let bus = PubSub::new();
        bus.publish(Count(1));
        bus.publish(Count(2));
        bus.publish(Other("x"));
        bus.join().await;

        let (counts, callback) = collector::<Count>();
        bus.subscribe(callback, true);
        bus.publish(Count(3));
        bus.join().await;
        assert_eq!(*counts.lock().unwrap(), vec![Count(2), Count(3)]);
    }

    #[tokio::test]
    async fn want_last_message_for_subscribe_all_replays_overall_latest() {
        let bus = PubSub::new();
        bus.publish(Count(1));
        bus.publish(Other("x"));
        bus.join().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_all(
            move |message| sink.lock().unwrap().push(format!("{message:?}")),
            true,
        );
        bus.join().await;
        assert_eq!(*seen.lock().unwrap(), vec!["Other(\"x\")"]);
    }

    #[tokio::test]
    async fn want_last_message_with_no_history_replays_nothing() {
        let bus = PubSub::new();
        let (counts, callback) = collector::<Count>();
        bus.subscribe(callback, true);
        bus.join().await;
        assert!(counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_with_nothing_pending_returns_immediately() {
        let bus = PubSub::new();
        bus.join().await;
    }
}
