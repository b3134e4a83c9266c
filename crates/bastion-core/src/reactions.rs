//! Scoped waits for reactions on a single message.
//!
//! The gateway feeds every reaction event into a [`ReactionHub`]. Code that
//! needs a decision opens a [`ReactionMonitor`] for one message and waits on
//! it. A monitor is a subscription: it starts receiving events when opened and
//! stops when dropped, whichever way the owning scope ends (return, `?`, task
//! cancellation or panic).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::platform::{ChannelId, MessageId, ReactionEvent, ReactionKind, UserId};

pub type EmojiFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// What a monitor listens for.
#[derive(Clone)]
pub struct ReactionWaitSpec {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// Only reactions by this user count, when set.
    pub author_id: Option<UserId>,
    pub kind: ReactionKind,
    pub timeout: Duration,
    filter: EmojiFilter,
}

impl ReactionWaitSpec {
    /// Accepts any emoji from anyone until a filter or author is set.
    pub fn new(
        channel_id: ChannelId,
        message_id: MessageId,
        kind: ReactionKind,
        timeout: Duration,
    ) -> Self {
        Self {
            channel_id,
            message_id,
            author_id: None,
            kind,
            timeout,
            filter: Arc::new(|_| true),
        }
    }

    #[must_use]
    pub fn author(mut self, author_id: UserId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    /// Only the listed emoji count.
    #[must_use]
    pub fn emojis<I, S>(self, emojis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = emojis.into_iter().map(Into::into).collect();
        self.filter(move |emoji| allowed.iter().any(|candidate| candidate == emoji))
    }

    /// Whether `event` resolves a wait with this spec.
    pub fn matches(&self, event: &ReactionEvent) -> bool {
        event.kind == self.kind
            && event.channel_id == self.channel_id
            && event.message_id == self.message_id
            && self.author_id.is_none_or(|author| author == event.user_id)
            && (self.filter)(&event.emoji)
    }
}

impl fmt::Debug for ReactionWaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionWaitSpec")
            .field("channel_id", &self.channel_id)
            .field("message_id", &self.message_id)
            .field("author_id", &self.author_id)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// How a wait ended. Exactly one per [`ReactionMonitor::wait`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Matched { emoji: String, user_id: UserId },
    TimedOut,
}

struct Subscriber {
    spec: ReactionWaitSpec,
    tx: mpsc::UnboundedSender<ReactionEvent>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: HashMap<u64, Subscriber>,
}

/// Fans reaction events out to open monitors.
#[derive(Clone, Default)]
pub struct ReactionHub {
    inner: Arc<Mutex<Subscribers>>,
}

impl ReactionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a monitor for `spec`. Events dispatched from now on are
    /// queued for it until it is dropped.
    pub fn open(&self, spec: ReactionWaitSpec) -> ReactionMonitor {
        let (tx, rx) = mpsc::unbounded_channel();
        let timeout = spec.timeout;
        let id = {
            let mut subscribers = lock(&self.inner);
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            tracing::trace!(id, ?spec, "reaction monitor opened");
            subscribers.entries.insert(id, Subscriber { spec, tx });
            id
        };

        ReactionMonitor {
            id,
            hub: Arc::clone(&self.inner),
            rx,
            timeout,
        }
    }

    /// Delivers `event` to every open monitor whose spec matches it.
    ///
    /// Returns how many monitors received it.
    pub fn dispatch(&self, event: &ReactionEvent) -> usize {
        let subscribers = lock(&self.inner);
        let mut delivered = 0;
        for subscriber in subscribers.entries.values() {
            if subscriber.spec.matches(event) && subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of open monitors.
    pub fn active(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

/// An open subscription to reactions on one message.
///
/// Dropping it unsubscribes.
pub struct ReactionMonitor {
    id: u64,
    hub: Arc<Mutex<Subscribers>>,
    rx: mpsc::UnboundedReceiver<ReactionEvent>,
    timeout: Duration,
}

impl ReactionMonitor {
    /// Waits for the first matching reaction, or for the timeout to elapse.
    ///
    /// The deadline is set when this call starts. Matching events that arrived
    /// since the monitor was opened are consumed first, in arrival order.
    pub async fn wait(&mut self) -> ReactionOutcome {
        let deadline = Instant::now() + self.timeout;
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(event)) => ReactionOutcome::Matched {
                emoji: event.emoji,
                user_id: event.user_id,
            },
            // The sender lives in the hub entry we own; nothing else can close it.
            Ok(None) => {
                tokio::time::sleep_until(deadline).await;
                ReactionOutcome::TimedOut
            }
            Err(_) => ReactionOutcome::TimedOut,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for ReactionMonitor {
    fn drop(&mut self) {
        let removed = lock(&self.hub).entries.remove(&self.id).is_some();
        tracing::trace!(id = self.id, removed, "reaction monitor closed");
    }
}

fn lock(inner: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const CHANNEL: ChannelId = 10;
    const MESSAGE: MessageId = 20;
    const AUTHOR: UserId = 30;

    fn event(emoji: &str, user_id: UserId) -> ReactionEvent {
        ReactionEvent {
            kind: ReactionKind::Add,
            emoji: emoji.to_string(),
            user_id,
            channel_id: CHANNEL,
            message_id: MESSAGE,
            guild_id: Some(1),
        }
    }

    fn spec(timeout: Duration) -> ReactionWaitSpec {
        ReactionWaitSpec::new(CHANNEL, MESSAGE, ReactionKind::Add, timeout)
            .author(AUTHOR)
            .emojis(["✅", "↩"])
    }

    #[test]
    fn spec_checks_location_kind_author_and_emoji() {
        let spec = spec(Duration::from_secs(1));
        assert!(spec.matches(&event("✅", AUTHOR)));
        assert!(!spec.matches(&event("❌", AUTHOR)));
        assert!(!spec.matches(&event("✅", AUTHOR + 1)));

        let mut other_message = event("✅", AUTHOR);
        other_message.message_id += 1;
        assert!(!spec.matches(&other_message));

        let mut removal = event("✅", AUTHOR);
        removal.kind = ReactionKind::Remove;
        assert!(!spec.matches(&removal));
    }

    #[test]
    fn spec_without_author_accepts_anyone() {
        let spec = ReactionWaitSpec::new(CHANNEL, MESSAGE, ReactionKind::Add, Duration::ZERO);
        assert!(spec.matches(&event("🦀", 1)));
        assert!(spec.matches(&event("✅", 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_no_earlier_than_timeout() {
        let hub = ReactionHub::new();
        let mut monitor = hub.open(spec(Duration::from_secs(60)));

        let started = Instant::now();
        let outcome = monitor.wait().await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ReactionOutcome::TimedOut);
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn non_matching_events_do_not_resolve_or_extend_the_wait() {
        let hub = ReactionHub::new();
        let mut monitor = hub.open(spec(Duration::from_secs(10)));

        let feeder = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    hub.dispatch(&event("❌", AUTHOR));
                    hub.dispatch(&event("✅", AUTHOR + 1));
                }
            })
        };

        let started = Instant::now();
        assert_eq!(monitor.wait().await, ReactionOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(11));
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn first_matching_event_wins() {
        let hub = ReactionHub::new();
        let mut monitor = hub.open(spec(Duration::from_secs(60)));

        assert_eq!(hub.dispatch(&event("↩", AUTHOR)), 1);
        assert_eq!(hub.dispatch(&event("✅", AUTHOR)), 1);

        assert_eq!(
            monitor.wait().await,
            ReactionOutcome::Matched {
                emoji: "↩".to_string(),
                user_id: AUTHOR
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn each_wait_gets_a_fresh_deadline() {
        let hub = ReactionHub::new();
        let mut monitor = hub.open(spec(Duration::from_secs(5)));

        let feeder = {
            let hub = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(4)).await;
                hub.dispatch(&event("✅", AUTHOR));
            })
        };
        assert!(matches!(
            monitor.wait().await,
            ReactionOutcome::Matched { .. }
        ));
        feeder.await.unwrap();

        let started = Instant::now();
        assert_eq!(monitor.wait().await, ReactionOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_monitor_unsubscribes() {
        let hub = ReactionHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let spec = ReactionWaitSpec::new(CHANNEL, MESSAGE, ReactionKind::Add, Duration::ZERO)
            .filter(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            });

        {
            let mut monitor = hub.open(spec);
            assert_eq!(hub.active(), 1);
            assert_eq!(monitor.wait().await, ReactionOutcome::TimedOut);
        }

        assert_eq!(hub.active(), 0);
        assert_eq!(hub.dispatch(&event("✅", AUTHOR)), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_still_unsubscribes() {
        let hub = ReactionHub::new();
        let task = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let mut monitor = hub.open(spec(Duration::from_secs(60)));
                monitor.wait().await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hub.active(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(hub.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_scope_still_unsubscribes() {
        let hub = ReactionHub::new();
        let task = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let _monitor = hub.open(spec(Duration::from_secs(60)));
                tokio::time::sleep(Duration::from_secs(1)).await;
                panic!("handler failed");
            })
        };

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(hub.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn monitors_on_other_messages_are_isolated() {
        let hub = ReactionHub::new();
        let mut first = hub.open(spec(Duration::from_secs(5)));
        let mut second = hub.open(
            ReactionWaitSpec::new(CHANNEL, MESSAGE + 1, ReactionKind::Add, Duration::from_secs(5))
                .author(AUTHOR),
        );

        assert_eq!(hub.dispatch(&event("✅", AUTHOR)), 1);

        assert!(matches!(first.wait().await, ReactionOutcome::Matched { .. }));
        assert_eq!(second.wait().await, ReactionOutcome::TimedOut);
    }
}
