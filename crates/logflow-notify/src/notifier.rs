//! The notifier worker and subscription handles.
//!
//! A single worker task owns the subscriber registry. Subscriptions,
//! unsubscriptions and notifications all travel through its command queue,
//! so they are applied in the order they were sent.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use logflow_store::LogEntry;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::NotifierConfig;
use crate::error::{NotifyError, Result};

/// A log entry delivered to subscribers of its stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    /// Stream the entry was ingested into
    pub stream: String,
    /// Key the store assigned to the entry
    pub key: String,
    /// The entry itself
    pub entry: LogEntry,
}

enum Command {
    Subscribe {
        stream: String,
        id: u64,
        mailbox: mpsc::Sender<LogMessage>,
        ready: oneshot::Sender<()>,
    },
    Unsubscribe {
        stream: String,
        id: u64,
    },
    Notify(LogMessage),
    Count {
        stream: String,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the notifier worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    tx: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    config: NotifierConfig,
    shutdown: CancellationToken,
}

impl LogNotifier {
    /// Spawns the worker on the current Tokio runtime.
    pub fn spawn(config: NotifierConfig) -> Result<(Self, JoinHandle<()>)> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let config = config.sanitized();
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let shutdown = CancellationToken::new();

        let worker = NotifierWorker {
            subscribers: HashMap::new(),
            rx,
            shutdown: shutdown.clone(),
        };
        let handle = runtime.spawn(worker.run());

        Ok((
            Self {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
                config,
                shutdown,
            },
            handle,
        ))
    }

    /// Subscribes to entries ingested into `stream`.
    ///
    /// Returns once the worker has registered the subscriber. The
    /// subscription ends when `cancel` fires or the handle is dropped;
    /// nothing is delivered after that.
    pub async fn subscribe(&self, stream: &str, cancel: &CancellationToken) -> Result<Subscription> {
        let (mailbox, receiver) = mpsc::channel(self.config.subscriber_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.tx
            .send(Command::Subscribe {
                stream: stream.to_string(),
                id,
                mailbox,
                ready: ready_tx,
            })
            .await
            .map_err(|_| NotifyError::Closed)?;
        ready_rx
            .await
            .map_err(|_| NotifyError::Registration(stream.to_string()))?;

        let token = cancel.child_token();
        let waiter = Waiter {
            stream: stream.to_string(),
            id,
            token: token.clone(),
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(waiter.run());

        debug!(stream, subscriber = id, "subscribed");
        Ok(Subscription {
            stream: stream.to_string(),
            receiver,
            token,
        })
    }

    /// Broadcasts an entry to the current subscribers of `stream`.
    ///
    /// Delivery is best effort: a subscriber whose buffer is full misses the
    /// entry without slowing down the others.
    pub async fn notify(&self, stream: &str, key: &str, entry: LogEntry) -> Result<()> {
        self.tx
            .send(Command::Notify(LogMessage {
                stream: stream.to_string(),
                key: key.to_string(),
                entry,
            }))
            .await
            .map_err(|_| NotifyError::Closed)
    }

    /// Number of live subscribers of `stream`.
    ///
    /// Also acts as a barrier: every command sent before it has been applied
    /// when it returns.
    pub async fn subscriber_count(&self, stream: &str) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Count {
                stream: stream.to_string(),
                reply,
            })
            .await
            .map_err(|_| NotifyError::Closed)?;
        response.await.map_err(|_| NotifyError::Closed)
    }

    /// Stops the worker. Subscriptions see the end of their stream.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Receiving side of a subscription.
///
/// Implements [`Stream`]; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    stream: String,
    receiver: mpsc::Receiver<LogMessage>,
    token: CancellationToken,
}

impl Subscription {
    /// The stream subscribed to.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Waits for the next entry. Returns `None` once cancelled or closed.
    pub async fn recv(&mut self) -> Option<LogMessage> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            message = self.receiver.recv() => message,
        }
    }

    /// Ends the subscription.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the subscription has ended.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = LogMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Removes a subscriber once its token fires.
struct Waiter {
    stream: String,
    id: u64,
    token: CancellationToken,
    tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
}

impl Waiter {
    async fn run(self) {
        let Self {
            stream,
            id,
            token,
            tx,
            shutdown,
        } = self;
        tokio::select! {
            () = token.cancelled() => {
                let _ = tx.send(Command::Unsubscribe { stream, id }).await;
            }
            () = shutdown.cancelled() => {}
        }
    }
}

struct NotifierWorker {
    subscribers: HashMap<String, HashMap<u64, mpsc::Sender<LogMessage>>>,
    rx: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
}

impl NotifierWorker {
    async fn run(mut self) {
        debug!("log notifier started");
        loop {
            let command = tokio::select! {
                () = self.shutdown.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command);
        }
        debug!("log notifier stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                stream,
                id,
                mailbox,
                ready,
            } => {
                self.subscribers.entry(stream).or_default().insert(id, mailbox);
                let _ = ready.send(());
            }
            Command::Unsubscribe { stream, id } => self.remove(&stream, id),
            Command::Notify(message) => self.broadcast(&message),
            Command::Count { stream, reply } => {
                let count = self.subscribers.get(&stream).map_or(0, HashMap::len);
                let _ = reply.send(count);
            }
        }
    }

    fn broadcast(&mut self, message: &LogMessage) {
        let Some(mailboxes) = self.subscribers.get(&message.stream) else {
            return;
        };

        let mut closed = Vec::new();
        for (id, mailbox) in mailboxes {
            match mailbox.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(stream = %message.stream, subscriber = id, key = %message.key, "subscriber lagging, dropping log");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            debug!(stream = %message.stream, subscriber = id, "subscriber gone");
            self.remove(&message.stream, id);
        }
    }

    fn remove(&mut self, stream: &str, id: u64) {
        if let Some(mailboxes) = self.subscribers.get_mut(stream) {
            if mailboxes.remove(&id).is_some() {
                debug!(stream, subscriber = id, "unsubscribed");
            }
            if mailboxes.is_empty() {
                self.subscribers.remove(stream);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::time::Duration;

    fn make_entry(message: &str) -> LogEntry {
        LogEntry::new(HashMap::new()).with_field("message", message)
    }

    fn start(config: NotifierConfig) -> LogNotifier {
        let (notifier, _worker) = LogNotifier::spawn(config).expect("spawn notifier");
        notifier
    }

    async fn wait_for_count(notifier: &LogNotifier, stream: &str, expected: usize) -> bool {
        for _ in 0..100 {
            if notifier.subscriber_count(stream).await.expect("subscriber count") == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    async fn next_message(sub: &mut Subscription) -> LogMessage {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("message within timeout")
            .expect("subscription open")
    }

    #[test]
    fn spawn_without_runtime_fails() {
        assert!(matches!(
            LogNotifier::spawn(NotifierConfig::default()),
            Err(NotifyError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn delivers_only_to_matching_stream() {
        let notifier = start(NotifierConfig::default());
        let cancel = CancellationToken::new();
        let mut sub_a = notifier.subscribe("a", &cancel).await.expect("subscribe");

        notifier.notify("b", "k-b", make_entry("for b")).await.expect("notify");
        notifier.notify("a", "k-a", make_entry("for a")).await.expect("notify");

        let received = next_message(&mut sub_a).await;
        assert_eq!(received.stream, "a");
        assert_eq!(received.key, "k-a");

        let nothing = tokio::time::timeout(Duration::from_millis(50), sub_a.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn every_subscriber_of_a_stream_receives() {
        let notifier = start(NotifierConfig::default());
        let cancel = CancellationToken::new();
        let mut first = notifier.subscribe("app", &cancel).await.expect("subscribe");
        let mut second = notifier.subscribe("app", &cancel).await.expect("subscribe");
        assert_eq!(notifier.subscriber_count("app").await.expect("subscriber count"), 2);

        notifier.notify("app", "k1", make_entry("hello")).await.expect("notify");

        for sub in [&mut first, &mut second] {
            let received = next_message(sub).await;
            assert_eq!(received.entry.field("message"), Some("hello"));
        }
    }

    #[tokio::test]
    async fn cancellation_stops_delivery_and_unregisters() {
        let notifier = start(NotifierConfig::default());
        let cancel = CancellationToken::new();
        let mut sub = notifier.subscribe("app", &cancel).await.expect("subscribe");

        cancel.cancel();
        notifier.notify("app", "k1", make_entry("late")).await.expect("notify");

        assert!(sub.recv().await.is_none());
        assert!(sub.is_cancelled());
        assert!(wait_for_count(&notifier, "app", 0).await);
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let notifier = start(NotifierConfig::default());
        let cancel = CancellationToken::new();
        let sub = notifier.subscribe("app", &cancel).await.expect("subscribe");
        drop(sub);

        assert!(wait_for_count(&notifier, "app", 0).await);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn lagging_subscriber_does_not_block_others() {
        let notifier = start(NotifierConfig::default().with_subscriber_capacity(1));
        let cancel = CancellationToken::new();
        let mut slow = notifier.subscribe("app", &cancel).await.expect("subscribe");

        for i in 0..3 {
            tokio::time::timeout(
                Duration::from_secs(1),
                notifier.notify("app", &format!("k{i}"), make_entry("x")),
            )
            .await
            .expect("notify within timeout")
            .expect("notify");
        }
        assert_eq!(notifier.subscriber_count("app").await.expect("subscriber count"), 1);

        assert_eq!(next_message(&mut slow).await.key, "k0");
        let rest = tokio::time::timeout(Duration::from_millis(50), slow.recv()).await;
        assert!(rest.is_err());
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let notifier = start(NotifierConfig::default());
        let cancel = CancellationToken::new();
        let mut sub = notifier.subscribe("app", &cancel).await.expect("subscribe");
        assert_eq!(sub.stream(), "app");

        notifier.notify("app", "k1", make_entry("one")).await.expect("notify");
        let next = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .expect("message within timeout")
            .expect("subscription open");
        assert_eq!(next.key, "k1");

        sub.cancel();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_notifier() {
        let (notifier, handle) = LogNotifier::spawn(NotifierConfig::default()).expect("spawn notifier");
        notifier.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker stops")
            .expect("worker task");

        assert!(matches!(
            notifier.notify("app", "k", make_entry("x")).await,
            Err(NotifyError::Closed)
        ));
        let cancel = CancellationToken::new();
        assert!(matches!(
            notifier.subscribe("app", &cancel).await,
            Err(NotifyError::Closed)
        ));
    }

    #[test]
    fn log_message_serializes() {
        let message = LogMessage {
            stream: "app".to_string(),
            key: "entry:app:1".to_string(),
            entry: make_entry("hi"),
        };
        let json = serde_json::to_value(&message).expect("serialize message");
        assert_eq!(json["stream"], "app");
        assert_eq!(json["entry"]["fields"]["message"], "hi");
    }
}
