//! Outbound notifications
//!
//! Callers never wait on delivery: messages go through a bounded queue to a
//! background worker, and a full queue drops the message.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),

    #[error("platform error: {0}")]
    Platform(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log when no messaging platform is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!("📣 {}", text.replace('\n', " | "));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Entry,
    TakeProfit,
    StopLoss,
    Emergency,
    Error,
    Pause,
    DailySummary,
    Signal,
    Startup,
    Shutdown,
}

/// Suppresses repeats of the same (ticker, kind) inside a window
#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last_sent: HashMap<(String, NotificationKind), DateTime<Utc>>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Records the send and returns true when the key is not cooling down
    pub fn try_acquire(&mut self, ticker: &str, kind: NotificationKind, now: DateTime<Utc>) -> bool {
        let key = (ticker.to_string(), kind);
        if let Some(last) = self.last_sent.get(&key) {
            if now - *last < self.window {
                return false;
            }
        }
        self.last_sent.insert(key, now);
        true
    }
}

/// Cloneable handle for queueing notifications
#[derive(Clone)]
pub struct Notifications {
    sender: mpsc::Sender<String>,
    cooldown: Arc<Mutex<Cooldown>>,
}

impl Notifications {
    /// Queues `text`. Returns false if the queue was full or closed.
    pub fn send(&self, text: impl Into<String>) -> bool {
        match self.sender.try_send(text.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Notification channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("⚠️  Notification worker stopped, dropping message");
                false
            }
        }
    }

    /// Queues `text` unless the same (ticker, kind) was sent within the cooldown
    pub fn send_throttled(
        &self,
        ticker: &str,
        kind: NotificationKind,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let allowed = match self.cooldown.lock() {
            Ok(mut cooldown) => cooldown.try_acquire(ticker, kind, now),
            Err(poisoned) => poisoned.into_inner().try_acquire(ticker, kind, now),
        };

        if !allowed {
            trace!("Cooldown active for {} {:?}", ticker, kind);
            return false;
        }
        self.send(text)
    }
}

/// Spawns the delivery worker. The worker exits once every handle is dropped
/// and the queue is drained.
pub fn spawn_worker(
    notifier: Arc<dyn Notifier>,
    capacity: usize,
    cooldown: Duration,
) -> (Notifications, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<String>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(text) = receiver.recv().await {
            if let Err(e) = notifier.send(&text).await {
                warn!("⚠️  Notification delivery failed: {}", e);
            }
        }
        trace!("Notification worker stopped");
    });

    let notifications = Notifications {
        sender,
        cooldown: Arc::new(Mutex::new(Cooldown::new(cooldown))),
    };

    (notifications, handle)
}
