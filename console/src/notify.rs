use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Failure,
}

/// A user-facing message naming an action and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) {
        self.publish(title.into(), message.into(), NotificationLevel::Info);
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
        self.publish(title.into(), message.into(), NotificationLevel::Success);
    }

    pub fn failure(&self, title: impl Into<String>, message: impl Into<String>) {
        self.publish(title.into(), message.into(), NotificationLevel::Failure);
    }

    fn publish(&self, title: String, message: String, level: NotificationLevel) {
        let notification = Notification {
            title,
            message,
            level,
            at: Utc::now(),
        };
        // No subscribers is fine; the display may not be attached yet.
        if self.sender.send(notification).is_err() {
            log::debug!("Notification dropped, no subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
