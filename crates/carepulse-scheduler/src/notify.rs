//! Notification router — the [`NotificationSink`] the schedulers talk to.
//! Permission-gated; delivers to the local log and keeps a short history.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carepulse_core::config::{NotificationConfig, NotifyPermission};
use carepulse_core::traits::NotificationSink;

/// History ring buffer size.
const HISTORY_LIMIT: usize = 100;

/// A notification handed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub play_sound: bool,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: &str, body: &str, play_sound: bool) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            play_sound,
            timestamp: Utc::now(),
        }
    }
}

/// Local notification sink.
pub struct NotifyRouter {
    permission: NotifyPermission,
    history: Mutex<VecDeque<Notification>>,
}

impl NotifyRouter {
    pub fn new(permission: NotifyPermission) -> Self {
        Self {
            permission,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.permission)
    }

    pub fn permission(&self) -> NotifyPermission {
        self.permission
    }

    /// Delivered notifications, oldest first (last 100).
    pub fn history(&self) -> Vec<Notification> {
        self.history_guard().iter().cloned().collect()
    }

    fn record(&self, notification: Notification) {
        let mut history = self.history_guard();
        history.push_back(notification);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    fn history_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new(NotifyPermission::Granted)
    }
}

impl NotificationSink for NotifyRouter {
    fn notify(&self, title: &str, body: &str, play_sound: bool) {
        if self.permission != NotifyPermission::Granted {
            tracing::debug!(
                "🔕 Notification suppressed ({:?}): {}",
                self.permission,
                title
            );
            return;
        }
        let notification = Notification::new(title, body, play_sound);
        tracing::info!(
            "📢 {}: {}{}",
            notification.title,
            notification.body,
            if notification.play_sound { " 🔊" } else { "" }
        );
        self.record(notification);
    }
}
