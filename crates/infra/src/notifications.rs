//! User-facing notices emitted by data operations.

use std::sync::Mutex;

use serde::Serialize;

use contacthub_core::AppError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: Option<String>,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            message: Some(message.into()),
        }
    }

    /// Retryable failures are warnings; everything else is an error.
    pub fn failure(context: &str, error: &AppError) -> Self {
        let level = if error.is_retryable() {
            NotificationLevel::Warning
        } else {
            NotificationLevel::Error
        };
        Self {
            level,
            title: format!("{context} Failed"),
            message: Some(error.message.clone()),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Error => tracing::error!(title = %n.title, message = ?n.message, "notification"),
            NotificationLevel::Warning => tracing::warn!(title = %n.title, message = ?n.message, "notification"),
            _ => tracing::info!(title = %n.title, message = ?n.message, "notification"),
        }
    }
}

/// Keeps every notice in order.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(notification);
        }
    }
}
