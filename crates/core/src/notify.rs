//! User-facing notifications
//!
//! Workflows report outcomes through a [`Notifier`]; the front-end decides
//! how to show them. A spawn failure gets its own notification so the user
//! can be told which tool to install.

use crate::errors::NocalhostError;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: Level, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Error, title, message)
    }

    /// The named binary could not be started
    pub fn missing_binary(program: &str) -> Self {
        Self::new(
            Level::Error,
            format!("{} not found", program),
            format!(
                "Could not run `{}`. Install it or point the settings at its location.",
                program
            ),
        )
    }

    /// Notification for a failed operation, distinguishing missing binaries
    pub fn from_error(title: impl Into<String>, err: &NocalhostError) -> Self {
        match err.missing_binary() {
            Some(program) => Self::missing_binary(program),
            None => Self::error(title, err.user_message()),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.message)
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Success | Level::Info => info!(title = %n.title, "{}", n.message),
            Level::Warning => warn!(title = %n.title, "{}", n.message),
            Level::Error => error!(title = %n.title, "{}", n.message),
        }
    }
}

pub mod mock {
    use super::{Level, Notification, Notifier};
    use std::sync::{Mutex, PoisonError};

    /// Keeps every notification for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        received: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn notifications(&self) -> Vec<Notification> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn with_level(&self, level: Level) -> Vec<Notification> {
            self.notifications()
                .into_iter()
                .filter(|n| n.level == level)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingNotifier;
    use super::*;
    use crate::errors::CommandError;

    #[test]
    fn test_from_error_missing_binary() {
        let err: NocalhostError = CommandError::Spawn {
            program: "kubectl".to_string(),
            message: "No such file or directory".to_string(),
        }
        .into();
        let n = Notification::from_error("Fetch failed", &err);
        assert_eq!(n.title, "kubectl not found");
        assert_eq!(n.level, Level::Error);
    }

    #[test]
    fn test_from_error_command_failure() {
        let err: NocalhostError = CommandError::NonZeroExit {
            command: "nhctl dev start demo".to_string(),
            exit_code: 1,
            output: "image pull failed\n".to_string(),
        }
        .into();
        let n = Notification::from_error("Dev mode failed", &err);
        assert_eq!(n.to_string(), "Dev mode failed: Command failed: image pull failed");
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::success("DevMode started", ""));
        notifier.notify(Notification::error("oops", "bad"));
        assert_eq!(notifier.notifications().len(), 2);
        assert_eq!(notifier.with_level(Level::Success)[0].to_string(), "DevMode started");
    }
}
