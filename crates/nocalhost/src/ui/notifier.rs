use console::style;
use nocalhost_core::notify::{Level, Notification, Notifier};

/// Prints notifications to stderr, keeping stdout for command output
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

pub fn format_notification(notification: &Notification) -> String {
    let text = notification.to_string();
    match notification.level {
        Level::Success => style(format!("✔ {}", text)).green().to_string(),
        Level::Warning => style(format!("! {}", text)).yellow().to_string(),
        Level::Error => style(format!("✖ {}", text)).red().to_string(),
        Level::Info => text,
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        eprintln!("{}", format_notification(&notification));
    }
}
