use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use nocalhost_core::devmode::{DevModeObserver, DevModeState};
use std::time::Duration;

fn default_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Message shown while a dev-mode run is in `state`
pub fn transition_message(workload: &str, state: DevModeState) -> String {
    match state {
        DevModeState::Idle => format!("Preparing {}…", workload),
        DevModeState::CheckingStatus => format!("Checking {}…", workload),
        DevModeState::DevStarting => format!("Starting dev mode for {}…", workload),
        DevModeState::WaitingContainerReady => "Waiting for the dev container…".to_string(),
        DevModeState::Syncing => "Syncing files…".to_string(),
        DevModeState::PortForwarding => "Forwarding ports…".to_string(),
        DevModeState::Ready => format!("{} is in dev mode", workload),
        DevModeState::Failed => format!("Dev mode for {} failed", workload),
    }
}

/// Spinner on stderr that follows dev-mode transitions
#[derive(Debug)]
pub struct DevModeSpinner {
    pb: ProgressBar,
    workload: String,
}

impl DevModeSpinner {
    pub fn new(workload: impl Into<String>) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(default_style());
        Self {
            pb,
            workload: workload.into(),
        }
    }
}

impl DevModeObserver for DevModeSpinner {
    fn on_transition(&self, state: DevModeState) {
        let msg = transition_message(&self.workload, state);
        match state {
            DevModeState::Ready => {
                self.pb.set_style(finished_style());
                self.pb.finish_with_message(style(msg).green().to_string());
            }
            DevModeState::Failed => {
                self.pb.set_style(finished_style());
                self.pb.finish_with_message(style(msg).red().to_string());
            }
            _ => self.pb.set_message(style(msg).yellow().to_string()),
        }
    }
}

impl Drop for DevModeSpinner {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
        }
    }
}

/// Simple RAII spinner for wrapping an async operation without events
pub struct PlainSpinner {
    pb: ProgressBar,
    finished: bool,
}

impl PlainSpinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(default_style());
        pb.set_message(style(message).yellow().to_string());
        Self {
            pb,
            finished: false,
        }
    }

    pub fn finish_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb
            .finish_with_message(style(message).green().to_string());
        self.finished = true;
    }

    pub fn fail_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb.finish_with_message(style(message).red().to_string());
        self.finished = true;
    }
}

impl Drop for PlainSpinner {
    fn drop(&mut self) {
        if !self.finished {
            self.pb.finish_and_clear();
        }
    }
}
