//! Standardized tracing spans and structured field names
//!
//! Every long-running workflow (reconcile pass, dev-mode start/end, install,
//! log streaming) and every external command gets a span from this module so
//! that logs can be filtered and correlated by dev space, application and
//! workload.

use std::time::Instant;
use tracing::{span, Span};

/// Canonical span names
pub mod spans {
    pub const RECONCILE_PASS: &str = "reconcile.pass";
    pub const RECONCILE_BRANCH: &str = "reconcile.branch";
    pub const DEVMODE_START: &str = "devmode.start";
    pub const DEVMODE_END: &str = "devmode.end";
    pub const COMMAND_EXEC: &str = "command.exec";
    pub const INSTALL_APP: &str = "install.app";
    pub const LOGS_STREAM: &str = "logs.stream";
}

/// Common field names for structured logging
pub mod fields {
    pub const DEVSPACE_ID: &str = "devspace_id";
    pub const APPLICATION: &str = "application";
    pub const WORKLOAD: &str = "workload";
    pub const PROGRAM: &str = "program";
    pub const DURATION_MS: &str = "duration_ms";
}

/// Span for one reconciliation pass over all dev spaces
pub fn reconcile_pass_span(pass: u64) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::INFO,
        spans::RECONCILE_PASS,
        duration_ms = tracing::field::Empty,
        pass = pass
    )
}

/// Span for refreshing one resource-type branch
pub fn reconcile_branch_span(devspace_id: i64, application: &str, resource_type: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::DEBUG,
        spans::RECONCILE_BRANCH,
        duration_ms = tracing::field::Empty,
        devspace_id = devspace_id,
        application = %application,
        resource_type = %resource_type
    )
}

/// Span for a dev-mode start orchestration
pub fn devmode_start_span(devspace_id: i64, application: &str, workload: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::INFO,
        spans::DEVMODE_START,
        duration_ms = tracing::field::Empty,
        devspace_id = devspace_id,
        application = %application,
        workload = %workload
    )
}

/// Span for ending dev mode
pub fn devmode_end_span(devspace_id: i64, application: &str, workload: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::INFO,
        spans::DEVMODE_END,
        duration_ms = tracing::field::Empty,
        devspace_id = devspace_id,
        application = %application,
        workload = %workload
    )
}

/// Span for a single external command
pub fn command_exec_span(program: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::DEBUG,
        spans::COMMAND_EXEC,
        duration_ms = tracing::field::Empty,
        program = %program
    )
}

/// Span for an application install
pub fn install_app_span(devspace_id: i64, application: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::INFO,
        spans::INSTALL_APP,
        duration_ms = tracing::field::Empty,
        devspace_id = devspace_id,
        application = %application
    )
}

/// Span for a followed log stream
pub fn logs_stream_span(pod: &str, container: &str) -> Span {
    span!(
        target: "nocalhost_core::observability",
        tracing::Level::INFO,
        spans::LOGS_STREAM,
        pod = %pod,
        container = %container
    )
}

/// Records `duration_ms` on its span when completed.
///
/// The span is not entered here; async callers attach it with
/// `tracing::Instrument::instrument` so it survives `.await` points.
pub struct TimedSpan {
    span: Span,
    start_time: Instant,
}

impl TimedSpan {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record the elapsed time on the span
    pub fn complete(self) -> u64 {
        let duration_ms = self.start_time.elapsed().as_millis() as u64;
        self.span.record(fields::DURATION_MS, duration_ms);
        duration_ms
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
