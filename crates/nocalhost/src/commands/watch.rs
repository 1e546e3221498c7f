//! Watch command implementation
//!
//! Runs the reconcile loop and prints every tree event as one JSON object per
//! line on stdout until interrupted.

use crate::commands::shared::{cancel_on_ctrl_c, catalog_source, CliContext};
use anyhow::Result;
use nocalhost_core::poll::CancelHandle;
use nocalhost_core::refresh::ReconcileLoop;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

#[instrument(skip(context))]
pub async fn execute_watch(context: &CliContext, interval: Option<u64>) -> Result<()> {
    let settings = context.load_settings()?;
    let interval = interval
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.refresh_interval());
    let (session, requests) = context.open_session(&settings)?;

    let (reports_tx, mut reports) = mpsc::unbounded_channel();
    let shutdown = CancelHandle::new();
    cancel_on_ctrl_c(shutdown.clone());

    let driver = ReconcileLoop::new(
        session.reconciler(catalog_source(&settings)),
        requests,
        interval,
    )
    .with_reports(reports_tx);
    let task = tokio::spawn(driver.run(shutdown.token()));
    info!(interval_secs = interval.as_secs(), "Watching dev spaces");

    while let Some(report) = reports.recv().await {
        for event in session.workbench.drain_events().await? {
            println!("{}", serde_json::to_string(&event)?);
        }
        if !report.failures.is_empty() {
            warn!(pass = report.pass, failures = report.failures.len(), "Reconcile pass had failures");
        }
    }

    task.await??;
    Ok(())
}
