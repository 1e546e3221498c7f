//! Dev command implementation
//!
//! `dev start` runs the dev-mode orchestrator behind a spinner; `dev end`
//! leaves dev mode and drops the workload's local binding.

use crate::cli::WorkloadArgs;
use crate::commands::shared::{cancel_on_ctrl_c, find_devspace, load_catalog, CliContext};
use crate::ui::spinner::{DevModeSpinner, PlainSpinner};
use anyhow::{Context, Result};
use nocalhost_core::devmode::{DevModeOutcome, DevModeRequest};
use nocalhost_core::poll::CancelHandle;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(skip(context))]
pub async fn execute_dev_start(
    context: &CliContext,
    target: &WorkloadArgs,
    container: &str,
    local_dir: Option<PathBuf>,
) -> Result<()> {
    let settings = context.load_settings()?;
    let catalog = load_catalog(&settings).await?;
    let devspace = find_devspace(&catalog, target.devspace)?;

    let local_dir = match local_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };
    let local_dir = std::fs::canonicalize(&local_dir)
        .with_context(|| format!("Local directory {} does not exist", local_dir.display()))?;

    let (session, _requests) = context.open_session(&settings)?;
    let cancel = CancelHandle::new();
    cancel_on_ctrl_c(cancel.clone());

    let request = DevModeRequest {
        devspace,
        application: target.application.clone(),
        workload: target.workload.clone(),
        container: container.to_string(),
        local_dir,
    };
    let outcome = session
        .orchestrator()
        .with_observer(Arc::new(DevModeSpinner::new(&target.workload)))
        .start(&request, &cancel.token())
        .await;

    match outcome {
        DevModeOutcome::Ready {
            already_developing,
            ports,
            ..
        } => {
            if already_developing {
                println!("{} is already in dev mode", request.workload);
            } else if ports.is_empty() {
                println!("{} is in dev mode", request.workload);
            } else {
                println!(
                    "{} is in dev mode, forwarding {}",
                    request.workload,
                    ports.join(", ")
                );
            }
            Ok(())
        }
        DevModeOutcome::Failed { step, error } => {
            info!(step = step.as_str(), "Dev mode start failed");
            Err(error.into())
        }
    }
}

#[instrument(skip(context))]
pub async fn execute_dev_end(context: &CliContext, target: &WorkloadArgs) -> Result<()> {
    let settings = context.load_settings()?;
    let catalog = load_catalog(&settings).await?;
    let devspace = find_devspace(&catalog, target.devspace)?;
    let (session, _requests) = context.open_session(&settings)?;

    let spinner = PlainSpinner::start(&format!("Ending dev mode for {}…", target.workload));
    match session
        .orchestrator()
        .end(&devspace, &target.application, &target.workload)
        .await
    {
        Ok(removed) => {
            spinner.finish_with_message(&format!("{} left dev mode", target.workload));
            if let Some(binding) = removed {
                println!(
                    "Removed binding {} -> {}",
                    target.workload,
                    binding.local_path.display()
                );
            }
            Ok(())
        }
        Err(err) => {
            spinner.fail_with_message(&format!("Failed to end dev mode for {}", target.workload));
            Err(err.into())
        }
    }
}
