//! Install command implementation

use crate::cli::InstallArgs;
use crate::commands::shared::{find_devspace, load_catalog, CliContext};
use crate::ui::spinner::PlainSpinner;
use anyhow::{anyhow, bail, Result};
use nocalhost_core::errors::NocalhostError;
use nocalhost_core::install::{InstallChoices, InstallPlan};
use nocalhost_core::IndexMap;
use tracing::instrument;

/// Parse repeated `KEY=VALUE` arguments, keeping their order
pub fn parse_values(values: &[String]) -> Result<IndexMap<String, String>> {
    let mut parsed = IndexMap::new();
    for value in values {
        let (key, val) = value
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected KEY=VALUE, got `{}`", value))?;
        if key.trim().is_empty() {
            bail!("Expected KEY=VALUE, got `{}`", value);
        }
        parsed.insert(key.trim().to_string(), val.to_string());
    }
    Ok(parsed)
}

#[instrument(skip(context))]
pub async fn execute_install(context: &CliContext, args: &InstallArgs) -> Result<()> {
    let settings = context.load_settings()?;
    let catalog = load_catalog(&settings).await?;
    let devspace = find_devspace(&catalog, args.devspace)?;
    let application = catalog
        .application(&args.application)
        .ok_or_else(|| anyhow!("Application {} not found in catalog", args.application))?;

    let choices = InstallChoices {
        git_ref: args.git_ref.clone(),
        helm_version: args.helm_version.clone(),
        helm_values: args.helm_values.clone(),
        values: parse_values(&args.values)?,
        local_path: args.local_path.clone(),
        outer_config: None,
        kustomize_path: args.kustomize_path.clone(),
    };
    let plan = InstallPlan::new(application, &choices);
    if plan.install_type.is_local_source() && plan.options.local_path.is_none() {
        bail!("Application {} installs from a local directory; pass --local-path", plan.application);
    }

    let (session, _requests) = context.open_session(&settings)?;
    let spinner = PlainSpinner::start(&format!("Installing {}…", plan.application));
    match session.installer().install_application(&devspace, &plan).await {
        Ok(_) => {
            spinner.finish_with_message(&format!("Installed {}", plan.application));
            Ok(())
        }
        Err(NocalhostError::AlreadyInstalled { name }) => {
            spinner.finish_with_message(&format!("{} is already installed", name));
            Ok(())
        }
        Err(err) => {
            spinner.fail_with_message(&format!("Failed to install {}", plan.application));
            Err(err.into())
        }
    }
}
