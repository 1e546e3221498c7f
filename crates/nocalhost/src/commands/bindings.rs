//! Bindings command implementation

use crate::cli::OutputFormat;
use crate::commands::shared::CliContext;
use anyhow::Result;
use nocalhost_core::binding::LocalBinding;
use tracing::instrument;

pub fn format_bindings(bindings: &[LocalBinding]) -> String {
    if bindings.is_empty() {
        return "No local bindings\n".to_string();
    }
    let mut out = String::new();
    for binding in bindings {
        let key = &binding.key;
        out.push_str(&format!(
            "{}/{}/{} ({}, {}) -> {}\n",
            key.devspace_id,
            key.application,
            key.workload,
            key.email,
            key.host,
            binding.local_path.display()
        ));
    }
    out
}

#[instrument(skip(context))]
pub async fn execute_bindings(context: &CliContext, output: OutputFormat) -> Result<()> {
    let settings = context.load_settings()?;
    let (session, _requests) = context.open_session(&settings)?;
    let bindings = session.workbench.list_bindings().await?;

    match output {
        OutputFormat::Text => print!("{}", format_bindings(&bindings)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bindings)?),
    }
    Ok(())
}
