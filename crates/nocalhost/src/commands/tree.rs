//! Tree command implementation
//!
//! Runs a reconcile pass, loads the requested resource types under every
//! application, and prints the resulting outline.

use crate::commands::shared::{catalog_source, CliContext};
use anyhow::{anyhow, bail, Result};
use nocalhost_core::tree::{resource_type_label, NodeId, NodeKind, Tree};
use nocalhost_core::workbench::WorkbenchHandle;
use tracing::{debug, instrument};

/// Catalogue label for a user-supplied type name (`Deployments`, `deployments`, `Persistent Volume Claims`)
pub fn normalize_resource_type(input: &str) -> Result<&'static str> {
    resource_type_label(input)
        .ok_or_else(|| anyhow!("Unknown resource type: {}", input))
}

/// Dev spaces, applications, and groups holding a loaded resource type
pub fn nodes_to_reveal(tree: &Tree) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let reveal = match tree.kind(id) {
            Some(NodeKind::DevSpace { .. })
            | Some(NodeKind::Application { .. })
            | Some(NodeKind::DefaultApplication) => true,
            Some(NodeKind::ResourceGroup { .. }) => tree.children(id).iter().any(|child| {
                matches!(tree.kind(*child), Some(NodeKind::ResourceType { loaded: true, .. }))
            }),
            _ => false,
        };
        if reveal {
            out.push(id);
        }
        stack.extend(tree.children(id).iter().copied());
    }
    out
}

async fn reveal(workbench: &WorkbenchHandle) -> Result<()> {
    let tree = workbench.snapshot().await?;
    for id in nodes_to_reveal(&tree) {
        workbench.set_expanded(id, true).await?;
    }
    Ok(())
}

#[instrument(skip(context))]
pub async fn execute_tree(context: &CliContext, expand: &[String]) -> Result<()> {
    let labels = expand
        .iter()
        .map(|input| normalize_resource_type(input))
        .collect::<Result<Vec<_>>>()?;

    let settings = context.load_settings()?;
    let (session, _requests) = context.open_session(&settings)?;
    let mut reconciler = session.reconciler(catalog_source(&settings));

    let mut report = reconciler.run_pass().await?;
    if !labels.is_empty() {
        for label in &labels {
            let targets = session.workbench.expand_resource_types(label).await?;
            debug!(label, branches = targets.len(), "Expanded resource type");
        }
        report = reconciler.run_pass().await?;
    }
    reveal(&session.workbench).await?;

    print!("{}", session.workbench.render().await?);

    if !report.failures.is_empty() {
        bail!(
            "{} part(s) of the tree could not be refreshed",
            report.failures.len()
        );
    }
    Ok(())
}
