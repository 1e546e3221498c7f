//! Cluster query CLI (`kubectl`) client
//!
//! Every request is scoped to a dev space: its namespace is passed with `-n`
//! and its kubeconfig, when known, with `--kubeconfig`.

use crate::command::{command_line, run_checked, CommandRunner};
use crate::errors::{ParseError, Result};
use crate::model::DevSpace;
use crate::resource::{KubeResource, KubeResourceList};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default binary name, resolved through `PATH`
pub const KUBECTL_BINARY: &str = "kubectl";

#[derive(Clone)]
pub struct KubectlClient {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for KubectlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubectlClient")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

/// Render a label selector as `k1=v1,k2=v2`
pub fn format_selector(labels: &IndexMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

impl KubectlClient {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn argv(&self, args: &[&str], devspace: &DevSpace) -> Vec<String> {
        let mut argv = vec![self.binary.clone()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv.push("-n".to_string());
        argv.push(devspace.namespace.clone());
        if let Some(kubeconfig) = &devspace.kubeconfig {
            argv.push("--kubeconfig".to_string());
            argv.push(kubeconfig.display().to_string());
        }
        argv
    }

    async fn run(&self, argv: &[String]) -> Result<String> {
        Ok(run_checked(self.runner.as_ref(), argv, &HashMap::new()).await?)
    }

    async fn run_json<T: DeserializeOwned>(&self, argv: &[String]) -> Result<T> {
        let output = self.run(argv).await?;
        serde_json::from_str(&output).map_err(|e| {
            ParseError::Json {
                context: command_line(argv),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// `kubectl get <kind> [-l selector] -o json`
    #[instrument(skip(self, selector, devspace), fields(namespace = %devspace.namespace))]
    pub async fn get_resource_list(
        &self,
        kind: &str,
        selector: Option<&IndexMap<String, String>>,
        devspace: &DevSpace,
    ) -> Result<KubeResourceList> {
        let selector = selector.map(format_selector);
        let mut args = vec!["get", kind];
        if let Some(selector) = selector.as_deref() {
            args.push("-l");
            args.push(selector);
        }
        args.extend(["-o", "json"]);
        let list: KubeResourceList = self.run_json(&self.argv(&args, devspace)).await?;
        debug!(count = list.items.len(), "Fetched resource list");
        Ok(list)
    }

    /// `kubectl get <kind>/<name> -o json`
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn get_resource(
        &self,
        kind: &str,
        name: &str,
        devspace: &DevSpace,
    ) -> Result<KubeResource> {
        let target = format!("{}/{}", kind, name);
        self.run_json(&self.argv(&["get", &target, "-o", "json"], devspace))
            .await
    }

    /// Full object as YAML text, for display or editing
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn get_resource_yaml(
        &self,
        kind: &str,
        name: &str,
        devspace: &DevSpace,
    ) -> Result<String> {
        let target = format!("{}/{}", kind, name);
        self.run(&self.argv(&["get", &target, "-o", "yaml"], devspace))
            .await
    }

    /// Argument vector for `kubectl logs`; followed streams are spawned by the caller
    pub fn logs_argv(
        &self,
        pod: &str,
        container: &str,
        follow: bool,
        devspace: &DevSpace,
    ) -> Vec<String> {
        let mut args = vec!["logs"];
        if follow {
            args.push("-f");
        }
        args.extend([pod, "-c", container]);
        self.argv(&args, devspace)
    }

    /// `kubectl logs <pod> -c <container>` without following
    #[instrument(skip(self, devspace))]
    pub async fn logs(&self, pod: &str, container: &str, devspace: &DevSpace) -> Result<String> {
        self.run(&self.logs_argv(pod, container, false, devspace))
            .await
    }
}
