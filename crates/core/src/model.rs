//! Domain data model
//!
//! Accounts, dev spaces and applications as returned by the server catalog,
//! plus the structured records the workflow CLI (`nhctl`) emits for `list`,
//! `describe` and `pvc list`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Name the workflow CLI uses for resources not owned by any installed application
pub const DEFAULT_APPLICATION_NAME: &str = "default.application";

/// Annotation written by the workflow CLI on resources it installs
pub const NOCALHOST_ANNOTATION_NAME: &str = "dev.nocalhost/application-name";

/// Annotation written by Helm on resources of a release
pub const HELM_ANNOTATION_NAME: &str = "meta.helm.sh/release-name";

/// Container injected into a workload once dev mode is running
pub const DEV_SIDECAR_CONTAINER_NAME: &str = "nocalhost-dev";

/// The signed-in user; root of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A (cluster, namespace) pair the user develops against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevSpace {
    /// Server-side dev space id
    pub id: i64,
    /// Unique cluster identifier; identity of the dev-space node
    pub cluster_id: i64,
    pub namespace: String,
    #[serde(default)]
    pub space_name: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Path of the kubeconfig granting access to this dev space
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

impl DevSpace {
    /// Label used in the tree and in log messages
    pub fn display_name(&self) -> &str {
        self.space_name.as_deref().unwrap_or(&self.namespace)
    }
}

/// Where an application comes from and how it is packaged
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationContext {
    pub application_name: String,
    #[serde(default)]
    pub application_url: Option<String>,
    #[serde(default)]
    pub application_config_path: Option<String>,
    /// "git", "local" or a chart registry
    #[serde(default)]
    pub source: String,
    /// Packaging as reported by the server ("rawManifest", "helm_chart", "kustomize", ...)
    #[serde(default)]
    pub install_type: String,
    #[serde(default)]
    pub resource_dir: Vec<String>,
}

/// A deployable unit managed by the workflow CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub context: ApplicationContext,
}

impl Application {
    pub fn name(&self) -> &str {
        &self.context.application_name
    }

    /// Install type the workflow CLI expects for this application
    pub fn install_type(&self) -> InstallType {
        InstallType::derive(&self.context.source, &self.context.install_type)
    }
}

/// Install type passed to `nhctl install --type`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstallType {
    RawManifest,
    HelmGit,
    KustomizeGit,
    HelmRepo,
    /// Local sources pass the server-reported type through unchanged
    Local(String),
}

impl InstallType {
    /// Derive the install type from the `{source, originInstallType}` pair
    pub fn derive(source: &str, origin_install_type: &str) -> Self {
        match (source, origin_install_type) {
            ("git", "rawManifest") => InstallType::RawManifest,
            ("git", "helm_chart") => InstallType::HelmGit,
            ("git", "kustomize") => InstallType::KustomizeGit,
            ("local", other) => InstallType::Local(other.to_string()),
            _ => InstallType::HelmRepo,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstallType::RawManifest => "rawManifest",
            InstallType::HelmGit => "helmGit",
            InstallType::KustomizeGit => "kustomizeGit",
            InstallType::HelmRepo => "helmRepo",
            InstallType::Local(value) => value,
        }
    }

    /// Whether installing needs a local directory instead of a remote source
    pub fn is_local_source(&self) -> bool {
        matches!(self, InstallType::Local(t) if t == "helmLocal" || t == "rawManifestLocal")
    }

    /// Whether the application is packaged as a Helm chart
    pub fn is_helm(&self) -> bool {
        match self {
            InstallType::HelmGit | InstallType::HelmRepo => true,
            InstallType::Local(t) => t == "helmLocal",
            _ => false,
        }
    }
}

impl fmt::Display for InstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One namespace entry of `nhctl list --yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceApplications {
    pub namespace: String,
    #[serde(default)]
    pub application: Vec<ListedApplication>,
}

impl NamespaceApplications {
    /// Installed application names, excluding the default application
    pub fn installed_names(&self) -> impl Iterator<Item = &str> {
        self.application
            .iter()
            .map(|a| a.name.as_str())
            .filter(|name| *name != DEFAULT_APPLICATION_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedApplication {
    pub name: String,
    #[serde(default, rename = "type")]
    pub app_type: Option<String>,
}

/// Dev settings of one container in a workload's raw config
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    /// Port pairs to forward while developing, e.g. "8080:8080"
    #[serde(default)]
    pub port_forward: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContainer {
    pub name: String,
    #[serde(default)]
    pub dev: DevConfig,
}

/// Raw per-workload configuration held by the workflow CLI
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    pub name: String,
    #[serde(default, rename = "serviceType")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub containers: Vec<ServiceContainer>,
}

/// Status the workflow CLI reports for one workload (`nhctl describe --deployment`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRecord {
    #[serde(default)]
    pub raw_config: RawConfig,
    #[serde(default)]
    pub actual_name: Option<String>,
    #[serde(default)]
    pub developing: bool,
    #[serde(default)]
    pub port_forwarded: bool,
    #[serde(default)]
    pub syncing: bool,
    #[serde(default)]
    pub port_forward_status_list: Vec<String>,
}

impl DescribeRecord {
    /// Workload name the record describes
    pub fn workload(&self) -> &str {
        &self.raw_config.name
    }

    /// Ports configured for forwarding on `container`; empty when the container is unknown
    pub fn dev_ports(&self, container: &str) -> Vec<String> {
        self.raw_config
            .containers
            .iter()
            .find(|c| c.name == container)
            .map(|c| c.dev.port_forward.clone())
            .unwrap_or_default()
    }
}

/// Application-wide describe output (`nhctl describe <app>`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeAll {
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub svc_profile: Option<Vec<DescribeRecord>>,
}

impl DescribeAll {
    /// Record for the workload named `name`, if the application tracks it
    pub fn record_for(&self, name: &str) -> Option<&DescribeRecord> {
        self.svc_profile
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|svc| svc.raw_config.name == name)
    }
}

/// Persistent volume claim reported by `nhctl pvc list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcItem {
    pub name: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub capacity: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mount_path: Option<String>,
}
