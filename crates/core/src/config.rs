//! Settings and the remote catalog
//!
//! Settings come from a TOML file, then environment variables, then
//! command-line overrides, each layer replacing the one before it.
//!
//! ## Environment Variables
//!
//! * `NOCALHOST_CONFIG` - settings file path
//! * `NOCALHOST_NHCTL` - workflow CLI binary
//! * `NOCALHOST_KUBECTL` - cluster CLI binary
//! * `NOCALHOST_DATA_DIR` - directory holding the binding registry and catalog
//!
//! The catalog (dev spaces and the application list the server hands out) is
//! read through [`CatalogSource`]; [`FileCatalog`] reads it from JSON.

use crate::errors::{ConfigError, NocalhostError, Result};
use crate::kubectl::KUBECTL_BINARY;
use crate::model::{Application, DevSpace, UserInfo};
use crate::nhctl::NHCTL_BINARY;
use crate::poll::ReadinessPolicy;
use async_trait::async_trait;
use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

const SETTINGS_FILE: &str = "config.toml";
const CATALOG_FILE: &str = "catalog.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "nocalhost", "nocalhost")
}

/// Readiness wait bounds as written in the settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub poll_interval_ms: u64,
    /// Zero disables the attempt bound
    pub max_attempts: u32,
    pub deadline_secs: Option<u64>,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 600,
            deadline_secs: None,
        }
    }
}

impl ReadinessSettings {
    pub fn to_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            (self.max_attempts > 0).then_some(self.max_attempts),
            self.deadline_secs.map(Duration::from_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server base URL; part of every binding key
    pub base_url: String,
    pub user: UserInfo,
    pub nhctl_binary: String,
    pub kubectl_binary: String,
    pub data_dir: PathBuf,
    pub refresh_interval_secs: u64,
    pub readiness: ReadinessSettings,
    /// Catalog JSON; defaults to `catalog.json` in the data directory
    pub catalog: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            user: UserInfo {
                email: String::new(),
                name: None,
            },
            nhctl_binary: NHCTL_BINARY.to_string(),
            kubectl_binary: KUBECTL_BINARY.to_string(),
            data_dir: default_data_dir(),
            refresh_interval_secs: 30,
            readiness: ReadinessSettings::default(),
            catalog: None,
        }
    }
}

/// Per-user data directory, or a temp directory when none can be determined
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("nocalhost"))
}

impl Settings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        self.readiness.to_policy()
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CATALOG_FILE))
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "base_url must not be empty".to_string(),
            });
        }
        if self.readiness.poll_interval_ms == 0 {
            return Err(ConfigError::Validation {
                message: "readiness.poll_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Validation {
                message: "refresh_interval_secs must be greater than zero".to_string(),
            });
        }
        if self.nhctl_binary.trim().is_empty() || self.kubectl_binary.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "binary paths must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Command-line overrides, highest precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub nhctl_binary: Option<String>,
    pub kubectl_binary: Option<String>,
    pub data_dir: Option<PathBuf>,
}

pub struct SettingsLoader;

impl SettingsLoader {
    /// Parse and validate a settings file
    #[instrument]
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Err(NocalhostError::Config(ConfigError::NotFound {
                path: path.display().to_string(),
            }));
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;
        settings.validate()?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Settings file to read: explicit path, then `NOCALHOST_CONFIG`, then the user config dir
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("NOCALHOST_CONFIG") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        project_dirs()
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
            .filter(|path| path.exists())
    }

    /// Full layering: file (if any), environment, then `overrides`.
    ///
    /// An explicitly named file must exist; the implicit user config file is optional.
    pub fn load_layered(explicit: Option<&Path>, overrides: &SettingsOverrides) -> Result<Settings> {
        let mut settings = match Self::resolve_path(explicit) {
            Some(path) => Self::load(&path)?,
            None => Settings::default(),
        };
        Self::apply_env(&mut settings);
        Self::apply_overrides(&mut settings, overrides);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(settings: &mut Settings) {
        if let Some(value) = non_empty_env("NOCALHOST_NHCTL") {
            settings.nhctl_binary = value;
        }
        if let Some(value) = non_empty_env("NOCALHOST_KUBECTL") {
            settings.kubectl_binary = value;
        }
        if let Some(value) = non_empty_env("NOCALHOST_DATA_DIR") {
            settings.data_dir = PathBuf::from(value);
        }
    }

    pub fn apply_overrides(settings: &mut Settings, overrides: &SettingsOverrides) {
        if let Some(nhctl) = &overrides.nhctl_binary {
            settings.nhctl_binary = nhctl.clone();
        }
        if let Some(kubectl) = &overrides.kubectl_binary {
            settings.kubectl_binary = kubectl.clone();
        }
        if let Some(dir) = &overrides.data_dir {
            settings.data_dir = dir.clone();
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Dev spaces and applications available to the signed-in account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub dev_spaces: Vec<DevSpace>,
    #[serde(default)]
    pub applications: Vec<Application>,
}

impl Catalog {
    pub fn devspace(&self, id: i64) -> Option<&DevSpace> {
        self.dev_spaces.iter().find(|d| d.id == id)
    }

    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name() == name)
    }
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<Catalog>;
}

/// Catalog read from a JSON document on every load
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn load(&self) -> Result<Catalog> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: self.path.display().to_string(),
                }
                .into())
            }
            Err(e) => return Err(ConfigError::Io(e).into()),
        };
        let catalog: Catalog = serde_json::from_str(&content).map_err(|e| ConfigError::Parsing {
            message: format!("{}: {}", self.path.display(), e),
        })?;
        debug!(
            dev_spaces = catalog.dev_spaces.len(),
            applications = catalog.applications.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }
}

/// Fixed in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Catalog);

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn load(&self) -> Result<Catalog> {
        Ok(self.0.clone())
    }
}
