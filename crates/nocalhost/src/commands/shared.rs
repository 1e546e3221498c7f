//! Settings, session and catalog plumbing shared by the subcommands

use crate::ui::notifier::ConsoleNotifier;
use anyhow::{anyhow, Context, Result};
use nocalhost_core::config::{Catalog, CatalogSource, FileCatalog, Settings, SettingsLoader, SettingsOverrides};
use nocalhost_core::model::DevSpace;
use nocalhost_core::poll::CancelHandle;
use nocalhost_core::refresh::RefreshRequests;
use nocalhost_core::SessionContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Global options available to all subcommands
#[derive(Debug, Clone, Default)]
pub struct CliContext {
    pub config: Option<PathBuf>,
    pub nhctl: Option<String>,
    pub kubectl: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub nhctl_debug: bool,
}

impl CliContext {
    pub fn load_settings(&self) -> Result<Settings> {
        let overrides = SettingsOverrides {
            nhctl_binary: self.nhctl.clone(),
            kubectl_binary: self.kubectl.clone(),
            data_dir: self.data_dir.clone(),
        };
        let settings = SettingsLoader::load_layered(self.config.as_deref(), &overrides)?;
        debug!(data_dir = %settings.data_dir.display(), "Resolved settings");
        Ok(settings)
    }

    /// Session with console notifications and the persistent binding registry
    pub fn open_session(&self, settings: &Settings) -> Result<(SessionContext, RefreshRequests)> {
        let session = SessionContext::from_settings(settings)?
            .notifier(Arc::new(ConsoleNotifier::new()))
            .debug(self.nhctl_debug)
            .build();
        Ok(session)
    }
}

pub fn catalog_source(settings: &Settings) -> Arc<dyn CatalogSource> {
    Arc::new(FileCatalog::new(settings.catalog_path()))
}

pub async fn load_catalog(settings: &Settings) -> Result<Catalog> {
    let path = settings.catalog_path();
    FileCatalog::new(path.clone())
        .load()
        .await
        .with_context(|| format!("Failed to load catalog from {}", path.display()))
}

pub fn find_devspace(catalog: &Catalog, id: i64) -> Result<DevSpace> {
    catalog
        .devspace(id)
        .cloned()
        .ok_or_else(|| anyhow!("Dev space {} not found in catalog", id))
}

/// Cancel `handle` on the first Ctrl-C
pub fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Interrupted");
                handle.cancel();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocalhost_core::model::UserInfo;
    use serial_test::serial;

    #[test]
    fn test_find_devspace() {
        let catalog = Catalog {
            dev_spaces: vec![DevSpace {
                id: 7,
                cluster_id: 3,
                namespace: "dev-7".to_string(),
                space_name: None,
                storage_class: None,
                kubeconfig: None,
            }],
            applications: Vec::new(),
        };
        assert_eq!(find_devspace(&catalog, 7).unwrap().namespace, "dev-7");
        let err = find_devspace(&catalog, 9).unwrap_err();
        assert_eq!(err.to_string(), "Dev space 9 not found in catalog");
    }

    fn clear_env() {
        for key in [
            "NOCALHOST_CONFIG",
            "NOCALHOST_NHCTL",
            "NOCALHOST_KUBECTL",
            "NOCALHOST_DATA_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_overrides_win_over_settings_file() {
        clear_env();
        std::env::set_var("NOCALHOST_NHCTL", "/from/env");
        std::env::set_var("NOCALHOST_KUBECTL", "/env/kubectl");
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "base_url = \"https://h\"\nnhctl_binary = \"/from/file\"\n").unwrap();
        let context = CliContext {
            config: Some(config),
            nhctl: Some("/from/flag".to_string()),
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let settings = context.load_settings().unwrap();
        assert_eq!(settings.nhctl_binary, "/from/flag");
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.kubectl_binary, "/env/kubectl");
        assert_eq!(settings.user, UserInfo { email: String::new(), name: None });
        clear_env();
    }
}
