//! Local bindings between remote workloads and local directories
//!
//! A binding is written when dev mode starts successfully and survives across
//! sessions in `bindings.json` under the data directory. The registry itself
//! is not synchronized; the workbench actor is its only owner.
//!
//! The alive set is session-only: it records which bindings the reconciler has
//! seen backed by a workload that is currently developing.

use crate::errors::BindingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const REGISTRY_FILE: &str = "bindings.json";
const REGISTRY_VERSION: u32 = 1;

/// Identity of a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingKey {
    /// Server base URL
    pub host: String,
    /// Account email
    pub email: String,
    pub application: String,
    pub devspace_id: i64,
    pub workload: String,
}

/// Server and account a session's bindings belong to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingScope {
    pub host: String,
    pub email: String,
}

impl BindingScope {
    pub fn new(host: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            email: email.into(),
        }
    }

    pub fn key(&self, application: &str, devspace_id: i64, workload: &str) -> BindingKey {
        BindingKey {
            host: self.host.clone(),
            email: self.email.clone(),
            application: application.to_string(),
            devspace_id,
            workload: workload.to_string(),
        }
    }
}

/// A workload bound to a local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBinding {
    #[serde(flatten)]
    pub key: BindingKey,
    pub local_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl LocalBinding {
    pub fn new(key: BindingKey, local_path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            local_path: local_path.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    bindings: Vec<LocalBinding>,
}

/// Persistent table of local bindings
#[derive(Debug, Default)]
pub struct BindingRegistry {
    path: Option<PathBuf>,
    bindings: Vec<LocalBinding>,
}

impl BindingRegistry {
    /// Registry that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the registry stored under `data_dir`, starting empty if there is none
    #[instrument]
    pub fn open(data_dir: &Path) -> Result<Self, BindingError> {
        let path = data_dir.join(REGISTRY_FILE);
        let bindings = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: RegistryFile =
                serde_json::from_str(&content).map_err(|e| BindingError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            if file.version != REGISTRY_VERSION {
                warn!(version = file.version, "Unexpected binding registry version");
            }
            file.bindings
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), count = bindings.len(), "Opened binding registry");
        Ok(Self {
            path: Some(path),
            bindings,
        })
    }

    /// Location of the backing file, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn find(&self, key: &BindingKey) -> Option<&LocalBinding> {
        self.bindings.iter().find(|b| &b.key == key)
    }

    pub fn list(&self) -> &[LocalBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Add a binding, replacing any existing one with the same key
    #[instrument(skip(self, binding), fields(application = %binding.key.application, workload = %binding.key.workload))]
    pub fn register(&mut self, binding: LocalBinding) -> Result<(), BindingError> {
        let mut next: Vec<LocalBinding> = self
            .bindings
            .iter()
            .filter(|b| b.key != binding.key)
            .cloned()
            .collect();
        info!(local_path = %binding.local_path.display(), "Registering local binding");
        next.push(binding);
        self.commit(next)
    }

    /// Remove the binding for `key`, returning it if present
    #[instrument(skip(self), fields(application = %key.application, workload = %key.workload))]
    pub fn remove(&mut self, key: &BindingKey) -> Result<Option<LocalBinding>, BindingError> {
        let Some(index) = self.bindings.iter().position(|b| &b.key == key) else {
            debug!("No local binding to remove");
            return Ok(None);
        };
        let mut next = self.bindings.clone();
        let removed = next.remove(index);
        self.commit(next)?;
        info!("Local binding removed");
        Ok(Some(removed))
    }

    /// Drop every binding for which `is_live` returns false
    pub fn prune_stale<F>(&mut self, mut is_live: F) -> Result<Vec<LocalBinding>, BindingError>
    where
        F: FnMut(&LocalBinding) -> bool,
    {
        let (kept, stale): (Vec<_>, Vec<_>) =
            self.bindings.iter().cloned().partition(|b| is_live(b));
        if !stale.is_empty() {
            self.commit(kept)?;
            info!(count = stale.len(), "Pruned stale local bindings");
        }
        Ok(stale)
    }

    /// Write `next` to disk and only then make it the in-memory table
    fn commit(&mut self, next: Vec<LocalBinding>) -> Result<(), BindingError> {
        self.persist(&next)?;
        self.bindings = next;
        Ok(())
    }

    fn persist(&self, bindings: &[LocalBinding]) -> Result<(), BindingError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            version: REGISTRY_VERSION,
            bindings: bindings.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|e| BindingError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), count = bindings.len(), "Persisted binding registry");
        Ok(())
    }
}

/// A binding whose workload the reconciler has seen developing this session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliveWorkload {
    pub devspace_id: i64,
    pub application: String,
    pub workload: String,
    pub local_path: PathBuf,
}

impl AliveWorkload {
    fn same_workload(&self, devspace_id: i64, application: &str, workload: &str) -> bool {
        self.devspace_id == devspace_id && self.application == application && self.workload == workload
    }
}

/// Session-scoped set of alive workloads, in insertion order
#[derive(Debug, Clone, Default)]
pub struct AliveSet {
    entries: Vec<AliveWorkload>,
}

impl AliveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `alive`, replacing the entry for the same workload; true if anything changed
    pub fn insert(&mut self, alive: AliveWorkload) -> bool {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|a| a.same_workload(alive.devspace_id, &alive.application, &alive.workload))
        {
            if *existing == alive {
                return false;
            }
            *existing = alive;
            return true;
        }
        self.entries.push(alive);
        true
    }

    /// Drop the entry for a workload; true if one was present
    pub fn remove(&mut self, devspace_id: i64, application: &str, workload: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|a| !a.same_workload(devspace_id, application, workload));
        before != self.entries.len()
    }

    pub fn contains(&self, devspace_id: i64, application: &str, workload: &str) -> bool {
        self.entries
            .iter()
            .any(|a| a.same_workload(devspace_id, application, workload))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliveWorkload> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
