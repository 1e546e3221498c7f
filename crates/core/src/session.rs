//! Per-session context
//!
//! One [`SessionContext`] exists per signed-in account. It carries the CLI
//! clients, the workbench handle, the notifier and the refresh trigger, and
//! is handed to the reconciler, the dev-mode orchestrator and the installer
//! when they are constructed. Dropping every clone tears the session down.

use crate::binding::{BindingRegistry, BindingScope};
use crate::command::{CommandRunner, ProcessRunner};
use crate::config::{CatalogSource, Settings};
use crate::devmode::DevModeOrchestrator;
use crate::errors::Result;
use crate::install::Installer;
use crate::kubectl::{KubectlClient, KUBECTL_BINARY};
use crate::logs::KubectlLogSource;
use crate::model::UserInfo;
use crate::nhctl::{NhctlClient, NHCTL_BINARY};
use crate::notify::{Notifier, TracingNotifier};
use crate::poll::ReadinessPolicy;
use crate::refresh::{Reconciler, RefreshRequests, RefreshTrigger, StateFetcher};
use crate::workbench::{Workbench, WorkbenchHandle};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct SessionContext {
    pub scope: BindingScope,
    pub account: UserInfo,
    pub nhctl: NhctlClient,
    pub kubectl: KubectlClient,
    pub workbench: WorkbenchHandle,
    pub notifier: Arc<dyn Notifier>,
    pub refresh: RefreshTrigger,
    pub readiness: ReadinessPolicy,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("scope", &self.scope)
            .field("nhctl", &self.nhctl)
            .field("kubectl", &self.kubectl)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn builder(host: impl Into<String>, account: UserInfo) -> SessionBuilder {
        SessionBuilder {
            host: host.into(),
            account,
            runner: None,
            registry: None,
            notifier: None,
            readiness: ReadinessPolicy::default(),
            nhctl_binary: NHCTL_BINARY.to_string(),
            kubectl_binary: KUBECTL_BINARY.to_string(),
            debug: false,
        }
    }

    /// Builder seeded from settings, with the binding registry opened from the data directory
    pub fn from_settings(settings: &Settings) -> Result<SessionBuilder> {
        let registry = BindingRegistry::open(&settings.data_dir)?;
        Ok(Self::builder(settings.base_url.clone(), settings.user.clone())
            .registry(registry)
            .readiness(settings.readiness_policy())
            .nhctl_binary(settings.nhctl_binary.clone())
            .kubectl_binary(settings.kubectl_binary.clone()))
    }

    pub fn fetcher(&self) -> StateFetcher {
        StateFetcher::new(self.nhctl.clone(), self.kubectl.clone())
    }

    pub fn reconciler(&self, catalog: Arc<dyn CatalogSource>) -> Reconciler {
        Reconciler::new(
            self.fetcher(),
            self.workbench.clone(),
            catalog,
            self.notifier.clone(),
        )
    }

    pub fn orchestrator(&self) -> DevModeOrchestrator {
        DevModeOrchestrator::new(self)
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self)
    }

    pub fn log_source(&self) -> KubectlLogSource {
        KubectlLogSource::new(self.kubectl.clone())
    }
}

#[must_use]
pub struct SessionBuilder {
    host: String,
    account: UserInfo,
    runner: Option<Arc<dyn CommandRunner>>,
    registry: Option<BindingRegistry>,
    notifier: Option<Arc<dyn Notifier>>,
    readiness: ReadinessPolicy,
    nhctl_binary: String,
    kubectl_binary: String,
    debug: bool,
}

impl SessionBuilder {
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn registry(mut self, registry: BindingRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    pub fn nhctl_binary(mut self, binary: impl Into<String>) -> Self {
        self.nhctl_binary = binary.into();
        self
    }

    pub fn kubectl_binary(mut self, binary: impl Into<String>) -> Self {
        self.kubectl_binary = binary.into();
        self
    }

    /// Pass `--debug` to every workflow CLI call
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Spawn the workbench and return the session with the receiving end of its refresh trigger.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> (SessionContext, RefreshRequests) {
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ProcessRunner::new()));
        let registry = self.registry.unwrap_or_else(BindingRegistry::in_memory);
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        let scope = BindingScope::new(self.host, self.account.email.clone());

        debug!(
            host = %scope.host,
            nhctl = %self.nhctl_binary,
            kubectl = %self.kubectl_binary,
            "Starting session"
        );

        let workbench = Workbench::new(self.account.clone(), registry, scope.clone()).spawn();
        let (refresh, requests) = RefreshTrigger::channel();
        let session = SessionContext {
            scope,
            account: self.account,
            nhctl: NhctlClient::new(Arc::clone(&runner), self.nhctl_binary).with_debug(self.debug),
            kubectl: KubectlClient::new(runner, self.kubectl_binary),
            workbench,
            notifier,
            refresh,
            readiness: self.readiness,
        };
        (session, requests)
    }
}
