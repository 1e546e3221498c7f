//! Dev-mode lifecycle
//!
//! Starting dev mode is a strictly ordered sequence of workflow-CLI and
//! cluster-CLI calls:
//!
//! ```text
//! CheckingStatus -> DevStarting -> WaitingContainerReady -> Syncing
//!                -> PortForwarding (only with dev ports) -> Ready
//! ```
//!
//! A workload that is already developing goes straight to `Ready`. Any
//! failing step ends in `Failed` and no later step runs. The local binding is
//! written only on the way to `Ready`.

use crate::binding::{BindingScope, LocalBinding};
use crate::errors::{DevModeError, NocalhostError, Result};
use crate::kubectl::KubectlClient;
use crate::model::{DevSpace, DEV_SIDECAR_CONTAINER_NAME};
use crate::nhctl::{DevStartOptions, NhctlClient, PortForwardOptions, PortForwardWay, SyncOptions};
use crate::notify::{Notification, Notifier};
use crate::observability::{devmode_end_span, devmode_start_span, TimedSpan};
use crate::poll::{poll_until, CancelToken, PollError, Probe, ReadinessPolicy};
use crate::refresh::RefreshTrigger;
use crate::session::SessionContext;
use crate::workbench::WorkbenchHandle;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DevModeState {
    Idle,
    CheckingStatus,
    DevStarting,
    WaitingContainerReady,
    Syncing,
    PortForwarding,
    Ready,
    Failed,
}

impl DevModeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevModeState::Idle => "idle",
            DevModeState::CheckingStatus => "checking status",
            DevModeState::DevStarting => "dev start",
            DevModeState::WaitingContainerReady => "waiting for dev container",
            DevModeState::Syncing => "sync file",
            DevModeState::PortForwarding => "port forward",
            DevModeState::Ready => "ready",
            DevModeState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DevModeState::Ready | DevModeState::Failed)
    }
}

impl fmt::Display for DevModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every state a dev-mode run enters, in order
pub trait DevModeObserver: Send + Sync {
    fn on_transition(&self, state: DevModeState);
}

/// Which workload to develop and where its sources live
#[derive(Debug, Clone, PartialEq)]
pub struct DevModeRequest {
    pub devspace: DevSpace,
    pub application: String,
    pub workload: String,
    pub container: String,
    /// Local directory synced into the dev container
    pub local_dir: PathBuf,
}

#[derive(Debug)]
pub enum DevModeOutcome {
    Ready {
        /// The workload was developing before this run started
        already_developing: bool,
        /// Ports forwarded by this run
        ports: Vec<String>,
        /// Readiness probes it took
        attempts: u32,
    },
    Failed {
        /// State in which the run failed
        step: DevModeState,
        error: NocalhostError,
    },
}

impl DevModeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, DevModeOutcome::Ready { .. })
    }

    pub fn error(&self) -> Option<&NocalhostError> {
        match self {
            DevModeOutcome::Failed { error, .. } => Some(error),
            DevModeOutcome::Ready { .. } => None,
        }
    }
}

struct Progress {
    already_developing: bool,
    ports: Vec<String>,
    attempts: u32,
}

type StepResult<T> = std::result::Result<T, (DevModeState, NocalhostError)>;

/// Runs dev-mode start and end for one session.
///
/// Runs for the same workload are not deduplicated.
#[derive(Clone)]
pub struct DevModeOrchestrator {
    nhctl: NhctlClient,
    kubectl: KubectlClient,
    workbench: WorkbenchHandle,
    scope: BindingScope,
    notifier: Arc<dyn Notifier>,
    refresh: RefreshTrigger,
    policy: ReadinessPolicy,
    observer: Option<Arc<dyn DevModeObserver>>,
}

impl DevModeOrchestrator {
    pub fn new(session: &SessionContext) -> Self {
        Self {
            nhctl: session.nhctl.clone(),
            kubectl: session.kubectl.clone(),
            workbench: session.workbench.clone(),
            scope: session.scope.clone(),
            notifier: session.notifier.clone(),
            refresh: session.refresh.clone(),
            policy: session.readiness,
            observer: None,
        }
    }

    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DevModeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn enter(&self, state: DevModeState) {
        debug!(state = state.as_str(), "Dev mode transition");
        if let Some(observer) = &self.observer {
            observer.on_transition(state);
        }
    }

    fn checkpoint(&self, cancel: &CancelToken, request: &DevModeRequest, next: DevModeState) -> StepResult<()> {
        if cancel.is_cancelled() {
            return Err((
                next,
                DevModeError::Cancelled {
                    workload: request.workload.clone(),
                }
                .into(),
            ));
        }
        self.enter(next);
        Ok(())
    }

    /// Bring `request.workload` into dev mode
    pub async fn start(&self, request: &DevModeRequest, cancel: &CancelToken) -> DevModeOutcome {
        let timed = TimedSpan::new(devmode_start_span(
            request.devspace.id,
            &request.application,
            &request.workload,
        ));
        let span = timed.span().clone();
        let outcome = async {
            match self.run_steps(request, cancel).await {
                Ok(progress) => self.finish_ready(request, progress).await,
                Err((step, error)) => self.finish_failed(request, step, error),
            }
        }
        .instrument(span)
        .await;
        let duration_ms = timed.complete();
        debug!(duration_ms, ready = outcome.is_ready(), "Dev mode start finished");
        outcome
    }

    async fn run_steps(&self, request: &DevModeRequest, cancel: &CancelToken) -> StepResult<Progress> {
        self.checkpoint(cancel, request, DevModeState::CheckingStatus)?;
        let record = self
            .nhctl
            .describe_workload(&request.devspace, &request.application, &request.workload)
            .await
            .map_err(|err| (DevModeState::CheckingStatus, describe_error(&request.workload, err)))?;
        let ports = record.dev_ports(&request.container);

        if record.developing {
            info!(workload = %request.workload, "Workload is already developing");
            return Ok(Progress {
                already_developing: true,
                ports: Vec::new(),
                attempts: 0,
            });
        }

        self.checkpoint(cancel, request, DevModeState::DevStarting)?;
        let options = DevStartOptions {
            workload: request.workload.clone(),
            container: Some(request.container.clone()),
            local_sync: vec![request.local_dir.display().to_string()],
            storage_class: request.devspace.storage_class.clone(),
            ..Default::default()
        };
        self.nhctl
            .dev_start(&request.devspace, &request.application, &options)
            .await
            .map_err(|err| (DevModeState::DevStarting, err))?;

        self.checkpoint(cancel, request, DevModeState::WaitingContainerReady)?;
        let attempts = self
            .wait_container_ready(request, cancel)
            .await
            .map_err(|err| (DevModeState::WaitingContainerReady, err))?;

        self.checkpoint(cancel, request, DevModeState::Syncing)?;
        let sync = SyncOptions {
            workload: request.workload.clone(),
            container: Some(request.container.clone()),
            ..Default::default()
        };
        self.nhctl
            .sync(&request.devspace, &request.application, &sync)
            .await
            .map_err(|err| (DevModeState::Syncing, err))?;

        if !ports.is_empty() {
            self.checkpoint(cancel, request, DevModeState::PortForwarding)?;
            let forward = PortForwardOptions {
                workload: request.workload.clone(),
                ports: ports.clone(),
                way: PortForwardWay::DevPorts,
                ..Default::default()
            };
            self.nhctl
                .port_forward_start(&request.devspace, &request.application, &forward)
                .await
                .map_err(|err| (DevModeState::PortForwarding, err))?;
        }

        Ok(Progress {
            already_developing: false,
            ports,
            attempts,
        })
    }

    /// Poll until the deployment is available and its pod runs the dev sidecar
    #[instrument(skip(self, request, cancel), fields(workload = %request.workload))]
    async fn wait_container_ready(&self, request: &DevModeRequest, cancel: &CancelToken) -> Result<u32> {
        let polled = poll_until(&self.policy, cancel, |attempt| self.probe_ready(request, attempt)).await;
        match polled {
            Ok(polled) => Ok(polled.attempts),
            Err(PollError::Failed(err)) => Err(err),
            Err(PollError::Exhausted { attempts }) => Err(DevModeError::ReadinessTimeout {
                workload: request.workload.clone(),
                attempts,
            }
            .into()),
            Err(PollError::Cancelled) => Err(DevModeError::Cancelled {
                workload: request.workload.clone(),
            }
            .into()),
        }
    }

    async fn probe_ready(&self, request: &DevModeRequest, attempt: u32) -> Result<Probe<()>> {
        let deployment = self
            .kubectl
            .get_resource("deployment", &request.workload, &request.devspace)
            .await?;
        let selector = deployment
            .match_labels()
            .ok_or_else(|| DevModeError::MissingSelector {
                workload: request.workload.clone(),
            })?;
        let pods = self
            .kubectl
            .get_resource_list("pods", Some(selector), &request.devspace)
            .await?;

        let available = deployment.is_available();
        let sidecar = pods
            .items
            .first()
            .is_some_and(|pod| pod.has_container(DEV_SIDECAR_CONTAINER_NAME));
        debug!(attempt, available, sidecar, pods = pods.items.len(), "Readiness probe");
        if available && sidecar {
            Ok(Probe::Ready(()))
        } else {
            Ok(Probe::Pending)
        }
    }

    async fn finish_ready(&self, request: &DevModeRequest, progress: Progress) -> DevModeOutcome {
        let key = self
            .scope
            .key(&request.application, request.devspace.id, &request.workload);
        let binding = LocalBinding::new(key, request.local_dir.clone());
        if let Err(error) = self.workbench.register_binding(binding).await {
            return self.finish_failed(request, DevModeState::Ready, error);
        }

        self.enter(DevModeState::Ready);
        info!(
            workload = %request.workload,
            local_dir = %request.local_dir.display(),
            "Dev mode started"
        );
        self.notifier
            .notify(Notification::success("DevMode started", ""));
        self.refresh.request();
        DevModeOutcome::Ready {
            already_developing: progress.already_developing,
            ports: progress.ports,
            attempts: progress.attempts,
        }
    }

    fn finish_failed(&self, request: &DevModeRequest, step: DevModeState, error: NocalhostError) -> DevModeOutcome {
        self.enter(DevModeState::Failed);
        error!(
            workload = %request.workload,
            step = step.as_str(),
            error = %error,
            "Error occurred while starting dev mode"
        );
        self.notifier
            .notify(Notification::from_error("Failed to start dev mode", &error));
        DevModeOutcome::Failed { step, error }
    }

    /// Leave dev mode: `dev end`, drop the local binding, refresh.
    ///
    /// Bindings whose local directory no longer exists are pruned as well.
    pub async fn end(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
    ) -> Result<Option<LocalBinding>> {
        let timed = TimedSpan::new(devmode_end_span(devspace.id, application, workload));
        let span = timed.span().clone();
        let result = async {
            if let Err(err) = self.nhctl.dev_end(devspace, application, workload).await {
                error!(workload, error = %err, "Failed to end dev mode");
                self.notifier
                    .notify(Notification::from_error("Failed to end dev mode", &err));
                return Err(err);
            }

            let removed = self
                .workbench
                .remove_binding(self.scope.key(application, devspace.id, workload))
                .await?;
            let stale = self
                .workbench
                .prune_bindings(|binding| binding.local_path.exists())
                .await?;
            if !stale.is_empty() {
                debug!(count = stale.len(), "Dropped bindings for missing directories");
            }

            info!(workload, "Dev mode ended");
            self.notifier.notify(Notification::success("DevMode ended", ""));
            self.refresh.request();
            Ok(removed)
        }
        .instrument(span)
        .await;
        timed.complete();
        result
    }
}

fn describe_error(workload: &str, err: NocalhostError) -> NocalhostError {
    if err.is_binary_missing() {
        return err;
    }
    DevModeError::DescribeUnavailable {
        workload: workload.to_string(),
        message: err.user_message(),
    }
    .into()
}

pub mod mock {
    use super::{DevModeObserver, DevModeState};
    use std::sync::{Mutex, PoisonError};

    /// Keeps every transition for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        states: Mutex<Vec<DevModeState>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn states(&self) -> Vec<DevModeState> {
            self.states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl DevModeObserver for RecordingObserver {
        fn on_transition(&self, state: DevModeState) {
            self.states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(state);
        }
    }
}
