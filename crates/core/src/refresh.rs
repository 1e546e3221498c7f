//! Reconcile passes and the loop that schedules them
//!
//! A pass loads the catalog, lists installed applications per dev space,
//! merges the dev-space level, then refetches every loaded resource-type
//! branch. Fetch failures are confined to their branch: the branch keeps its
//! previous contents and siblings carry on.

use crate::config::CatalogSource;
use crate::errors::{NocalhostError, Result};
use crate::kubectl::KubectlClient;
use crate::matcher::select_resources;
use crate::model::{Application, DevSpace};
use crate::nhctl::NhctlClient;
use crate::notify::{Notification, Notifier};
use crate::observability::{reconcile_branch_span, reconcile_pass_span, TimedSpan};
use crate::poll::CancelToken;
use crate::reconciler::{installed_applications, DevSpaceState, ResourceEntry};
use crate::tree::BranchTarget;
use crate::workbench::{BranchApplied, WorkbenchHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

/// Where a pass failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFailure {
    pub devspace_id: i64,
    /// Absent when listing the dev space's applications failed
    pub application: Option<String>,
    pub resource_type: Option<&'static str>,
    pub message: String,
    /// Program that could not be started, if that was the cause
    pub missing_binary: Option<String>,
}

impl BranchFailure {
    fn new(
        devspace: &DevSpace,
        application: Option<&str>,
        resource_type: Option<&'static str>,
        err: &NocalhostError,
    ) -> Self {
        Self {
            devspace_id: devspace.id,
            application: application.map(str::to_string),
            resource_type,
            message: err.user_message(),
            missing_binary: err.missing_binary().map(str::to_string),
        }
    }
}

/// Summary of one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub pass: u64,
    pub structural_changes: usize,
    pub updates: usize,
    pub alive_changes: usize,
    pub failures: Vec<BranchFailure>,
}

impl ReconcileReport {
    /// True when the pass left the tree untouched
    pub fn is_quiet(&self) -> bool {
        self.structural_changes == 0 && self.updates == 0 && self.alive_changes == 0
    }

    fn add(&mut self, applied: BranchApplied) {
        self.structural_changes += applied.stats.structural_changes;
        self.updates += applied.stats.updates;
        self.alive_changes += applied.alive_changes;
    }
}

/// Reads remote state through the two command-line clients
#[derive(Debug, Clone)]
pub struct StateFetcher {
    nhctl: NhctlClient,
    kubectl: KubectlClient,
}

impl StateFetcher {
    pub fn new(nhctl: NhctlClient, kubectl: KubectlClient) -> Self {
        Self { nhctl, kubectl }
    }

    /// Catalog applications installed in `devspace`, in `nhctl list` order
    pub async fn fetch_applications(
        &self,
        devspace: &DevSpace,
        catalog_apps: &[Application],
    ) -> Result<Vec<Application>> {
        let listed = self.nhctl.list(devspace).await?;
        Ok(installed_applications(
            catalog_apps,
            &listed,
            &devspace.namespace,
        ))
    }

    /// Resources of one resource-type branch with their describe records
    pub async fn fetch_branch(&self, target: &BranchTarget) -> Result<Vec<ResourceEntry>> {
        let devspace = &target.devspace;
        let list = self
            .kubectl
            .get_resource_list(&target.kubectl_kind(), None, devspace)
            .await?;
        let described = self
            .nhctl
            .describe_application(devspace, &target.application)
            .await?;

        let selected = select_resources(&list.items, &target.application);
        let mut entries = Vec::with_capacity(selected.len());
        for resource in selected {
            let record = described.record_for(resource.name()).cloned();
            if resource.is_kind("Deployment") {
                entries.push(ResourceEntry::new(resource, record));
            } else if resource.is_kind("StatefulSet") {
                let full = self
                    .kubectl
                    .get_resource("statefulset", resource.name(), devspace)
                    .await?;
                entries.push(ResourceEntry::new(full, record));
            } else {
                entries.push(ResourceEntry::new(resource, None));
            }
        }
        debug!(
            resource_type = target.resource_type,
            count = entries.len(),
            "Fetched branch"
        );
        Ok(entries)
    }
}

/// Sender side of the refresh request queue.
///
/// Requests coalesce: while one is pending, more are dropped.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

/// Receiver side of the refresh request queue, consumed by [`ReconcileLoop`]
#[derive(Debug)]
pub struct RefreshRequests {
    rx: mpsc::Receiver<()>,
}

impl RefreshTrigger {
    pub fn channel() -> (RefreshTrigger, RefreshRequests) {
        let (tx, rx) = mpsc::channel(1);
        (RefreshTrigger { tx }, RefreshRequests { rx })
    }

    /// Ask for a pass; false once the loop is gone
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => {
                debug!("Refresh requested with no reconcile loop running");
                false
            }
        }
    }
}

impl RefreshRequests {
    /// Whether a request is waiting, consuming it
    pub fn take_pending(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    async fn next(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Runs reconcile passes against a workbench
pub struct Reconciler {
    fetcher: StateFetcher,
    workbench: WorkbenchHandle,
    catalog: Arc<dyn CatalogSource>,
    notifier: Arc<dyn Notifier>,
    passes: u64,
}

impl Reconciler {
    pub fn new(
        fetcher: StateFetcher,
        workbench: WorkbenchHandle,
        catalog: Arc<dyn CatalogSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            workbench,
            catalog,
            notifier,
            passes: 0,
        }
    }

    /// One full pass.
    ///
    /// Fails only when the catalog cannot be read or the workbench is gone;
    /// per-dev-space and per-branch failures land in the report.
    pub async fn run_pass(&mut self) -> Result<ReconcileReport> {
        self.passes += 1;
        let timed = TimedSpan::new(reconcile_pass_span(self.passes));
        let span = timed.span().clone();
        let report = self.pass_inner().instrument(span).await;
        let duration_ms = timed.complete();
        if let Ok(report) = &report {
            info!(
                pass = report.pass,
                structural_changes = report.structural_changes,
                updates = report.updates,
                failures = report.failures.len(),
                duration_ms,
                "Reconcile pass finished"
            );
        }
        report
    }

    async fn pass_inner(&mut self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            pass: self.passes,
            ..Default::default()
        };

        let catalog = match self.catalog.load().await {
            Ok(catalog) => catalog,
            Err(err) => {
                error!(error = %err, "Failed to load catalog");
                self.notifier
                    .notify(Notification::from_error("Failed to load dev spaces", &err));
                return Err(err);
            }
        };

        let mut states = Vec::with_capacity(catalog.dev_spaces.len());
        for devspace in &catalog.dev_spaces {
            let applications = match self
                .fetcher
                .fetch_applications(devspace, &catalog.applications)
                .await
            {
                Ok(apps) => Some(apps),
                Err(err) => {
                    self.record_failure(&mut report, BranchFailure::new(devspace, None, None, &err), &err);
                    None
                }
            };
            states.push(DevSpaceState {
                devspace: devspace.clone(),
                applications,
            });
        }

        let stats = self.workbench.apply_devspaces(states).await?;
        report.structural_changes += stats.structural_changes;
        report.updates += stats.updates;

        for target in self.workbench.plan().await? {
            let applied = self.refresh_target(&mut report, target).await?;
            if let Some(applied) = applied {
                report.add(applied);
            }
        }
        Ok(report)
    }

    /// Fetch and merge a single branch, e.g. one the user just expanded
    pub async fn refresh_branch(&mut self, target: BranchTarget) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            pass: self.passes,
            ..Default::default()
        };
        if let Some(applied) = self.refresh_target(&mut report, target).await? {
            report.add(applied);
        }
        Ok(report)
    }

    async fn refresh_target(
        &self,
        report: &mut ReconcileReport,
        target: BranchTarget,
    ) -> Result<Option<BranchApplied>> {
        let span = reconcile_branch_span(
            target.devspace.id,
            &target.application,
            target.resource_type,
        );
        match self.fetcher.fetch_branch(&target).instrument(span).await {
            Ok(entries) => Ok(Some(self.workbench.apply_resources(target, entries).await?)),
            Err(err) => {
                let failure = BranchFailure::new(
                    &target.devspace,
                    Some(&target.application),
                    Some(target.resource_type),
                    &err,
                );
                self.record_failure(report, failure, &err);
                Ok(None)
            }
        }
    }

    fn record_failure(&self, report: &mut ReconcileReport, failure: BranchFailure, err: &NocalhostError) {
        error!(
            devspace_id = failure.devspace_id,
            application = ?failure.application,
            resource_type = ?failure.resource_type,
            error = %err,
            "Failed to refresh branch"
        );
        self.notifier
            .notify(Notification::from_error("Failed to refresh resources", err));
        report.failures.push(failure);
    }
}

/// Background driver: a pass on start, on every interval tick and on every
/// refresh request, never two at once
pub struct ReconcileLoop {
    reconciler: Reconciler,
    requests: RefreshRequests,
    interval: Duration,
    reports: Option<mpsc::UnboundedSender<ReconcileReport>>,
}

impl ReconcileLoop {
    pub fn new(reconciler: Reconciler, requests: RefreshRequests, interval: Duration) -> Self {
        Self {
            reconciler,
            requests,
            interval,
            reports: None,
        }
    }

    /// Send each finished pass's report to `reports`
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<ReconcileReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Run until `shutdown` fires or the workbench stops
    pub async fn run(mut self, shutdown: CancelToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Reconcile loop shutting down");
                    return Ok(());
                }
                request = self.requests.next(), if triggers_open => {
                    if request.is_none() {
                        triggers_open = false;
                        continue;
                    }
                    debug!("Refresh requested");
                }
                _ = ticker.tick() => {}
            }

            match self.reconciler.run_pass().await {
                Ok(report) => {
                    if let Some(reports) = &self.reports {
                        let _ = reports.send(report);
                    }
                }
                Err(NocalhostError::WorkbenchClosed) => return Err(NocalhostError::WorkbenchClosed),
                Err(err) => warn!(error = %err, "Reconcile pass failed"),
            }
            // A request that arrived mid-pass is already covered.
            self.requests.take_pending();
            ticker.reset();
        }
    }
}
