//! Application install, upgrade and apply
//!
//! The `nhctl install` flags depend on where an application's sources live:
//! a chart repository, a git repository, or a local directory.

use crate::errors::{NocalhostError, Result};
use crate::model::{Application, DevSpace, InstallType};
use crate::nhctl::{InstallOptions, NhctlClient};
use crate::notify::{Notification, Notifier};
use crate::observability::{install_app_span, TimedSpan};
use crate::refresh::RefreshTrigger;
use crate::session::SessionContext;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, Instrument};

/// Choices the user makes on top of the catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallChoices {
    /// Branch, tag or commit for git sources
    pub git_ref: Option<String>,
    /// Chart version for chart-repository sources
    pub helm_version: Option<String>,
    /// Values file for Helm packaged applications
    pub helm_values: Option<String>,
    /// `--set` values for Helm sources
    pub values: IndexMap<String, String>,
    /// Source directory for local applications
    pub local_path: Option<String>,
    /// Config file for local applications; defaults to the source directory
    pub outer_config: Option<String>,
    /// Extra kustomize directory
    pub kustomize_path: Option<String>,
}

/// Everything needed to run `nhctl install` for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub application: String,
    pub install_type: InstallType,
    pub options: InstallOptions,
}

impl InstallPlan {
    pub fn new(application: &Application, choices: &InstallChoices) -> Self {
        let context = &application.context;
        let install_type = application.install_type();
        let mut options = InstallOptions {
            install_type: Some(install_type.as_str().to_string()),
            resource_paths: context.resource_dir.clone(),
            ..Default::default()
        };

        if install_type.is_local_source() {
            options.local_path = choices.local_path.clone();
            options.outer_config = choices
                .outer_config
                .clone()
                .or_else(|| choices.local_path.clone());
        } else if install_type == InstallType::HelmRepo {
            options.helm_repo_url = context.application_url.clone();
            options.helm_chart_name = Some(context.application_name.clone());
            options.helm_repo_version = choices.helm_version.clone();
        } else {
            options.git_url = context.application_url.clone();
            options.config = context.application_config_path.clone();
            options.git_ref = choices.git_ref.clone();
        }

        if install_type == InstallType::KustomizeGit {
            if let Some(path) = choices.kustomize_path.as_ref().filter(|p| !p.trim().is_empty()) {
                options.resource_paths.push(path.clone());
            }
        }

        if install_type.is_helm() {
            options.helm_values = choices.helm_values.clone();
            if matches!(install_type, InstallType::HelmGit | InstallType::HelmRepo) {
                options.values = choices.values.clone();
            }
        }

        Self {
            application: context.application_name.clone(),
            install_type,
            options,
        }
    }
}

/// Whether `application` is installed in `devspace`.
///
/// `nhctl describe` exits non-zero for applications that were never
/// installed, so a failed command reads as "not installed". Output that does
/// not parse is still an error.
#[instrument(skip(nhctl, devspace), fields(namespace = %devspace.namespace))]
pub async fn is_application_installed(
    nhctl: &NhctlClient,
    devspace: &DevSpace,
    application: &str,
) -> Result<bool> {
    match nhctl.describe_application(devspace, application).await {
        Ok(described) => Ok(described.installed),
        Err(NocalhostError::Command(err)) => {
            debug!(error = %err, "Describe failed, treating application as not installed");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Install, upgrade and apply for one session
#[derive(Clone)]
pub struct Installer {
    nhctl: NhctlClient,
    notifier: Arc<dyn Notifier>,
    refresh: RefreshTrigger,
}

impl Installer {
    pub fn new(session: &SessionContext) -> Self {
        Self {
            nhctl: session.nhctl.clone(),
            notifier: session.notifier.clone(),
            refresh: session.refresh.clone(),
        }
    }

    /// Install unless the application is already present
    pub async fn install_application(&self, devspace: &DevSpace, plan: &InstallPlan) -> Result<String> {
        let timed = TimedSpan::new(install_app_span(devspace.id, &plan.application));
        let span = timed.span().clone();
        let result = self.install_inner(devspace, plan).instrument(span).await;
        timed.complete();
        result
    }

    async fn install_inner(&self, devspace: &DevSpace, plan: &InstallPlan) -> Result<String> {
        if is_application_installed(&self.nhctl, devspace, &plan.application).await? {
            info!(application = %plan.application, "Application is already installed");
            return Err(NocalhostError::AlreadyInstalled {
                name: plan.application.clone(),
            });
        }

        info!(
            application = %plan.application,
            install_type = %plan.install_type,
            "Installing application"
        );
        match self
            .nhctl
            .install(devspace, &plan.application, &plan.options)
            .await
        {
            Ok(output) => {
                self.notifier.notify(Notification::success(
                    format!("Application {} installed", plan.application),
                    "",
                ));
                self.refresh.request();
                Ok(output)
            }
            Err(err) => {
                error!(application = %plan.application, error = %err, "Error occurred while installing application");
                self.notifier
                    .notify(Notification::from_error("Failed to install application", &err));
                Err(err)
            }
        }
    }

    /// Upgrade an installed application from the same source
    pub async fn upgrade_application(&self, devspace: &DevSpace, plan: &InstallPlan) -> Result<String> {
        let span = install_app_span(devspace.id, &plan.application);
        let result = self
            .nhctl
            .upgrade(devspace, &plan.application, &plan.options)
            .instrument(span)
            .await;
        self.report(result, format!("Application {} upgraded", plan.application), "Failed to upgrade application")
    }

    /// Apply a manifest file into an application
    pub async fn apply_manifest(&self, devspace: &DevSpace, application: &str, file: &str) -> Result<String> {
        let result = self.nhctl.apply(devspace, application, file).await;
        self.report(result, format!("Applied {}", file), "Failed to apply manifest")
    }

    fn report(&self, result: Result<String>, success: String, failure: &str) -> Result<String> {
        match &result {
            Ok(_) => {
                self.notifier.notify(Notification::success(success, ""));
                self.refresh.request();
            }
            Err(err) => {
                error!(error = %err, "{}", failure);
                self.notifier.notify(Notification::from_error(failure, err));
            }
        }
        result
    }
}
