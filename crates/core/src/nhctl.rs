//! Workflow CLI (`nhctl`) client
//!
//! Sub-commands map one-to-one onto methods. Global flags (`--debug`,
//! `--kubeconfig`, `--namespace`) are appended after the sub-command's own
//! arguments, and every invocation runs with `DISABLE_SPINNER=true`. When the
//! binary is configured as a path, its directory is put first on `PATH` so
//! helper binaries shipped next to it are found.

use crate::command::{command_line, run_checked, CommandRunner};
use crate::errors::{ParseError, Result};
use crate::model::{DescribeAll, DescribeRecord, DevSpace, NamespaceApplications, PvcItem};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default binary name, resolved through `PATH`
pub const NHCTL_BINARY: &str = "nhctl";

/// Flags accepted by every sub-command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub debug: bool,
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
}

impl GlobalOptions {
    pub fn for_devspace(devspace: &DevSpace) -> Self {
        Self {
            debug: false,
            kubeconfig: devspace.kubeconfig.clone(),
            namespace: Some(devspace.namespace.clone()),
        }
    }

    fn push_args(&self, argv: &mut Vec<String>) {
        if self.debug {
            argv.push("--debug".to_string());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            argv.push("--kubeconfig".to_string());
            argv.push(kubeconfig.display().to_string());
        }
        if let Some(namespace) = self.namespace.as_deref().filter(|n| !n.is_empty()) {
            argv.push("--namespace".to_string());
            argv.push(namespace.to_string());
        }
    }
}

/// Source and packaging flags shared by `install` and `upgrade`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub install_type: Option<String>,
    pub config: Option<String>,
    pub git_url: Option<String>,
    pub git_ref: Option<String>,
    pub helm_chart_name: Option<String>,
    pub helm_repo_name: Option<String>,
    pub helm_repo_url: Option<String>,
    pub helm_repo_version: Option<String>,
    pub helm_values: Option<String>,
    pub outer_config: Option<String>,
    pub local_path: Option<String>,
    pub resource_paths: Vec<String>,
    pub values: IndexMap<String, String>,
    pub ignore_pre_install: bool,
    pub wait: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevStartOptions {
    pub workload: String,
    pub container: Option<String>,
    pub image: Option<String>,
    pub local_sync: Vec<String>,
    pub sidecar_image: Option<String>,
    pub storage_class: Option<String>,
    pub syncthing_version: Option<String>,
    pub work_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub workload: String,
    pub container: Option<String>,
    pub daemon: bool,
    pub double_sided: bool,
    pub ignored_patterns: Vec<String>,
    pub synced_patterns: Vec<String>,
}

/// How `port-forward start` picks its ports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortForwardWay {
    /// Ports configured as dev ports of the workload
    #[default]
    DevPorts,
    /// Ports chosen by the user
    Manual,
}

impl PortForwardWay {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortForwardWay::DevPorts => "devPorts",
            PortForwardWay::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortForwardOptions {
    pub workload: String,
    pub ports: Vec<String>,
    pub pod: Option<String>,
    pub resource_type: Option<String>,
    pub daemon: bool,
    pub way: PortForwardWay,
}

fn push_opt(argv: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        argv.push(flag.to_string());
        argv.push(value.to_string());
    }
}

fn push_flag(argv: &mut Vec<String>, flag: &str, enabled: bool) {
    if enabled {
        argv.push(flag.to_string());
    }
}

fn push_each(argv: &mut Vec<String>, flag: &str, values: &[String]) {
    for value in values {
        argv.push(flag.to_string());
        argv.push(value.clone());
    }
}

#[derive(Clone)]
pub struct NhctlClient {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    debug: bool,
}

impl std::fmt::Debug for NhctlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NhctlClient")
            .field("binary", &self.binary)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl NhctlClient {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            debug: false,
        }
    }

    /// Pass `--debug` on every call
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Environment layered over the inherited one for every invocation
    pub fn env_overlay(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("DISABLE_SPINNER".to_string(), "true".to_string());
        if cfg!(unix) {
            if let Some((dir, _)) = self.binary.rsplit_once('/') {
                let path = std::env::var("PATH").unwrap_or_default();
                env.insert("PATH".to_string(), format!("{}:{}", dir, path));
            }
        }
        env
    }

    fn base(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.binary.clone()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    fn globals(&self, devspace: &DevSpace) -> GlobalOptions {
        GlobalOptions {
            debug: self.debug,
            ..GlobalOptions::for_devspace(devspace)
        }
    }

    async fn run(&self, mut argv: Vec<String>, globals: Option<GlobalOptions>) -> Result<String> {
        if let Some(globals) = globals {
            globals.push_args(&mut argv);
        }
        debug!(command = %command_line(&argv), "Executing nhctl");
        Ok(run_checked(self.runner.as_ref(), &argv, &self.env_overlay()).await?)
    }

    async fn run_yaml<T: DeserializeOwned>(
        &self,
        argv: Vec<String>,
        devspace: &DevSpace,
    ) -> Result<T> {
        let context = command_line(&argv);
        let output = self.run(argv, Some(self.globals(devspace))).await?;
        serde_yaml::from_str(&output).map_err(|e| {
            ParseError::Yaml {
                context,
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Applications installed per namespace (`list --yaml`)
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn list(&self, devspace: &DevSpace) -> Result<Vec<NamespaceApplications>> {
        let listed: Option<Vec<NamespaceApplications>> =
            self.run_yaml(self.base(&["list", "--yaml"]), devspace).await?;
        Ok(listed.unwrap_or_default())
    }

    #[instrument(skip(self, devspace, options), fields(namespace = %devspace.namespace))]
    pub async fn install(
        &self,
        devspace: &DevSpace,
        application: &str,
        options: &InstallOptions,
    ) -> Result<String> {
        let mut argv = self.base(&["install", application]);
        push_opt(&mut argv, "--config", options.config.as_deref());
        push_opt(&mut argv, "--git-ref", options.git_ref.as_deref());
        push_opt(&mut argv, "--git-url", options.git_url.as_deref());
        push_opt(&mut argv, "--helm-chart-name", options.helm_chart_name.as_deref());
        push_opt(&mut argv, "--helm-repo-name", options.helm_repo_name.as_deref());
        push_opt(&mut argv, "--helm-repo-url", options.helm_repo_url.as_deref());
        push_opt(&mut argv, "--helm-repo-version", options.helm_repo_version.as_deref());
        push_opt(&mut argv, "--helm-values", options.helm_values.as_deref());
        push_flag(&mut argv, "--ignore-pre-install", options.ignore_pre_install);
        push_opt(&mut argv, "--outer-config", options.outer_config.as_deref());
        push_each(&mut argv, "--resource-path", &options.resource_paths);
        if !options.values.is_empty() {
            let values = options
                .values
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            argv.push("--set".to_string());
            argv.push(values);
        }
        push_opt(&mut argv, "--type", options.install_type.as_deref());
        push_flag(&mut argv, "--wait", options.wait);
        push_opt(&mut argv, "--local-path", options.local_path.as_deref());
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace, options), fields(namespace = %devspace.namespace))]
    pub async fn upgrade(
        &self,
        devspace: &DevSpace,
        application: &str,
        options: &InstallOptions,
    ) -> Result<String> {
        let mut argv = self.base(&["upgrade", application]);
        push_opt(&mut argv, "--config", options.config.as_deref());
        push_opt(&mut argv, "--git-ref", options.git_ref.as_deref());
        push_opt(&mut argv, "--git-url", options.git_url.as_deref());
        push_opt(&mut argv, "--helm-chart-name", options.helm_chart_name.as_deref());
        push_opt(&mut argv, "--helm-repo-name", options.helm_repo_name.as_deref());
        push_opt(&mut argv, "--helm-repo-url", options.helm_repo_url.as_deref());
        push_opt(&mut argv, "--helm-repo-version", options.helm_repo_version.as_deref());
        push_opt(&mut argv, "--local-path", options.local_path.as_deref());
        push_each(&mut argv, "--resource-path", &options.resource_paths);
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn uninstall(&self, devspace: &DevSpace, application: &str, force: bool) -> Result<String> {
        let mut argv = self.base(&["uninstall", application]);
        push_flag(&mut argv, "--force", force);
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Reset the whole dev space (`reset`)
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn reset_devspace(&self, devspace: &DevSpace) -> Result<String> {
        self.run(self.base(&["reset"]), Some(self.globals(devspace)))
            .await
    }

    #[instrument(skip(self, devspace, options), fields(namespace = %devspace.namespace, workload = %options.workload))]
    pub async fn dev_start(
        &self,
        devspace: &DevSpace,
        application: &str,
        options: &DevStartOptions,
    ) -> Result<String> {
        let mut argv = self.base(&["dev", "start", application]);
        push_opt(&mut argv, "--deployment", Some(options.workload.as_str()));
        push_opt(&mut argv, "--image", options.image.as_deref());
        push_each(&mut argv, "--local-sync", &options.local_sync);
        push_opt(&mut argv, "--sidecar-image", options.sidecar_image.as_deref());
        push_opt(&mut argv, "--storage-class", options.storage_class.as_deref());
        push_opt(&mut argv, "--syncthing-version", options.syncthing_version.as_deref());
        push_opt(&mut argv, "--work-dir", options.work_dir.as_deref());
        push_opt(&mut argv, "--container", options.container.as_deref());
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn dev_end(&self, devspace: &DevSpace, application: &str, workload: &str) -> Result<String> {
        let mut argv = self.base(&["dev", "end", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Restore a workload to its pre-dev state (`dev reset`)
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn dev_reset(&self, devspace: &DevSpace, application: &str, workload: &str) -> Result<String> {
        let mut argv = self.base(&["dev", "reset", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Argument vector for an interactive `dev terminal`; the caller owns the TTY
    pub fn terminal_argv(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
        container: Option<&str>,
        pod: Option<&str>,
    ) -> Vec<String> {
        let mut argv = self.base(&["dev", "terminal", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        push_opt(&mut argv, "--container", container);
        push_opt(&mut argv, "--pod", pod);
        self.globals(devspace).push_args(&mut argv);
        argv
    }

    #[instrument(skip(self, devspace, options), fields(namespace = %devspace.namespace, workload = %options.workload))]
    pub async fn sync(&self, devspace: &DevSpace, application: &str, options: &SyncOptions) -> Result<String> {
        let mut argv = self.base(&["sync", application]);
        push_flag(&mut argv, "--daemon", options.daemon);
        push_opt(&mut argv, "--deployment", Some(options.workload.as_str()));
        push_flag(&mut argv, "--double", options.double_sided);
        push_opt(&mut argv, "--container", options.container.as_deref());
        push_each(&mut argv, "--ignored-pattern", &options.ignored_patterns);
        push_each(&mut argv, "--synced-pattern", &options.synced_patterns);
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn sync_resume(&self, devspace: &DevSpace, application: &str, workload: &str) -> Result<String> {
        let mut argv = self.base(&["sync", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        argv.push("--resume".to_string());
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// File sync status; with `override_remote` the local side wins
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn sync_status(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
        override_remote: bool,
    ) -> Result<String> {
        let mut argv = self.base(&["sync-status", application, "--deployment", workload]);
        push_flag(&mut argv, "--override", override_remote);
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace, options), fields(namespace = %devspace.namespace, workload = %options.workload))]
    pub async fn port_forward_start(
        &self,
        devspace: &DevSpace,
        application: &str,
        options: &PortForwardOptions,
    ) -> Result<String> {
        let mut argv = self.base(&["port-forward", "start", application]);
        push_flag(&mut argv, "--daemon", options.daemon);
        push_opt(&mut argv, "--deployment", Some(options.workload.as_str()));
        push_each(&mut argv, "-p", &options.ports);
        push_opt(&mut argv, "--pod", options.pod.as_deref());
        push_opt(&mut argv, "--type", options.resource_type.as_deref());
        argv.push("--way".to_string());
        argv.push(options.way.as_str().to_string());
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn port_forward_end(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
        port: &str,
        resource_type: Option<&str>,
    ) -> Result<String> {
        let mut argv = self.base(&["port-forward", "end", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        push_opt(&mut argv, "--port", Some(port));
        push_opt(&mut argv, "--type", resource_type);
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Unparsed `describe` output
    pub async fn describe_raw(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: Option<&str>,
        resource_type: Option<&str>,
    ) -> Result<String> {
        let mut argv = self.base(&["describe", application]);
        push_opt(&mut argv, "--deployment", workload);
        push_opt(&mut argv, "--type", resource_type);
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Describe record of one workload
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn describe_workload(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
    ) -> Result<DescribeRecord> {
        let argv = self.base(&["describe", application, "--deployment", workload]);
        self.run_yaml(argv, devspace).await
    }

    /// Application-wide describe, including every tracked workload
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn describe_application(&self, devspace: &DevSpace, application: &str) -> Result<DescribeAll> {
        let described: Option<DescribeAll> = self
            .run_yaml(self.base(&["describe", application]), devspace)
            .await?;
        Ok(described.unwrap_or_default())
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn apply(&self, devspace: &DevSpace, application: &str, file: &str) -> Result<String> {
        let mut argv = self.base(&["apply", application]);
        if !file.is_empty() {
            argv.push(file.to_string());
        }
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// `config get`; application-level config when `workload` is `None`
    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn config_get(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: Option<&str>,
    ) -> Result<String> {
        let mut argv = self.base(&["config", "get", application]);
        push_opt(&mut argv, "--deployment", workload);
        push_flag(&mut argv, "--app-config", workload.is_none());
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace, content), fields(namespace = %devspace.namespace))]
    pub async fn config_edit(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: Option<&str>,
        content: &str,
    ) -> Result<String> {
        let mut argv = self.base(&["config", "edit", application]);
        push_opt(&mut argv, "--deployment", workload);
        push_opt(&mut argv, "--content", Some(content));
        push_flag(&mut argv, "--app-config", workload.is_none());
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn config_template(&self, devspace: &DevSpace, application: &str, workload: &str) -> Result<String> {
        let mut argv = self.base(&["config", "template", application]);
        push_opt(&mut argv, "--deployment", Some(workload));
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn pvc_list(
        &self,
        devspace: &DevSpace,
        application: Option<&str>,
        workload: Option<&str>,
    ) -> Result<Vec<PvcItem>> {
        let mut argv = self.base(&["pvc", "list"]);
        push_opt(&mut argv, "--app", application);
        push_opt(&mut argv, "--svc", workload);
        argv.push("--json".to_string());
        let context = command_line(&argv);
        let output = self.run(argv, Some(self.globals(devspace))).await?;
        let items: Option<Vec<PvcItem>> = serde_json::from_str(&output).map_err(|e| ParseError::Json {
            context,
            message: e.to_string(),
        })?;
        Ok(items.unwrap_or_default())
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn pvc_clean(
        &self,
        devspace: &DevSpace,
        application: Option<&str>,
        workload: Option<&str>,
        name: Option<&str>,
    ) -> Result<String> {
        let mut argv = self.base(&["pvc", "clean"]);
        push_opt(&mut argv, "--app", application);
        push_opt(&mut argv, "--svc", workload);
        push_opt(&mut argv, "--name", name);
        self.run(argv, Some(self.globals(devspace))).await
    }

    #[instrument(skip(self, devspace), fields(namespace = %devspace.namespace))]
    pub async fn exec(
        &self,
        devspace: &DevSpace,
        application: &str,
        workload: &str,
        command: &[String],
    ) -> Result<String> {
        let mut argv = self.base(&["exec", application]);
        push_each(&mut argv, "--command", command);
        push_opt(&mut argv, "--deployment", Some(workload));
        self.run(argv, Some(self.globals(devspace))).await
    }

    /// Client version; takes no global flags
    #[instrument(skip(self))]
    pub async fn version(&self) -> Result<String> {
        self.run(self.base(&["version"]), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{MockResponse, MockRunner};
    use crate::errors::NocalhostError;

    fn devspace() -> DevSpace {
        DevSpace {
            id: 3,
            cluster_id: 7,
            namespace: "dev-7".to_string(),
            space_name: Some("Demo space".to_string()),
            storage_class: Some("cbs".to_string()),
            kubeconfig: Some(PathBuf::from("/tmp/kube-7")),
        }
    }

    fn client(mock: &Arc<MockRunner>) -> NhctlClient {
        NhctlClient::new(mock.clone(), "nhctl")
    }

    #[tokio::test]
    async fn test_list_parses_yaml() {
        let mock = Arc::new(MockRunner::new());
        mock.on(
            &["list"],
            MockResponse::ok(
                "- namespace: dev-7\n  application:\n    - name: default.application\n    - name: demo\n      type: rawManifest\n",
            ),
        );
        let listed = client(&mock).list(&devspace()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].installed_names().collect::<Vec<_>>(), vec!["demo"]);

        let call = &mock.history()[0];
        assert_eq!(
            call.command_line(),
            "nhctl list --yaml --kubeconfig /tmp/kube-7 --namespace dev-7"
        );
        assert_eq!(call.env.get("DISABLE_SPINNER").map(String::as_str), Some("true"));
        assert!(!call.env.contains_key("PATH"));
    }

    #[tokio::test]
    async fn test_empty_list_output() {
        let mock = Arc::new(MockRunner::new());
        mock.on(&["list"], MockResponse::ok(""));
        assert!(client(&mock).list(&devspace()).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_env_overlay_prefixes_binary_dir() {
        let mock = Arc::new(MockRunner::new());
        let nhctl = NhctlClient::new(mock, "/opt/nocalhost/bin/nhctl");
        let env = nhctl.env_overlay();
        assert!(env["PATH"].starts_with("/opt/nocalhost/bin:"));
    }

    #[tokio::test]
    async fn test_dev_start_flags() {
        let mock = Arc::new(MockRunner::new());
        let options = DevStartOptions {
            workload: "web".to_string(),
            container: Some("app".to_string()),
            local_sync: vec!["/home/u/demo".to_string()],
            storage_class: Some("cbs".to_string()),
            ..Default::default()
        };
        client(&mock)
            .with_debug(true)
            .dev_start(&devspace(), "demo", &options)
            .await
            .unwrap();
        assert_eq!(
            mock.history()[0].command_line(),
            "nhctl dev start demo --deployment web --local-sync /home/u/demo --storage-class cbs \
             --container app --debug --kubeconfig /tmp/kube-7 --namespace dev-7"
        );
    }

    #[tokio::test]
    async fn test_port_forward_and_sync_status() {
        let mock = Arc::new(MockRunner::new());
        let nhctl = client(&mock);
        let options = PortForwardOptions {
            workload: "web".to_string(),
            ports: vec!["8080:8080".to_string(), "9090:90".to_string()],
            ..Default::default()
        };
        nhctl
            .port_forward_start(&devspace(), "demo", &options)
            .await
            .unwrap();
        nhctl
            .sync_status(&devspace(), "demo", "web", true)
            .await
            .unwrap();

        let history = mock.history();
        assert!(history[0].command_line().starts_with(
            "nhctl port-forward start demo --deployment web -p 8080:8080 -p 9090:90 --way devPorts"
        ));
        assert!(history[1]
            .command_line()
            .starts_with("nhctl sync-status demo --deployment web --override"));
    }

    #[tokio::test]
    async fn test_install_values_and_resource_paths() {
        let mock = Arc::new(MockRunner::new());
        let mut values = IndexMap::new();
        values.insert("image.tag".to_string(), "v2".to_string());
        values.insert("replicas".to_string(), "2".to_string());
        let options = InstallOptions {
            install_type: Some("rawManifest".to_string()),
            git_url: Some("https://example.com/demo.git".to_string()),
            resource_paths: vec!["manifest/a".to_string(), "manifest/b".to_string()],
            values,
            ..Default::default()
        };
        client(&mock)
            .install(&devspace(), "demo", &options)
            .await
            .unwrap();
        let call = &mock.history()[0];
        assert_eq!(call.flag_value("--set"), Some("image.tag=v2,replicas=2"));
        assert_eq!(call.flag_value("--type"), Some("rawManifest"));
        assert_eq!(call.flag_count("--resource-path"), 2);
    }

    #[tokio::test]
    async fn test_describe_workload_parse_error() {
        let mock = Arc::new(MockRunner::new());
        mock.on(&["describe"], MockResponse::ok("developing: [unterminated"));
        let err = client(&mock)
            .describe_workload(&devspace(), "demo", "web")
            .await
            .unwrap_err();
        assert!(matches!(err, NocalhostError::Parse(ParseError::Yaml { .. })));
        assert!(err.user_message().starts_with("Command failed"));
    }

    #[tokio::test]
    async fn test_pvc_list_json() {
        let mock = Arc::new(MockRunner::new());
        mock.on(
            &["pvc", "list"],
            MockResponse::ok(r#"[{"name": "data-web", "appName": "demo", "capacity": "10Gi"}]"#),
        );
        let items = client(&mock)
            .pvc_list(&devspace(), Some("demo"), None)
            .await
            .unwrap();
        assert_eq!(items[0].app_name.as_deref(), Some("demo"));
        assert!(mock.history()[0].command_line().contains("--app demo --json"));
    }

    #[tokio::test]
    async fn test_version_has_no_global_flags() {
        let mock = Arc::new(MockRunner::new());
        mock.on(&["version"], MockResponse::ok("nhctl v0.4.0\n"));
        let version = client(&mock).version().await.unwrap();
        assert!(version.contains("v0.4.0"));
        assert_eq!(mock.history()[0].argv, vec!["nhctl", "version"]);
    }

    fn args_after_program(call: &crate::command::mock::MockCall) -> Vec<&str> {
        call.argv[1..].iter().map(String::as_str).collect()
    }

    const GLOBALS: [&str; 4] = ["--kubeconfig", "/tmp/kube-7", "--namespace", "dev-7"];

    fn with_globals(args: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        out.extend(GLOBALS.iter().map(|a| a.to_string()));
        out
    }

    #[tokio::test]
    async fn test_lifecycle_subcommands() {
        let mock = Arc::new(MockRunner::new());
        let nhctl = client(&mock);
        let ds = devspace();
        nhctl.uninstall(&ds, "demo", true).await.unwrap();
        nhctl.uninstall(&ds, "demo", false).await.unwrap();
        nhctl.reset_devspace(&ds).await.unwrap();
        nhctl.dev_reset(&ds, "demo", "web").await.unwrap();
        nhctl.sync_resume(&ds, "demo", "web").await.unwrap();
        nhctl.apply(&ds, "demo", "/tmp/extra.yaml").await.unwrap();
        nhctl.apply(&ds, "demo", "").await.unwrap();

        let history = mock.history();
        let expected: [&[&str]; 7] = [
            &["uninstall", "demo", "--force"],
            &["uninstall", "demo"],
            &["reset"],
            &["dev", "reset", "demo", "--deployment", "web"],
            &["sync", "demo", "--deployment", "web", "--resume"],
            &["apply", "demo", "/tmp/extra.yaml"],
            &["apply", "demo"],
        ];
        assert_eq!(history.len(), expected.len());
        for (call, args) in history.iter().zip(expected) {
            assert_eq!(args_after_program(call), with_globals(args));
        }
    }

    #[tokio::test]
    async fn test_port_forward_end_and_describe_type() {
        let mock = Arc::new(MockRunner::new());
        let nhctl = client(&mock);
        let ds = devspace();
        nhctl
            .port_forward_end(&ds, "demo", "web", "8080:8080", Some("statefulset"))
            .await
            .unwrap();
        nhctl
            .port_forward_end(&ds, "demo", "web", "9090:90", None)
            .await
            .unwrap();
        nhctl
            .describe_raw(&ds, "demo", Some("db"), Some("statefulset"))
            .await
            .unwrap();
        nhctl.describe_raw(&ds, "demo", None, None).await.unwrap();

        let history = mock.history();
        assert_eq!(
            args_after_program(&history[0]),
            with_globals(&[
                "port-forward", "end", "demo", "--deployment", "web", "--port", "8080:8080",
                "--type", "statefulset",
            ])
        );
        assert_eq!(
            args_after_program(&history[1]),
            with_globals(&["port-forward", "end", "demo", "--deployment", "web", "--port", "9090:90"])
        );
        assert_eq!(
            args_after_program(&history[2]),
            with_globals(&["describe", "demo", "--deployment", "db", "--type", "statefulset"])
        );
        assert_eq!(args_after_program(&history[3]), with_globals(&["describe", "demo"]));
    }

    #[tokio::test]
    async fn test_config_subcommands() {
        let mock = Arc::new(MockRunner::new());
        mock.on(&["config", "get"], MockResponse::ok("name: web\n"));
        let nhctl = client(&mock);
        let ds = devspace();
        let config = nhctl.config_get(&ds, "demo", Some("web")).await.unwrap();
        assert_eq!(config, "name: web\n");
        nhctl.config_get(&ds, "demo", None).await.unwrap();
        nhctl
            .config_edit(&ds, "demo", Some("web"), "bmFtZTogd2Vi")
            .await
            .unwrap();
        nhctl.config_edit(&ds, "demo", None, "e30=").await.unwrap();
        nhctl.config_template(&ds, "demo", "web").await.unwrap();

        let history = mock.history();
        let expected: [&[&str]; 5] = [
            &["config", "get", "demo", "--deployment", "web"],
            &["config", "get", "demo", "--app-config"],
            &["config", "edit", "demo", "--deployment", "web", "--content", "bmFtZTogd2Vi"],
            &["config", "edit", "demo", "--content", "e30=", "--app-config"],
            &["config", "template", "demo", "--deployment", "web"],
        ];
        for (call, args) in history.iter().zip(expected) {
            assert_eq!(args_after_program(call), with_globals(args));
        }
    }

    #[tokio::test]
    async fn test_pvc_clean_and_exec() {
        let mock = Arc::new(MockRunner::new());
        let nhctl = client(&mock);
        let ds = devspace();
        nhctl
            .pvc_clean(&ds, Some("demo"), Some("web"), Some("data-web"))
            .await
            .unwrap();
        nhctl.pvc_clean(&ds, None, None, None).await.unwrap();
        nhctl
            .exec(&ds, "demo", "web", &["sh".to_string(), "-c".to_string(), "ls -la".to_string()])
            .await
            .unwrap();

        let history = mock.history();
        assert_eq!(
            args_after_program(&history[0]),
            with_globals(&["pvc", "clean", "--app", "demo", "--svc", "web", "--name", "data-web"])
        );
        assert_eq!(args_after_program(&history[1]), with_globals(&["pvc", "clean"]));
        assert_eq!(
            args_after_program(&history[2]),
            with_globals(&[
                "exec", "demo", "--command", "sh", "--command", "-c", "--command", "ls -la",
                "--deployment", "web",
            ])
        );
    }

    #[test]
    fn test_terminal_argv() {
        let mock = Arc::new(MockRunner::new());
        let argv = client(&mock).terminal_argv(&devspace(), "demo", "web", Some("app"), None);
        assert_eq!(
            command_line(&argv),
            "nhctl dev terminal demo --deployment web --container app --kubeconfig /tmp/kube-7 --namespace dev-7"
        );
    }
}
