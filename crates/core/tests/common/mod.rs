//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use nocalhost_core::binding::BindingRegistry;
use nocalhost_core::command::mock::MockRunner;
use nocalhost_core::config::{Catalog, StaticCatalog};
use nocalhost_core::model::{Application, ApplicationContext, DevSpace, UserInfo};
use nocalhost_core::notify::mock::RecordingNotifier;
use nocalhost_core::poll::ReadinessPolicy;
use nocalhost_core::refresh::{Reconciler, RefreshRequests};
use nocalhost_core::SessionContext;
use std::sync::Arc;
use std::time::Duration;

pub const HOST: &str = "https://nocalhost.example.com";
pub const EMAIL: &str = "user@x.com";

pub fn devspace(id: i64) -> DevSpace {
    DevSpace {
        id,
        cluster_id: id,
        namespace: format!("dev-{}", id),
        space_name: Some(format!("space-{}", id)),
        storage_class: None,
        kubeconfig: None,
    }
}

pub fn application(id: i64, name: &str) -> Application {
    Application {
        id,
        context: ApplicationContext {
            application_name: name.to_string(),
            application_url: Some(format!("https://github.com/example/{}.git", name)),
            source: "git".to_string(),
            install_type: "rawManifest".to_string(),
            ..Default::default()
        },
    }
}

/// `nhctl list --yaml` output for one namespace
pub fn listing(namespace: &str, apps: &[&str]) -> String {
    let mut out = format!("- namespace: {}\n  application:\n", namespace);
    for app in apps {
        out.push_str(&format!("    - name: {}\n", app));
    }
    out
}

/// `kubectl get <kind> -o json` output with one item per `(kind, name, owner)`
pub fn resource_list(items: &[(&str, &str, Option<&str>)]) -> String {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(kind, name, owner)| {
            let mut metadata = serde_json::json!({ "name": name });
            if let Some(owner) = owner {
                metadata["annotations"] =
                    serde_json::json!({ "dev.nocalhost/application-name": owner });
            }
            serde_json::json!({ "kind": kind, "metadata": metadata })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

pub struct Harness {
    pub runner: Arc<MockRunner>,
    pub notifier: Arc<RecordingNotifier>,
    pub session: SessionContext,
    pub requests: RefreshRequests,
}

impl Harness {
    pub fn new() -> Self {
        let runner = Arc::new(MockRunner::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (session, requests) = SessionContext::builder(
            HOST,
            UserInfo {
                email: EMAIL.to_string(),
                name: None,
            },
        )
        .runner(runner.clone())
        .registry(BindingRegistry::in_memory())
        .notifier(notifier.clone())
        .readiness(ReadinessPolicy::new(Duration::from_secs(1), Some(20), None))
        .build();
        Self {
            runner,
            notifier,
            session,
            requests,
        }
    }

    pub fn reconciler(&self, catalog: Catalog) -> Reconciler {
        self.session.reconciler(Arc::new(StaticCatalog(catalog)))
    }
}
