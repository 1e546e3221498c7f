//! Integration tests for the dev-mode workflow
//!
//! Dev mode is started against scripted `nhctl`/`kubectl` output and the
//! resulting binding is followed through a reconcile pass.

mod common;

use common::{application, devspace, listing, resource_list, Harness, EMAIL, HOST};
use nocalhost_core::command::mock::MockResponse;
use nocalhost_core::config::Catalog;
use nocalhost_core::devmode::mock::RecordingObserver;
use nocalhost_core::devmode::{DevModeOutcome, DevModeRequest, DevModeState};
use nocalhost_core::errors::{DevModeError, NocalhostError};
use nocalhost_core::notify::Level;
use nocalhost_core::poll::CancelToken;
use std::path::PathBuf;
use std::sync::Arc;

const DESCRIBE_WEB_IDLE: &str = "rawConfig:\n  name: web\n  containers:\n    - name: app\n      dev:\n        portForward:\n          - \"8080:8080\"\ndeveloping: false\n";
const DESCRIBE_APP_IDLE: &str = "installed: true\nsvcProfile:\n  - rawConfig:\n      name: web\n    developing: false\n";
const DESCRIBE_APP_DEVELOPING: &str = "installed: true\nsvcProfile:\n  - rawConfig:\n      name: web\n    developing: true\n";
const DEPLOYMENT_AVAILABLE: &str = r#"{"kind":"Deployment","metadata":{"name":"web"},"spec":{"selector":{"matchLabels":{"app":"web"}}},"status":{"availableReplicas":1,"conditions":[{"type":"Available","status":"True"}]}}"#;
const DEPLOYMENT_UNAVAILABLE: &str = r#"{"kind":"Deployment","metadata":{"name":"web"},"spec":{"selector":{"matchLabels":{"app":"web"}}},"status":{"conditions":[{"type":"Available","status":"False"}]}}"#;
const PODS_WITHOUT_SIDECAR: &str = r#"{"items":[{"kind":"Pod","metadata":{"name":"web-1"},"spec":{"containers":[{"name":"app"}]}}]}"#;
const PODS_WITH_SIDECAR: &str = r#"{"items":[{"kind":"Pod","metadata":{"name":"web-2"},"spec":{"containers":[{"name":"nocalhost-dev"},{"name":"app"}]}}]}"#;

fn request() -> DevModeRequest {
    DevModeRequest {
        devspace: devspace(7),
        application: "demo".to_string(),
        workload: "web".to_string(),
        container: "app".to_string(),
        local_dir: PathBuf::from("/home/u/demo"),
    }
}

fn catalog() -> Catalog {
    Catalog {
        dev_spaces: vec![devspace(7)],
        applications: vec![application(1, "demo")],
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_start_and_reconcile() {
    let h = Harness::new();
    h.runner
        .on(&["list"], MockResponse::ok(listing("dev-7", &["demo"])));
    h.runner.on(
        &["get", "deployments"],
        MockResponse::ok(resource_list(&[("Deployment", "web", Some("demo"))])),
    );
    h.runner
        .on(&["describe", "demo"], MockResponse::ok(DESCRIBE_APP_IDLE));
    h.runner.on(
        &["describe", "demo", "--deployment", "web"],
        MockResponse::ok(DESCRIBE_WEB_IDLE),
    );
    h.runner.on(
        &["get", "deployment/web"],
        MockResponse::ok(DEPLOYMENT_AVAILABLE),
    );
    h.runner.on_sequence(
        &["get", "pods"],
        vec![
            MockResponse::ok(PODS_WITHOUT_SIDECAR),
            MockResponse::ok(PODS_WITHOUT_SIDECAR),
            MockResponse::ok(PODS_WITH_SIDECAR),
        ],
    );

    let mut reconciler = h.reconciler(catalog());
    reconciler.run_pass().await.unwrap();
    h.session
        .workbench
        .expand_resource_types("Deployments")
        .await
        .unwrap();
    let loaded = reconciler.run_pass().await.unwrap();
    assert_eq!(loaded.alive_changes, 0);

    let observer = Arc::new(RecordingObserver::new());
    let outcome = h
        .session
        .orchestrator()
        .with_observer(observer.clone())
        .start(&request(), &CancelToken::never())
        .await;

    match &outcome {
        DevModeOutcome::Ready {
            already_developing,
            ports,
            attempts,
        } => {
            assert!(!already_developing);
            assert_eq!(ports, &vec!["8080:8080".to_string()]);
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(
        observer.states(),
        vec![
            DevModeState::CheckingStatus,
            DevModeState::DevStarting,
            DevModeState::WaitingContainerReady,
            DevModeState::Syncing,
            DevModeState::PortForwarding,
            DevModeState::Ready,
        ]
    );
    assert_eq!(h.runner.calls_matching(&["get", "pods"]).len(), 3);
    let forward = &h.runner.calls_matching(&["port-forward", "start", "demo"])[0];
    assert_eq!(forward.flag_value("-p"), Some("8080:8080"));

    let bindings = h.session.workbench.list_bindings().await.unwrap();
    assert_eq!(bindings.len(), 1);
    let binding = &bindings[0];
    assert_eq!(binding.key.host, HOST);
    assert_eq!(binding.key.email, EMAIL);
    assert_eq!(binding.key.application, "demo");
    assert_eq!(binding.key.devspace_id, 7);
    assert_eq!(binding.key.workload, "web");
    assert_eq!(binding.local_path, PathBuf::from("/home/u/demo"));
    assert_eq!(
        h.notifier.with_level(Level::Success)[0].title,
        "DevMode started"
    );

    h.runner
        .on(&["describe", "demo"], MockResponse::ok(DESCRIBE_APP_DEVELOPING));
    let report = reconciler.run_pass().await.unwrap();
    assert_eq!(report.alive_changes, 1);

    let alive = h.session.workbench.alive_workloads().await.unwrap();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].workload, "web");
    assert_eq!(alive[0].devspace_id, 7);
    assert_eq!(alive[0].local_path, PathBuf::from("/home/u/demo"));
}

#[tokio::test(start_paused = true)]
async fn test_available_without_sidecar_keeps_polling() {
    let h = Harness::new();
    h.runner
        .on(&["describe"], MockResponse::ok(DESCRIBE_WEB_IDLE));
    h.runner.on(
        &["get", "deployment/web"],
        MockResponse::ok(DEPLOYMENT_AVAILABLE),
    );
    h.runner
        .on(&["get", "pods"], MockResponse::ok(PODS_WITHOUT_SIDECAR));

    let outcome = h
        .session
        .orchestrator()
        .start(&request(), &CancelToken::never())
        .await;

    match outcome {
        DevModeOutcome::Failed { step, error } => {
            assert_eq!(step, DevModeState::WaitingContainerReady);
            assert!(matches!(
                error,
                NocalhostError::DevMode(DevModeError::ReadinessTimeout { attempts: 20, .. })
            ));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(h.runner.calls_matching(&["get", "pods"]).len(), 20);
    assert!(h.runner.calls_matching(&["sync"]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sidecar_without_availability_keeps_polling() {
    let h = Harness::new();
    h.runner
        .on(&["describe"], MockResponse::ok(DESCRIBE_WEB_IDLE));
    h.runner.on_sequence(
        &["get", "deployment/web"],
        vec![
            MockResponse::ok(DEPLOYMENT_UNAVAILABLE),
            MockResponse::ok(DEPLOYMENT_AVAILABLE),
        ],
    );
    h.runner
        .on(&["get", "pods"], MockResponse::ok(PODS_WITH_SIDECAR));

    let outcome = h
        .session
        .orchestrator()
        .start(&request(), &CancelToken::never())
        .await;
    assert!(matches!(outcome, DevModeOutcome::Ready { attempts: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_dev_start_failure_stops_workflow() {
    let h = Harness::new();
    h.runner
        .on(&["describe"], MockResponse::ok(DESCRIBE_WEB_IDLE));
    h.runner
        .on(&["dev", "start"], MockResponse::fail(1, "image pull failed"));

    let observer = Arc::new(RecordingObserver::new());
    let outcome = h
        .session
        .orchestrator()
        .with_observer(observer.clone())
        .start(&request(), &CancelToken::never())
        .await;

    match &outcome {
        DevModeOutcome::Failed { step, error } => {
            assert_eq!(*step, DevModeState::DevStarting);
            assert!(error.user_message().contains("image pull failed"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(observer.states().last(), Some(&DevModeState::Failed));
    assert!(h.runner.calls_matching(&["get"]).is_empty());
    assert!(h.runner.calls_matching(&["sync"]).is_empty());
    assert!(h.runner.calls_matching(&["port-forward"]).is_empty());
    assert!(h.session.workbench.list_bindings().await.unwrap().is_empty());

    let errors = h.notifier.with_level(Level::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Failed to start dev mode");
}
