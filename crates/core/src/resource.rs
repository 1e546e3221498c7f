//! Cluster objects as returned by `kubectl get -o json`
//!
//! Only the fields the tree and the dev-mode readiness gate read are typed;
//! everything else is kept in `extra` maps so a resource node can still show
//! the full object.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One live cluster object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeResource {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: Spec,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    #[serde(default)]
    pub annotations: IndexMap<String, String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(default)]
    pub replicas: Option<i64>,
    #[serde(default)]
    pub selector: Option<Selector>,
    /// Pod containers (only present on pods)
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default)]
    pub match_labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub replicas: Option<i64>,
    #[serde(default)]
    pub ready_replicas: Option<i64>,
    #[serde(default)]
    pub available_replicas: Option<i64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `kubectl get <kind> -o json` list envelope
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KubeResourceList {
    #[serde(default)]
    pub items: Vec<KubeResource>,
}

impl KubeResource {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Annotation value, treating an empty value as absent
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }

    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.spec.containers.iter().map(|c| c.name.as_str())
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.container_names().any(|c| c == name)
    }

    /// Pod selector labels of a workload, if it has any
    pub fn match_labels(&self) -> Option<&IndexMap<String, String>> {
        self.spec
            .selector
            .as_ref()
            .map(|s| &s.match_labels)
            .filter(|labels| !labels.is_empty())
    }

    /// Whether a workload reports itself available.
    ///
    /// Requires an `Available=True` condition and, when a desired replica
    /// count is set, at least that many available replicas.
    pub fn is_available(&self) -> bool {
        let condition_met = self
            .status
            .conditions
            .iter()
            .any(|c| c.condition_type == "Available" && c.status == "True");
        if !condition_met {
            return false;
        }
        match self.spec.replicas {
            Some(desired) => self.status.available_replicas.unwrap_or(0) >= desired,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(conditions: &str, replicas: &str, available: &str) -> KubeResource {
        let json = format!(
            r#"{{
                "kind": "Deployment",
                "metadata": {{"name": "web", "annotations": {{"dev.nocalhost/application-name": "demo"}}}},
                "spec": {{{replicas} "selector": {{"matchLabels": {{"app": "web"}}}}}},
                "status": {{"conditions": [{conditions}] {available}}}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_available_requires_condition() {
        let d = deployment("", r#""replicas": 1,"#, r#", "availableReplicas": 1"#);
        assert!(!d.is_available());

        let d = deployment(
            r#"{"type": "Available", "status": "False"}"#,
            r#""replicas": 1,"#,
            r#", "availableReplicas": 1"#,
        );
        assert!(!d.is_available());
    }

    #[test]
    fn test_available_checks_replica_count() {
        let condition = r#"{"type": "Available", "status": "True"}"#;
        assert!(deployment(condition, r#""replicas": 2,"#, r#", "availableReplicas": 2"#).is_available());
        assert!(!deployment(condition, r#""replicas": 2,"#, r#", "availableReplicas": 1"#).is_available());
        assert!(!deployment(condition, r#""replicas": 1,"#, "").is_available());
        assert!(deployment(condition, "", "").is_available());
    }

    #[test]
    fn test_selector_and_annotations() {
        let d = deployment("", "", "");
        assert_eq!(
            d.match_labels().unwrap().get("app").map(String::as_str),
            Some("web")
        );
        assert_eq!(d.annotation("dev.nocalhost/application-name"), Some("demo"));
        assert_eq!(d.annotation("meta.helm.sh/release-name"), None);
        assert!(d.is_kind("deployment"));
    }

    #[test]
    fn test_pod_containers() {
        let pod: KubeResource = serde_json::from_str(
            r#"{"kind": "Pod", "metadata": {"name": "web-1"},
                "spec": {"containers": [{"name": "app"}, {"name": "nocalhost-dev"}], "nodeName": "n1"}}"#,
        )
        .unwrap();
        assert!(pod.has_container("nocalhost-dev"));
        assert_eq!(pod.container_names().count(), 2);
        assert!(pod.spec.extra.contains_key("nodeName"));
        assert!(pod.match_labels().is_none());
    }

    #[test]
    fn test_empty_annotation_is_absent() {
        let mut r = KubeResource::default();
        r.metadata
            .annotations
            .insert("meta.helm.sh/release-name".into(), " ".into());
        assert_eq!(r.annotation("meta.helm.sh/release-name"), None);
    }
}
