//! Arena-backed resource tree
//!
//! Nodes live in a map keyed by [`NodeId`]; ids are handed out from a counter
//! and never reused, so a view that holds an id either finds the same domain
//! object or nothing. Structural edits record [`TreeEvent`]s which the view
//! drains.
//!
//! Shape:
//!
//! ```text
//! Account
//! └── DevSpace (one per cluster id)
//!     ├── Application (installed, in `nhctl list` order)
//!     │   └── ResourceGroup ── ResourceType ── Resource
//!     └── DefaultApplication (always last)
//!         └── ResourceGroup ── ResourceType ── Resource
//! ```

use crate::model::{Application, DescribeRecord, DevSpace, UserInfo, DEFAULT_APPLICATION_NAME};
use crate::resource::KubeResource;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{self, Write as _};

/// Static resource folders shown under every application
pub const RESOURCE_GROUPS: &[(&str, &[&str])] = &[
    (
        "Workloads",
        &["Deployments", "DaemonSets", "StatefulSets", "Jobs", "CronJobs", "Pods"],
    ),
    (
        "Network",
        &["Services", "Endpoints", "Ingresses", "Network Policies"],
    ),
    (
        "Configuration",
        &[
            "ConfigMaps",
            "Secrets",
            "Resource Quotas",
            "HPA",
            "Pod Disruption Budgets",
        ],
    ),
    (
        "Storage",
        &[
            "Persistent Volumes",
            "Persistent Volume Claims",
            "Storage Classes",
        ],
    ),
];

/// Name the cluster CLI understands for a resource type label
pub fn kubectl_resource_name(label: &str) -> String {
    label.to_lowercase().replace(' ', "")
}

/// Canonical label for a resource type name, ignoring case and spaces
pub fn resource_type_label(name: &str) -> Option<&'static str> {
    let wanted = kubectl_resource_name(name);
    RESOURCE_GROUPS
        .iter()
        .flat_map(|(_, types)| types.iter())
        .find(|label| kubectl_resource_name(label) == wanted)
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Domain payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Account {
        user: UserInfo,
    },
    DevSpace {
        devspace: DevSpace,
    },
    Application {
        application: Application,
        installed: bool,
    },
    DefaultApplication,
    ResourceGroup {
        name: &'static str,
    },
    ResourceType {
        name: &'static str,
        loaded: bool,
    },
    Resource {
        resource: Box<KubeResource>,
        describe: Option<DescribeRecord>,
    },
}

impl NodeKind {
    pub fn label(&self) -> String {
        match self {
            NodeKind::Account { user } => user.name.clone().unwrap_or_else(|| user.email.clone()),
            NodeKind::DevSpace { devspace } => devspace.display_name().to_string(),
            NodeKind::Application { application, .. } => application.name().to_string(),
            NodeKind::DefaultApplication => "Default".to_string(),
            NodeKind::ResourceGroup { name } => name.to_string(),
            NodeKind::ResourceType { name, .. } => name.to_string(),
            NodeKind::Resource { resource, .. } => resource.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    pub expanded: bool,
}

/// Notification for the view; drained with [`Tree::drain_events`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TreeEvent {
    Inserted {
        parent: NodeId,
        node: NodeId,
        index: usize,
    },
    Removed {
        parent: NodeId,
        node: NodeId,
    },
    /// Node payload changed in place
    Updated { node: NodeId },
    /// Surviving children of `parent` changed order
    Moved { parent: NodeId },
    /// Subtree under `node` changed structurally; views collapse it on reload
    Reloaded { node: NodeId },
    /// Re-expand `node` after a reload
    Expand { node: NodeId },
}

/// A loaded resource-type branch and the context needed to fetch it
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTarget {
    pub node: NodeId,
    pub devspace: DevSpace,
    /// Application name, or the default application name for the default view
    pub application: String,
    pub resource_type: &'static str,
}

impl BranchTarget {
    pub fn kubectl_kind(&self) -> String {
        kubectl_resource_name(self.resource_type)
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
    events: Vec<TreeEvent>,
}

impl Tree {
    /// Tree holding only the account node
    pub fn new(user: UserInfo) -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            root: NodeId(0),
            next_id: 0,
            events: Vec::new(),
        };
        let root = tree.alloc(None, NodeKind::Account { user });
        if let Some(node) = tree.nodes.get_mut(&root) {
            node.expanded = true;
        }
        tree.root = root;
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|n| n.expanded).unwrap_or(false)
    }

    /// Take the pending view notifications
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> &[TreeEvent] {
        &self.events
    }

    pub(crate) fn push_event(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    /// First child of `parent` whose payload satisfies `predicate`
    pub fn find_child<P>(&self, parent: NodeId, mut predicate: P) -> Option<NodeId>
    where
        P: FnMut(&NodeKind) -> bool,
    {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.kind(*id).is_some_and(&mut predicate))
    }

    pub fn find_devspace(&self, cluster_id: i64) -> Option<NodeId> {
        self.find_child(self.root, |k| {
            matches!(k, NodeKind::DevSpace { devspace } if devspace.cluster_id == cluster_id)
        })
    }

    /// Application node by name; the default application name finds the default node
    pub fn find_application(&self, devspace_node: NodeId, name: &str) -> Option<NodeId> {
        if name == DEFAULT_APPLICATION_NAME {
            return self.find_child(devspace_node, |k| matches!(k, NodeKind::DefaultApplication));
        }
        self.find_child(devspace_node, |k| {
            matches!(k, NodeKind::Application { application, .. } if application.name() == name)
        })
    }

    /// Resource-type node under an application node
    pub fn find_resource_type(&self, application_node: NodeId, label: &str) -> Option<NodeId> {
        self.children(application_node).iter().find_map(|group| {
            self.find_child(*group, |k| matches!(k, NodeKind::ResourceType { name, .. } if *name == label))
        })
    }

    /// Resource-type node addressed by cluster id, application and type label
    pub fn resource_type_node(&self, cluster_id: i64, application: &str, label: &str) -> Option<NodeId> {
        let devspace = self.find_devspace(cluster_id)?;
        let app = self.find_application(devspace, application)?;
        self.find_resource_type(app, label)
    }

    pub fn resource_names(&self, type_node: NodeId) -> Vec<String> {
        self.children(type_node)
            .iter()
            .filter_map(|id| match self.kind(*id) {
                Some(NodeKind::Resource { resource, .. }) => Some(resource.name().to_string()),
                _ => None,
            })
            .collect()
    }

    /// Nearest ancestor (or self) that is a dev space, and its payload
    pub fn devspace_of(&self, id: NodeId) -> Option<(NodeId, &DevSpace)> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.nodes.get(&node_id)?;
            if let NodeKind::DevSpace { devspace } = &node.kind {
                return Some((node_id, devspace));
            }
            current = node.parent;
        }
        None
    }

    /// Application name a node belongs to, if it sits under an application
    pub fn application_of(&self, id: NodeId) -> Option<String> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.nodes.get(&node_id)?;
            match &node.kind {
                NodeKind::Application { application, .. } => {
                    return Some(application.name().to_string())
                }
                NodeKind::DefaultApplication => return Some(DEFAULT_APPLICATION_NAME.to_string()),
                _ => current = node.parent,
            }
        }
        None
    }

    /// Fetch context for a resource-type node
    pub fn branch_target(&self, id: NodeId) -> Option<BranchTarget> {
        let NodeKind::ResourceType { name, .. } = self.kind(id)? else {
            return None;
        };
        let (_, devspace) = self.devspace_of(id)?;
        Some(BranchTarget {
            node: id,
            devspace: devspace.clone(),
            application: self.application_of(id)?,
            resource_type: *name,
        })
    }

    /// Every loaded resource-type branch, in tree order
    pub fn loaded_branches(&self) -> Vec<BranchTarget> {
        let mut out = Vec::new();
        self.walk(self.root, &mut |tree, id| {
            if let Some(NodeKind::ResourceType { loaded: true, .. }) = tree.kind(id) {
                if let Some(target) = tree.branch_target(id) {
                    out.push(target);
                }
            }
        });
        out
    }

    fn walk<F>(&self, id: NodeId, visit: &mut F)
    where
        F: FnMut(&Tree, NodeId),
    {
        visit(self, id);
        for child in self.children(id) {
            self.walk(*child, visit);
        }
    }

    /// Record a user expand or collapse.
    ///
    /// Expanding a resource type that has not been loaded yet marks it
    /// loaded and returns the branch to fetch.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Option<BranchTarget> {
        let node = self.nodes.get_mut(&id)?;
        match &mut node.kind {
            NodeKind::Account { .. } | NodeKind::Resource { .. } => None,
            NodeKind::DevSpace { .. }
            | NodeKind::Application { .. }
            | NodeKind::DefaultApplication
            | NodeKind::ResourceGroup { .. } => {
                node.expanded = expanded;
                None
            }
            NodeKind::ResourceType { loaded, .. } => {
                node.expanded = expanded;
                if expanded && !*loaded {
                    *loaded = true;
                    self.branch_target(id)
                } else {
                    None
                }
            }
        }
    }

    /// Expand every resource type labelled `label`, returning branches that need a fetch
    pub fn expand_resource_types(&mut self, label: &str) -> Vec<BranchTarget> {
        let mut targets = Vec::new();
        self.walk(self.root, &mut |tree, id| {
            if matches!(tree.kind(id), Some(NodeKind::ResourceType { name, .. }) if *name == label) {
                targets.push(id);
            }
        });
        targets
            .into_iter()
            .filter_map(|id| self.set_expanded(id, true))
            .collect()
    }

    pub(crate) fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                parent,
                children: Vec::new(),
                kind,
                expanded: false,
            },
        );
        id
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(&id).map(|n| &mut n.kind)
    }

    pub(crate) fn set_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        for child in &children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = children;
        }
    }

    /// Delete `id` and its descendants from the arena
    pub(crate) fn drop_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    /// Build the static group/type folders under an application or default node
    pub(crate) fn build_resource_groups(&mut self, app_node: NodeId) {
        let mut groups = Vec::with_capacity(RESOURCE_GROUPS.len());
        for (index, (group, types)) in RESOURCE_GROUPS.iter().enumerate() {
            let group_id = self.alloc(Some(app_node), NodeKind::ResourceGroup { name: *group });
            let type_ids = types
                .iter()
                .map(|name| {
                    self.alloc(
                        Some(group_id),
                        NodeKind::ResourceType {
                            name: *name,
                            loaded: false,
                        },
                    )
                })
                .collect();
            self.set_children(group_id, type_ids);
            if index == 0 {
                if let Some(node) = self.nodes.get_mut(&group_id) {
                    node.expanded = true;
                }
            }
            groups.push(group_id);
        }
        self.set_children(app_node, groups);
    }

    /// Emit `Expand` for the deepest expanded nodes under `id`.
    ///
    /// A node is re-expanded explicitly only when none of its descendants
    /// was, since expanding a descendant reveals its ancestors. Returns
    /// whether anything under or at `id` was expanded.
    pub(crate) fn reapply_expansion(&mut self, id: NodeId) -> bool {
        let children = self.children(id).to_vec();
        let mut expanded_below = false;
        for child in children {
            expanded_below |= self.reapply_expansion(child);
        }
        let Some(node) = self.nodes.get(&id) else {
            return expanded_below;
        };
        let expandable = !matches!(node.kind, NodeKind::Account { .. } | NodeKind::Resource { .. });
        if expandable && node.expanded && !expanded_below {
            self.events.push(TreeEvent::Expand { node: id });
            return true;
        }
        expanded_below
    }

    /// Plain-text outline; children of collapsed nodes are elided
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root, 0, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let marker = if node.children.is_empty() {
            " "
        } else if node.expanded {
            "-"
        } else {
            "+"
        };
        let _ = write!(out, "{}{} {}", "  ".repeat(depth), marker, node.kind.label());
        match &node.kind {
            NodeKind::DevSpace { devspace } => {
                let _ = write!(out, " [{}]", devspace.namespace);
            }
            NodeKind::Resource {
                describe: Some(describe),
                ..
            } if describe.developing => out.push_str(" (developing)"),
            _ => {}
        }
        out.push('\n');
        if node.expanded {
            for child in &node.children {
                self.render_node(*child, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApplicationContext;

    fn user() -> UserInfo {
        UserInfo {
            email: "user@x.com".to_string(),
            name: None,
        }
    }

    fn devspace(cluster_id: i64) -> DevSpace {
        DevSpace {
            id: cluster_id,
            cluster_id,
            namespace: format!("dev-{}", cluster_id),
            space_name: None,
            storage_class: None,
            kubeconfig: None,
        }
    }

    fn tree_with_app() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new(user());
        let root = tree.root();
        let ds = tree.alloc(Some(root), NodeKind::DevSpace { devspace: devspace(7) });
        let app = tree.alloc(
            Some(ds),
            NodeKind::Application {
                application: Application {
                    id: 1,
                    context: ApplicationContext {
                        application_name: "demo".to_string(),
                        ..Default::default()
                    },
                },
                installed: true,
            },
        );
        tree.build_resource_groups(app);
        tree.set_children(ds, vec![app]);
        tree.set_children(root, vec![ds]);
        (tree, ds, app)
    }

    #[test]
    fn test_kubectl_resource_names() {
        assert_eq!(kubectl_resource_name("Network Policies"), "networkpolicies");
        assert_eq!(kubectl_resource_name("HPA"), "hpa");
        assert_eq!(resource_type_label("statefulsets"), Some("StatefulSets"));
        assert_eq!(resource_type_label("persistent volume claims"), Some("Persistent Volume Claims"));
        assert_eq!(resource_type_label("widgets"), None);
    }

    #[test]
    fn test_resource_groups_first_expanded() {
        let (tree, _, app) = tree_with_app();
        let groups = tree.children(app);
        assert_eq!(groups.len(), 4);
        assert!(tree.is_expanded(groups[0]));
        assert!(!tree.is_expanded(groups[1]));
        assert_eq!(tree.children(groups[0]).len(), 6);
    }

    #[test]
    fn test_expand_unloaded_type_schedules_fetch() {
        let (mut tree, _, app) = tree_with_app();
        let deployments = tree.find_resource_type(app, "Deployments").unwrap();

        let target = tree.set_expanded(deployments, true).unwrap();
        assert_eq!(target.application, "demo");
        assert_eq!(target.kubectl_kind(), "deployments");
        assert_eq!(target.devspace.cluster_id, 7);

        assert!(tree.set_expanded(deployments, false).is_none());
        assert!(tree.set_expanded(deployments, true).is_none());
        assert_eq!(tree.loaded_branches().len(), 1);
    }

    #[test]
    fn test_account_expand_is_noop() {
        let (mut tree, _, _) = tree_with_app();
        let root = tree.root();
        assert!(tree.set_expanded(root, false).is_none());
        assert!(tree.is_expanded(root));
    }

    #[test]
    fn test_reapply_expansion_picks_deepest() {
        let (mut tree, ds, app) = tree_with_app();
        tree.set_expanded(ds, true);
        tree.set_expanded(app, true);
        let pods = tree.find_resource_type(app, "Pods").unwrap();
        tree.set_expanded(pods, true);
        let network = tree.children(app)[1];
        tree.set_expanded(network, true);

        tree.drain_events();
        tree.reapply_expansion(tree.root());
        let expanded: Vec<NodeId> = tree
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TreeEvent::Expand { node } => Some(node),
                _ => None,
            })
            .collect();
        assert_eq!(expanded, vec![pods, network]);
    }

    #[test]
    fn test_drop_subtree_removes_descendants() {
        let (mut tree, ds, _) = tree_with_app();
        let before = tree.len();
        tree.drop_subtree(ds);
        assert_eq!(tree.len(), 1);
        assert!(before > 20);
    }

    #[test]
    fn test_render_elides_collapsed() {
        let (mut tree, ds, app) = tree_with_app();
        let text = tree.render();
        assert!(text.contains("user@x.com"));
        assert!(text.contains("+ dev-7 [dev-7]"));
        assert!(!text.contains("demo"));

        tree.set_expanded(ds, true);
        tree.set_expanded(app, true);
        let text = tree.render();
        assert!(text.contains("- demo"));
        assert!(text.contains("Deployments"));
        assert!(!text.contains("Services"));
    }
}
