//! Tree reconciliation
//!
//! Fresh remote state is merged into the [`Tree`] level by level. Children
//! are matched by identity only: dev spaces by cluster id, applications by
//! name, resources by `(kind, name)`. A child missing from the fresh list is
//! removed, a new one is built, and a surviving one keeps its node id even
//! when it moves; its payload is replaced in place only when it differs. A
//! second pass over identical input therefore changes nothing.

use crate::binding::{AliveSet, AliveWorkload, BindingRegistry, BindingScope};
use crate::model::{Application, DescribeRecord, DevSpace, NamespaceApplications};
use crate::resource::KubeResource;
use crate::tree::{NodeId, NodeKind, Tree, TreeEvent};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, trace};

/// Fresh state of one dev space
#[derive(Debug, Clone, PartialEq)]
pub struct DevSpaceState {
    pub devspace: DevSpace,
    /// Installed applications in listing order; `None` when listing failed,
    /// which leaves the existing children untouched
    pub applications: Option<Vec<Application>>,
}

/// A resource with its describe record, if the workflow CLI tracks it
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub resource: KubeResource,
    pub describe: Option<DescribeRecord>,
}

impl ResourceEntry {
    pub fn new(resource: KubeResource, describe: Option<DescribeRecord>) -> Self {
        Self { resource, describe }
    }
}

/// Counts of tree mutations made by an apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Insertions, removals and reorders
    pub structural_changes: usize,
    /// In-place payload updates
    pub updates: usize,
}

impl ApplyStats {
    pub fn is_empty(&self) -> bool {
        self.structural_changes == 0 && self.updates == 0
    }
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, other: Self) {
        self.structural_changes += other.structural_changes;
        self.updates += other.updates;
    }
}

/// Catalog applications installed in `namespace`, in listing order.
///
/// The default application is excluded, as are listed names the catalog
/// does not know.
pub fn installed_applications(
    catalog: &[Application],
    listed: &[NamespaceApplications],
    namespace: &str,
) -> Vec<Application> {
    let Some(entry) = listed.iter().find(|l| l.namespace == namespace) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    entry
        .installed_names()
        .filter(|name| seen.insert(*name))
        .filter_map(|name| catalog.iter().find(|a| a.name() == name).cloned())
        .collect()
}

/// Merge `desired` into the children of `parent`.
///
/// `existing_key` extracts the identity of a current child (children with no
/// key are removed), `update` refreshes a surviving child and reports what it
/// changed, `create` builds a new child subtree.
fn reconcile_children<T, K, FK, FD, FU, FC>(
    tree: &mut Tree,
    parent: NodeId,
    desired: Vec<T>,
    existing_key: FK,
    desired_key: FD,
    mut update: FU,
    mut create: FC,
) -> ApplyStats
where
    K: Eq + Hash + Clone,
    FK: Fn(&NodeKind) -> Option<K>,
    FD: Fn(&T) -> K,
    FU: FnMut(&mut Tree, NodeId, &T) -> ApplyStats,
    FC: FnMut(&mut Tree, NodeId, T) -> NodeId,
{
    let mut stats = ApplyStats::default();

    let mut seen = HashSet::new();
    let desired: Vec<T> = desired
        .into_iter()
        .filter(|item| seen.insert(desired_key(item)))
        .collect();
    let wanted: HashSet<K> = desired.iter().map(&desired_key).collect();

    let current = tree.children(parent).to_vec();
    let mut survivors: HashMap<K, NodeId> = HashMap::new();
    let mut removed = Vec::new();
    for child in &current {
        let key = tree.kind(*child).and_then(&existing_key);
        match key {
            Some(key) if wanted.contains(&key) && !survivors.contains_key(&key) => {
                survivors.insert(key, *child);
            }
            _ => removed.push(*child),
        }
    }

    for child in &removed {
        tree.drop_subtree(*child);
        tree.push_event(TreeEvent::Removed {
            parent,
            node: *child,
        });
        stats.structural_changes += 1;
    }

    let mut next = Vec::with_capacity(desired.len());
    let mut inserted = Vec::new();
    for item in desired {
        let key = desired_key(&item);
        match survivors.get(&key) {
            Some(id) => {
                stats += update(tree, *id, &item);
                next.push(*id);
            }
            None => {
                let id = create(tree, parent, item);
                inserted.push((next.len(), id));
                next.push(id);
            }
        }
    }

    let old_order: Vec<NodeId> = current
        .iter()
        .copied()
        .filter(|id| !removed.contains(id))
        .collect();
    let new_order: Vec<NodeId> = next
        .iter()
        .copied()
        .filter(|id| !inserted.iter().any(|(_, new)| new == id))
        .collect();
    let moved = old_order != new_order;

    tree.set_children(parent, next);

    for (index, node) in &inserted {
        tree.push_event(TreeEvent::Inserted {
            parent,
            node: *node,
            index: *index,
        });
        stats.structural_changes += 1;
    }
    if moved {
        tree.push_event(TreeEvent::Moved { parent });
        stats.structural_changes += 1;
    }
    if !removed.is_empty() || !inserted.is_empty() || moved {
        tree.push_event(TreeEvent::Reloaded { node: parent });
    }
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AppKey {
    Installed(String),
    Default,
}

enum AppItem {
    Installed(Application),
    Default,
}

impl AppItem {
    fn key(&self) -> AppKey {
        match self {
            AppItem::Installed(app) => AppKey::Installed(app.name().to_string()),
            AppItem::Default => AppKey::Default,
        }
    }
}

fn app_key(kind: &NodeKind) -> Option<AppKey> {
    match kind {
        NodeKind::Application { application, .. } => {
            Some(AppKey::Installed(application.name().to_string()))
        }
        NodeKind::DefaultApplication => Some(AppKey::Default),
        _ => None,
    }
}

fn create_app(tree: &mut Tree, parent: NodeId, item: AppItem) -> NodeId {
    let kind = match item {
        AppItem::Installed(application) => NodeKind::Application {
            application,
            installed: true,
        },
        AppItem::Default => NodeKind::DefaultApplication,
    };
    let id = tree.alloc(Some(parent), kind);
    tree.build_resource_groups(id);
    id
}

fn update_app(tree: &mut Tree, id: NodeId, item: &AppItem) -> ApplyStats {
    let mut stats = ApplyStats::default();
    if let (Some(NodeKind::Application { application, installed }), AppItem::Installed(fresh)) =
        (tree.kind_mut(id), item)
    {
        if application != fresh || !*installed {
            *application = fresh.clone();
            *installed = true;
            stats.updates += 1;
        }
    }
    if stats.updates > 0 {
        tree.push_event(TreeEvent::Updated { node: id });
    }
    stats
}

fn app_items(applications: &[Application]) -> Vec<AppItem> {
    applications
        .iter()
        .cloned()
        .map(AppItem::Installed)
        .chain(std::iter::once(AppItem::Default))
        .collect()
}

fn reconcile_apps(tree: &mut Tree, devspace_node: NodeId, applications: &[Application]) -> ApplyStats {
    reconcile_children(
        tree,
        devspace_node,
        app_items(applications),
        app_key,
        AppItem::key,
        update_app,
        create_app,
    )
}

fn create_devspace(tree: &mut Tree, parent: NodeId, state: DevSpaceState) -> NodeId {
    let id = tree.alloc(
        Some(parent),
        NodeKind::DevSpace {
            devspace: state.devspace,
        },
    );
    let children: Vec<NodeId> = app_items(&state.applications.unwrap_or_default())
        .into_iter()
        .map(|item| create_app(tree, id, item))
        .collect();
    tree.set_children(id, children);
    id
}

fn update_devspace(tree: &mut Tree, id: NodeId, state: &DevSpaceState) -> ApplyStats {
    let mut stats = ApplyStats::default();
    if let Some(NodeKind::DevSpace { devspace }) = tree.kind_mut(id) {
        if *devspace != state.devspace {
            *devspace = state.devspace.clone();
            stats.updates += 1;
        }
    }
    if stats.updates > 0 {
        tree.push_event(TreeEvent::Updated { node: id });
    }
    if let Some(applications) = &state.applications {
        stats += reconcile_apps(tree, id, applications);
    }
    stats
}

/// Merge the dev-space level (and each dev space's applications) into the tree
pub fn apply_devspaces(tree: &mut Tree, states: Vec<DevSpaceState>) -> ApplyStats {
    let root = tree.root();
    let stats = reconcile_children(
        tree,
        root,
        states,
        |kind| match kind {
            NodeKind::DevSpace { devspace } => Some(devspace.cluster_id),
            _ => None,
        },
        |state: &DevSpaceState| state.devspace.cluster_id,
        update_devspace,
        create_devspace,
    );
    if stats.structural_changes > 0 {
        tree.reapply_expansion(root);
    }
    debug!(
        structural_changes = stats.structural_changes,
        updates = stats.updates,
        "Applied dev spaces"
    );
    stats
}

fn resource_key(kind: &NodeKind) -> Option<(String, String)> {
    match kind {
        NodeKind::Resource { resource, .. } => {
            Some((resource.kind.clone(), resource.name().to_string()))
        }
        _ => None,
    }
}

/// Merge a fetched resource list into a resource-type node.
///
/// Does nothing if `type_node` is gone or is not a resource type.
pub fn apply_resources(tree: &mut Tree, type_node: NodeId, entries: Vec<ResourceEntry>) -> ApplyStats {
    if !matches!(tree.kind(type_node), Some(NodeKind::ResourceType { .. })) {
        trace!(node = %type_node, "Resource branch no longer present");
        return ApplyStats::default();
    }

    let stats = reconcile_children(
        tree,
        type_node,
        entries,
        resource_key,
        |entry: &ResourceEntry| (entry.resource.kind.clone(), entry.resource.name().to_string()),
        |tree, id, entry| {
            let mut stats = ApplyStats::default();
            if let Some(NodeKind::Resource { resource, describe }) = tree.kind_mut(id) {
                if **resource != entry.resource || *describe != entry.describe {
                    **resource = entry.resource.clone();
                    *describe = entry.describe.clone();
                    stats.updates += 1;
                }
            }
            if stats.updates > 0 {
                tree.push_event(TreeEvent::Updated { node: id });
            }
            stats
        },
        |tree, parent, entry| {
            tree.alloc(
                Some(parent),
                NodeKind::Resource {
                    resource: Box::new(entry.resource),
                    describe: entry.describe,
                },
            )
        },
    );
    if stats.structural_changes > 0 {
        tree.reapply_expansion(type_node);
    }
    stats
}

/// Update the alive set from the describe records of a fetched branch.
///
/// A developing Deployment with a local binding becomes alive; a
/// non-developing one is dropped from the set. Returns the number of
/// entries added, changed or removed.
pub fn track_alive(
    alive: &mut AliveSet,
    registry: &BindingRegistry,
    scope: &BindingScope,
    devspace_id: i64,
    application: &str,
    entries: &[ResourceEntry],
) -> usize {
    let mut changes = 0;
    for entry in entries {
        let Some(describe) = &entry.describe else {
            continue;
        };
        if !entry.resource.is_kind("Deployment") {
            continue;
        }
        let workload = describe.workload();
        if describe.developing {
            let key = scope.key(application, devspace_id, workload);
            if let Some(binding) = registry.find(&key) {
                let added = alive.insert(AliveWorkload {
                    devspace_id,
                    application: application.to_string(),
                    workload: workload.to_string(),
                    local_path: binding.local_path.clone(),
                });
                if added {
                    debug!(workload, "Workload is alive-bound");
                    changes += 1;
                }
            }
        } else if alive.remove(devspace_id, application, workload) {
            debug!(workload, "Workload no longer developing");
            changes += 1;
        }
    }
    changes
}
