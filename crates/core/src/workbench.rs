//! Workbench actor
//!
//! One task owns the resource [`Tree`], the [`BindingRegistry`] and the
//! session's [`AliveSet`]. Reconcile passes, dev-mode runs and the front-end
//! all reach that state through a cloneable [`WorkbenchHandle`], so every
//! structural mutation and every registry write happens on the same task, in
//! arrival order.
//!
//! The actor stops once every handle has been dropped.

use crate::binding::{AliveSet, AliveWorkload, BindingKey, BindingRegistry, BindingScope, LocalBinding};
use crate::errors::{NocalhostError, Result};
use crate::model::UserInfo;
use crate::reconciler::{apply_devspaces, apply_resources, track_alive, ApplyStats, DevSpaceState, ResourceEntry};
use crate::tree::{BranchTarget, NodeId, Tree, TreeEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Predicate deciding which bindings survive a prune
pub type KeepBinding = Box<dyn FnMut(&LocalBinding) -> bool + Send>;

/// Outcome of merging one resource branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchApplied {
    pub stats: ApplyStats,
    /// Alive-set entries added or removed
    pub alive_changes: usize,
}

enum Request {
    Plan {
        reply: oneshot::Sender<Vec<BranchTarget>>,
    },
    ApplyDevSpaces {
        states: Vec<DevSpaceState>,
        reply: oneshot::Sender<ApplyStats>,
    },
    ApplyResources {
        target: BranchTarget,
        entries: Vec<ResourceEntry>,
        reply: oneshot::Sender<BranchApplied>,
    },
    SetExpanded {
        node: NodeId,
        expanded: bool,
        reply: oneshot::Sender<Option<BranchTarget>>,
    },
    ExpandResourceTypes {
        label: String,
        reply: oneshot::Sender<Vec<BranchTarget>>,
    },
    RegisterBinding {
        binding: LocalBinding,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveBinding {
        key: BindingKey,
        reply: oneshot::Sender<Result<Option<LocalBinding>>>,
    },
    FindBinding {
        key: BindingKey,
        reply: oneshot::Sender<Option<LocalBinding>>,
    },
    ListBindings {
        reply: oneshot::Sender<Vec<LocalBinding>>,
    },
    PruneBindings {
        keep: KeepBinding,
        reply: oneshot::Sender<Result<Vec<LocalBinding>>>,
    },
    AliveWorkloads {
        reply: oneshot::Sender<Vec<AliveWorkload>>,
    },
    DrainEvents {
        reply: oneshot::Sender<Vec<TreeEvent>>,
    },
    Render {
        reply: oneshot::Sender<String>,
    },
    Snapshot {
        reply: oneshot::Sender<Tree>,
    },
}

/// State owned by the actor task
pub struct Workbench {
    tree: Tree,
    registry: BindingRegistry,
    alive: AliveSet,
    scope: BindingScope,
}

impl Workbench {
    pub fn new(user: UserInfo, registry: BindingRegistry, scope: BindingScope) -> Self {
        Self {
            tree: Tree::new(user),
            registry,
            alive: AliveSet::new(),
            scope,
        }
    }

    /// Move the state onto its own task and return the handle to it
    pub fn spawn(self) -> WorkbenchHandle {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(self.run(rx));
        WorkbenchHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        debug!("Workbench started");
        while let Some(request) = rx.recv().await {
            self.handle(request);
        }
        debug!("Workbench stopped");
    }

    fn handle(&mut self, request: Request) {
        // A dropped reply receiver only means the caller went away.
        match request {
            Request::Plan { reply } => {
                let _ = reply.send(self.tree.loaded_branches());
            }
            Request::ApplyDevSpaces { states, reply } => {
                let _ = reply.send(apply_devspaces(&mut self.tree, states));
            }
            Request::ApplyResources {
                target,
                entries,
                reply,
            } => {
                let alive_changes = track_alive(
                    &mut self.alive,
                    &self.registry,
                    &self.scope,
                    target.devspace.id,
                    &target.application,
                    &entries,
                );
                let stats = apply_resources(&mut self.tree, target.node, entries);
                let _ = reply.send(BranchApplied {
                    stats,
                    alive_changes,
                });
            }
            Request::SetExpanded {
                node,
                expanded,
                reply,
            } => {
                let _ = reply.send(self.tree.set_expanded(node, expanded));
            }
            Request::ExpandResourceTypes { label, reply } => {
                let _ = reply.send(self.tree.expand_resource_types(&label));
            }
            Request::RegisterBinding { binding, reply } => {
                let result = self.registry.register(binding).map_err(NocalhostError::from);
                if let Err(err) = &result {
                    warn!(error = %err, "Failed to register local binding");
                }
                let _ = reply.send(result);
            }
            Request::RemoveBinding { key, reply } => {
                self.alive
                    .remove(key.devspace_id, &key.application, &key.workload);
                let _ = reply.send(self.registry.remove(&key).map_err(NocalhostError::from));
            }
            Request::FindBinding { key, reply } => {
                let _ = reply.send(self.registry.find(&key).cloned());
            }
            Request::ListBindings { reply } => {
                let _ = reply.send(self.registry.list().to_vec());
            }
            Request::PruneBindings { keep, reply } => {
                let result = self.registry.prune_stale(keep).map_err(NocalhostError::from);
                if let Ok(stale) = &result {
                    for binding in stale {
                        self.alive.remove(
                            binding.key.devspace_id,
                            &binding.key.application,
                            &binding.key.workload,
                        );
                    }
                }
                let _ = reply.send(result);
            }
            Request::AliveWorkloads { reply } => {
                let _ = reply.send(self.alive.iter().cloned().collect());
            }
            Request::DrainEvents { reply } => {
                let _ = reply.send(self.tree.drain_events());
            }
            Request::Render { reply } => {
                let _ = reply.send(self.tree.render());
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.tree.clone());
            }
        }
    }
}

/// Cloneable access to the workbench task
#[derive(Debug, Clone)]
pub struct WorkbenchHandle {
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Request::Plan { .. } => "Plan",
            Request::ApplyDevSpaces { .. } => "ApplyDevSpaces",
            Request::ApplyResources { .. } => "ApplyResources",
            Request::SetExpanded { .. } => "SetExpanded",
            Request::ExpandResourceTypes { .. } => "ExpandResourceTypes",
            Request::RegisterBinding { .. } => "RegisterBinding",
            Request::RemoveBinding { .. } => "RemoveBinding",
            Request::FindBinding { .. } => "FindBinding",
            Request::ListBindings { .. } => "ListBindings",
            Request::PruneBindings { .. } => "PruneBindings",
            Request::AliveWorkloads { .. } => "AliveWorkloads",
            Request::DrainEvents { .. } => "DrainEvents",
            Request::Render { .. } => "Render",
            Request::Snapshot { .. } => "Snapshot",
        };
        f.write_str(name)
    }
}

impl WorkbenchHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NocalhostError::WorkbenchClosed)?;
        rx.await.map_err(|_| NocalhostError::WorkbenchClosed)
    }

    /// Loaded resource-type branches that a pass must refetch
    pub async fn plan(&self) -> Result<Vec<BranchTarget>> {
        self.call(|reply| Request::Plan { reply }).await
    }

    pub async fn apply_devspaces(&self, states: Vec<DevSpaceState>) -> Result<ApplyStats> {
        self.call(|reply| Request::ApplyDevSpaces { states, reply })
            .await
    }

    /// Merge a fetched branch and update the alive set from its describe records
    pub async fn apply_resources(
        &self,
        target: BranchTarget,
        entries: Vec<ResourceEntry>,
    ) -> Result<BranchApplied> {
        self.call(|reply| Request::ApplyResources {
            target,
            entries,
            reply,
        })
        .await
    }

    /// Returns the branch to fetch when this expands an unloaded resource type
    pub async fn set_expanded(&self, node: NodeId, expanded: bool) -> Result<Option<BranchTarget>> {
        self.call(|reply| Request::SetExpanded {
            node,
            expanded,
            reply,
        })
        .await
    }

    pub async fn expand_resource_types(&self, label: &str) -> Result<Vec<BranchTarget>> {
        let label = label.to_string();
        self.call(|reply| Request::ExpandResourceTypes { label, reply })
            .await
    }

    pub async fn register_binding(&self, binding: LocalBinding) -> Result<()> {
        self.call(|reply| Request::RegisterBinding { binding, reply })
            .await?
    }

    /// Remove a binding and its alive entry
    pub async fn remove_binding(&self, key: BindingKey) -> Result<Option<LocalBinding>> {
        self.call(|reply| Request::RemoveBinding { key, reply })
            .await?
    }

    pub async fn find_binding(&self, key: BindingKey) -> Result<Option<LocalBinding>> {
        self.call(|reply| Request::FindBinding { key, reply }).await
    }

    pub async fn list_bindings(&self) -> Result<Vec<LocalBinding>> {
        self.call(|reply| Request::ListBindings { reply }).await
    }

    /// Drop bindings for which `keep` returns false, along with their alive entries
    pub async fn prune_bindings<F>(&self, keep: F) -> Result<Vec<LocalBinding>>
    where
        F: FnMut(&LocalBinding) -> bool + Send + 'static,
    {
        let keep: KeepBinding = Box::new(keep);
        self.call(|reply| Request::PruneBindings { keep, reply })
            .await?
    }

    pub async fn alive_workloads(&self) -> Result<Vec<AliveWorkload>> {
        self.call(|reply| Request::AliveWorkloads { reply }).await
    }

    pub async fn drain_events(&self) -> Result<Vec<TreeEvent>> {
        self.call(|reply| Request::DrainEvents { reply }).await
    }

    pub async fn render(&self) -> Result<String> {
        self.call(|reply| Request::Render { reply }).await
    }

    /// Copy of the current tree
    pub async fn snapshot(&self) -> Result<Tree> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    /// Whether the actor task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
