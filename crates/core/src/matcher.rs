//! Resource ownership by annotation
//!
//! A resource belongs to an application when either the workflow CLI's
//! annotation or Helm's release annotation names it. Resources applied outside
//! the workflow tool carry neither, and are shown under the default view.

use crate::model::{HELM_ANNOTATION_NAME, NOCALHOST_ANNOTATION_NAME};
use crate::resource::KubeResource;

/// Partition of a resource list for one application
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ownership {
    /// Resources annotated with the application name
    pub owned: Vec<KubeResource>,
    /// Resources carrying neither ownership annotation
    pub unowned: Vec<KubeResource>,
}

impl Ownership {
    /// Resources to show for the application: the owned set, or the
    /// unannotated ones when nothing is owned
    pub fn into_selection(self) -> Vec<KubeResource> {
        if self.owned.is_empty() {
            self.unowned
        } else {
            self.owned
        }
    }
}

/// Whether `resource` names `application` in an ownership annotation
pub fn is_owned_by(resource: &KubeResource, application: &str) -> bool {
    resource.annotation(NOCALHOST_ANNOTATION_NAME) == Some(application)
        || resource.annotation(HELM_ANNOTATION_NAME) == Some(application)
}

/// Whether `resource` carries no ownership annotation at all
pub fn is_unannotated(resource: &KubeResource) -> bool {
    resource.annotation(NOCALHOST_ANNOTATION_NAME).is_none()
        && resource.annotation(HELM_ANNOTATION_NAME).is_none()
}

/// Split `resources` into those owned by `application` and the unannotated rest.
///
/// Resources annotated for some other application land in neither set.
/// Input order is preserved.
pub fn match_resources(resources: &[KubeResource], application: &str) -> Ownership {
    let mut ownership = Ownership::default();
    for resource in resources {
        if is_owned_by(resource, application) {
            ownership.owned.push(resource.clone());
        } else if is_unannotated(resource) {
            ownership.unowned.push(resource.clone());
        }
    }
    ownership
}

/// Resources the tree shows under `application`
pub fn select_resources(resources: &[KubeResource], application: &str) -> Vec<KubeResource> {
    match_resources(resources, application).into_selection()
}
