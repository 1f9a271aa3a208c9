//! Kubernetes pod label resolution.
//!
//! Under the Docker shim every pod runs a "sandbox" container (the pause
//! container) next to the application containers. The sandbox carries the
//! pod's own labels, so a log line from any container in the pod is
//! enriched with the labels of its sandbox, plus the host it runs on.

use std::collections::HashMap;

use crate::container::Container;
use crate::inventory::{ContainerInventory, InventoryError, LabelFilter};

pub const K8S_POD_UID_LABEL: &str = "io.kubernetes.pod.uid";
pub const K8S_POD_TYPE_LABEL: &str = "io.kubernetes.docker.type";
pub const K8S_POD_PARENT_TYPE: &str = "podsandbox";
pub const K8S_POD_CONTAINER_TYPE: &str = "container";
pub const K8S_IO_PREFIX: &str = "io.kubernetes.";
pub const K8S_ANNOTATION_PREFIX: &str = "annotation.kubernetes.io/";

/// Prefix given to a pod label whose key the container already uses.
pub const COLLISION_PREFIX: &str = "pod_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodLabels {
    /// A sandbox was found and its labels were merged in.
    Merged(HashMap<String, String>),
    /// Not in a pod, or the pod has no visible sandbox.
    Unchanged(HashMap<String, String>),
}

/// Drops Kubernetes bookkeeping labels and annotations.
pub fn select_container_labels(source: &HashMap<String, String>) -> HashMap<String, String> {
    source
        .iter()
        .filter(|(k, _)| !k.starts_with(K8S_IO_PREFIX) && !k.starts_with(K8S_ANNOTATION_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Copies `src` into `dst`. Keys already present in `dst` are kept and the
/// `src` value is stored under `pod_<key>` instead.
pub fn merge(
    src: HashMap<String, String>,
    mut dst: HashMap<String, String>,
) -> HashMap<String, String> {
    for (key, value) in src {
        if dst.contains_key(&key) {
            dst.insert(format!("{COLLISION_PREFIX}{key}"), value);
        } else {
            dst.insert(key, value);
        }
    }
    dst
}

/// `host` and `docker_version` of the daemon. Empty when the daemon
/// cannot be asked.
pub async fn host_labels(inventory: &dyn ContainerInventory) -> HashMap<String, String> {
    match inventory.daemon_info().await {
        Ok(info) => HashMap::from([
            ("host".to_string(), info.name),
            ("docker_version".to_string(), info.server_version),
        ]),
        Err(e) => {
            log::warn!("Cannot get Docker info: {e}");
            HashMap::new()
        }
    }
}

pub async fn resolve_pod_labels(
    container: &Container,
    current_labels: HashMap<String, String>,
    inventory: &dyn ContainerInventory,
) -> Result<PodLabels, InventoryError> {
    let Some(pod_uid) = container.labels.get(K8S_POD_UID_LABEL) else {
        log::debug!("There are no K8S labels for container {}", container.id);
        return Ok(PodLabels::Unchanged(current_labels));
    };

    log::debug!("Container {} is in K8S pod {pod_uid}", container.id);

    let filter = LabelFilter::new(K8S_POD_UID_LABEL, pod_uid.clone());
    let candidates = inventory.list_containers(&filter).await?;

    log::debug!(
        "Got {} containers to check for pod {pod_uid}",
        candidates.len()
    );

    let leader = candidates.iter().find(|candidate| {
        let is_leader = candidate.labels.get(K8S_POD_UID_LABEL) == Some(pod_uid)
            && candidate.labels.get(K8S_POD_TYPE_LABEL).map(String::as_str)
                == Some(K8S_POD_PARENT_TYPE);
        if !is_leader {
            log::debug!("Container {} is not a pod leader", candidate.id);
        }
        is_leader
    });

    match leader {
        Some(leader) => {
            log::debug!("Container {} is a pod leader", leader.id);
            let labels = merge(select_container_labels(&leader.labels), current_labels);
            let labels = merge(host_labels(inventory).await, labels);
            log::debug!("Returning labels: {labels:?}");
            Ok(PodLabels::Merged(labels))
        }
        None => {
            log::debug!(
                "Returning current labels for {} -- could not find a pod leader",
                container.id
            );
            Ok(PodLabels::Unchanged(current_labels))
        }
    }
}
