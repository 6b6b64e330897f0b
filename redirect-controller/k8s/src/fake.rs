//! An in-memory API server holding pods and nodes, for tests.

use crate::{Error, Node, ObjectMeta, Pod, WorkloadApi};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pods: BTreeMap<(String, String), Pod>,
    nodes: BTreeMap<String, Node>,
    patches: Vec<(String, String, serde_json::Value)>,
    fail_patches: bool,
}

// === impl FakeApi ===

impl FakeApi {
    /// A pod with a name, namespace, and UID, and nothing else.
    pub fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(Self::uid(namespace, name)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn uid(namespace: &str, name: &str) -> String {
        format!("uid-{namespace}-{name}")
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.insert_pod(pod);
        self
    }

    pub fn with_node(self, node: Node) -> Self {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.state.lock().nodes.insert(name, node);
        self
    }

    pub fn failing_patches(self) -> Self {
        self.state.lock().fail_patches = true;
        self
    }

    pub fn insert_pod(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.state.lock().pods.insert(key, pod);
    }

    pub fn get_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn annotation(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.get_pod(namespace, name)?
            .metadata
            .annotations?
            .remove(key)
    }

    pub fn patches(&self) -> Vec<(String, String, serde_json::Value)> {
        self.state.lock().patches.clone()
    }
}

/// Matches a comma-separated list of `key=value` requirements.
fn selects(selector: &str, lookup: impl Fn(&str) -> Option<String>) -> bool {
    selector
        .split(',')
        .filter(|r| !r.is_empty())
        .all(|requirement| match requirement.split_once('=') {
            Some((k, v)) => lookup(k.trim()).as_deref() == Some(v.trim()),
            None => lookup(requirement.trim()).is_some(),
        })
}

fn pod_field(pod: &Pod, field: &str) -> Option<String> {
    match field {
        "metadata.name" => pod.metadata.name.clone(),
        "metadata.namespace" => pod.metadata.namespace.clone(),
        "spec.nodeName" => pod.spec.as_ref()?.node_name.clone(),
        "status.phase" => pod.status.as_ref()?.phase.clone(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl WorkloadApi for FakeApi {
    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        self.state
            .lock()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "node",
                name: name.to_string(),
            })
    }

    async fn list_pods(
        &self,
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Vec<Pod>, Error> {
        Ok(self
            .state
            .lock()
            .pods
            .values()
            .filter(|pod| {
                let labels = pod.metadata.labels.clone().unwrap_or_default();
                selects(label_selector, |k| labels.get(k).cloned())
                    && selects(field_selector, |f| pod_field(pod, f))
            })
            .cloned()
            .collect())
    }

    async fn patch_pod(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        let not_found = || Error::NotFound {
            kind: "pod",
            name: format!("{namespace}/{name}"),
        };
        if state.fail_patches {
            return Err(not_found());
        }
        let pod = state
            .pods
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(not_found)?;

        let updates = patch
            .pointer("/metadata/annotations")
            .and_then(|a| a.as_object())
            .cloned()
            .unwrap_or_default();
        let annotations = pod.metadata.annotations.get_or_insert_with(Default::default);
        for (key, value) in updates {
            match value.as_str() {
                Some(value) => {
                    annotations.insert(key, value.to_string());
                }
                None => {
                    annotations.remove(&key);
                }
            }
        }

        state
            .patches
            .push((namespace.to_string(), name.to_string(), patch));
        Ok(())
    }
}
