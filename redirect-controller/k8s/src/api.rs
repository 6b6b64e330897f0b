use crate::{Node, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] kube::Error),

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("pod is missing {0}")]
    MissingField(&'static str),

    #[error("invalid pod IP {ip:?}: {source}")]
    InvalidIp {
        ip: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// The subset of the Kubernetes API used by the redirection controller.
#[async_trait::async_trait]
pub trait WorkloadApi: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, Error>;

    /// Lists pods in all namespaces. Empty selectors match everything.
    async fn list_pods(&self, label_selector: &str, field_selector: &str)
        -> Result<Vec<Pod>, Error>;

    /// Applies a JSON merge patch to a pod.
    async fn patch_pod(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl WorkloadApi for kube::Client {
    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        let node = Api::<Node>::all(self.clone()).get(name).await?;
        Ok(node)
    }

    async fn list_pods(
        &self,
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Vec<Pod>, Error> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        if !field_selector.is_empty() {
            params = params.fields(field_selector);
        }
        let pods = Api::<Pod>::all(self.clone()).list(&params).await?;
        Ok(pods.items)
    }

    async fn patch_pod(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error> {
        Api::<Pod>::namespaced(self.clone(), namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
