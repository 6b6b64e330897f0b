//! Discovers the node's address on the pod network.

use crate::{
    k8s::{self, Selector, WorkloadApi},
    net::{host, Exec},
};
use anyhow::{anyhow, Result};
use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};

/// Returns the host IP used as the source of inbound routes.
///
/// The local address that reaches a node proxy pod on this node is preferred.
/// If none can be determined, the address is derived from the Node resource.
#[instrument(skip(api, exec))]
pub async fn host_ip(
    api: &dyn WorkloadApi,
    exec: &dyn Exec,
    node_name: &str,
    ztunnel: &Selector,
) -> Result<IpAddr> {
    let fields = format!("spec.nodeName={node_name}");
    match api.list_pods(&ztunnel.to_string(), &fields).await {
        Ok(pods) => {
            let peers = pods
                .iter()
                .filter_map(|pod| pod.status.as_ref()?.pod_ip.as_deref()?.parse::<IpAddr>().ok());
            for peer in peers {
                if let Some(ip) = host::resolve_host_ip_for_peer(peer).await {
                    info!(%ip, %peer, "Resolved host IP from node proxy");
                    return Ok(ip);
                }
                debug!(%peer, "No local address reaches node proxy");
            }
        }
        Err(error) => warn!(%error, "Failed to list node proxy pods"),
    }

    let node = api.get_node(node_name).await?;
    let local = host::local_addresses(exec).await.unwrap_or_else(|error| {
        warn!(%error, "Failed to list local addresses");
        vec![]
    });
    let ip = k8s::resolve_node_ip(&node, &local)
        .ok_or_else(|| anyhow!("node {node_name} has no usable address"))?;
    info!(%ip, "Resolved host IP from node");
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        k8s::{fake::FakeApi, Node, NodeSpec, ObjectMeta, PodSpec, PodStatus},
        net::fake::FakeKernel,
    };
    use std::collections::BTreeMap;

    fn ztunnel() -> Selector {
        "app=ztunnel".parse().unwrap()
    }

    fn node() -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                pod_cidr: Some("10.1.2.0/24".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn prefers_node_proxy() {
        let mut pod = FakeApi::pod("istio-system", "ztunnel-x7k2p");
        pod.metadata.labels = Some(BTreeMap::from([("app".to_string(), "ztunnel".to_string())]));
        pod.spec = Some(PodSpec {
            node_name: Some("node-1".to_string()),
            ..Default::default()
        });
        pod.status = Some(PodStatus {
            pod_ip: Some("127.0.0.1".to_string()),
            ..Default::default()
        });
        let api = FakeApi::default().with_pod(pod).with_node(node());
        let kernel = FakeKernel::default();

        let ip = host_ip(&api, &kernel, "node-1", &ztunnel()).await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn falls_back_to_node() {
        let api = FakeApi::default().with_node(node());
        let kernel = FakeKernel::default()
            .with_local_addr("127.0.0.1".parse().unwrap())
            .with_local_addr("10.1.2.1".parse().unwrap());

        let ip = host_ip(&api, &kernel, "node-1", &ztunnel()).await.unwrap();
        assert_eq!(ip, "10.1.2.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn unknown_node() {
        let api = FakeApi::default();
        let kernel = FakeKernel::default();
        assert!(host_ip(&api, &kernel, "node-1", &ztunnel()).await.is_err());
    }
}
