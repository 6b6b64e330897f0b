use crate::Node;
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::debug;

/// Picks the address this node uses on the pod network.
///
/// A local address inside one of the node's pod CIDRs is preferred. Otherwise
/// the node's reported `InternalIP` is used.
pub fn resolve_node_ip(node: &Node, local_addrs: &[IpAddr]) -> Option<IpAddr> {
    if let Some(ip) = pod_cidrs(node)
        .into_iter()
        .find_map(|net| local_addrs.iter().copied().find(|ip| net.contains(ip)))
    {
        return Some(ip);
    }

    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .into_iter()
        .flatten()
        .filter(|a| a.type_ == "InternalIP")
        .find_map(|a| a.address.parse().ok())
}

fn pod_cidrs(node: &Node) -> Vec<IpNet> {
    let Some(spec) = node.spec.as_ref() else {
        return vec![];
    };
    let cidrs = match spec.pod_cidrs.as_ref() {
        Some(cidrs) if !cidrs.is_empty() => cidrs.iter().collect::<Vec<_>>(),
        _ => spec.pod_cidr.iter().collect(),
    };
    cidrs
        .into_iter()
        .filter_map(|cidr| match cidr.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(error) => {
                debug!(%cidr, %error, "Ignoring invalid pod CIDR");
                None
            }
        })
        .collect()
}
