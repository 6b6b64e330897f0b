use crate::{MacAddr, ResolveError};
use std::net::IpAddr;

/// Everything needed to address a workload's interface from eBPF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkIdentity {
    /// Host-side veth carrying the workload's address.
    pub device: String,
    pub ifindex: u32,
    /// Index of the veth peer inside the workload's namespace.
    pub peer_index: u32,
    pub peer_ns: String,
    pub peer_mac: MacAddr,
}

/// Resolves a workload address to its network identity.
///
/// Implementations perform lookups only and never mutate kernel state.
#[async_trait::async_trait]
pub trait ResolveIdentity: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<NetworkIdentity, ResolveError>;

    /// Returns the interface index of the host-side veth routing to `ip`.
    async fn veth_index(&self, ip: IpAddr) -> Result<u32, ResolveError>;
}
