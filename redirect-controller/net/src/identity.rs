//! Resolves a workload address to the veth pair that carries it.

use crate::{
    exec::{argv, Exec},
    iproute::{self, Link, NetnsId, Route},
};
use ambient_redirect_core::{MacAddr, NetworkIdentity, ResolveError, ResolveIdentity};
use std::{net::IpAddr, sync::Arc};
use tracing::{debug, instrument};

/// Looks up network identities with iproute2.
#[derive(Clone)]
pub struct Resolver {
    exec: Arc<dyn Exec>,
}

impl Resolver {
    pub fn new(exec: Arc<dyn Exec>) -> Self {
        Self { exec }
    }

    /// Returns the name of the device the kernel would use to reach `ip`.
    pub async fn device_for(&self, ip: IpAddr) -> Result<String, ResolveError> {
        let dst = ip.to_string();
        let routes = iproute::query::<Route>(
            &*self.exec,
            argv(["-j", "route", "get", dst.as_str()]),
        )
        .await
        .map_err(|e| ResolveError::query("route", e))?;
        routes
            .into_iter()
            .find_map(|r| r.dev)
            .ok_or(ResolveError::NoVethRoute(ip))
    }

    async fn veth_for(&self, ip: IpAddr) -> Result<Link, ResolveError> {
        let device = self.device_for(ip).await?;
        let link = iproute::query::<Link>(
            &*self.exec,
            argv(["-j", "-d", "link", "show", "dev", device.as_str()]),
        )
        .await
        .map_err(|e| ResolveError::query("link", e))?
        .into_iter()
        .next()
        .ok_or(ResolveError::NoVethRoute(ip))?;
        if !link.is_veth() {
            debug!(%device, "Route does not use a veth");
            return Err(ResolveError::NoVethRoute(ip));
        }
        Ok(link)
    }

    async fn namespace_name(&self, nsid: i64) -> Result<String, ResolveError> {
        let ids = iproute::query::<NetnsId>(&*self.exec, argv(["-j", "netns", "list-id"]))
            .await
            .map_err(|e| ResolveError::query("namespace ids", e))?;
        ids.into_iter()
            .find(|id| id.nsid == nsid)
            .and_then(|id| id.name)
            .ok_or(ResolveError::NamespaceName(nsid))
    }

    async fn peer_mac(&self, ns: &str, index: u32) -> Result<MacAddr, ResolveError> {
        let missing = || ResolveError::MacAddress {
            ns: ns.to_string(),
            index,
        };
        let links = iproute::query::<Link>(&*self.exec, argv(["-n", ns, "-j", "link", "show"]))
            .await
            .map_err(|e| ResolveError::query("peer links", e))?;
        links
            .into_iter()
            .find(|l| l.ifindex == index)
            .and_then(|l| l.address)
            .and_then(|a| a.parse().ok())
            .ok_or_else(missing)
    }
}

#[async_trait::async_trait]
impl ResolveIdentity for Resolver {
    #[instrument(skip(self))]
    async fn resolve(&self, ip: IpAddr) -> Result<NetworkIdentity, ResolveError> {
        let veth = self.veth_for(ip).await?;
        let peer_index = veth
            .link_index
            .ok_or_else(|| ResolveError::PeerIndex(veth.ifname.clone()))?;
        let nsid = veth
            .link_netnsid
            .ok_or_else(|| ResolveError::PeerNamespace(veth.ifname.clone()))?;
        let peer_ns = self.namespace_name(nsid).await?;
        let peer_mac = self.peer_mac(&peer_ns, peer_index).await?;
        Ok(NetworkIdentity {
            device: veth.ifname,
            ifindex: veth.ifindex,
            peer_index,
            peer_ns,
            peer_mac,
        })
    }

    async fn veth_index(&self, ip: IpAddr) -> Result<u32, ResolveError> {
        self.veth_for(ip).await.map(|l| l.ifindex)
    }
}
