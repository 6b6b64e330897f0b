//! eBPF redirection: builds redirect descriptors and hands them to the eBPF
//! program manager.

use crate::{
    controller::{Outcome, Redirector, Skip},
    Error, MacAddr, ResolveIdentity, Result, WorkloadIdentity,
};
use std::{net::IpAddr, sync::Arc};
use tracing::debug;

/// A request for the eBPF program manager to install or remove a redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedirectDescriptor {
    pub ip_addrs: Vec<IpAddr>,
    pub mac: Option<MacAddr>,
    /// Host-side interface index; zero when unknown.
    pub ifindex: u32,
    pub peer_index: u32,
    pub peer_ns: Option<String>,
    /// Set when the descriptor targets the node proxy itself.
    pub is_shared_proxy: bool,
    pub remove: bool,
    pub capture_dns: bool,
}

/// The eBPF program manager's intake.
///
/// Submission is fire-and-forget: the receiver owns all kernel-side state and
/// must tolerate duplicate requests.
pub trait RedirectManager: Send + Sync {
    fn accept_request(&self, descriptor: RedirectDescriptor);
}

/// Builds a descriptor for `ip` from its fully resolved network identity.
///
/// A partially resolved identity is never returned: any lookup failure is an
/// [`Error::Unresolvable`].
pub async fn build_args(
    resolver: &dyn ResolveIdentity,
    ip: IpAddr,
    is_shared_proxy: bool,
    remove: bool,
) -> Result<RedirectDescriptor> {
    let identity = resolver.resolve(ip).await?;
    Ok(RedirectDescriptor {
        ip_addrs: vec![ip],
        mac: Some(identity.peer_mac),
        ifindex: identity.ifindex,
        peer_index: identity.peer_index,
        peer_ns: Some(identity.peer_ns),
        is_shared_proxy,
        remove,
        capture_dns: false,
    })
}

impl RedirectDescriptor {
    /// Removes the node proxy's redirect. The proxy is known node-wide, so no
    /// address or interface is carried.
    pub fn shared_proxy_removal() -> Self {
        Self {
            ifindex: 0,
            is_shared_proxy: true,
            remove: true,
            ..Default::default()
        }
    }

    pub fn workload_removal(ip: IpAddr, ifindex: u32) -> Self {
        Self {
            ip_addrs: vec![ip],
            ifindex,
            remove: true,
            ..Default::default()
        }
    }
}

/// Redirects workloads by submitting descriptors to the eBPF program manager.
#[derive(Clone)]
pub struct EbpfRedirector {
    manager: Option<Arc<dyn RedirectManager>>,
    resolver: Arc<dyn ResolveIdentity>,
}

// === impl EbpfRedirector ===

impl EbpfRedirector {
    pub fn new(
        manager: Option<Arc<dyn RedirectManager>>,
        resolver: Arc<dyn ResolveIdentity>,
    ) -> Self {
        Self { manager, resolver }
    }

    fn manager(&self) -> Result<&dyn RedirectManager> {
        self.manager
            .as_deref()
            .ok_or(Error::UninitializedCollaborator("eBPF redirect manager"))
    }
}

#[async_trait::async_trait]
impl Redirector for EbpfRedirector {
    async fn enroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        let manager = self.manager()?;
        let Some(ip) = workload.ip else {
            debug!("Skipping pod without an allocated IP");
            return Ok(Outcome::Skipped(Skip::NoAddressYet));
        };

        let descriptor = build_args(&*self.resolver, ip, false, false).await?;
        debug!(?descriptor, "Updating pod eBPF redirection");
        manager.accept_request(descriptor);
        Ok(Outcome::Redirected)
    }

    async fn unenroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        if workload.host_network {
            return Ok(Outcome::Skipped(Skip::HostNetwork));
        }
        let manager = self.manager()?;
        let Some(ip) = workload.ip else {
            debug!("Nothing to remove for a pod without an IP");
            return Ok(Outcome::Skipped(Skip::NoAddressYet));
        };

        // The veth is often gone by the time a pod is deleted.
        let ifindex = match self.resolver.veth_index(ip).await {
            Ok(ifindex) => ifindex,
            Err(error) => {
                debug!(%error, "Failed to resolve pod veth");
                0
            }
        };
        let descriptor = RedirectDescriptor::workload_removal(ip, ifindex);
        debug!(?descriptor, "Removing pod eBPF redirection");
        manager.accept_request(descriptor);
        Ok(Outcome::Redirected)
    }

    async fn enroll_shared_proxy(
        &self,
        proxy: &WorkloadIdentity,
        capture_dns: bool,
    ) -> Result<Outcome> {
        let manager = self.manager()?;
        let Some(ip) = proxy.ip else {
            return Ok(Outcome::Skipped(Skip::NoAddressYet));
        };

        let mut descriptor = build_args(&*self.resolver, ip, true, false).await?;
        descriptor.capture_dns = capture_dns;
        debug!(?descriptor, "Updating node proxy eBPF redirection");
        manager.accept_request(descriptor);
        Ok(Outcome::Redirected)
    }

    async fn unenroll_shared_proxy(&self) -> Result<Outcome> {
        let manager = self.manager()?;
        let descriptor = RedirectDescriptor::shared_proxy_removal();
        debug!(?descriptor, "Removing node proxy eBPF redirection");
        manager.accept_request(descriptor);
        Ok(Outcome::Redirected)
    }
}
