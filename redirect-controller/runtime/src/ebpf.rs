//! Intake for the eBPF program manager.

use crate::core::ebpf::{RedirectDescriptor, RedirectManager};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Queues redirect requests for the map programmer.
#[derive(Clone, Debug)]
pub struct Queue {
    tx: mpsc::UnboundedSender<RedirectDescriptor>,
}

pub type Requests = mpsc::UnboundedReceiver<RedirectDescriptor>;

// === impl Queue ===

impl Queue {
    pub fn new() -> (Self, Requests) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RedirectManager for Queue {
    fn accept_request(&self, descriptor: RedirectDescriptor) {
        if let Err(mpsc::error::SendError(descriptor)) = self.tx.send(descriptor) {
            warn!(?descriptor, "eBPF redirect manager has stopped; dropping request");
        }
    }
}

/// Consumes requests until every [`Queue`] handle is dropped.
pub async fn drain(mut requests: Requests) {
    while let Some(descriptor) = requests.recv().await {
        let action = if descriptor.remove { "remove" } else { "install" };
        info!(
            action,
            shared_proxy = descriptor.is_shared_proxy,
            ips = ?descriptor.ip_addrs,
            ifindex = descriptor.ifindex,
            peer_index = descriptor.peer_index,
            peer_ns = ?descriptor.peer_ns,
            mac = ?descriptor.mac,
            capture_dns = descriptor.capture_dns,
            "Accepted eBPF redirect request"
        );
    }
}
