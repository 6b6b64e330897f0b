//! Discovers the addresses this node uses to reach the pod network.

use crate::{
    exec::{self, argv, Exec},
    iproute::{self, AddrIface},
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::trace;

/// Returns the local address the kernel would select to reach `peer`.
///
/// Connecting a UDP socket sends nothing; it only binds a route. `None` means
/// no route could be selected and callers should try another peer.
pub async fn resolve_host_ip_for_peer(peer: IpAddr) -> Option<IpAddr> {
    let unspecified = match peer {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await.ok()?;
    if let Err(error) = socket.connect(SocketAddr::new(peer, 80)).await {
        trace!(%peer, %error, "No route to peer");
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Lists the addresses assigned to the host's interfaces.
pub async fn local_addresses(exec: &dyn Exec) -> Result<Vec<IpAddr>, exec::Error> {
    let ifaces = iproute::query::<AddrIface>(exec, argv(["-j", "addr", "show"])).await?;
    Ok(ifaces
        .into_iter()
        .flat_map(|iface| iface.addr_info.into_iter().filter_map(|a| a.local))
        .collect())
}
