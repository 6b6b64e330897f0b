use crate::RouteConfig;
use ipnet::IpNet;
use std::{fmt, net::IpAddr};

/// An inbound policy route steering a workload's traffic through the proxy
/// tunnel.
///
/// Routes are never cached: they are rebuilt for every enroll and unenroll so
/// that the kernel's routing table remains the only source of truth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub table: u32,
    pub destination: IpNet,
    pub gateway: IpAddr,
    pub device: String,
    pub source: IpAddr,
}

impl RouteEntry {
    pub fn for_workload(config: &RouteConfig, ip: IpAddr, host_ip: IpAddr) -> Self {
        Self {
            table: config.table,
            destination: IpNet::from(ip),
            gateway: config.tunnel_gateway,
            device: config.tunnel_device.clone(),
            source: host_ip,
        }
    }

    /// Renders the route as `ip route` arguments.
    ///
    /// The same arguments are used to match (`ip route show`), add and delete
    /// the route.
    pub fn args(&self) -> Vec<String> {
        vec![
            "table".to_string(),
            self.table.to_string(),
            self.destination.to_string(),
            "via".to_string(),
            self.gateway.to_string(),
            "dev".to_string(),
            self.device.clone(),
            "src".to_string(),
            self.source.to_string(),
        ]
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}
