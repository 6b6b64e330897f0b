use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

/// Selects how workload traffic is steered into the node proxy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RedirectionMode {
    /// Policy routes plus an ip-set matched by the node's iptables rules.
    RouteBased,
    /// Redirect descriptors handed to the eBPF program manager.
    EbpfBased,
}

/// Node-wide settings, fixed when the controller is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub node_name: String,
    pub mode: RedirectionMode,
    pub route: RouteConfig,
    pub annotation: AnnotationConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    /// Policy routing table that holds inbound workload routes.
    pub table: u32,
    /// Address of the proxy end of the inbound tunnel.
    pub tunnel_gateway: IpAddr,
    pub tunnel_device: String,
    /// Kernel ip-set matched by the inbound capture rules.
    pub ipset_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationConfig {
    pub key: String,
    pub enabled: String,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid redirection mode {0:?}; expected one of 'iptables' or 'ebpf'")]
pub struct InvalidMode(String);

// === impl RedirectionMode ===

impl FromStr for RedirectionMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iptables" | "route" => Ok(Self::RouteBased),
            "ebpf" => Ok(Self::EbpfBased),
            _ => Err(InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for RedirectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RouteBased => f.write_str("iptables"),
            Self::EbpfBased => f.write_str("ebpf"),
        }
    }
}

// === impl RouteConfig ===

impl RouteConfig {
    pub const DEFAULT_TABLE: u32 = 100;
    pub const DEFAULT_TUNNEL_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(169, 254, 7, 127));
    pub const DEFAULT_TUNNEL_DEVICE: &'static str = "istioin";
    pub const DEFAULT_IPSET_NAME: &'static str = "ztunnel-pods-ips";
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            table: Self::DEFAULT_TABLE,
            tunnel_gateway: Self::DEFAULT_TUNNEL_GATEWAY,
            tunnel_device: Self::DEFAULT_TUNNEL_DEVICE.to_string(),
            ipset_name: Self::DEFAULT_IPSET_NAME.to_string(),
        }
    }
}

// === impl AnnotationConfig ===

impl AnnotationConfig {
    pub const DEFAULT_KEY: &'static str = "ambient.istio.io/redirection";
    pub const DEFAULT_ENABLED: &'static str = "enabled";
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            key: Self::DEFAULT_KEY.to_string(),
            enabled: Self::DEFAULT_ENABLED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(
            "iptables".parse::<RedirectionMode>().unwrap(),
            RedirectionMode::RouteBased
        );
        assert_eq!(
            "route".parse::<RedirectionMode>().unwrap(),
            RedirectionMode::RouteBased
        );
        assert_eq!(
            " eBPF ".parse::<RedirectionMode>().unwrap(),
            RedirectionMode::EbpfBased
        );
        assert!("tproxy".parse::<RedirectionMode>().is_err());
    }

    #[test]
    fn mode_display_round_trips() {
        for mode in [RedirectionMode::RouteBased, RedirectionMode::EbpfBased] {
            assert_eq!(mode.to_string().parse::<RedirectionMode>().unwrap(), mode);
        }
    }
}
