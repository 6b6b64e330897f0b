//! Models of iproute2's JSON (`ip -j`) output.

use crate::exec::{self, render, Exec};
use serde::{de::DeserializeOwned, Deserialize};
use std::net::IpAddr;

#[derive(Debug, Deserialize)]
pub(crate) struct Route {
    pub dev: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Link {
    pub ifindex: u32,
    pub ifname: String,
    /// For veths, the peer's index in the peer's namespace.
    pub link_index: Option<u32>,
    pub link_netnsid: Option<i64>,
    pub address: Option<String>,
    pub linkinfo: Option<LinkInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkInfo {
    pub info_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetnsId {
    pub nsid: i64,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddrIface {
    #[serde(default)]
    pub addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddrInfo {
    pub local: Option<IpAddr>,
}

impl Link {
    pub fn is_veth(&self) -> bool {
        self.linkinfo
            .as_ref()
            .and_then(|li| li.info_kind.as_deref())
            == Some("veth")
    }
}

/// Runs `ip` with the given arguments and decodes its JSON output.
///
/// iproute2 prints nothing at all, rather than `[]`, for some empty results.
pub(crate) async fn query<T: DeserializeOwned>(
    exec: &dyn Exec,
    args: Vec<String>,
) -> Result<Vec<T>, exec::Error> {
    let out = exec.output("ip", &args).await?;
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&out).map_err(|source| exec::Error::Parse {
        command: render("ip", &args),
        source,
    })
}
