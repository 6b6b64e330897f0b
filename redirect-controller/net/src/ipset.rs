//! The kernel ip-set that tracks redirected workloads.
//!
//! Entries are IPv4 addresses annotated with the owning pod's UID as a
//! comment, so that membership can be checked by UID.

use crate::exec::{argv, Exec};
use ambient_redirect_core::{Error, Result};
use std::{net::Ipv4Addr, sync::Arc};
use tracing::debug;

#[async_trait::async_trait]
pub trait IpSet: Send + Sync {
    /// Returns true if an entry is tagged with `uid`. Lookup failures are
    /// treated as absence.
    async fn contains(&self, uid: &str) -> bool;

    async fn add_ip(&self, ip: Ipv4Addr, uid: &str) -> Result<()>;

    async fn delete_ip(&self, ip: Ipv4Addr) -> Result<()>;
}

/// An ip-set managed with the `ipset` tool.
#[derive(Clone)]
pub struct Ipset {
    exec: Arc<dyn Exec>,
    name: String,
}

/// Yields `(address, comment)` for each member of `set` in `ipset save`
/// output.
pub(crate) fn saved_entries<'a>(
    saved: &'a str,
    set: &'a str,
) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
    saved.lines().filter_map(move |line| {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("add") || tokens.next() != Some(set) {
            return None;
        }
        let addr = tokens.next()?;
        let comment = tokens
            .skip_while(|t| *t != "comment")
            .nth(1)
            .map(|c| c.trim_matches('"'));
        Some((addr, comment))
    })
}

// === impl Ipset ===

impl Ipset {
    pub fn new(exec: Arc<dyn Exec>, name: impl Into<String>) -> Self {
        Self {
            exec,
            name: name.into(),
        }
    }
}

#[async_trait::async_trait]
impl IpSet for Ipset {
    async fn contains(&self, uid: &str) -> bool {
        match self.exec.output("ipset", &argv(["save", self.name.as_str()])).await {
            Ok(saved) => {
                saved_entries(&saved, &self.name).any(|(_, comment)| comment == Some(uid))
            }
            Err(error) => {
                debug!(set = %self.name, %error, "Failed to list ipset");
                false
            }
        }
    }

    async fn add_ip(&self, ip: Ipv4Addr, uid: &str) -> Result<()> {
        let ip = ip.to_string();
        self.exec
            .run(
                "ipset",
                &argv(["add", self.name.as_str(), ip.as_str(), "comment", uid]),
            )
            .await
            .map_err(|e| Error::kernel("add ipset entry", e))
    }

    async fn delete_ip(&self, ip: Ipv4Addr) -> Result<()> {
        let ip = ip.to_string();
        self.exec
            .run("ipset", &argv(["del", self.name.as_str(), ip.as_str()]))
            .await
            .map_err(|e| Error::kernel("delete ipset entry", e))
    }
}
