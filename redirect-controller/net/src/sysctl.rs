use crate::exec::Exec;
use ambient_redirect_core::{Error, Result};
use std::path::{Path, PathBuf};

const IPV4_CONF: &str = "/proc/sys/net/ipv4/conf";

pub fn rp_filter_path(device: &str) -> PathBuf {
    Path::new(IPV4_CONF).join(device).join("rp_filter")
}

/// Disables reverse-path filtering on `device`, so that replies routed back
/// through the proxy tunnel are not dropped as spoofed.
pub async fn disable_rp_filter(exec: &dyn Exec, device: &str) -> Result<()> {
    exec.write_file(&rp_filter_path(device), "0")
        .await
        .map_err(|e| Error::kernel("disable rp_filter", e))
}
