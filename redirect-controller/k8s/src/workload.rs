use crate::{Error, Pod, ResourceExt};
use ambient_redirect_core::{AnnotationConfig, WorkloadIdentity};
use std::net::IpAddr;

/// Extracts the fields the controller acts on from a pod.
///
/// A pod without an assigned IP yields a workload with `ip: None`; an IP that
/// does not parse is an error.
pub fn workload_from_pod(pod: &Pod, annotation: &AnnotationConfig) -> Result<WorkloadIdentity, Error> {
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingField("metadata.name"))?;
    let namespace = pod.namespace().ok_or(Error::MissingField("metadata.namespace"))?;
    let uid = pod.uid().ok_or(Error::MissingField("metadata.uid"))?;

    let ip = match pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) {
        None | Some("") => None,
        Some(ip) => Some(ip.parse::<IpAddr>().map_err(|source| Error::InvalidIp {
            ip: ip.to_string(),
            source,
        })?),
    };

    let host_network = pod
        .spec
        .as_ref()
        .and_then(|s| s.host_network)
        .unwrap_or(false);

    let enrolled = pod.annotations().get(&annotation.key) == Some(&annotation.enabled);

    Ok(WorkloadIdentity {
        name,
        namespace,
        uid,
        ip,
        host_network,
        enrolled,
    })
}

/// Returns true once the pod has been marked for deletion or its containers
/// have finished.
pub fn is_terminating(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return true;
    }
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded" | "Failed")
    )
}
