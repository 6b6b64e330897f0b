use std::{fmt, net::IpAddr};

/// The subset of a pod that redirection needs.
///
/// Built from the pod object for each event and dropped once the operation
/// completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadIdentity {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    /// Unset until the pod has been assigned an address.
    pub ip: Option<IpAddr>,
    pub host_network: bool,
    /// Whether the pod's redirection annotation currently reads "enabled".
    pub enrolled: bool,
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
