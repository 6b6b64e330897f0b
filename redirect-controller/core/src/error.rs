use std::net::IpAddr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The workload's network identity could not be fully resolved.
    #[error("unresolvable network identity: {0}")]
    Unresolvable(#[from] ResolveError),

    #[error("{0} is not initialized")]
    UninitializedCollaborator(&'static str),

    #[error("failed to {op}: {source}")]
    KernelMutationFailed {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed to patch pod annotations: {0}")]
    AnnotationPatchFailed(#[source] BoxError),
}

/// Identifies the lookup step that failed while resolving a workload's
/// network identity.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no veth device routes to {0}")]
    NoVethRoute(IpAddr),

    #[error("failed to determine the peer index of {0}")]
    PeerIndex(String),

    #[error("failed to determine the peer namespace of {0}")]
    PeerNamespace(String),

    #[error("no network namespace is named for nsid {0}")]
    NamespaceName(i64),

    #[error("no MAC address for interface {index} in namespace {ns}")]
    MacAddress { ns: String, index: u32 },

    #[error("failed to query {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn kernel(op: &'static str, source: impl Into<BoxError>) -> Self {
        Self::KernelMutationFailed {
            op,
            source: source.into(),
        }
    }
}

impl ResolveError {
    pub fn query(what: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Query {
            what,
            source: source.into(),
        }
    }
}
