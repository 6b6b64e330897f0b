#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod annotate;
mod api;
pub mod labels;
mod node;
mod workload;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use self::{
    annotate::{annotation_patch, Annotator},
    api::{Error, WorkloadApi},
    labels::Selector,
    node::resolve_node_ip,
    workload::{is_terminating, workload_from_pod},
};
pub use k8s_openapi::api::core::v1::{
    Node, NodeAddress, NodeSpec, NodeStatus, Pod, PodSpec, PodStatus,
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    runtime::watcher,
    Client,
};
