#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
pub mod controller;
pub mod ebpf;
mod error;
pub mod identity;
pub mod idempotent;
mod mac;
mod route;
mod workload;

pub use self::{
    config::{AnnotationConfig, Config, InvalidMode, RedirectionMode, RouteConfig},
    controller::{Annotate, Controller, Outcome, Redirector, Skip},
    error::{BoxError, Error, ResolveError, Result},
    identity::{NetworkIdentity, ResolveIdentity},
    mac::{InvalidMac, MacAddr},
    route::RouteEntry,
    workload::WorkloadIdentity,
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
