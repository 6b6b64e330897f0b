#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod exec;
pub mod host;
pub mod identity;
mod iproute;
pub mod ipset;
pub mod route;
pub mod sysctl;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use self::{
    exec::{Exec, System},
    identity::Resolver,
    ipset::{IpSet, Ipset},
    route::RouteRedirector,
};
