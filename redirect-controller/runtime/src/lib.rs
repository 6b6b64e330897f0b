#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ambient_redirect_core as core;
pub use ambient_redirect_k8s as k8s;
pub use ambient_redirect_net as net;

mod args;
pub mod discover;
pub mod ebpf;
mod watch;


pub use self::{args::Args, watch::Dispatcher};

use self::core::{
    ebpf::{EbpfRedirector, RedirectManager},
    Config, Controller, RedirectionMode, Redirector,
};
use std::{net::IpAddr, sync::Arc};

/// Builds the controller for the configured redirection mode.
///
/// This is the only place the mode is inspected. `manager` is only used in
/// eBPF mode; `host_ip` is only used in route mode.
pub fn build_controller(
    config: &Config,
    host_ip: IpAddr,
    exec: Arc<dyn net::Exec>,
    api: Arc<dyn k8s::WorkloadApi>,
    manager: Option<Arc<dyn RedirectManager>>,
) -> Controller {
    let redirector: Arc<dyn Redirector> = match config.mode {
        RedirectionMode::RouteBased => {
            let ipset = net::Ipset::new(exec.clone(), config.route.ipset_name.clone());
            Arc::new(net::RouteRedirector::new(
                config.route.clone(),
                host_ip,
                exec,
                Arc::new(ipset),
            ))
        }
        RedirectionMode::EbpfBased => {
            let resolver = net::Resolver::new(exec);
            Arc::new(EbpfRedirector::new(manager, Arc::new(resolver)))
        }
    };
    let annotator = k8s::Annotator::new(api, config.annotation.clone());
    Controller::new(redirector, Arc::new(annotator))
}
