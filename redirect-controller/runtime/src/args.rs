use crate::{
    build_controller,
    core::{ebpf::RedirectManager, AnnotationConfig, Config, RedirectionMode, RouteConfig},
    discover, ebpf,
    k8s::{self, watcher, Pod, Selector},
    net, Dispatcher,
};
use anyhow::{bail, Result};
use clap::Parser;
use std::{net::IpAddr, sync::Arc};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "ambient-redirect",
    about = "Redirects pod traffic on this node into the node proxy"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "ambient_redirect=info,warn",
        env = "AMBIENT_REDIRECT_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "AMBIENT_REDIRECT_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The node this controller manages.
    #[clap(long, env = "NODE_NAME")]
    node_name: String,

    /// Redirection mechanism: `iptables` or `ebpf`.
    #[clap(long, default_value = "iptables", env = "REDIRECT_MODE")]
    redirect_mode: RedirectionMode,

    /// Policy routing table holding inbound workload routes.
    #[clap(long, default_value_t = RouteConfig::DEFAULT_TABLE)]
    inbound_route_table: u32,

    #[clap(long, default_value_t = RouteConfig::DEFAULT_TUNNEL_GATEWAY)]
    inbound_tunnel_ip: IpAddr,

    #[clap(long, default_value = RouteConfig::DEFAULT_TUNNEL_DEVICE)]
    inbound_tunnel_device: String,

    #[clap(long, default_value = RouteConfig::DEFAULT_IPSET_NAME)]
    ipset_name: String,

    #[clap(long, default_value = AnnotationConfig::DEFAULT_KEY)]
    redirection_annotation: String,

    /// Pods to redirect.
    #[clap(long, default_value = "istio.io/dataplane-mode=ambient")]
    workload_selector: Selector,

    /// Node proxy pods.
    #[clap(long, default_value = "app=ztunnel")]
    ztunnel_selector: Selector,

    /// Redirects DNS queries from workloads to the node proxy (eBPF mode).
    #[clap(long, env = "CAPTURE_DNS")]
    capture_dns: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            node_name,
            redirect_mode,
            inbound_route_table,
            inbound_tunnel_ip,
            inbound_tunnel_device,
            ipset_name,
            redirection_annotation,
            workload_selector,
            ztunnel_selector,
            capture_dns,
        } = self;

        let config = Config {
            node_name,
            mode: redirect_mode,
            route: RouteConfig {
                table: inbound_route_table,
                tunnel_gateway: inbound_tunnel_ip,
                tunnel_device: inbound_tunnel_device,
                ipset_name,
            },
            annotation: AnnotationConfig {
                key: redirection_annotation,
                ..Default::default()
            },
        };

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .build()
            .await?;

        let api: Arc<dyn k8s::WorkloadApi> = Arc::new(runtime.client());
        let exec: Arc<dyn net::Exec> = Arc::new(net::System::new());

        let host_ip =
            discover::host_ip(&*api, &*exec, &config.node_name, &ztunnel_selector).await?;

        let manager = match config.mode {
            RedirectionMode::EbpfBased => {
                let (queue, requests) = ebpf::Queue::new();
                tokio::spawn(ebpf::drain(requests).instrument(info_span!("ebpf")));
                Some(Arc::new(queue) as Arc<dyn RedirectManager>)
            }
            RedirectionMode::RouteBased => None,
        };
        let controller = build_controller(&config, host_ip, exec, api, manager);
        info!(mode = %config.mode, %host_ip, node = %config.node_name, "Controller ready");

        let pods = runtime.watch_all::<Pod>(
            watcher::Config::default().fields(&format!("spec.nodeName={}", config.node_name)),
        );
        let dispatcher = Dispatcher::new(
            controller,
            config.annotation,
            workload_selector,
            ztunnel_selector,
            capture_dns,
        );
        tokio::spawn(dispatcher.run(pods).instrument(info_span!("pods")));

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
