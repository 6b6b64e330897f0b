//! Route-based redirection: an inbound policy route plus ip-set membership
//! per workload.

use crate::{
    exec::{argv, render, Exec},
    identity::Resolver,
    ipset::IpSet,
    sysctl,
};
use ambient_redirect_core::{
    idempotent::{self, Converged},
    Error, Outcome, Redirector, Result, RouteConfig, RouteEntry, Skip, WorkloadIdentity,
};
use std::{net::IpAddr, sync::Arc};
use tracing::{debug, info, instrument, warn};

pub struct RouteRedirector {
    config: RouteConfig,
    host_ip: IpAddr,
    exec: Arc<dyn Exec>,
    ipset: Arc<dyn IpSet>,
    resolver: Resolver,
}

// === impl RouteRedirector ===

impl RouteRedirector {
    pub fn new(
        config: RouteConfig,
        host_ip: IpAddr,
        exec: Arc<dyn Exec>,
        ipset: Arc<dyn IpSet>,
    ) -> Self {
        Self {
            config,
            host_ip,
            resolver: Resolver::new(exec.clone()),
            exec,
            ipset,
        }
    }

    pub fn route_for(&self, ip: IpAddr) -> RouteEntry {
        RouteEntry::for_workload(&self.config, ip, self.host_ip)
    }

    /// Enrolls `workload`, preferring `ip` over the workload's reported
    /// address.
    #[instrument(skip_all, fields(pod = %workload))]
    pub async fn enroll_with_ip(
        &self,
        workload: &WorkloadIdentity,
        ip: Option<IpAddr>,
    ) -> Result<Outcome> {
        let Some(ip) = ip.or(workload.ip) else {
            debug!("Skipping pod without an allocated IP");
            return Ok(Outcome::Skipped(Skip::NoAddressYet));
        };

        match ip {
            IpAddr::V4(addr) => {
                let added = idempotent::ensure_present(
                    self.ipset.contains(&workload.uid),
                    self.ipset.add_ip(addr, &workload.uid),
                )
                .await;
                match added {
                    Ok(Converged::Applied) => info!(uid = %workload.uid, "Added pod to ipset"),
                    Ok(Converged::Unchanged) => info!(uid = %workload.uid, "Pod is in ipset"),
                    Err(error) => warn!(%error, "Failed to add pod to ipset"),
                }
            }
            IpAddr::V6(_) => debug!(%ip, "The ipset only holds IPv4 addresses"),
        }

        let route = self.route_for(ip);
        let added =
            idempotent::ensure_present(self.route_exists(&route), self.add_route(&route)).await;
        match added {
            Ok(Converged::Applied) => info!(%route, "Added route"),
            Ok(Converged::Unchanged) => info!(%route, "Route already exists"),
            Err(error) => warn!(%error, %route, "Failed to add route"),
        }

        match self.resolver.device_for(ip).await {
            Ok(device) => {
                if let Err(error) = sysctl::disable_rp_filter(&*self.exec, &device).await {
                    warn!(%error, %device, "Failed to disable rp_filter");
                }
            }
            Err(error) => warn!(%error, %ip, "Failed to get device for destination"),
        }

        Ok(Outcome::Redirected)
    }

    /// Returns true if the kernel prints exactly one route for the route's
    /// match arguments.
    ///
    /// The table is queried rather than relying on the result of `add`/`del`,
    /// since routes added this way are not reliably echoed back.
    pub async fn route_exists(&self, route: &RouteEntry) -> bool {
        let args = [argv(["route", "show"]), route.args()].concat();
        match self.exec.output("ip", &args).await {
            Ok(out) => {
                let lines = out.lines().filter(|l| !l.trim().is_empty()).count();
                debug!(command = %render("ip", &args), lines, "Queried route");
                lines == 1
            }
            Err(error) => {
                debug!(%error, "Failed to query route");
                false
            }
        }
    }

    async fn add_route(&self, route: &RouteEntry) -> Result<()> {
        let args = [argv(["route", "add"]), route.args()].concat();
        self.exec
            .run("ip", &args)
            .await
            .map_err(|e| Error::kernel("add route", e))
    }

    async fn delete_route(&self, route: &RouteEntry) -> Result<()> {
        let args = [argv(["route", "del"]), route.args()].concat();
        self.exec
            .run("ip", &args)
            .await
            .map_err(|e| Error::kernel("delete route", e))
    }
}

#[async_trait::async_trait]
impl Redirector for RouteRedirector {
    async fn enroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        self.enroll_with_ip(workload, None).await
    }

    #[instrument(skip_all, fields(pod = %workload))]
    async fn unenroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        debug!(uid = %workload.uid, "Removing pod from mesh");
        let Some(ip) = workload.ip else {
            debug!("Nothing to remove for a pod without an IP");
            return Ok(Outcome::Skipped(Skip::NoAddressYet));
        };

        if let IpAddr::V4(addr) = ip {
            let removed = idempotent::ensure_absent(
                self.ipset.contains(&workload.uid),
                self.ipset.delete_ip(addr),
            )
            .await;
            match removed {
                Ok(Converged::Applied) => info!(uid = %workload.uid, "Removed pod from ipset"),
                Ok(Converged::Unchanged) => info!(uid = %workload.uid, "Pod is not in ipset"),
                Err(error) => warn!(%error, "Failed to delete pod from ipset"),
            }
        }

        let route = self.route_for(ip);
        let removed =
            idempotent::ensure_absent(self.route_exists(&route), self.delete_route(&route)).await;
        match removed {
            Ok(Converged::Applied) => info!(%route, "Removed route"),
            Ok(Converged::Unchanged) => debug!(%route, "No route to remove"),
            Err(error) => warn!(%error, %route, "Failed to delete route"),
        }

        Ok(Outcome::Redirected)
    }
}

#[cfg(test)]
mod tests;
