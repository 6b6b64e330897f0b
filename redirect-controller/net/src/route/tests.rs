use super::*;
use crate::{
    fake::{FakeKernel, Veth},
    ipset::Ipset,
    sysctl::rp_filter_path,
};
use pretty_assertions::assert_eq;

const SET: &str = "ztunnel-pods-ips";
const UID: &str = "8f6c1a52-4c1e-4f0e-9d0a-0b1c7a2e3d4f";
const EXPECTED_ROUTE: &str = "table 100 10.1.2.7/32 via 169.254.7.127 dev istioin src 10.1.2.1";

fn pod_ip() -> IpAddr {
    "10.1.2.7".parse().unwrap()
}

fn kernel() -> Arc<FakeKernel> {
    Arc::new(FakeKernel::default().with_veth(
        pod_ip(),
        Veth {
            device: "veth5c2a3b1f".to_string(),
            ifindex: 12,
            peer_index: Some(3),
            nsid: Some(2),
            ns: Some("cni-7e1d2c4a".to_string()),
            mac: Some("0a:58:0a:01:02:07".parse().unwrap()),
        },
    ))
}

fn redirector(kernel: &Arc<FakeKernel>) -> RouteRedirector {
    RouteRedirector::new(
        RouteConfig::default(),
        "10.1.2.1".parse().unwrap(),
        kernel.clone(),
        Arc::new(Ipset::new(kernel.clone(), SET)),
    )
}

fn workload(ip: Option<IpAddr>) -> WorkloadIdentity {
    WorkloadIdentity {
        name: "app-1".to_string(),
        namespace: "default".to_string(),
        uid: UID.to_string(),
        ip,
        ..Default::default()
    }
}

#[tokio::test]
async fn enroll_installs_route_and_membership() {
    let kernel = kernel();
    let outcome = redirector(&kernel)
        .enroll(&workload(Some(pod_ip())))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Redirected);
    assert_eq!(kernel.routes(), vec![EXPECTED_ROUTE.to_string()]);
    assert_eq!(
        kernel.ipset(SET),
        vec![("10.1.2.7".to_string(), UID.to_string())]
    );
    assert_eq!(
        kernel.file(&rp_filter_path("veth5c2a3b1f")).as_deref(),
        Some("0")
    );
}

#[tokio::test]
async fn enroll_is_idempotent() {
    let kernel = kernel();
    let redirector = redirector(&kernel);
    let w = workload(Some(pod_ip()));

    redirector.enroll(&w).await.unwrap();
    let routes = kernel.routes();
    let members = kernel.ipset(SET);
    kernel.clear_calls();

    let outcome = redirector.enroll(&w).await.unwrap();
    assert_eq!(outcome, Outcome::Redirected);
    assert_eq!(kernel.routes(), routes);
    assert_eq!(kernel.ipset(SET), members);
    // Only the sysctl write, which is idempotent by nature, is repeated.
    assert_eq!(
        kernel.mutations(),
        vec![format!(
            "write {} 0",
            rp_filter_path("veth5c2a3b1f").display()
        )]
    );
}

#[tokio::test]
async fn preexisting_route_converges_with_added_route() {
    let added = kernel();
    redirector(&added)
        .enroll(&workload(Some(pod_ip())))
        .await
        .unwrap();

    let preexisting = kernel();
    let args = [argv(["route", "add"]), argv(EXPECTED_ROUTE.split(' '))].concat();
    preexisting.run("ip", &args).await.unwrap();
    redirector(&preexisting)
        .enroll(&workload(Some(pod_ip())))
        .await
        .unwrap();

    assert_eq!(added.routes(), preexisting.routes());
    assert_eq!(added.ipset(SET), preexisting.ipset(SET));
}

#[tokio::test]
async fn explicit_ip_wins() {
    let kernel = kernel();
    let outcome = redirector(&kernel)
        .enroll_with_ip(&workload(None), Some(pod_ip()))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Redirected);
    assert_eq!(kernel.routes(), vec![EXPECTED_ROUTE.to_string()]);
}

#[tokio::test]
async fn missing_ip_is_a_no_op() {
    let kernel = kernel();
    let redirector = redirector(&kernel);
    let w = workload(None);

    assert_eq!(
        redirector.enroll(&w).await.unwrap(),
        Outcome::Skipped(Skip::NoAddressYet)
    );
    assert_eq!(
        redirector.unenroll(&w).await.unwrap(),
        Outcome::Skipped(Skip::NoAddressYet)
    );
    assert!(kernel.calls().is_empty());
}

#[tokio::test]
async fn unenroll_of_unknown_pod_mutates_nothing() {
    let kernel = kernel();
    let outcome = redirector(&kernel)
        .unenroll(&workload(Some(pod_ip())))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Redirected);
    assert!(kernel.mutations().is_empty(), "{:?}", kernel.mutations());
}

#[tokio::test]
async fn unenroll_removes_route_and_membership() {
    let kernel = kernel();
    let redirector = redirector(&kernel);
    let w = workload(Some(pod_ip()));

    redirector.enroll(&w).await.unwrap();
    redirector.unenroll(&w).await.unwrap();
    assert!(kernel.routes().is_empty());
    assert!(kernel.ipset(SET).is_empty());

    kernel.clear_calls();
    redirector.unenroll(&w).await.unwrap();
    assert!(kernel.mutations().is_empty());
}

#[tokio::test]
async fn step_failures_do_not_abort_enrollment() {
    let kernel = Arc::new(
        FakeKernel::default()
            .with_device(pod_ip(), "cni0", 4)
            .failing("ipset add")
            .failing("ip route add"),
    );
    let outcome = redirector(&kernel)
        .enroll(&workload(Some(pod_ip())))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Redirected);
    assert!(kernel.routes().is_empty());
    // The device still has reverse-path filtering disabled.
    assert_eq!(kernel.file(&rp_filter_path("cni0")).as_deref(), Some("0"));
}

#[tokio::test]
async fn unroutable_device_is_tolerated() {
    let kernel = Arc::new(FakeKernel::default());
    let outcome = redirector(&kernel)
        .enroll(&workload(Some(pod_ip())))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Redirected);
    assert_eq!(kernel.routes(), vec![EXPECTED_ROUTE.to_string()]);
}

#[tokio::test]
async fn ipv6_workloads_skip_the_ipset() {
    let kernel = Arc::new(FakeKernel::default());
    let redirector = RouteRedirector::new(
        RouteConfig::default(),
        "fd00::1".parse().unwrap(),
        kernel.clone(),
        Arc::new(Ipset::new(kernel.clone(), SET)),
    );
    redirector
        .enroll(&workload(Some("fd00::7".parse().unwrap())))
        .await
        .unwrap();
    assert!(kernel.ipset(SET).is_empty());
    assert_eq!(
        kernel.routes(),
        vec!["table 100 fd00::7/128 via 169.254.7.127 dev istioin src fd00::1".to_string()]
    );
}
