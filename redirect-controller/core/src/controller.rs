use crate::{Result, WorkloadIdentity};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A redirection mechanism.
///
/// Exactly one implementation is selected when the [`Controller`] is built;
/// nothing else branches on the configured mode.
#[async_trait::async_trait]
pub trait Redirector: Send + Sync {
    async fn enroll(&self, workload: &WorkloadIdentity) -> Result<Outcome>;

    async fn unenroll(&self, workload: &WorkloadIdentity) -> Result<Outcome>;

    /// Redirects traffic for the node proxy itself.
    async fn enroll_shared_proxy(
        &self,
        _proxy: &WorkloadIdentity,
        _capture_dns: bool,
    ) -> Result<Outcome> {
        Ok(Outcome::Skipped(Skip::NotApplicable))
    }

    async fn unenroll_shared_proxy(&self) -> Result<Outcome> {
        Ok(Outcome::Skipped(Skip::NotApplicable))
    }
}

/// Records enrollment state on the workload object.
#[async_trait::async_trait]
pub trait Annotate: Send + Sync {
    async fn mark_enrolled(&self, workload: &WorkloadIdentity) -> Result<()>;

    /// Clears the enrollment record. Implementations must not issue an API
    /// call when the workload is not currently marked as enrolled.
    async fn mark_unenrolled(&self, workload: &WorkloadIdentity) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Kernel state was reconciled, possibly with logged step failures.
    Redirected,
    Skipped(Skip),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Skip {
    /// The workload has not been assigned an address yet.
    NoAddressYet,
    /// Host-network workloads are never redirected.
    HostNetwork,
    /// The operation has no meaning for the configured mechanism.
    NotApplicable,
}

/// Dispatches enroll and unenroll events to the configured redirector and
/// keeps the workload's enrollment annotation in step.
///
/// Both operations are best-effort: kernel and annotation failures are logged
/// and later steps still run. Only identity resolution failures and missing
/// collaborators are returned, in which case the annotation is left untouched.
#[derive(Clone)]
pub struct Controller {
    redirector: Arc<dyn Redirector>,
    annotator: Arc<dyn Annotate>,
}

// === impl Controller ===

impl Controller {
    pub fn new(redirector: Arc<dyn Redirector>, annotator: Arc<dyn Annotate>) -> Self {
        Self {
            redirector,
            annotator,
        }
    }

    #[instrument(skip_all, fields(pod = %workload))]
    pub async fn enroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        let outcome = self.redirector.enroll(workload).await?;
        match outcome {
            Outcome::Redirected => {
                if let Err(error) = self.annotator.mark_enrolled(workload).await {
                    warn!(%error, "Failed to annotate pod enrollment");
                }
            }
            Outcome::Skipped(reason) => debug!(?reason, "Skipped enrollment"),
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(pod = %workload))]
    pub async fn unenroll(&self, workload: &WorkloadIdentity) -> Result<Outcome> {
        let outcome = self.redirector.unenroll(workload).await?;
        if outcome == Outcome::Skipped(Skip::HostNetwork) {
            debug!("Pod uses the host network, skipping");
            return Ok(outcome);
        }

        if let Err(error) = self.annotator.mark_unenrolled(workload).await {
            warn!(%error, "Failed to annotate pod unenrollment");
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(proxy = %proxy, capture_dns = capture_dns))]
    pub async fn enroll_shared_proxy(
        &self,
        proxy: &WorkloadIdentity,
        capture_dns: bool,
    ) -> Result<Outcome> {
        self.redirector.enroll_shared_proxy(proxy, capture_dns).await
    }

    #[instrument(skip_all)]
    pub async fn unenroll_shared_proxy(&self) -> Result<Outcome> {
        self.redirector.unenroll_shared_proxy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ResolveError};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Calls(Mutex<Vec<&'static str>>);

    impl Calls {
        fn push(&self, call: &'static str) {
            self.0.lock().push(call);
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    struct FixedRedirector {
        calls: Arc<Calls>,
        result: fn() -> Result<Outcome>,
    }

    #[async_trait::async_trait]
    impl Redirector for FixedRedirector {
        async fn enroll(&self, _: &WorkloadIdentity) -> Result<Outcome> {
            self.calls.push("enroll");
            (self.result)()
        }

        async fn unenroll(&self, _: &WorkloadIdentity) -> Result<Outcome> {
            self.calls.push("unenroll");
            (self.result)()
        }
    }

    struct FailingAnnotator(Arc<Calls>);

    #[async_trait::async_trait]
    impl Annotate for FailingAnnotator {
        async fn mark_enrolled(&self, _: &WorkloadIdentity) -> Result<()> {
            self.0.push("mark_enrolled");
            Err(Error::AnnotationPatchFailed("conflict".into()))
        }

        async fn mark_unenrolled(&self, _: &WorkloadIdentity) -> Result<()> {
            self.0.push("mark_unenrolled");
            Err(Error::AnnotationPatchFailed("conflict".into()))
        }
    }

    fn controller(result: fn() -> Result<Outcome>) -> (Controller, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let controller = Controller::new(
            Arc::new(FixedRedirector {
                calls: calls.clone(),
                result,
            }),
            Arc::new(FailingAnnotator(calls.clone())),
        );
        (controller, calls)
    }

    fn workload() -> WorkloadIdentity {
        WorkloadIdentity {
            name: "app-1".to_string(),
            namespace: "default".to_string(),
            uid: "uid-1".to_string(),
            ip: Some("10.1.2.7".parse().unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn annotation_failures_are_absorbed() {
        let (controller, calls) = controller(|| Ok(Outcome::Redirected));
        let outcome = controller.enroll(&workload()).await.unwrap();
        assert_eq!(outcome, Outcome::Redirected);
        assert_eq!(calls.take(), vec!["enroll", "mark_enrolled"]);

        let outcome = controller.unenroll(&workload()).await.unwrap();
        assert_eq!(outcome, Outcome::Redirected);
        assert_eq!(calls.take(), vec!["unenroll", "mark_unenrolled"]);
    }

    #[tokio::test]
    async fn resolution_failure_skips_annotation() {
        let (controller, calls) = controller(|| {
            Err(ResolveError::NoVethRoute("10.1.2.7".parse().unwrap()).into())
        });
        let err = controller.enroll(&workload()).await.unwrap_err();
        assert!(matches!(err, Error::Unresolvable(_)), "{err}");
        assert_eq!(calls.take(), vec!["enroll"]);
    }

    #[tokio::test]
    async fn skipped_enrollment_is_not_annotated() {
        let (controller, calls) = controller(|| Ok(Outcome::Skipped(Skip::NoAddressYet)));
        let outcome = controller.enroll(&workload()).await.unwrap();
        assert_eq!(outcome, Outcome::Skipped(Skip::NoAddressYet));
        assert_eq!(calls.take(), vec!["enroll"]);
    }

    #[tokio::test]
    async fn skipped_unenrollment_still_clears_annotation() {
        let (controller, calls) = controller(|| Ok(Outcome::Skipped(Skip::NoAddressYet)));
        controller.unenroll(&workload()).await.unwrap();
        assert_eq!(calls.take(), vec!["unenroll", "mark_unenrolled"]);
    }

    #[tokio::test]
    async fn host_network_unenrollment_is_not_annotated() {
        let (controller, calls) = controller(|| Ok(Outcome::Skipped(Skip::HostNetwork)));
        controller.unenroll(&workload()).await.unwrap();
        assert_eq!(calls.take(), vec!["unenroll"]);
    }

    #[tokio::test]
    async fn shared_proxy_defaults_to_not_applicable() {
        let (controller, calls) = controller(|| Ok(Outcome::Redirected));
        assert_eq!(
            controller.enroll_shared_proxy(&workload(), true).await.unwrap(),
            Outcome::Skipped(Skip::NotApplicable)
        );
        assert_eq!(
            controller.unenroll_shared_proxy().await.unwrap(),
            Outcome::Skipped(Skip::NotApplicable)
        );
        assert!(calls.take().is_empty());
    }
}
