use crate::{
    core::{AnnotationConfig, Controller, Outcome, Result, WorkloadIdentity},
    k8s::{self, watcher, Pod, ResourceExt, Selector},
};
use futures::prelude::*;
use tracing::{debug, info, warn};

/// Turns pod watch events on this node into controller calls.
///
/// Events are handled one at a time, so operations on a single pod are never
/// interleaved.
pub struct Dispatcher {
    controller: Controller,
    annotation: AnnotationConfig,
    workloads: Selector,
    ztunnel: Selector,
    capture_dns: bool,
}

enum Action {
    Enroll,
    Unenroll,
    EnrollProxy,
    UnenrollProxy,
}

// === impl Dispatcher ===

impl Dispatcher {
    pub fn new(
        controller: Controller,
        annotation: AnnotationConfig,
        workloads: Selector,
        ztunnel: Selector,
        capture_dns: bool,
    ) -> Self {
        Self {
            controller,
            annotation,
            workloads,
            ztunnel,
            capture_dns,
        }
    }

    pub async fn run(self, events: impl Stream<Item = watcher::Event<Pod>>) {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.handle(event).await;
        }
        debug!("Pod watch ended");
    }

    pub async fn handle(&self, event: watcher::Event<Pod>) {
        match event {
            watcher::Event::Apply(pod) | watcher::Event::InitApply(pod) => {
                self.apply(&pod).await
            }
            watcher::Event::Delete(pod) => self.delete(&pod).await,
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }

    async fn apply(&self, pod: &Pod) {
        let Some(workload) = self.workload(pod) else {
            return;
        };
        let terminating = k8s::is_terminating(pod);

        let action = if self.ztunnel.matches(pod.labels()) {
            if terminating {
                Action::UnenrollProxy
            } else {
                Action::EnrollProxy
            }
        } else if workload.host_network {
            debug!(pod = %workload, "Ignoring host network pod");
            return;
        } else if self.workloads.matches(pod.labels()) && !terminating {
            Action::Enroll
        } else if workload.enrolled {
            Action::Unenroll
        } else {
            return;
        };

        self.dispatch(action, &workload).await;
    }

    async fn delete(&self, pod: &Pod) {
        let Some(mut workload) = self.workload(pod) else {
            return;
        };

        let action = if self.ztunnel.matches(pod.labels()) {
            Action::UnenrollProxy
        } else if workload.enrolled || self.workloads.matches(pod.labels()) {
            Action::Unenroll
        } else {
            return;
        };

        // The object is gone, so there is no annotation left to clear.
        workload.enrolled = false;
        self.dispatch(action, &workload).await;
    }

    async fn dispatch(&self, action: Action, workload: &WorkloadIdentity) {
        let (op, result): (&str, Result<Outcome>) = match action {
            Action::Enroll => ("enroll", self.controller.enroll(workload).await),
            Action::Unenroll => ("unenroll", self.controller.unenroll(workload).await),
            Action::EnrollProxy => (
                "enroll node proxy",
                self.controller
                    .enroll_shared_proxy(workload, self.capture_dns)
                    .await,
            ),
            Action::UnenrollProxy => (
                "unenroll node proxy",
                self.controller.unenroll_shared_proxy().await,
            ),
        };
        match result {
            Ok(Outcome::Redirected) => info!(pod = %workload, op, "Updated pod redirection"),
            Ok(Outcome::Skipped(reason)) => debug!(pod = %workload, op, ?reason, "Skipped"),
            Err(error) => warn!(pod = %workload, op, %error, "Failed to update pod redirection"),
        }
    }

    fn workload(&self, pod: &Pod) -> Option<WorkloadIdentity> {
        match k8s::workload_from_pod(pod, &self.annotation) {
            Ok(workload) => Some(workload),
            Err(error) => {
                warn!(name = %pod.name_any(), %error, "Ignoring pod");
                None
            }
        }
    }
}
