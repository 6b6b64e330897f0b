use crate::WorkloadApi;
use ambient_redirect_core::{Annotate, AnnotationConfig, Error, Result, WorkloadIdentity};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Records enrollment on the pod's annotations with merge patches.
#[derive(Clone)]
pub struct Annotator {
    api: Arc<dyn WorkloadApi>,
    config: AnnotationConfig,
}

/// Builds the merge patch that sets the enrollment annotation to `value`, or
/// removes it when `value` is `None`.
pub fn annotation_patch(key: &str, value: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                key: value,
            }
        }
    })
}

// === impl Annotator ===

impl Annotator {
    pub fn new(api: Arc<dyn WorkloadApi>, config: AnnotationConfig) -> Self {
        Self { api, config }
    }

    async fn patch(&self, workload: &WorkloadIdentity, value: Option<&str>) -> Result<()> {
        let patch = annotation_patch(&self.config.key, value);
        self.api
            .patch_pod(&workload.namespace, &workload.name, patch)
            .await
            .map_err(|e| Error::AnnotationPatchFailed(e.into()))
    }
}

#[async_trait::async_trait]
impl Annotate for Annotator {
    #[instrument(skip_all, fields(pod = %workload))]
    async fn mark_enrolled(&self, workload: &WorkloadIdentity) -> Result<()> {
        self.patch(workload, Some(self.config.enabled.as_str())).await?;
        debug!(key = %self.config.key, "Annotated pod");
        Ok(())
    }

    #[instrument(skip_all, fields(pod = %workload))]
    async fn mark_unenrolled(&self, workload: &WorkloadIdentity) -> Result<()> {
        if !workload.enrolled {
            return Ok(());
        }
        self.patch(workload, None).await?;
        debug!(key = %self.config.key, "Removed pod annotation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeApi;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn workload(enrolled: bool) -> WorkloadIdentity {
        WorkloadIdentity {
            name: "app-1".to_string(),
            namespace: "default".to_string(),
            uid: "8f6c1a52".to_string(),
            ip: Some("10.1.2.7".parse().unwrap()),
            host_network: false,
            enrolled,
        }
    }

    #[test]
    fn patches() {
        let key = "ambient.istio.io/redirection";
        assert_eq!(
            annotation_patch(key, Some("enabled")),
            json!({"metadata":{"annotations":{"ambient.istio.io/redirection":"enabled"}}})
        );
        assert_eq!(
            annotation_patch(key, None),
            json!({"metadata":{"annotations":{"ambient.istio.io/redirection":null}}})
        );
    }

    #[tokio::test]
    async fn enroll_then_unenroll() {
        let api = Arc::new(FakeApi::default().with_pod(FakeApi::pod("default", "app-1")));
        let annotator = Annotator::new(api.clone(), AnnotationConfig::default());

        annotator.mark_enrolled(&workload(false)).await.unwrap();
        assert_eq!(
            api.annotation("default", "app-1", &AnnotationConfig::default().key),
            Some("enabled".to_string())
        );

        annotator.mark_unenrolled(&workload(true)).await.unwrap();
        assert_eq!(
            api.annotation("default", "app-1", &AnnotationConfig::default().key),
            None
        );
        assert_eq!(api.patches().len(), 2);
    }

    #[tokio::test]
    async fn unenroll_without_annotation_skips_the_api() {
        let api = Arc::new(FakeApi::default().with_pod(FakeApi::pod("default", "app-1")));
        let annotator = Annotator::new(api.clone(), AnnotationConfig::default());

        annotator.mark_unenrolled(&workload(false)).await.unwrap();
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn patch_failures_are_reported() {
        let api = Arc::new(FakeApi::default());
        let annotator = Annotator::new(api, AnnotationConfig::default());

        let err = annotator.mark_enrolled(&workload(false)).await.unwrap_err();
        assert!(matches!(err, Error::AnnotationPatchFailed(_)), "{err}");
    }
}
