//! Workload generation: Kubernetes Deployment or OpenShift DeploymentConfig.
//!
//! Both variants run the same pod template; only one exists per record.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::MailhogInstance;
use crate::crd::openshift::{
    DeploymentConfig, DeploymentConfigSpec, DeploymentStrategy, DeploymentTriggerPolicy,
    RollingDeploymentStrategyParams,
};
use crate::resources::common::{DEPLOYMENT_CONFIG_LABEL, object_meta, pod_selector_labels};
use crate::resources::pod_template::generate_pod_template;

const DC_MIN_READY_SECONDS: i32 = 30;
const DC_ROLLING_TIMEOUT_SECONDS: i64 = 600;

/// Generate a Deployment for a MailhogInstance.
pub fn generate_deployment(resource: &MailhogInstance) -> Deployment {
    Deployment {
        metadata: object_meta(resource),
        spec: Some(DeploymentSpec {
            replicas: Some(resource.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            template: generate_pod_template(resource),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Selector of a DeploymentConfig, which also pins the `deploymentconfig` label.
fn deployment_config_selector(resource: &MailhogInstance) -> BTreeMap<String, String> {
    let mut selector = pod_selector_labels(resource);
    selector.insert(DEPLOYMENT_CONFIG_LABEL.to_string(), resource.name_any());
    selector
}

/// Generate a DeploymentConfig for a MailhogInstance.
///
/// Rolls out on config change with a surge of two and no unavailability.
pub fn generate_deployment_config(resource: &MailhogInstance) -> DeploymentConfig {
    let spec = DeploymentConfigSpec {
        replicas: resource.spec.replicas,
        selector: deployment_config_selector(resource),
        min_ready_seconds: Some(DC_MIN_READY_SECONDS),
        template: Some(generate_pod_template(resource)),
        strategy: Some(DeploymentStrategy {
            type_: "Rolling".to_string(),
            rolling_params: Some(RollingDeploymentStrategyParams {
                timeout_seconds: Some(DC_ROLLING_TIMEOUT_SECONDS),
                max_unavailable: Some(IntOrString::Int(0)),
                max_surge: Some(IntOrString::Int(2)),
            }),
        }),
        triggers: vec![DeploymentTriggerPolicy {
            type_: "ConfigChange".to_string(),
        }],
    };

    let mut dc = DeploymentConfig::new(&resource.name_any(), spec);
    dc.metadata = object_meta(resource);
    dc
}
