//! Common resource generation utilities.
//!
//! Provides the naming constants, labels, annotations and object metadata
//! shared by every child object of a MailhogInstance.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::{BackingResource, MailhogInstance};

/// Annotation holding the serialized last-applied desired state.
pub const LAST_APPLIED_ANNOTATION: &str = "mailhog.operators.patrick.mx/last-applied";

/// Operator identity used in managed-by/created-by labels.
pub const OPERATOR_NAME: &str = "mailhog.operators.patrick.mx";

/// Container name inside the pod template.
pub const CONTAINER_NAME: &str = "mailhog";

/// Web UI and API port
pub const WEB_PORT: i32 = 8025;
pub const WEB_PORT_NAME: &str = "http";
/// SMTP port
pub const SMTP_PORT: i32 = 1025;
pub const SMTP_PORT_NAME: &str = "smtp";

/// Mount point of the settings-file ConfigMap.
pub const SETTINGS_FILES_MOUNT: &str = "/mailhog/settings/files";
pub const UPSTREAMS_FILE: &str = "upstream.servers.json";
pub const USERS_FILE: &str = "users.list.bcrypt";

pub const CR_NAME_LABEL: &str = "mailhoginstance_cr";
pub const CR_TYPE_LABEL: &str = "mailhogtype";
pub const CR_TYPE_VALUE: &str = "mailhoginstance";
pub const DEPLOYMENT_CONFIG_LABEL: &str = "deploymentconfig";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";
const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
const RUNTIME_LABEL: &str = "app.openshift.io/runtime";
const RUNTIME_DEFAULT: &str = "golang";

/// Record labels copied onto children for topology views.
const PASSTHROUGH_LABELS: [&str; 4] = [
    "app.kubernetes.io/part-of",
    "app",
    "app.kubernetes.io/component",
    "app.kubernetes.io/name",
];

/// Record annotations copied onto children.
const PASSTHROUGH_ANNOTATIONS: [&str; 2] =
    ["app.openshift.io/connects-to", "app.openshift.io/vcs-uri"];

/// Labels identifying the pods of a record. Used for selectors.
pub fn pod_selector_labels(resource: &MailhogInstance) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(CR_TYPE_LABEL.to_string(), CR_TYPE_VALUE.to_string());
    labels.insert(CR_NAME_LABEL.to_string(), resource.name_any());
    labels
}

/// Selector labels rendered as a label-selector string.
pub fn label_selector(resource: &MailhogInstance) -> String {
    pod_selector_labels(resource)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Standard labels applied to all managed resources
pub fn standard_labels(resource: &MailhogInstance) -> BTreeMap<String, String> {
    let mut labels = pod_selector_labels(resource);
    labels.insert(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());
    labels.insert(CREATED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());

    let own = resource.labels();
    for key in PASSTHROUGH_LABELS {
        if let Some(value) = own.get(key).filter(|v| !v.is_empty()) {
            labels.insert(key.to_string(), value.clone());
        }
    }
    let runtime = own
        .get(RUNTIME_LABEL)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| RUNTIME_DEFAULT.to_string());
    labels.insert(RUNTIME_LABEL.to_string(), runtime);
    let instance = own
        .get(INSTANCE_LABEL)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| resource.name_any());
    labels.insert(INSTANCE_LABEL.to_string(), instance);

    labels
}

/// Labels for pods; DeploymentConfig pods also carry the `deploymentconfig` label.
pub fn pod_labels(resource: &MailhogInstance) -> BTreeMap<String, String> {
    let mut labels = standard_labels(resource);
    if resource.spec.backing_resource == BackingResource::DeploymentConfig {
        labels.insert(DEPLOYMENT_CONFIG_LABEL.to_string(), resource.name_any());
    }
    labels
}

/// Annotations passed through from the record.
pub fn standard_annotations(resource: &MailhogInstance) -> BTreeMap<String, String> {
    let own = resource.annotations();
    PASSTHROUGH_ANNOTATIONS
        .iter()
        .filter_map(|key| {
            own.get(*key)
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_string(), v.clone()))
        })
        .collect()
}

/// Metadata for a child object: same name and namespace as the record.
pub fn object_meta(resource: &MailhogInstance) -> ObjectMeta {
    let annotations = standard_annotations(resource);
    ObjectMeta {
        name: Some(resource.name_any()),
        namespace: resource.namespace(),
        labels: Some(standard_labels(resource)),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        },
        ..Default::default()
    }
}

/// Controller owner reference pointing at the record.
///
/// Returns `None` while the record has no UID (it was never persisted).
pub fn owner_reference(resource: &MailhogInstance) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: MailhogInstance::api_version(&()).to_string(),
        kind: MailhogInstance::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}
