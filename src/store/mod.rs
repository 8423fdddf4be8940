//! Object store facade.
//!
//! The reconcile core talks to the cluster only through [`ObjectStore`]. Child
//! objects travel as [`DynamicObject`] so one synchronizer can drive every
//! kind; the record itself is read and written with its typed form.

mod kube_store;

pub use kube_store::KubeStore;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use kube::core::{ApiResource, DynamicObject};
use serde::de::DeserializeOwned;

#[cfg(test)]
use mockall::automock;

use crate::controller::error::Result;
use crate::crd::MailhogInstance;
use crate::crd::openshift::{DeploymentConfig, Route};

/// Cluster types the operator reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    DeploymentConfig,
    Service,
    ConfigMap,
    Route,
    Ingress,
    Pod,
}

impl ResourceKind {
    /// API coordinates used to build a dynamic client for this kind.
    pub fn api_resource(&self) -> ApiResource {
        match self {
            ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ResourceKind::DeploymentConfig => ApiResource::erase::<DeploymentConfig>(&()),
            ResourceKind::Service => ApiResource::erase::<Service>(&()),
            ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ResourceKind::Route => ApiResource::erase::<Route>(&()),
            ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
            ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::DeploymentConfig => "DeploymentConfig",
            ResourceKind::Service => "Service",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Route => "Route",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Pod => "Pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace-qualified object name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a record. Children share it since they are named after the record.
    pub fn of(instance: &MailhogInstance) -> Self {
        Self::new(
            instance.namespace().unwrap_or_else(|| "default".to_string()),
            instance.name_any(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Get/create/replace/delete/list access to cluster objects.
///
/// Implementations map store failures onto the controller error variants:
/// a missing object on `get` is `Ok(None)`, on `delete` or `replace` it is
/// `Error::NotFound`; a duplicate create is `Error::AlreadyExists`; a stale
/// `resourceVersion` is `Error::Conflict`; a rejected field change is
/// `Error::Invalid`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Option<DynamicObject>>;

    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject>;

    /// Whole-object update; `metadata.resourceVersion` must be set.
    async fn replace(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject>;

    async fn delete(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        grace_period_seconds: u32,
    ) -> Result<()>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>>;

    async fn get_instance(&self, key: &ObjectKey) -> Result<Option<MailhogInstance>>;

    /// Replace the status subresource of the record.
    async fn replace_instance_status(&self, instance: &MailhogInstance)
    -> Result<MailhogInstance>;
}

/// Convert a typed object into its dynamic form.
pub fn to_dynamic<K: serde::Serialize>(object: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert a dynamic object back into a typed one.
pub fn from_dynamic<K: DeserializeOwned>(object: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}
