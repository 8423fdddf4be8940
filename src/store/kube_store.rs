//! [`ObjectStore`] backed by the Kubernetes API.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::DynamicObject;
use kube::{Client, ResourceExt};
use tracing::debug;

use super::{ObjectKey, ObjectStore, ResourceKind};
use crate::controller::error::{Error, Result};
use crate::crd::MailhogInstance;

/// Object store talking to the API server through a shared client.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn instances(&self, namespace: &str) -> Api<MailhogInstance> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API status codes onto the store error contract.
fn classify(err: kube::Error, what: String) -> Error {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => Error::NotFound(what),
        kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::AlreadyExists(what)
        }
        kube::Error::Api(ref resp) if resp.code == 409 => {
            Error::Conflict(format!("{what}: {}", resp.message))
        }
        kube::Error::Api(ref resp) if resp.code == 422 => {
            Error::Invalid(format!("{what}: {}", resp.message))
        }
        other => Error::Kube(other),
    }
}

/// Finish an optional read. Any 404 means absent, including the plain-text
/// ones the server sends for resources of a group it does not serve.
fn read_opt<T>(result: kube::Result<Option<T>>, what: String) -> Result<Option<T>> {
    match result {
        Ok(found) => Ok(found),
        Err(kube::Error::Api(ref resp)) if resp.code == 404 => {
            debug!(what = %what, reason = %resp.reason, "Read returned 404, treating as absent");
            Ok(None)
        }
        Err(e) => Err(classify(e, what)),
    }
}

fn target(kind: ResourceKind, object: &DynamicObject) -> Result<(String, String)> {
    let name = object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::MissingField(format!("{kind}.metadata.name")))?;
    let namespace = object
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| Error::MissingField(format!("{kind}.metadata.namespace")))?;
    Ok((namespace, name))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        let result = self.api(kind, &key.namespace).get_opt(&key.name).await;
        read_opt(result, format!("{kind} {key}"))
    }

    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject> {
        let (namespace, name) = target(kind, object)?;
        self.api(kind, &namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify(e, format!("{kind} {namespace}/{name}")))
    }

    async fn replace(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject> {
        let (namespace, name) = target(kind, object)?;
        self.api(kind, &namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify(e, format!("{kind} {namespace}/{name}")))
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        grace_period_seconds: u32,
    ) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..Default::default()
        };
        self.api(kind, &key.namespace)
            .delete(&key.name, &params)
            .await
            .map_err(|e| classify(e, format!("{kind} {key}")))?;
        debug!(kind = %kind, key = %key, grace_period_seconds, "Delete accepted");
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let params = ListParams::default().labels(label_selector);
        let list = self
            .api(kind, namespace)
            .list(&params)
            .await
            .map_err(|e| classify(e, format!("{kind} list in {namespace}")))?;
        Ok(list.items)
    }

    async fn get_instance(&self, key: &ObjectKey) -> Result<Option<MailhogInstance>> {
        let result = self.instances(&key.namespace).get_opt(&key.name).await;
        read_opt(result, format!("MailhogInstance {key}"))
    }

    async fn replace_instance_status(
        &self,
        instance: &MailhogInstance,
    ) -> Result<MailhogInstance> {
        let key = ObjectKey::of(instance);
        let body = serde_json::to_vec(instance)?;
        self.instances(&key.namespace)
            .replace_status(&instance.name_any(), &PostParams::default(), body)
            .await
            .map_err(|e| classify(e, format!("MailhogInstance {key} status")))
    }
}
