//! mailhog-operator library crate
//!
//! This module exports the controller, CRD definitions, resource generators
//! and the object store the reconciler runs against.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod leader;
pub mod resources;
pub mod store;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::collections::HashSet;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use controller::kinds::ChildKind;
use controller::{context::Context, reconciler::reconcile};
use crd::MailhogInstance;
use crd::openshift::{DeploymentConfig, Route};
use resources::common::{CR_NAME_LABEL, CR_TYPE_LABEL, CR_TYPE_VALUE};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all watches.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a reflector-backed stream of MailhogInstances.
///
/// Status-only updates are filtered out via the generation predicate; the
/// reconciler requeues itself after its own status writes.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Map a pod back to the MailhogInstance named in its labels.
fn pod_to_instance(pod: Pod) -> Option<ObjectRef<MailhogInstance>> {
    let name = pod.labels().get(CR_NAME_LABEL)?.clone();
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(&name).within(&namespace))
}

/// Names of the API groups the cluster serves. Empty when discovery fails,
/// which leaves the OpenShift kinds unmanaged.
async fn served_api_groups(client: &Client) -> HashSet<String> {
    match client.list_api_groups().await {
        Ok(groups) => groups.groups.into_iter().map(|g| g.name).collect(),
        Err(e) => {
            warn!(error = %e, "API group discovery failed");
            HashSet::new()
        }
    }
}

/// Child kinds that live in an API group missing from `groups`.
fn unserved_kinds(groups: &HashSet<String>) -> Vec<ChildKind> {
    let mut unserved = Vec::new();
    if !groups.contains(DeploymentConfig::group(&()).as_ref()) {
        unserved.push(ChildKind::DeploymentConfig);
    }
    if !groups.contains(Route::group(&()).as_ref()) {
        unserved.push(ChildKind::Route);
    }
    unserved
}

/// Run the operator controller.
///
/// Watches MailhogInstances in the configured namespace (or cluster-wide),
/// every owned child kind and the pods of each record. OpenShift kinds are
/// only watched where the cluster serves them.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.as_deref();
    info!(
        "Starting controller for MailhogInstance resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let unserved = unserved_kinds(&served_api_groups(&client).await);
    let ctx = Arc::new(
        Context::for_cluster(client.clone(), &config, health_state)
            .with_unserved(unserved.iter().copied()),
    );

    let instances: Api<MailhogInstance> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let ingresses: Api<Ingress> = scoped_api(client.clone(), namespace);
    let pods: Api<Pod> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();
    let pod_config = watcher_config
        .clone()
        .labels(&format!("{CR_TYPE_LABEL}={CR_TYPE_VALUE}"));

    let (reader, resource_stream) = create_filtered_stream(instances, watcher_config.clone());

    // Owned children only need to signal that they changed, so metadata
    // watches suffice. Pods are watched in full to follow readiness.
    let mut controller = Controller::for_stream(resource_stream, reader)
        .owns_stream(metadata_watcher(deployments, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(services, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(configmaps, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(ingresses, watcher_config.clone()).touched_objects())
        .watches(pods, pod_config, pod_to_instance);

    if !unserved.contains(&ChildKind::DeploymentConfig) {
        let deployment_configs: Api<DeploymentConfig> = scoped_api(client.clone(), namespace);
        controller = controller.owns_stream(
            metadata_watcher(deployment_configs, watcher_config.clone()).touched_objects(),
        );
    } else {
        info!("apps.openshift.io not served, DeploymentConfigs are not watched");
    }
    if !unserved.contains(&ChildKind::Route) {
        let routes: Api<Route> = scoped_api(client.clone(), namespace);
        controller = controller.owns(routes, watcher_config);
    } else {
        info!("route.openshift.io not served, Routes are not watched");
    }

    controller
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
