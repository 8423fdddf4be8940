//! Shared context for the controller.
//!
//! The Context struct holds the seams the reconciler talks through: the
//! object store, the event publisher and the metrics sink.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::EventType;
use kube::{Client, Resource};

use crate::config::OperatorConfig;
use crate::controller::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
use crate::controller::kinds::ChildKind;
use crate::controller::metrics::{MetricsSink, NoopMetrics};
use crate::crd::MailhogInstance;
use crate::health::HealthState;
use crate::store::{KubeStore, ObjectStore};

/// Controller name reported on events.
pub const CONTROLLER_NAME: &str = "mailhog-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventPublisher>,
    pub metrics: Arc<dyn MetricsSink>,
    /// Delay before rerunning a pass that changed cluster state
    pub requeue_interval: Duration,
    /// Optional health state for readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Child kinds whose API group the cluster does not serve
    pub unserved: HashSet<ChildKind>,
}

impl Context {
    /// Context with explicit seams, used by tests and embedders.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventPublisher>,
        metrics: Arc<dyn MetricsSink>,
        requeue_interval: Duration,
    ) -> Self {
        Self {
            store,
            events,
            metrics,
            requeue_interval,
            health_state: None,
            unserved: HashSet::new(),
        }
    }

    /// Mark child kinds the cluster cannot store.
    pub fn with_unserved(mut self, kinds: impl IntoIterator<Item = ChildKind>) -> Self {
        self.unserved = kinds.into_iter().collect();
        self
    }

    /// Whether the cluster serves the API group of `kind`.
    pub fn serves(&self, kind: ChildKind) -> bool {
        !self.unserved.contains(&kind)
    }

    /// Context that drops events and metrics.
    pub fn with_store(store: Arc<dyn ObjectStore>, requeue_interval: Duration) -> Self {
        Self::new(
            store,
            Arc::new(NoopEventPublisher),
            Arc::new(NoopMetrics),
            requeue_interval,
        )
    }

    /// Production context backed by the cluster.
    pub fn for_cluster(
        client: Client,
        config: &OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let metrics: Arc<dyn MetricsSink> = match &health_state {
            Some(state) => state.metrics.clone(),
            None => Arc::new(NoopMetrics),
        };
        Self {
            store: Arc::new(KubeStore::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(
                client,
                CONTROLLER_NAME,
                config.pod_name.clone(),
            )),
            metrics,
            requeue_interval: config.requeue_interval,
            health_state,
            unserved: HashSet::new(),
        }
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &MailhogInstance,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .publish(
                &resource.object_ref(&()),
                EventType::Normal,
                reason,
                action,
                note,
            )
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &MailhogInstance,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .publish(
                &resource.object_ref(&()),
                EventType::Warning,
                reason,
                action,
                note,
            )
            .await;
    }
}
