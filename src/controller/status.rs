//! Status computation for MailhogInstance records.
//!
//! The status is derived from the record's pods and its public exposure
//! object, then written as a whole when it differs from the stored status.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::debug;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::crd::openshift::Route;
use crate::crd::{
    MailhogInstance, MailhogInstanceSpec, MailhogInstanceStatus, PodBuckets, TrafficInlet,
};
use crate::resources::label_selector;
use crate::store::{ObjectKey, ResourceKind, from_dynamic};

/// Pods restarted more often than this are reported as restarting.
pub const RESTART_THRESHOLD: i32 = 3;

/// Whether a status pass wrote anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusOutcome {
    Unchanged,
    Written,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PodHealth {
    Pending,
    Failed,
    Restarting,
    Ready,
    Other,
}

fn pod_health(pod: &Pod) -> PodHealth {
    let Some(status) = pod.status.as_ref() else {
        return PodHealth::Other;
    };
    match status.phase.as_deref() {
        Some("Pending") => return PodHealth::Pending,
        Some("Failed") => return PodHealth::Failed,
        _ => {}
    }
    let restarting = status
        .container_statuses
        .iter()
        .flatten()
        .any(|c| c.restart_count > RESTART_THRESHOLD);
    if restarting {
        return PodHealth::Restarting;
    }
    let ready = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    if ready {
        PodHealth::Ready
    } else {
        PodHealth::Other
    }
}

/// Sort pods into exclusive buckets, names sorted within each bucket.
pub fn bucket_pods(pods: &[Pod]) -> PodBuckets {
    let mut buckets = PodBuckets::default();
    for pod in pods {
        let name = pod.name_any();
        match pod_health(pod) {
            PodHealth::Pending => buckets.pending.push(name),
            PodHealth::Failed => buckets.failed.push(name),
            PodHealth::Restarting => buckets.restarting.push(name),
            PodHealth::Ready => buckets.ready.push(name),
            PodHealth::Other => buckets.other.push(name),
        }
    }
    for bucket in [
        &mut buckets.pending,
        &mut buckets.failed,
        &mut buckets.restarting,
        &mut buckets.ready,
        &mut buckets.other,
    ] {
        bucket.sort();
    }
    buckets
}

fn with_web_path(scheme: &str, host: &str, web_path: &str) -> String {
    if web_path.is_empty() {
        format!("{scheme}://{host}")
    } else {
        format!("{scheme}://{host}/{web_path}")
    }
}

/// URL of an admitted Route. Routes terminate TLS at the edge.
pub fn route_url(route: &Route, web_path: &str) -> Option<String> {
    let ingress = route
        .status
        .as_ref()?
        .ingress
        .iter()
        .find(|i| i.is_admitted())?;
    let host = ingress.host.as_deref().filter(|h| !h.is_empty())?;
    Some(with_web_path("https", host, web_path))
}

/// URL of an Ingress that a load balancer picked up.
pub fn ingress_url(ingress: &Ingress, spec: &MailhogInstanceSpec) -> Option<String> {
    let balancers = ingress
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?;
    let first = balancers.first()?;

    let settings = &spec.settings.ingress;
    let host = if !settings.host.is_empty() {
        settings.host.clone()
    } else {
        first.hostname.clone().or_else(|| first.ip.clone())?
    };
    let scheme = if settings.tls_secret_name.is_empty() {
        "http"
    } else {
        "https"
    };
    Some(with_web_path(scheme, &host, &spec.settings.web_path))
}

async fn exposure_url(ctx: &Context, instance: &MailhogInstance) -> Result<Option<String>> {
    let key = ObjectKey::of(instance);
    let spec = &instance.spec;
    match spec.web_traffic_inlet {
        TrafficInlet::None => Ok(None),
        TrafficInlet::Route => match ctx.store.get(ResourceKind::Route, &key).await? {
            Some(object) => {
                let route: Route = from_dynamic(&object)?;
                Ok(route_url(&route, &spec.settings.web_path))
            }
            None => Ok(None),
        },
        TrafficInlet::Ingress => match ctx.store.get(ResourceKind::Ingress, &key).await? {
            Some(object) => {
                let ingress: Ingress = from_dynamic(&object)?;
                Ok(ingress_url(&ingress, spec))
            }
            None => Ok(None),
        },
    }
}

/// Build the full status from the cluster.
pub async fn compute_status(
    ctx: &Context,
    instance: &MailhogInstance,
) -> Result<MailhogInstanceStatus> {
    let key = ObjectKey::of(instance);
    let selector = label_selector(instance);
    let pods = ctx
        .store
        .list(ResourceKind::Pod, &key.namespace, &selector)
        .await?
        .iter()
        .map(from_dynamic::<Pod>)
        .collect::<Result<Vec<_>>>()?;

    let pods = bucket_pods(&pods);
    Ok(MailhogInstanceStatus {
        pod_count: i32::try_from(pods.total()).unwrap_or(i32::MAX),
        ready_pod_count: i32::try_from(pods.ready.len()).unwrap_or(i32::MAX),
        pods,
        label_selector: selector,
        url: exposure_url(ctx, instance).await?,
        error: None,
    })
}

/// Recompute the status and write it if it changed.
pub async fn ensure_status(ctx: &Context, instance: &MailhogInstance) -> Result<StatusOutcome> {
    let status = compute_status(ctx, instance).await?;
    let key = ObjectKey::of(instance);
    ctx.metrics.record_pods(
        &key.namespace,
        &key.name,
        i64::from(status.pod_count),
        i64::from(status.ready_pod_count),
    );
    write_status(ctx, instance, status).await
}

/// Write `status` unless it equals the stored one.
///
/// The record is re-read before writing so a concurrent spec edit is not
/// overwritten with the stale copy this pass started from.
pub async fn write_status(
    ctx: &Context,
    instance: &MailhogInstance,
    status: MailhogInstanceStatus,
) -> Result<StatusOutcome> {
    if instance.status.as_ref() == Some(&status) {
        return Ok(StatusOutcome::Unchanged);
    }
    let key = ObjectKey::of(instance);
    let Some(mut latest) = ctx.store.get_instance(&key).await? else {
        debug!(key = %key, "Record deleted before status write");
        return Ok(StatusOutcome::Unchanged);
    };
    latest.status = Some(status);
    ctx.store.replace_instance_status(&latest).await?;
    ctx.metrics.record_status_update();
    debug!(key = %key, "Status written");
    Ok(StatusOutcome::Written)
}
