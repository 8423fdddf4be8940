//! Reconciliation loop for MailhogInstance.
//!
//! A pass loads the record, validates it, synchronizes each child kind in a
//! fixed order and finally writes the status. The first step that changes
//! cluster state ends the pass and schedules a rerun after the requeue
//! interval, so every pass performs at most one mutation.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, warn};

use crate::controller::context::Context;
use crate::controller::error::Error;
use crate::controller::events::reasons;
use crate::controller::kinds::ChildKind;
use crate::controller::status::{StatusOutcome, ensure_status, write_status};
use crate::controller::synchronizer::sync_child;
use crate::controller::validation::validate_spec;
use crate::crd::MailhogInstance;
use crate::store::ObjectKey;

/// Result of one reconcile pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The record no longer exists.
    Missing,
    /// The spec was rejected with this message.
    Rejected(String),
    /// Something changed; another pass is needed.
    Progressing,
    /// Children and status already match the spec.
    Quiescent,
}

/// Run one pass for the record identified by `key`.
pub async fn reconcile_pass(ctx: &Context, key: &ObjectKey) -> Result<PassOutcome, Error> {
    let Some(instance) = ctx.store.get_instance(key).await? else {
        debug!(key = %key, "MailhogInstance gone, nothing to do");
        return Ok(PassOutcome::Missing);
    };

    if let Some(violation) = validate_spec(&instance.spec) {
        let message = violation.message().to_string();
        warn!(key = %key, error = %message, "Spec rejected");
        let mut status = instance.status.clone().unwrap_or_default();
        status.error = Some(message.clone());
        if write_status(ctx, &instance, status).await? == StatusOutcome::Written {
            ctx.publish_warning_event(
                &instance,
                reasons::VALIDATION_FAILED,
                "Validate",
                Some(message.clone()),
            )
            .await;
        }
        return Ok(PassOutcome::Rejected(message));
    }

    for kind in ChildKind::ALL {
        let outcome = sync_child(ctx, &instance, kind).await?;
        if outcome.ends_pass() {
            debug!(key = %key, kind = %kind, ?outcome, "Child not settled, ending pass early");
            return Ok(PassOutcome::Progressing);
        }
    }

    match ensure_status(ctx, &instance).await? {
        StatusOutcome::Written => Ok(PassOutcome::Progressing),
        StatusOutcome::Unchanged => Ok(PassOutcome::Quiescent),
    }
}

/// Reconcile a MailhogInstance
///
/// The object handed over by the watcher only provides the identity; every
/// pass reads the record and its children afresh.
pub async fn reconcile(obj: Arc<MailhogInstance>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let key = ObjectKey::of(&obj);

    debug!(name = %key.name, namespace = %key.namespace, "Reconciling MailhogInstance");

    let outcome = reconcile_pass(&ctx, &key).await?;

    ctx.metrics.record_reconcile(
        &key.namespace,
        &key.name,
        start_time.elapsed().as_secs_f64(),
    );
    if let Some(ref health_state) = ctx.health_state {
        health_state.touch_reconcile();
    }

    let action = match &outcome {
        PassOutcome::Progressing => Action::requeue(ctx.requeue_interval),
        PassOutcome::Missing | PassOutcome::Rejected(_) | PassOutcome::Quiescent => {
            Action::await_change()
        }
    };
    if outcome == PassOutcome::Quiescent {
        info!(name = %key.name, namespace = %key.namespace, "MailhogInstance converged");
    }
    Ok(action)
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<MailhogInstance>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    ctx.metrics.record_error(&namespace, &name);

    if error.is_retryable() {
        warn!(name = %name, namespace = %namespace, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, namespace = %namespace, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after(ctx.requeue_interval))
}
