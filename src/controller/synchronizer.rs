//! Per-kind child synchronization.
//!
//! One pass over a child kind reads the observed object, classifies it
//! against the desired object and performs at most one create, update or
//! delete. The caller stops the reconcile pass after the first mutation, or
//! when a selected child is still terminating.

use kube::ResourceExt;
use kube::core::DynamicObject;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::diff::{needs_update, stamp_last_applied};
use crate::controller::error::{Error, Result};
use crate::controller::events::reasons;
use crate::controller::kinds::ChildKind;
use crate::controller::metrics::Verb;
use crate::crd::MailhogInstance;
use crate::resources::owner_reference;
use crate::store::ObjectKey;

/// Grace period for child deletions, lets in-flight SMTP sessions drain.
pub const DELETE_GRACE_PERIOD_SECS: u32 = 100;

/// Observed state of one child relative to the spec.
#[derive(Clone, Debug)]
pub enum ChildState {
    /// Selected but missing; carries the desired object.
    Absent(DynamicObject),
    /// Selected and matching the desired object.
    InSync,
    /// Selected but drifted; carries the replacement object.
    Stale(DynamicObject),
    /// Not selected but still present.
    ShouldNotExist,
    /// Not selected and absent.
    NotSelected,
    /// Present but already being deleted by the server.
    Terminating {
        /// Whether the spec still asks for this child.
        selected: bool,
    },
}

/// What a synchronization step did to the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Created,
    Updated,
    /// Update was rejected, the child was deleted so the next pass recreates it.
    Recreated,
    Deleted,
    /// A selected child is still terminating; nothing was written.
    Waiting,
}

impl SyncOutcome {
    /// Whether cluster state changed.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SyncOutcome::Unchanged | SyncOutcome::Waiting)
    }

    /// Whether the pass must stop and be retried later.
    pub fn ends_pass(&self) -> bool {
        !matches!(self, SyncOutcome::Unchanged)
    }
}

/// Classify `observed` against `desired`.
///
/// A stale replacement carries the observed `resourceVersion` so the update
/// is rejected if someone else wrote the object in between. An object with a
/// deletion timestamp is never written to.
pub fn classify(
    observed: Option<DynamicObject>,
    desired: Option<DynamicObject>,
) -> Result<ChildState> {
    match (observed, desired) {
        (Some(observed), desired) if observed.metadata.deletion_timestamp.is_some() => {
            Ok(ChildState::Terminating {
                selected: desired.is_some(),
            })
        }
        (None, Some(desired)) => Ok(ChildState::Absent(desired)),
        (None, None) => Ok(ChildState::NotSelected),
        (Some(_), None) => Ok(ChildState::ShouldNotExist),
        (Some(observed), Some(desired)) => {
            let diff = needs_update(&observed, &desired)?;
            if !diff.needs_update {
                return Ok(ChildState::InSync);
            }
            let mut replacement = diff.object;
            replacement.metadata.resource_version = observed.metadata.resource_version;
            Ok(ChildState::Stale(replacement))
        }
    }
}

/// Bring one child kind of `instance` in line with its spec.
pub async fn sync_child(
    ctx: &Context,
    instance: &MailhogInstance,
    kind: ChildKind,
) -> Result<SyncOutcome> {
    let key = ObjectKey::of(instance);
    if !ctx.serves(kind) {
        if kind.is_selected(&instance.spec) {
            warn!(
                kind = %kind,
                key = %key,
                "API group not served by the cluster, skipping child"
            );
        }
        return Ok(SyncOutcome::Unchanged);
    }
    let desired = match kind.desired(instance)? {
        Some(mut object) => {
            adopt(&mut object, instance)?;
            Some(object)
        }
        None => None,
    };
    let observed = ctx.store.get(kind.resource_kind(), &key).await?;

    match classify(observed, desired)? {
        ChildState::InSync | ChildState::NotSelected => {
            debug!(kind = %kind, key = %key, "Child in desired state");
            Ok(SyncOutcome::Unchanged)
        }
        ChildState::Absent(desired) => create(ctx, instance, kind, &key, desired).await,
        ChildState::Stale(replacement) => update(ctx, instance, kind, &key, replacement).await,
        ChildState::ShouldNotExist => delete(ctx, instance, kind, &key).await,
        ChildState::Terminating { selected } => Ok(wait_for_deletion(kind, &key, selected)),
    }
}

fn wait_for_deletion(kind: ChildKind, key: &ObjectKey, selected: bool) -> SyncOutcome {
    if selected {
        debug!(kind = %kind, key = %key, "Child terminating, waiting before recreating");
        SyncOutcome::Waiting
    } else {
        debug!(kind = %kind, key = %key, "Unselected child already terminating");
        SyncOutcome::Unchanged
    }
}

/// Point the child's owner reference at the record. Runs on every pass so a
/// detached reference shows up as drift and is restored.
fn adopt(object: &mut DynamicObject, instance: &MailhogInstance) -> Result<()> {
    let owner =
        owner_reference(instance).ok_or_else(|| Error::MissingField("metadata.uid".into()))?;
    object.metadata.owner_references = Some(vec![owner]);
    Ok(())
}

async fn create(
    ctx: &Context,
    instance: &MailhogInstance,
    kind: ChildKind,
    key: &ObjectKey,
    mut desired: DynamicObject,
) -> Result<SyncOutcome> {
    stamp_last_applied(&mut desired)?;
    match ctx.store.create(kind.resource_kind(), &desired).await {
        Ok(_) => {
            record(ctx, instance, kind, Verb::Create, reasons::CHILD_CREATED).await;
            Ok(SyncOutcome::Created)
        }
        Err(Error::AlreadyExists(_)) => {
            debug!(kind = %kind, key = %key, "Concurrent create, diffing the existing object");
            let observed = ctx
                .store
                .get(kind.resource_kind(), key)
                .await?
                .ok_or_else(|| {
                    Error::Transient(format!("{kind} {key} already exists but cannot be read"))
                })?;
            match classify(Some(observed), Some(desired))? {
                ChildState::Stale(replacement) => {
                    update(ctx, instance, kind, key, replacement).await
                }
                ChildState::Terminating { selected } => Ok(wait_for_deletion(kind, key, selected)),
                _ => Ok(SyncOutcome::Unchanged),
            }
        }
        Err(e) => Err(e),
    }
}

async fn update(
    ctx: &Context,
    instance: &MailhogInstance,
    kind: ChildKind,
    key: &ObjectKey,
    replacement: DynamicObject,
) -> Result<SyncOutcome> {
    match ctx.store.replace(kind.resource_kind(), &replacement).await {
        Ok(_) => {
            record(ctx, instance, kind, Verb::Update, reasons::CHILD_UPDATED).await;
            Ok(SyncOutcome::Updated)
        }
        Err(Error::Invalid(message)) => {
            warn!(
                kind = %kind,
                key = %key,
                error = %message,
                "Update rejected, deleting child for recreation"
            );
            match ctx
                .store
                .delete(kind.resource_kind(), key, DELETE_GRACE_PERIOD_SECS)
                .await
            {
                Ok(()) => {
                    record(ctx, instance, kind, Verb::Delete, reasons::CHILD_RECREATING).await;
                }
                Err(Error::NotFound(_)) => {
                    debug!(kind = %kind, key = %key, "Rejected child already gone");
                }
                Err(e) => return Err(e),
            }
            Ok(SyncOutcome::Recreated)
        }
        Err(e) => Err(e),
    }
}

async fn delete(
    ctx: &Context,
    instance: &MailhogInstance,
    kind: ChildKind,
    key: &ObjectKey,
) -> Result<SyncOutcome> {
    match ctx
        .store
        .delete(kind.resource_kind(), key, DELETE_GRACE_PERIOD_SECS)
        .await
    {
        Ok(()) => {
            record(ctx, instance, kind, Verb::Delete, reasons::CHILD_DELETED).await;
            Ok(SyncOutcome::Deleted)
        }
        Err(Error::NotFound(_)) => Ok(SyncOutcome::Unchanged),
        Err(e) => Err(e),
    }
}

/// Count, log and publish a mutation.
async fn record(
    ctx: &Context,
    instance: &MailhogInstance,
    kind: ChildKind,
    verb: Verb,
    reason: &str,
) {
    ctx.metrics.record_child(kind, verb);
    info!(
        name = %instance.name_any(),
        namespace = ?instance.namespace(),
        kind = %kind,
        span = kind.span(),
        verb = %verb,
        "Child {verb}d"
    );
    ctx.publish_normal_event(
        instance,
        reason,
        verb_action(verb),
        Some(format!("{kind} {} {verb}d", instance.name_any())),
    )
    .await;
}

fn verb_action(verb: Verb) -> &'static str {
    match verb {
        Verb::Create => "Create",
        Verb::Update => "Update",
        Verb::Delete => "Delete",
    }
}
