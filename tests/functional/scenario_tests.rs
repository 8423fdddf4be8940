//! Multi-pass convergence scenarios for MailhogInstance.
//!
//! Each test starts from a record in the in-memory store and drives
//! `reconcile_pass` the way the controller would: rerun while the pass
//! reports progress, stop once it is quiescent.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;

use mailhog_operator::controller::context::Context;
use mailhog_operator::controller::events::NoopEventPublisher;
use mailhog_operator::controller::kinds::ChildKind;
use mailhog_operator::controller::metrics::Verb;
use mailhog_operator::controller::reconciler::{PassOutcome, reconcile_pass};
use mailhog_operator::controller::validation::Violation;
use mailhog_operator::crd::{
    BackingResource, MailhogInstance, StorageKind, TrafficInlet, UpstreamSpec,
};
use mailhog_operator::resources::common::{
    CR_NAME_LABEL, CR_TYPE_LABEL, CR_TYPE_VALUE, LAST_APPLIED_ANNOTATION, USERS_FILE,
};
use mailhog_operator::store::{ObjectKey, ObjectStore, ResourceKind};

use crate::common::fixtures::MailhogInstanceBuilder;
use crate::memory_store::{Deletion, MemoryStore, RecordingMetrics};

/// Upper bound on passes before a scenario counts as not converging.
const MAX_PASSES: usize = 20;

struct Harness {
    store: Arc<MemoryStore>,
    metrics: Arc<RecordingMetrics>,
    ctx: Context,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let ctx = Context::new(
            store.clone(),
            Arc::new(NoopEventPublisher),
            metrics.clone(),
            Duration::from_secs(10),
        );
        Self {
            store,
            metrics,
            ctx,
        }
    }

    async fn pass(&self, key: &ObjectKey) -> PassOutcome {
        reconcile_pass(&self.ctx, key).await.unwrap()
    }

    /// Run passes until one is not progressing; returns every outcome.
    async fn converge(&self, key: &ObjectKey) -> Vec<PassOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..MAX_PASSES {
            let outcome = self.pass(key).await;
            let done = outcome != PassOutcome::Progressing;
            outcomes.push(outcome);
            if done {
                return outcomes;
            }
        }
        panic!("no quiescent pass within {MAX_PASSES} passes: {outcomes:?}");
    }
}

fn base() -> MailhogInstanceBuilder {
    MailhogInstanceBuilder::new("mh")
        .namespace("mail")
        .uid("uid-mh")
}

fn key() -> ObjectKey {
    ObjectKey::new("mail", "mh")
}

fn pod(name: &str, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("mail".into()),
            labels: Some(
                [
                    (CR_NAME_LABEL.to_string(), "mh".to_string()),
                    (CR_TYPE_LABEL.to_string(), CR_TYPE_VALUE.to_string()),
                ]
                .into(),
            ),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some("Running".into()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".into(),
                status: if ready { "True" } else { "False" }.into(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Convergence
// ============================================================================

/// Empty cluster: workload, then service, then status, then quiescent.
#[tokio::test]
async fn test_default_instance_converges() {
    let h = Harness::new();
    h.store.insert_instance(base().build());

    let outcomes = h.converge(&key()).await;
    assert_eq!(
        outcomes,
        vec![
            PassOutcome::Progressing,
            PassOutcome::Progressing,
            PassOutcome::Progressing,
            PassOutcome::Quiescent,
        ]
    );
    assert_eq!(
        h.store.kinds(),
        vec![ResourceKind::Deployment, ResourceKind::Service]
    );
    assert_eq!(
        h.metrics.children(),
        vec![
            (ChildKind::Deployment, Verb::Create),
            (ChildKind::Service, Verb::Create),
        ]
    );
    assert_eq!(h.metrics.status_updates(), 1);

    let status = h.store.instance(&key()).status.unwrap();
    assert_eq!(
        status.label_selector,
        "mailhoginstance_cr=mh,mailhogtype=mailhoginstance"
    );
    assert_eq!(status.pod_count, 0);
    assert_eq!(status.error, None);
}

/// Children carry the owner reference and last-applied annotation.
#[tokio::test]
async fn test_children_are_owned_and_stamped() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    for kind in [ResourceKind::Deployment, ResourceKind::Service] {
        let object = h.store.object(kind, &key()).unwrap();
        let owners = object.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-mh");
        assert_eq!(owners[0].kind, "MailhogInstance");
        assert_eq!(owners[0].controller, Some(true));
        assert!(
            object
                .metadata
                .annotations
                .unwrap()
                .contains_key(LAST_APPLIED_ANNOTATION)
        );
    }
}

/// Once settled, further passes write nothing.
#[tokio::test]
async fn test_settled_instance_is_idempotent() {
    let h = Harness::new();
    h.store.insert_instance(base().inlet(TrafficInlet::Ingress).build());
    h.converge(&key()).await;

    let writes = h.store.writes();
    for _ in 0..3 {
        assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    }
    assert_eq!(h.store.writes(), writes);
}

/// A claim-backed maildir settles even though the server drops `readOnly: false`.
#[tokio::test]
async fn test_claimed_maildir_settles() {
    let h = Harness::new();
    h.store
        .insert_instance(base().maildir("/maildir").claim("mail-pvc").build());

    let outcomes = h.converge(&key()).await;
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes.last(), Some(&PassOutcome::Quiescent));

    let deploy = h.store.object(ResourceKind::Deployment, &key()).unwrap();
    let claim = &deploy.data["spec"]["template"]["spec"]["volumes"][0]["persistentVolumeClaim"];
    assert_eq!(claim["claimName"], "mail-pvc");
    assert!(claim.get("readOnly").is_none());

    let writes = h.store.writes();
    for _ in 0..3 {
        assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    }
    assert_eq!(h.store.writes(), writes);
}

/// Settings files mount a ConfigMap and switch probes; the result stays settled.
#[tokio::test]
async fn test_settings_files_instance_settles() {
    let h = Harness::new();
    h.store.insert_instance(
        base()
            .web_user("admin", "$2a$04$hash")
            .upstream(UpstreamSpec {
                name: "relay".into(),
                host: "smtp.example.com".into(),
                port: "25".into(),
                ..Default::default()
            })
            .build(),
    );
    let outcomes = h.converge(&key()).await;
    assert_eq!(outcomes.last(), Some(&PassOutcome::Quiescent));
    assert_eq!(
        h.store.kinds(),
        vec![
            ResourceKind::Deployment,
            ResourceKind::Service,
            ResourceKind::ConfigMap
        ]
    );

    let writes = h.store.writes();
    for _ in 0..3 {
        assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    }
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test]
async fn test_missing_record_is_terminal() {
    let h = Harness::new();
    assert_eq!(h.pass(&key()).await, PassOutcome::Missing);
    assert_eq!(h.store.writes(), 0);
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_route_and_deployment_config_selection() {
    let h = Harness::new();
    h.store.insert_instance(
        base()
            .inlet(TrafficInlet::Route)
            .backing(BackingResource::DeploymentConfig)
            .build(),
    );
    h.converge(&key()).await;

    assert_eq!(
        h.store.kinds(),
        vec![
            ResourceKind::DeploymentConfig,
            ResourceKind::Service,
            ResourceKind::Route
        ]
    );
}

/// Switching the backing deletes the old workload before creating the new one.
#[tokio::test]
async fn test_backing_switch_replaces_workload() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    h.store.edit_instance(&key(), |mh| {
        mh.spec.backing_resource = BackingResource::DeploymentConfig;
    });
    h.converge(&key()).await;

    assert_eq!(
        h.store.kinds(),
        vec![ResourceKind::DeploymentConfig, ResourceKind::Service]
    );
    assert_eq!(
        h.store.deletions(),
        vec![Deletion {
            kind: ResourceKind::Deployment,
            key: key(),
            grace_period_seconds: 100,
        }]
    );
}

/// Web users bring the settings ConfigMap; dropping them removes it.
#[tokio::test]
async fn test_settings_configmap_follows_files() {
    let h = Harness::new();
    h.store
        .insert_instance(base().web_user("admin", "$2a$04$hash").build());
    h.converge(&key()).await;

    let cm = h.store.object(ResourceKind::ConfigMap, &key()).unwrap();
    assert_eq!(cm.data["data"][USERS_FILE], "admin:$2a$04$hash\n");

    h.store.edit_instance(&key(), |mh| mh.spec.settings.files = None);
    h.converge(&key()).await;

    assert!(h.store.object(ResourceKind::ConfigMap, &key()).is_none());
    assert!(
        h.store
            .deletions()
            .iter()
            .any(|d| d.kind == ResourceKind::ConfigMap && d.grace_period_seconds == 100)
    );
}

/// Disabling the public endpoint deletes the Route and clears the URL.
#[tokio::test]
async fn test_route_toggle_off_clears_url() {
    let h = Harness::new();
    h.store
        .insert_instance(base().inlet(TrafficInlet::Route).web_path("mail").build());
    h.converge(&key()).await;
    assert_eq!(h.store.instance(&key()).status.unwrap().url, None);

    h.store.edit_object(ResourceKind::Route, &key(), |route| {
        route.data["status"] = json!({
            "ingress": [{
                "host": "mh.apps.example.com",
                "conditions": [{ "type": "Admitted", "status": "True" }]
            }]
        });
    });
    h.converge(&key()).await;
    assert_eq!(
        h.store.instance(&key()).status.unwrap().url.as_deref(),
        Some("https://mh.apps.example.com/mail")
    );

    h.store.edit_instance(&key(), |mh| {
        mh.spec.web_traffic_inlet = TrafficInlet::None;
    });
    h.converge(&key()).await;

    assert!(h.store.object(ResourceKind::Route, &key()).is_none());
    assert_eq!(h.store.instance(&key()).status.unwrap().url, None);
    assert_eq!(h.store.deletions()[0].kind, ResourceKind::Route);
    assert_eq!(h.store.deletions()[0].grace_period_seconds, 100);
}

// ============================================================================
// Drift
// ============================================================================

/// A field the builder sets is forced back after a hand edit.
#[tokio::test]
async fn test_hand_edited_port_is_reverted() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    h.store.edit_object(ResourceKind::Service, &key(), |svc| {
        svc.data["spec"]["ports"][0]["port"] = json!(9999);
    });
    let outcomes = h.converge(&key()).await;
    assert_eq!(
        outcomes,
        vec![PassOutcome::Progressing, PassOutcome::Quiescent]
    );

    let svc = h.store.object(ResourceKind::Service, &key()).unwrap();
    assert_eq!(svc.data["spec"]["ports"][0]["port"], 1025);
    assert_eq!(h.metrics.children().last(), Some(&(ChildKind::Service, Verb::Update)));
}

/// Fields the builder never sets are left alone.
#[tokio::test]
async fn test_foreign_label_is_tolerated() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;
    let writes = h.store.writes();

    h.store.edit_object(ResourceKind::Service, &key(), |svc| {
        svc.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("team".into(), "mail".into());
        svc.data["spec"]["clusterIP"] = json!("10.96.0.12");
    });
    assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    assert_eq!(h.store.writes(), writes);
}

/// A detached owner reference is restored.
#[tokio::test]
async fn test_detached_owner_reference_heals() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    h.store.edit_object(ResourceKind::Service, &key(), |svc| {
        svc.metadata.owner_references = None;
    });
    h.converge(&key()).await;

    let svc = h.store.object(ResourceKind::Service, &key()).unwrap();
    assert_eq!(svc.metadata.owner_references.unwrap().len(), 1);
}

/// A deleted child is recreated on the next pass.
#[tokio::test]
async fn test_missing_child_is_recreated() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    h.store
        .delete(ResourceKind::Service, &key(), 0)
        .await
        .unwrap();
    let outcomes = h.converge(&key()).await;
    assert_eq!(outcomes.last(), Some(&PassOutcome::Quiescent));
    assert!(h.store.object(ResourceKind::Service, &key()).is_some());
}

/// A child the server is already deleting is not deleted a second time.
#[tokio::test]
async fn test_terminating_child_is_left_to_finish() {
    let h = Harness::new();
    h.store.insert_instance(base().inlet(TrafficInlet::Route).build());
    h.converge(&key()).await;
    let children = h.metrics.children().len();
    let writes = h.store.writes();

    h.store.mark_terminating(ResourceKind::Route, &key());
    h.store.edit_instance(&key(), |mh| {
        mh.spec.web_traffic_inlet = TrafficInlet::None;
    });
    for _ in 0..3 {
        assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    }
    assert!(h.store.deletions().is_empty());
    assert_eq!(h.metrics.children().len(), children);
    assert_eq!(h.store.writes(), writes);
}

/// A selected child that is terminating holds the pass without writing to it.
#[tokio::test]
async fn test_terminating_selected_child_waits() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;
    let writes = h.store.writes();

    h.store.mark_terminating(ResourceKind::Deployment, &key());
    h.store.edit_instance(&key(), |mh| mh.spec.replicas = 2);
    for _ in 0..3 {
        assert_eq!(h.pass(&key()).await, PassOutcome::Progressing);
    }
    assert_eq!(h.store.writes(), writes);
    let deploy = h.store.object(ResourceKind::Deployment, &key()).unwrap();
    assert_eq!(deploy.data["spec"]["replicas"], 1);
}

/// An update the store refuses (immutable selector) falls back to delete and recreate.
#[tokio::test]
async fn test_immutable_field_recreates_child() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;
    let creates = h.store.creates();

    h.store.edit_object(ResourceKind::Deployment, &key(), |deploy| {
        deploy.data["spec"]["selector"]["matchLabels"][CR_NAME_LABEL] = json!("other");
    });
    let outcomes = h.converge(&key()).await;
    assert_eq!(outcomes.last(), Some(&PassOutcome::Quiescent));
    assert!(h.metrics.children().contains(&(ChildKind::Deployment, Verb::Delete)));

    assert_eq!(
        h.store.deletions(),
        vec![Deletion {
            kind: ResourceKind::Deployment,
            key: key(),
            grace_period_seconds: 100,
        }]
    );
    assert_eq!(h.store.creates(), creates + 1);
    let deploy = h.store.object(ResourceKind::Deployment, &key()).unwrap();
    assert_eq!(deploy.data["spec"]["selector"]["matchLabels"][CR_NAME_LABEL], "mh");
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_rejected_spec_creates_nothing() {
    let h = Harness::new();
    h.store.insert_instance(base().maildir("").build());

    let outcome = h.pass(&key()).await;
    let message = "maildir was specified as data storage but no path has been specified";
    assert_eq!(outcome, PassOutcome::Rejected(message.to_string()));
    assert!(h.store.kinds().is_empty());
    assert_eq!(
        h.store.instance(&key()).status.unwrap().error.as_deref(),
        Some(message)
    );

    // Rejecting again does not rewrite the same error.
    assert!(matches!(h.pass(&key()).await, PassOutcome::Rejected(_)));
    assert_eq!(h.store.status_writes(), 1);
}

/// Breaking any rule on a converged record only rewrites its status.
#[tokio::test]
async fn test_violations_on_converged_record_leave_children_untouched() {
    let h = Harness::new();
    h.store
        .insert_instance(base().inlet(TrafficInlet::Ingress).web_user("admin", "h").build());
    h.converge(&key()).await;

    let snapshot = |h: &Harness| -> Vec<serde_json::Value> {
        h.store
            .kinds()
            .into_iter()
            .map(|kind| serde_json::to_value(h.store.object(kind, &key())).unwrap())
            .collect()
    };
    let children = snapshot(&h);
    let child_ops = h.metrics.children().len();
    let valid = h.store.instance(&key()).spec;

    let violations: [(Violation, fn(&mut MailhogInstance)); 6] = [
        (Violation::ReservedMaildirPath, |mh| {
            mh.spec.settings.storage = StorageKind::Maildir;
            mh.spec.settings.storage_maildir.path = "/usr/local/bin".into();
        }),
        (Violation::MissingMaildirPath, |mh| {
            mh.spec.settings.storage = StorageKind::Maildir;
        }),
        (Violation::IncompleteMongoDb, |mh| {
            mh.spec.settings.storage = StorageKind::Mongodb;
            mh.spec.settings.storage_mongo_db.uri = "mongo:27017".into();
        }),
        (Violation::UpstreamWithoutMechanism, |mh| {
            if let Some(files) = mh.spec.settings.files.as_mut() {
                files.smtp_upstreams.push(UpstreamSpec {
                    name: "relay".into(),
                    username: "u".into(),
                    password: "p".into(),
                    ..Default::default()
                });
            }
        }),
        (Violation::UnparsableProbability, |mh| {
            mh.spec.settings.jim.invite = true;
            mh.spec.settings.jim.accept = "often".into();
        }),
        (Violation::AbsoluteWebPath, |mh| {
            mh.spec.settings.web_path = "/mail".into();
        }),
    ];

    for (violation, break_rule) in violations {
        h.store.edit_instance(&key(), |mh| {
            mh.spec = valid.clone();
            break_rule(mh);
        });
        let writes = h.store.writes();

        assert_eq!(
            h.pass(&key()).await,
            PassOutcome::Rejected(violation.to_string()),
            "{violation:?}"
        );
        assert_eq!(h.store.writes(), writes + 1, "{violation:?}");
        assert_eq!(h.store.status_writes(), h.metrics.status_updates(), "{violation:?}");
        assert_eq!(snapshot(&h), children, "{violation:?}");
    }
    assert_eq!(h.metrics.children().len(), child_ops);
    assert_eq!(h.store.deletions(), Vec::new());
}

#[tokio::test]
async fn test_reserved_path_rejected() {
    let h = Harness::new();
    h.store
        .insert_instance(base().maildir("/mailhog/settings/files").build());
    assert_eq!(
        h.pass(&key()).await,
        PassOutcome::Rejected(
            "the chosen maildir path conflicts with other paths needed (/usr/local/bin or /mailhog/settings/files)"
                .to_string()
        )
    );
}

/// Fixing a rejected spec clears the error once the children converge.
#[tokio::test]
async fn test_fixed_spec_clears_error() {
    let h = Harness::new();
    h.store.insert_instance(base().web_path("/sub/").build());
    assert!(matches!(h.pass(&key()).await, PassOutcome::Rejected(_)));

    h.store
        .edit_instance(&key(), |mh| mh.spec.settings.web_path = "sub".into());
    h.converge(&key()).await;
    assert_eq!(h.store.instance(&key()).status.unwrap().error, None);
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_status_reports_pods_and_stays_stable() {
    let h = Harness::new();
    h.store.insert_instance(base().replicas(2).build());
    h.store.add_pod(pod("mh-b", true));
    h.store.add_pod(pod("mh-a", false));
    h.converge(&key()).await;

    let status = h.store.instance(&key()).status.unwrap();
    assert_eq!(status.pod_count, 2);
    assert_eq!(status.ready_pod_count, 1);
    assert_eq!(status.pods.ready, vec!["mh-b"]);
    assert_eq!(status.pods.other, vec!["mh-a"]);

    let status_writes = h.store.status_writes();
    assert_eq!(h.pass(&key()).await, PassOutcome::Quiescent);
    assert_eq!(h.store.status_writes(), status_writes);

    h.store.add_pod(pod("mh-c", true));
    h.converge(&key()).await;
    assert_eq!(h.store.status_writes(), status_writes + 1);
    assert_eq!(
        h.store.instance(&key()).status.unwrap().ready_pod_count,
        2
    );
}

/// A record deleted mid-pass is not resurrected by a status write.
#[tokio::test]
async fn test_removed_record_is_missing() {
    let h = Harness::new();
    h.store.insert_instance(base().build());
    h.converge(&key()).await;

    h.store.remove_instance(&key());
    assert_eq!(h.pass(&key()).await, PassOutcome::Missing);
}
