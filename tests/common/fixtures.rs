//! Test fixtures and builder patterns for MailhogInstance.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use mailhog_operator::crd::{
    BackingResource, FilesSpec, MailhogInstance, MailhogInstanceSpec, StorageKind, TrafficInlet,
    UpstreamSpec, WebUserSpec,
};
use std::collections::BTreeMap;

/// Builder for creating MailhogInstance test fixtures.
///
/// # Example
/// ```
/// let resource = MailhogInstanceBuilder::new("mh")
///     .namespace("mail")
///     .replicas(2)
///     .inlet(TrafficInlet::Route)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct MailhogInstanceBuilder {
    name: String,
    namespace: Option<String>,
    spec: MailhogInstanceSpec,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    generation: Option<i64>,
    uid: Option<String>,
}

impl MailhogInstanceBuilder {
    /// Create a new builder with the given resource name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            spec: MailhogInstanceSpec::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            generation: None,
            uid: None,
        }
    }

    /// Set the namespace for the resource.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the number of replicas.
    pub fn replicas(mut self, replicas: i32) -> Self {
        self.spec.replicas = replicas;
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.spec.image = image.into();
        self
    }

    /// Select the public exposure kind.
    pub fn inlet(mut self, inlet: TrafficInlet) -> Self {
        self.spec.web_traffic_inlet = inlet;
        self
    }

    /// Select the workload kind.
    pub fn backing(mut self, backing: BackingResource) -> Self {
        self.spec.backing_resource = backing;
        self
    }

    /// Use maildir storage at `path`.
    pub fn maildir(mut self, path: impl Into<String>) -> Self {
        self.spec.settings.storage = StorageKind::Maildir;
        self.spec.settings.storage_maildir.path = path.into();
        self
    }

    /// Back the maildir with an existing PersistentVolumeClaim.
    pub fn claim(mut self, pv_name: impl Into<String>) -> Self {
        self.spec.settings.storage_maildir.pv_name = pv_name.into();
        self
    }

    pub fn web_path(mut self, path: impl Into<String>) -> Self {
        self.spec.settings.web_path = path.into();
        self
    }

    /// Add a basic-auth web user, which turns on the settings ConfigMap.
    pub fn web_user(mut self, name: impl Into<String>, hash: impl Into<String>) -> Self {
        self.spec
            .settings
            .files
            .get_or_insert_with(FilesSpec::default)
            .web_users
            .push(WebUserSpec {
                name: name.into(),
                password_hash: hash.into(),
            });
        self
    }

    /// Add an upstream relay, which turns on the settings ConfigMap.
    pub fn upstream(mut self, upstream: UpstreamSpec) -> Self {
        self.spec
            .settings
            .files
            .get_or_insert_with(FilesSpec::default)
            .smtp_upstreams
            .push(upstream);
        self
    }

    /// Replace the whole spec.
    pub fn spec(mut self, spec: MailhogInstanceSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Add a label to the resource.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation to the resource.
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the generation (for testing status updates).
    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Set the UID (for testing owner references).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Build the MailhogInstance.
    pub fn build(self) -> MailhogInstance {
        MailhogInstance {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels)
                },
                annotations: if self.annotations.is_empty() {
                    None
                } else {
                    Some(self.annotations)
                },
                generation: self.generation,
                uid: self.uid,
                ..Default::default()
            },
            spec: self.spec,
            status: None,
        }
    }
}

impl Default for MailhogInstanceBuilder {
    fn default() -> Self {
        Self::new("test-mailhog")
    }
}

/// Create a MailhogInstance with common test defaults.
pub fn test_instance(name: &str, namespace: &str) -> MailhogInstance {
    MailhogInstanceBuilder::new(name)
        .namespace(namespace)
        .generation(1)
        .uid(format!("test-uid-{}", name))
        .build()
}
