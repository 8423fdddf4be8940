//! MailhogInstance Custom Resource Definition.
//!
//! A MailhogInstance describes one MailHog mail-capture deployment. The spec
//! selects which child objects exist (workload variant, public exposure,
//! settings ConfigMap); the status is written only by the reconciler.

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MailhogInstance is a custom resource for deploying MailHog.
///
/// Example:
/// ```yaml
/// apiVersion: mailhog.operators.patrick.mx/v1alpha1
/// kind: MailhogInstance
/// metadata:
///   name: mailhog
/// spec:
///   image: mailhog/mailhog:latest
///   replicas: 1
///   webTrafficInlet: route
///   backingResource: deployment
///   settings:
///     storage: maildir
///     storageMaildir:
///       path: /maildir
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "mailhog.operators.patrick.mx",
    version = "v1alpha1",
    kind = "MailhogInstance",
    plural = "mailhoginstances",
    shortname = "mh",
    status = "MailhogInstanceStatus",
    namespaced,
    scale = r#"{"specReplicasPath":".spec.replicas", "statusReplicasPath":".status.podCount", "labelSelectorPath":".status.labelSelector"}"#,
    printcolumn = r#"{"name":"Backing", "type":"string", "jsonPath":".spec.backingResource"}"#,
    printcolumn = r#"{"name":"Pods", "type":"integer", "jsonPath":".status.podCount"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyPodCount"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Error", "type":"string", "jsonPath":".status.error"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MailhogInstanceSpec {
    /// MailHog container image.
    #[serde(default = "default_image")]
    pub image: String,

    /// Number of pods to run.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// MailHog configuration options.
    #[serde(default)]
    pub settings: SettingsSpec,

    /// How the web interface is exposed outside the cluster.
    #[serde(default)]
    pub web_traffic_inlet: TrafficInlet,

    /// Which workload type runs the pods.
    #[serde(default)]
    pub backing_resource: BackingResource,
}

impl Default for MailhogInstanceSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            replicas: default_replicas(),
            settings: SettingsSpec::default(),
            web_traffic_inlet: TrafficInlet::default(),
            backing_resource: BackingResource::default(),
        }
    }
}

fn default_image() -> String {
    "mailhog/mailhog:latest".to_string()
}

fn default_replicas() -> i32 {
    1
}

/// Public exposure variant.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrafficInlet {
    /// No external access to the web interface.
    #[default]
    None,
    /// OpenShift Route.
    Route,
    /// Kubernetes Ingress.
    Ingress,
}

/// Workload backing variant.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BackingResource {
    /// Kubernetes Deployment.
    #[default]
    Deployment,
    /// OpenShift DeploymentConfig.
    DeploymentConfig,
}

/// Mail storage backend.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Messages are kept in process memory.
    #[default]
    Memory,
    /// Messages are written to a directory.
    Maildir,
    /// Messages are stored in MongoDB.
    Mongodb,
}

impl StorageKind {
    /// Value passed to MailHog via `MH_STORAGE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Maildir => "maildir",
            StorageKind::Mongodb => "mongodb",
        }
    }
}

/// MailHog settings, see the MailHog CONFIG documentation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSpec {
    /// Hostname used for SMTP EHLO/HELO.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// Value for the API's Access-Control-Allow-Origin header.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cors_origin: String,

    /// Storage backend.
    #[serde(default)]
    pub storage: StorageKind,

    /// Only used when storage is `mongodb`.
    #[serde(default)]
    pub storage_mongo_db: MongoDbStorageSpec,

    /// Only used when storage is `maildir`.
    #[serde(default)]
    pub storage_maildir: MaildirStorageSpec,

    /// Settings delivered as files through a ConfigMap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesSpec>,

    /// Overrides the default container resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Overrides the pod affinity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Jim, the built-in chaos monkey.
    #[serde(default)]
    pub jim: JimSpec,

    /// Context root for web resources, without leading or trailing slash.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub web_path: String,

    /// Ingress settings, only used when the inlet is `ingress`.
    #[serde(default)]
    pub ingress: IngressSpec,
}

/// MongoDB storage settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDbStorageSpec {
    /// MongoDB host and port.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Database name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub db: String,
    /// Collection name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collection: String,
}

/// Maildir storage settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaildirStorageSpec {
    /// Directory inside the container.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Pre-existing PersistentVolumeClaim to mount; an emptyDir is used when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pv_name: String,
}

/// Settings that MailHog reads from files.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilesSpec {
    /// Upstream SMTP servers captured mail can be released to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smtp_upstreams: Vec<UpstreamSpec>,
    /// Basic-auth users for the UI and API.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_users: Vec<WebUserSpec>,
}

/// Upstream SMTP relay. Field names match MailHog's outgoing server file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub save: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// SMTP auth mechanism, required when credentials are given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mechanism: String,
}

/// Basic-auth user.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebUserSpec {
    pub name: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
}

/// Jim chaos monkey settings, passed as container args.
///
/// Rates are strings holding floats (e.g. "0.05").
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JimSpec {
    #[serde(default)]
    pub invite: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disconnect: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub accept: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkspeed_affect: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkspeed_min: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkspeed_max: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reject_sender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reject_recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reject_auth: String,
}

impl JimSpec {
    /// Fields holding probabilities, in the order they are validated.
    pub fn probabilities(&self) -> [&str; 6] {
        [
            &self.reject_recipient,
            &self.reject_auth,
            &self.reject_sender,
            &self.disconnect,
            &self.accept,
            &self.linkspeed_affect,
        ]
    }
}

/// Ingress settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// IngressClass name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
    /// Rule host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// TLS secret; when set the ingress terminates TLS for `host`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_secret_name: String,
}

/// Observed state, overwritten as a whole on every status write.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailhogInstanceStatus {
    /// Pod names by health.
    #[serde(default)]
    pub pods: PodBuckets,

    /// Number of pods last seen.
    #[serde(default)]
    pub pod_count: i32,

    /// Number of pods last seen ready.
    #[serde(default)]
    pub ready_pod_count: i32,

    /// Label selector for the pods, usable by an autoscaler.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,

    /// Externally reachable URL of the web interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Reason the spec was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pod names split into exclusive health categories.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodBuckets {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restarting: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ready: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

impl PodBuckets {
    /// Total number of pods across all buckets.
    pub fn total(&self) -> usize {
        self.pending.len()
            + self.failed.len()
            + self.restarting.len()
            + self.ready.len()
            + self.other.len()
    }
}
