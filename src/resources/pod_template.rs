//! Pod template shared by the Deployment and DeploymentConfig workloads.
//!
//! Maps the MailHog settings onto the container:
//! - environment variables (`MH_*`)
//! - Jim chaos monkey arguments
//! - maildir and settings-file volumes
//! - TCP liveness/startup probes and an HTTP readiness probe

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{JimSpec, MailhogInstance, StorageKind};
use crate::resources::common::{
    CONTAINER_NAME, SETTINGS_FILES_MOUNT, SMTP_PORT, SMTP_PORT_NAME, UPSTREAMS_FILE, USERS_FILE,
    WEB_PORT, WEB_PORT_NAME, pod_labels,
};

const DEFAULT_CPU: &str = "200m";
const DEFAULT_MEMORY: &str = "150Mi";

const MAILDIR_VOLUME: &str = "maildir-storage";
const SETTINGS_VOLUME: &str = "settings-files";

const SMTP_BIND: &str = "0.0.0.0:1025";
const WEB_BIND: &str = "0.0.0.0:8025";

/// Path polled by the HTTP readiness probe, relative to the web path.
const HEALTH_PATH: &str = "/api/v2/messages?limit=1";

/// Generate the pod template for a MailhogInstance.
pub fn generate_pod_template(resource: &MailhogInstance) -> PodTemplateSpec {
    let settings = &resource.spec.settings;
    let (volumes, mounts) = pod_volumes(resource);

    let has_web_users = settings
        .files
        .as_ref()
        .is_some_and(|f| !f.web_users.is_empty());
    // Basic auth on the UI makes HTTP probes fail with 401
    let readiness = if has_web_users {
        tcp_probe()
    } else {
        http_probe(&health_path(&settings.web_path))
    };

    let args = jim_args(&settings.jim);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(resource.spec.image.clone()),
        ports: Some(container_ports()),
        env: Some(env_vars(resource)),
        args: if args.is_empty() { None } else { Some(args) },
        resources: Some(
            settings
                .resources
                .clone()
                .unwrap_or_else(default_resources),
        ),
        liveness_probe: Some(tcp_probe()),
        startup_probe: Some(tcp_probe()),
        readiness_probe: Some(readiness),
        volume_mounts: if mounts.is_empty() { None } else { Some(mounts) },
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels(resource)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            automount_service_account_token: Some(false),
            affinity: settings.affinity.clone(),
            volumes: if volumes.is_empty() {
                None
            } else {
                Some(volumes)
            },
            ..Default::default()
        }),
    }
}

fn container_ports() -> Vec<ContainerPort> {
    vec![
        ContainerPort {
            name: Some(WEB_PORT_NAME.to_string()),
            container_port: WEB_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        ContainerPort {
            name: Some(SMTP_PORT_NAME.to_string()),
            container_port: SMTP_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
    ]
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Push an env var only when its value is set.
fn push_non_empty(vars: &mut Vec<EnvVar>, name: &str, value: &str) {
    if !value.is_empty() {
        vars.push(env(name, value));
    }
}

/// Environment for the MailHog container.
pub fn env_vars(resource: &MailhogInstance) -> Vec<EnvVar> {
    let settings = &resource.spec.settings;
    let mut vars = vec![
        env("MH_SMTP_BIND_ADDR", SMTP_BIND),
        env("MH_API_BIND_ADDR", WEB_BIND),
        env("MH_UI_BIND_ADDR", WEB_BIND),
        env("MH_STORAGE", settings.storage.as_str()),
    ];

    match settings.storage {
        StorageKind::Mongodb => {
            let mongo = &settings.storage_mongo_db;
            push_non_empty(&mut vars, "MH_MONGO_URI", &mongo.uri);
            push_non_empty(&mut vars, "MH_MONGO_DB", &mongo.db);
            push_non_empty(&mut vars, "MH_MONGO_COLLECTION", &mongo.collection);
        }
        StorageKind::Maildir => {
            push_non_empty(&mut vars, "MH_MAILDIR_PATH", &settings.storage_maildir.path);
        }
        StorageKind::Memory => {}
    }

    push_non_empty(&mut vars, "MH_HOSTNAME", &settings.hostname);
    push_non_empty(&mut vars, "MH_CORS_ORIGIN", &settings.cors_origin);
    push_non_empty(&mut vars, "MH_UI_WEB_PATH", &settings.web_path);

    if let Some(files) = &settings.files {
        if !files.smtp_upstreams.is_empty() {
            vars.push(env(
                "MH_OUTGOING_SMTP",
                &format!("{SETTINGS_FILES_MOUNT}/{UPSTREAMS_FILE}"),
            ));
        }
        if !files.web_users.is_empty() {
            vars.push(env(
                "MH_AUTH_FILE",
                &format!("{SETTINGS_FILES_MOUNT}/{USERS_FILE}"),
            ));
        }
    }

    vars
}

/// Container args enabling Jim. Empty when Jim is not invited.
pub fn jim_args(jim: &JimSpec) -> Vec<String> {
    if !jim.invite {
        return Vec::new();
    }
    let flags = [
        ("jim-disconnect", &jim.disconnect),
        ("jim-accept", &jim.accept),
        ("jim-linkspeed-affect", &jim.linkspeed_affect),
        ("jim-linkspeed-min", &jim.linkspeed_min),
        ("jim-linkspeed-max", &jim.linkspeed_max),
        ("jim-reject-sender", &jim.reject_sender),
        ("jim-reject-recipient", &jim.reject_recipient),
        ("jim-reject-auth", &jim.reject_auth),
    ];
    std::iter::once("-invite-jim".to_string())
        .chain(
            flags
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(flag, value)| format!("-{flag}={value}")),
        )
        .collect()
}

fn pod_volumes(resource: &MailhogInstance) -> (Vec<Volume>, Vec<VolumeMount>) {
    let settings = &resource.spec.settings;
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    let maildir = &settings.storage_maildir;
    if settings.storage == StorageKind::Maildir && !maildir.path.is_empty() {
        let volume = if maildir.pv_name.is_empty() {
            Volume {
                name: MAILDIR_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }
        } else {
            Volume {
                name: MAILDIR_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: maildir.pv_name.clone(),
                    read_only: None,
                }),
                ..Default::default()
            }
        };
        volumes.push(volume);
        mounts.push(VolumeMount {
            name: MAILDIR_VOLUME.to_string(),
            mount_path: maildir.path.clone(),
            ..Default::default()
        });
    }

    if settings.files.is_some() {
        volumes.push(Volume {
            name: SETTINGS_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: resource.name_any(),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: SETTINGS_VOLUME.to_string(),
            mount_path: SETTINGS_FILES_MOUNT.to_string(),
            ..Default::default()
        });
    }

    (volumes, mounts)
}

/// Resource requests and limits used when none are configured.
pub fn default_resources() -> ResourceRequirements {
    let quantities = BTreeMap::from([
        ("cpu".to_string(), Quantity(DEFAULT_CPU.to_string())),
        ("memory".to_string(), Quantity(DEFAULT_MEMORY.to_string())),
    ]);
    ResourceRequirements {
        requests: Some(quantities.clone()),
        limits: Some(quantities),
        ..Default::default()
    }
}

fn health_path(web_path: &str) -> String {
    if web_path.is_empty() {
        HEALTH_PATH.to_string()
    } else {
        format!("/{web_path}{HEALTH_PATH}")
    }
}

fn probe_timings(probe: Probe) -> Probe {
    Probe {
        initial_delay_seconds: Some(10),
        timeout_seconds: Some(2),
        period_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..probe
    }
}

fn tcp_probe() -> Probe {
    probe_timings(Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(WEB_PORT),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn http_probe(path: &str) -> Probe {
    probe_timings(Probe {
        http_get: Some(HTTPGetAction {
            port: IntOrString::Int(WEB_PORT),
            path: Some(path.to_string()),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}
