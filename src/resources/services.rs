//! Service generation for MailHog.
//!
//! One ClusterIP Service exposes both the SMTP and the web port.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::MailhogInstance;
use crate::resources::common::{
    SMTP_PORT, SMTP_PORT_NAME, WEB_PORT, WEB_PORT_NAME, object_meta, pod_selector_labels,
};

/// Generate the Service for a MailhogInstance.
pub fn generate_service(resource: &MailhogInstance) -> Service {
    Service {
        metadata: object_meta(resource),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector_labels(resource)),
            ports: Some(vec![
                ServicePort {
                    name: Some(SMTP_PORT_NAME.to_string()),
                    port: SMTP_PORT,
                    target_port: Some(IntOrString::Int(SMTP_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some(WEB_PORT_NAME.to_string()),
                    port: WEB_PORT,
                    target_port: Some(IntOrString::Int(WEB_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
