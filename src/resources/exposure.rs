//! Public exposure of the web interface: OpenShift Route or Kubernetes Ingress.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::MailhogInstance;
use crate::crd::openshift::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crate::resources::common::{WEB_PORT, WEB_PORT_NAME, object_meta};

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Generate a Route with edge TLS that redirects plain HTTP.
pub fn generate_route(resource: &MailhogInstance) -> Route {
    let web_path = &resource.spec.settings.web_path;
    let spec = RouteSpec {
        host: None,
        path: if web_path.is_empty() {
            None
        } else {
            Some(format!("/{web_path}"))
        },
        to: RouteTargetReference {
            kind: "Service".to_string(),
            name: resource.name_any(),
            weight: None,
        },
        port: Some(RoutePort {
            target_port: IntOrString::Int(WEB_PORT),
        }),
        tls: Some(TlsConfig {
            termination: "edge".to_string(),
            insecure_edge_termination_policy: Some("Redirect".to_string()),
        }),
    };

    let mut route = Route::new(&resource.name_any(), spec);
    route.metadata = object_meta(resource);
    route
}

/// Generate an Ingress routing the web path prefix to the Service.
pub fn generate_ingress(resource: &MailhogInstance) -> Ingress {
    let settings = &resource.spec.settings;
    let ingress = &settings.ingress;

    let path = HTTPIngressPath {
        path: Some(format!("/{}", settings.web_path)),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: resource.name_any(),
                port: Some(ServiceBackendPort {
                    name: Some(WEB_PORT_NAME.to_string()),
                    number: None,
                }),
            }),
            ..Default::default()
        },
    };

    let tls = non_empty(&ingress.tls_secret_name).map(|secret| {
        vec![IngressTLS {
            hosts: non_empty(&ingress.host).map(|host| vec![host]),
            secret_name: Some(secret),
        }]
    });

    Ingress {
        metadata: object_meta(resource),
        spec: Some(IngressSpec {
            ingress_class_name: non_empty(&ingress.class),
            rules: Some(vec![IngressRule {
                host: non_empty(&ingress.host),
                http: Some(HTTPIngressRuleValue { paths: vec![path] }),
            }]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    }
}
