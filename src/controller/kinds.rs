//! Managed child kinds.
//!
//! Every child of a MailhogInstance is one variant of [`ChildKind`]. A variant
//! knows whether the record selects it, how to build its desired object and
//! which store binding it uses; the synchronizer needs nothing else.

use std::fmt;

use kube::core::DynamicObject;

use crate::controller::error::Result;
use crate::crd::{BackingResource, MailhogInstance, MailhogInstanceSpec, TrafficInlet};
use crate::resources::{configmap, exposure, services, workload};
use crate::store::{ResourceKind, to_dynamic};

/// A child kind managed for every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// Workload backed by a Kubernetes Deployment
    Deployment,
    /// Workload backed by an OpenShift DeploymentConfig
    DeploymentConfig,
    /// In-cluster network endpoint
    Service,
    /// Settings files
    ConfigMap,
    /// OpenShift public route
    Route,
    /// Kubernetes ingress
    Ingress,
}

impl ChildKind {
    /// Synchronization order. The workload comes first so pods start early.
    pub const ALL: [ChildKind; 6] = [
        ChildKind::Deployment,
        ChildKind::DeploymentConfig,
        ChildKind::Service,
        ChildKind::ConfigMap,
        ChildKind::Route,
        ChildKind::Ingress,
    ];

    /// Whether the spec asks for this child to exist.
    pub fn is_selected(&self, spec: &MailhogInstanceSpec) -> bool {
        match self {
            ChildKind::Deployment => spec.backing_resource == BackingResource::Deployment,
            ChildKind::DeploymentConfig => {
                spec.backing_resource == BackingResource::DeploymentConfig
            }
            ChildKind::Service => true,
            ChildKind::ConfigMap => spec.settings.files.is_some(),
            ChildKind::Route => spec.web_traffic_inlet == TrafficInlet::Route,
            ChildKind::Ingress => spec.web_traffic_inlet == TrafficInlet::Ingress,
        }
    }

    /// Build the desired object, or `None` when the kind is not selected.
    pub fn desired(&self, resource: &MailhogInstance) -> Result<Option<DynamicObject>> {
        if !self.is_selected(&resource.spec) {
            return Ok(None);
        }
        let object = match self {
            ChildKind::Deployment => to_dynamic(&workload::generate_deployment(resource))?,
            ChildKind::DeploymentConfig => {
                to_dynamic(&workload::generate_deployment_config(resource))?
            }
            ChildKind::Service => to_dynamic(&services::generate_service(resource))?,
            ChildKind::ConfigMap => match configmap::generate_configmap(resource)? {
                Some(cm) => to_dynamic(&cm)?,
                None => return Ok(None),
            },
            ChildKind::Route => to_dynamic(&exposure::generate_route(resource))?,
            ChildKind::Ingress => to_dynamic(&exposure::generate_ingress(resource))?,
        };
        Ok(Some(object))
    }

    /// Store binding for this kind.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            ChildKind::Deployment => ResourceKind::Deployment,
            ChildKind::DeploymentConfig => ResourceKind::DeploymentConfig,
            ChildKind::Service => ResourceKind::Service,
            ChildKind::ConfigMap => ResourceKind::ConfigMap,
            ChildKind::Route => ResourceKind::Route,
            ChildKind::Ingress => ResourceKind::Ingress,
        }
    }

    /// Span name used in logs.
    pub fn span(&self) -> &'static str {
        match self {
            ChildKind::Deployment => "deployment",
            ChildKind::DeploymentConfig => "deploymentConfig",
            ChildKind::Service => "service",
            ChildKind::ConfigMap => "configMap",
            ChildKind::Route => "route",
            ChildKind::Ingress => "ingress",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_kind().as_str())
    }
}
