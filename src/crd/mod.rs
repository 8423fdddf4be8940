//! Custom Resource Definitions (CRDs) for mailhog-operator.
//!
//! - `MailhogInstance`: the record this operator reconciles
//! - OpenShift `Route` and `DeploymentConfig`: foreign types managed as children

mod mailhog_instance;
pub mod openshift;

pub use mailhog_instance::*;
