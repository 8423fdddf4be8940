//! Resource generation module.
//!
//! Desired-state builders for the children of a MailhogInstance. Each builder
//! is a pure function of the record.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Deployment / DeploymentConfig | Runs the MailHog pods |
//! | Service | SMTP and web endpoints inside the cluster |
//! | ConfigMap | Upstream servers and web users as files |
//! | Route / Ingress | External access to the web interface |

pub mod common;
pub mod configmap;
pub mod exposure;
pub mod pod_template;
pub mod services;
pub mod workload;

// Re-export commonly used items from common
pub use common::{label_selector, owner_reference, pod_selector_labels, standard_labels};
