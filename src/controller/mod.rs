//! Controller module for mailhog-operator.
//!
//! Contains the reconcile pass and its building blocks: the diff engine, the
//! per-kind synchronizer, the admission validator and the status aggregator.

pub mod context;
pub mod diff;
pub mod error;
pub mod events;
pub mod kinds;
pub mod metrics;
pub mod reconciler;
pub mod status;
pub mod synchronizer;
pub mod validation;
