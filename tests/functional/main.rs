// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for MailhogInstance convergence.
//!
//! These tests drive full reconcile passes against an in-memory object store
//! WITHOUT requiring a live Kubernetes cluster.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_default_instance_converges
//! ```
//!
//! ## Test Categories
//!
//! - **Convergence tests**: pass sequences from an empty cluster to quiescence
//! - **Drift tests**: hand edits, missing and extra children
//! - **Validation tests**: rejected specs never touch children

#[path = "../common/mod.rs"]
mod common;
mod scenario_tests;

pub use memory_store::*;
