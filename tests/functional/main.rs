// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the InferenceService reconcile pipeline.
//!
//! These tests drive the real `reconcile` function against an in-memory
//! cluster WITHOUT requiring a live Kubernetes cluster. The backend
//! controllers are simulated by writing status onto the backend resources
//! between passes.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_backend_ready_makes_service_available
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: end-to-end create, become available, fail
//! - **Convergence tests**: idempotence, spec updates, conflict retries
//! - **Lifecycle tests**: finalizer handling, deletion, unsupported backends

mod convergence_tests;
mod scenario_tests;
