//! Cluster I/O for the serving controller.
//!
//! Every read and write the reconcile pipeline performs goes through the
//! [`ServingClient`] trait, so the pipeline can run against the API server
//! in production and against an in-memory store in tests.
//!
//! ## Architecture
//!
//! - `store`: the `ServingClient` trait and its optimistic-concurrency contract
//! - `kube_store`: `ServingClient` over `kube::Api`

pub mod kube_store;
pub mod store;

pub use kube_store::KubeServingClient;
pub use store::ServingClient;
