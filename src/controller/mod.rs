//! Controller module for inference-operator.
//!
//! Contains the reconciliation loop, the convergence engine for backend
//! resources, status propagation, events and error handling.
//!
//! A pass runs three stages:
//! - build: select the backend adapter and synthesise the desired resource
//! - converge: get-or-create-or-update the backend resource (`convergence`)
//! - propagate: fold the backend status into the parent (`status`)

pub mod common;
pub mod context;
pub mod convergence;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod status;
