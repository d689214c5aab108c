//! Custom Resource Definitions (CRDs) for inference-operator.
//!
//! - `InferenceService`: backend-agnostic model serving resource

mod inference_service;

pub use inference_service::*;
