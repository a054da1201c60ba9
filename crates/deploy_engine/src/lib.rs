//! Reconciliation engine for declarative handler deployments.
//!
//! This crate owns provider-facing behavior: the port traits a cloud adapter
//! implements, per-kind reconcilers, the handler pipeline, the bounded
//! project orchestrator, tag-driven cleanup, and the dependency-package
//! builder. It depends on ports only; the AWS SDK lives in `deploy_aws`.

pub mod artifacts;
pub mod cleanup;
pub mod layer_builder;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod reconcile;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
