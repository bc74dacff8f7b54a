//! HTTP handlers for authz-service.

pub mod authz;
pub mod metrics;

pub use authz::*;
