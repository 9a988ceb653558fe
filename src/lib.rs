//! kubectl-actuator library interface
//!
//! Runs Spring Boot Actuator requests against Kubernetes pods through the
//! API server's port-forward subresource.
//!
//! # Module Organization
//!
//! - [`k8s`] - Target resolution and the port-forward transport
//! - [`actuator`] - HTTP over a tunnel, endpoint client, response models
//! - [`runner`] - Per-pod execution with aggregated failures
//! - [`output`] - Terminal rendering of actuator responses
//! - [`errors`] - Error types (ActuatorError, Result)
//! - [`core`] - Main execution logic

pub mod actuator;
pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod k8s;
pub mod logging;
pub mod output;
pub mod runner;
pub mod signals;
pub mod status;
