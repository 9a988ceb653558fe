//! Spring Boot Actuator client
//!
//! - [`http`] - HTTP/1.1 over a port-forward tunnel
//! - [`client`] - one typed method per endpoint and error classification
//! - [`models`] - response shapes
//! - [`factory`] - per-pod settings and client wiring

pub mod client;
pub mod factory;
pub mod http;
pub mod models;

pub use client::ActuatorClient;
pub use factory::{ActuatorClientFactory, ActuatorSettings, ConnectionOverrides};
pub use http::{ActuatorResponse, HttpClient, TunnelHttpClient};
