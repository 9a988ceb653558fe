//! Configuration: built-in defaults, pod annotations and the config file

#[allow(clippy::module_inception)]
mod config;

pub use config::*;
