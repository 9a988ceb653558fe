//! Common test utilities for kubectl-actuator integration tests
//!
//! Every invocation runs with an isolated environment: no kubeconfig, no
//! in-cluster service account and no user config file, so nothing reaches a
//! real cluster.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory that is never created
const NOWHERE: &str = "/nonexistent/kubectl-actuator-tests";

fn isolated(args: &[&str], home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kubectl-actuator").expect("binary built");
    cmd.args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("KUBECONFIG", home.join("kubeconfig"))
        .env_remove("KUBECTL_ACTUATOR_CONFIG")
        .env_remove("KUBERNETES_SERVICE_HOST")
        .env_remove("KUBERNETES_SERVICE_PORT")
        .env_remove("RUST_LOG");
    cmd
}

/// The binary with `args`, cut off from any cluster or user config
pub fn actuator(args: &[&str]) -> Command {
    isolated(args, Path::new(NOWHERE))
}

/// Temporary home directory for tests that need files on disk
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Write a config file into the sandbox and return its path
    pub fn config(&self, content: &str) -> PathBuf {
        let path = self.dir.path().join("config.toml");
        std::fs::write(&path, content).expect("write config");
        path
    }

    pub fn actuator(&self, args: &[&str]) -> Command {
        isolated(args, self.dir.path())
    }
}
