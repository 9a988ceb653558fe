//! Config file handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ActuatorError, Result};

/// Pod annotation overriding the actuator port
pub const PORT_ANNOTATION: &str = "kubectl-actuator.device-insight.com/port";
/// Pod annotation overriding the actuator base path
pub const BASE_PATH_ANNOTATION: &str = "kubectl-actuator.device-insight.com/basePath";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BASE_PATH: &str = "actuator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable pointing at an alternative config file
pub const CONFIG_FILE_ENV: &str = "KUBECTL_ACTUATOR_CONFIG";

/// Values from the `[defaults]` table; unset fields fall through to the
/// built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub timeout: Option<Duration>,
}

impl Defaults {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn base_path(&self) -> &str {
        self.base_path.as_deref().unwrap_or(DEFAULT_BASE_PATH)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// kubectl-actuator configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub config_file: PathBuf,
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: Self::default_config_file(),
            defaults: Defaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when no
    /// path is given. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ActuatorError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_file(path)
            }
            None => {
                let config_file = Self::default_config_file();
                if !config_file.exists() {
                    return Ok(Self::default());
                }
                Self::load_file(&config_file)
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ActuatorError::Config(format!("Failed to read config: {}", e)))?;

        Ok(Self {
            config_file: path.to_path_buf(),
            defaults: Self::parse_defaults(&content)?,
        })
    }

    /// Parse the `[defaults]` table of a TOML document
    pub fn parse_defaults(content: &str) -> Result<Defaults> {
        let toml_value: toml::Value = toml::from_str(content)
            .map_err(|e| ActuatorError::Config(format!("Invalid config TOML: {}", e)))?;

        let defaults = match toml_value.get("defaults") {
            Some(d) => d,
            None => return Ok(Defaults::default()),
        };

        let port = match defaults.get("port") {
            None => None,
            Some(v) => {
                let port = v
                    .as_integer()
                    .ok_or_else(|| ActuatorError::Config("defaults.port must be an integer".to_string()))?;
                Some(validate_port(port).map_err(ActuatorError::Config)?)
            }
        };

        let base_path = defaults
            .get("base_path")
            .and_then(|v| v.as_str())
            .map(String::from);

        let timeout = match defaults.get("timeout") {
            None => None,
            Some(toml::Value::Integer(secs)) if *secs > 0 => Some(Duration::from_secs(*secs as u64)),
            Some(toml::Value::String(s)) => Some(humantime::parse_duration(s).map_err(|e| {
                ActuatorError::Config(format!("Invalid defaults.timeout {:?}: {}", s, e))
            })?),
            Some(other) => {
                return Err(ActuatorError::Config(format!(
                    "Invalid defaults.timeout: {}",
                    other
                )))
            }
        };

        Ok(Defaults {
            port,
            base_path,
            timeout,
        })
    }

    /// Get the default config file path
    pub fn default_config_file() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("kubectl-actuator"))
            .unwrap_or_else(|| PathBuf::from(".kubectl-actuator"))
            .join("config.toml")
    }
}

/// Check that a port number is usable
pub fn validate_port(port: i64) -> std::result::Result<u16, String> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!("port must be between 1-65535, got {}", port))
    }
}
