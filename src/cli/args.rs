//! CLI argument definitions using clap
//!
//! Target and connection flags are global so they can be given before or
//! after the subcommand, the way kubectl plugins are usually invoked.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::CONFIG_FILE_ENV;
use crate::output::threads::parse_thread_state;

/// Levels accepted by Spring Boot's loggers endpoint
pub const SUPPORTED_LEVELS: [&str; 7] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "FATAL", "OFF"];

/// Clears a logger's configured level so it inherits again
pub const RESET_LEVEL: &str = "RESET";

/// kubectl-actuator - Spring Boot Actuator endpoints of pods, over port-forward
#[derive(Parser, Debug, Clone)]
#[command(name = "kubectl-actuator", version, about, long_about = None)]
pub struct Args {
    // =========================================================================
    // TARGET SELECTION
    // =========================================================================

    /// Namespace of the target pods (defaults to the kubeconfig namespace)
    #[arg(short = 'n', long = "namespace", global = true, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long = "context", global = true, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Target pod (repeatable)
    #[arg(short = 'p', long = "pod", global = true, action = ArgAction::Append, value_name = "POD")]
    pub pods: Vec<String>,

    /// Target every pod of a deployment (repeatable)
    #[arg(short = 'd', long = "deployment", global = true, action = ArgAction::Append, value_name = "DEPLOYMENT")]
    pub deployments: Vec<String>,

    /// Target pods matching a label selector (repeatable)
    #[arg(short = 'l', long = "selector", global = true, action = ArgAction::Append, value_name = "SELECTOR")]
    pub selectors: Vec<String>,

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Actuator port inside the pod (overrides the pod annotation)
    #[arg(long = "port", global = true, value_parser = clap::value_parser!(u16).range(1..), value_name = "PORT")]
    pub port: Option<u16>,

    /// Actuator base path (overrides the pod annotation)
    #[arg(long = "base-path", global = true, value_name = "PATH")]
    pub base_path: Option<String>,

    /// Per-request timeout, e.g. 10s or 1m (plain numbers are seconds)
    #[arg(long = "timeout", global = true, value_parser = parse_timeout, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    /// Config file with connection defaults
    #[arg(long = "config", global = true, env = CONFIG_FILE_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Log tunnel and request details to stderr
    #[arg(long = "debug", global = true, action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Format of diagnostic logs
    #[arg(long = "log-format", global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show application health
    Health {
        /// Output format
        #[arg(short = 'o', long = "output", value_enum)]
        output: Option<WideFormat>,
    },

    /// Show application info
    Info,

    /// List loggers, or set a logger's level
    ///
    /// With a level, the logger is set on every target pod. RESET clears the
    /// configured level.
    Logger {
        /// Logger name; filters the listing by prefix
        name: Option<String>,

        /// New level (TRACE, DEBUG, INFO, WARN, ERROR, FATAL, OFF or RESET)
        #[arg(value_parser = parse_log_level)]
        level: Option<String>,

        /// Include loggers without a configured level
        #[arg(long = "all-loggers", action = ArgAction::SetTrue)]
        all_loggers: bool,
    },

    /// Show scheduled tasks
    ScheduledTasks {
        /// Output format
        #[arg(short = 'o', long = "output", value_enum)]
        output: Option<WideFormat>,
    },

    /// List metric names, or show one metric
    Metrics {
        /// Metric to show
        name: Option<String>,

        /// Only list names containing this text
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,
    },

    /// Show environment properties, or one property
    Env {
        /// Property to show
        property: Option<String>,

        /// Only show properties whose name contains this text
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,

        /// Output format
        #[arg(short = 'o', long = "output", value_enum)]
        output: Option<NameFormat>,
    },

    /// Show a thread dump
    Threaddump {
        /// Output format
        #[arg(short = 'o', long = "output", value_enum)]
        output: Option<WideFormat>,

        /// Only threads in this state (e.g. BLOCKED, WAITING, RUNNABLE)
        #[arg(long = "state", value_parser = parse_thread_state)]
        state: Option<String>,

        /// Only threads whose name contains this text
        #[arg(long = "name")]
        name: Option<String>,

        /// Only print the state summary
        #[arg(long = "summary", action = ArgAction::SetTrue)]
        summary: bool,

        /// Omit stack traces
        #[arg(long = "no-stacktrace", action = ArgAction::SetTrue)]
        no_stacktrace: bool,
    },

    /// List application beans
    Beans {
        /// Only beans whose name contains this text (case-insensitive)
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,

        /// Output format
        #[arg(short = 'o', long = "output", value_enum)]
        output: Option<BeansFormat>,
    },

    /// Print the raw JSON of any actuator endpoint for every pod
    Raw {
        /// Endpoint path below the base path, e.g. health/liveness ("/" for the index)
        endpoint: String,
    },

    /// List the endpoints the first pod exposes
    Endpoints,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the version
    Version,
}

/// `-o wide`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WideFormat {
    Wide,
}

/// `-o name`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NameFormat {
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BeansFormat {
    /// Full detail per bean
    Wide,
    /// Bean names only
    Name,
}

/// Shell type for completion generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Format of diagnostic logs on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines (default)
    #[default]
    Text,
    /// JSON Lines for log collectors
    Json,
}

/// Accept a logger level in any case, returned upper-cased
pub fn parse_log_level(s: &str) -> Result<String, String> {
    let level = s.to_uppercase();
    if level == RESET_LEVEL || SUPPORTED_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(format!(
            "unsupported log level: {}. Supported levels: [{}]",
            level,
            SUPPORTED_LEVELS.join(" ")
        ))
    }
}

/// `30` means 30 seconds; anything else goes through humantime
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    let duration = match s.trim().parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s.trim()).map_err(|e| format!("invalid duration {:?}: {}", s, e))?,
    };
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kubectl-actuator").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["health", "-p", "web-0", "-p", "web-1", "-n", "shop", "-o", "wide"]);
        assert_eq!(args.pods, vec!["web-0", "web-1"]);
        assert_eq!(args.namespace.as_deref(), Some("shop"));
        assert!(matches!(
            args.command,
            Command::Health {
                output: Some(WideFormat::Wide)
            }
        ));
    }

    #[test]
    fn test_logger_level_is_normalized() {
        let args = parse(&["-d", "api", "logger", "com.example", "debug"]);
        assert_eq!(args.deployments, vec!["api"]);
        match args.command {
            Command::Logger { name, level, .. } => {
                assert_eq!(name.as_deref(), Some("com.example"));
                assert_eq!(level.as_deref(), Some("DEBUG"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_level() {
        let err = parse_log_level("verbose").unwrap_err();
        assert_eq!(
            err,
            "unsupported log level: VERBOSE. Supported levels: [TRACE DEBUG INFO WARN ERROR FATAL OFF]"
        );
        assert_eq!(parse_log_level("reset").unwrap(), RESET_LEVEL);
    }

    #[test]
    fn test_port_range() {
        assert!(Args::try_parse_from(["kubectl-actuator", "--port", "0", "info"]).is_err());
        assert!(Args::try_parse_from(["kubectl-actuator", "--port", "65536", "info"]).is_err());
        assert_eq!(parse(&["--port", "9090", "info"]).port, Some(9090));
    }

    #[test]
    fn test_timeout_formats() {
        assert_eq!(parse_timeout("15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_timeout("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_threaddump_state_validation() {
        let args = parse(&["threaddump", "--state", "waiting", "--summary"]);
        match args.command {
            Command::Threaddump { state, summary, .. } => {
                assert_eq!(state.as_deref(), Some("WAITING"));
                assert!(summary);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["kubectl-actuator", "threaddump", "--state", "idle"]).is_err());
    }

    #[test]
    fn test_output_formats_per_command() {
        assert!(Args::try_parse_from(["kubectl-actuator", "beans", "-o", "name"]).is_ok());
        assert!(Args::try_parse_from(["kubectl-actuator", "env", "-o", "wide"]).is_err());
        assert!(Args::try_parse_from(["kubectl-actuator", "health", "-o", "yaml"]).is_err());
    }

    #[test]
    fn test_raw_requires_endpoint() {
        assert!(Args::try_parse_from(["kubectl-actuator", "raw"]).is_err());
    }
}
