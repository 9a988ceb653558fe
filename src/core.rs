use chrono::Utc;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::actuator::{ActuatorClientFactory, ConnectionOverrides};
use crate::cli::args::RESET_LEVEL;
use crate::cli::{Args, BeansFormat, Command, Shell};
use crate::config::Config;
use crate::errors::{ActuatorError, Result};
use crate::k8s::{resolve_targets, ClusterApi, KubeCluster, KubeUpgrader, ResolvedPodSet, TargetSpec};
use crate::logging;
use crate::output::beans::{render_bean_names, render_beans, render_beans_wide};
use crate::output::env::{render_env, render_env_names, render_env_property};
use crate::output::health::render_health;
use crate::output::loggers::{render_loggers, LoggerView};
use crate::output::metrics::{render_metric, render_metric_names};
use crate::output::raw::{PodResult, RawOutput};
use crate::output::scheduled::render_scheduled_tasks;
use crate::output::threads::{render_thread_dump, ThreadDumpView};
use crate::output::to_pretty_json;
use crate::runner::run_for_each_pod;
use crate::signals;
use crate::status::ExitStatus;

/// Main entry point for the CLI.
///
/// Parses arguments, answers the commands that need no cluster, then
/// connects, resolves the target pods and dispatches.
pub fn run(args: Vec<String>) -> ExitStatus {
    let parsed = match Args::try_parse_from(&args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion
            {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    let mut stdout = std::io::stdout();
    match run_local(&parsed.command, &mut stdout) {
        Ok(true) => return ExitStatus::Success,
        Ok(false) => {}
        Err(e) => return handle_error(e),
    }

    if let Err(e) = logging::init(parsed.debug, parsed.log_format) {
        eprintln!("Warning: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return handle_error(ActuatorError::Io(e)),
    };

    match runtime.block_on(program(parsed, signals::shutdown_token())) {
        Ok(()) => ExitStatus::Success,
        Err(ActuatorError::Cancelled) => ExitStatus::Interrupted,
        Err(e) => handle_error(e),
    }
}

/// Commands answered without touching the cluster; true when handled
pub fn run_local<W: Write>(command: &Command, out: &mut W) -> Result<bool> {
    match command {
        Command::Completions { shell } => {
            generate_completions(*shell, out);
            Ok(true)
        }
        Command::Version => {
            writeln!(out, "kubectl-actuator version {}", env!("CARGO_PKG_VERSION"))?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub async fn program(args: Args, cancel: CancellationToken) -> Result<()> {
    let spec = TargetSpec::new(args.pods.clone(), args.deployments.clone(), args.selectors.clone());
    if spec.is_empty() {
        return Err(ActuatorError::NoTargetsSelected);
    }

    let config = Config::load(args.config.as_deref())?;
    debug!(config_file = %config.config_file.display(), "Loaded configuration");

    let cluster = KubeCluster::connect(args.context.as_deref(), args.namespace.as_deref()).await?;
    let namespace = cluster.namespace().to_string();
    let upgrader = Arc::new(KubeUpgrader::new(cluster.client().clone(), namespace.clone()));
    let cluster: Arc<dyn ClusterApi> = Arc::new(cluster);

    let pods = resolve_targets(cluster.as_ref(), &namespace, &spec).await?;
    debug!(count = pods.len(), "Resolved target pods");

    let overrides = ConnectionOverrides {
        port: args.port,
        base_path: args.base_path.clone(),
        timeout: args.timeout,
    };
    let factory = ActuatorClientFactory::new(cluster, upgrader, namespace, overrides, config.defaults);

    let mut stdout = std::io::stdout();
    execute(&args.command, &factory, &pods, &cancel, &mut stdout).await
}

/// Run one cluster command against every resolved pod
pub async fn execute<W: Write>(
    command: &Command,
    factory: &ActuatorClientFactory,
    pods: &ResolvedPodSet,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Health { output } => {
            let wide = output.is_some();
            run_for_each_pod(out, cancel, pods, "get health", |pod| async move {
                let health = factory.client_for(&pod).await?.health().await?;
                Ok(render_health(&health, wide))
            })
            .await
        }

        Command::Info => {
            run_for_each_pod(out, cancel, pods, "get info", |pod| async move {
                let info = factory.client_for(&pod).await?.info().await?;
                to_pretty_json(&info)
            })
            .await
        }

        Command::Logger {
            name,
            level: Some(level),
            ..
        } => {
            let name = name.as_deref().ok_or_else(|| {
                ActuatorError::Argument("a logger name is required to set a level".to_string())
            })?;
            let level = (level != RESET_LEVEL).then_some(level.as_str());
            run_for_each_pod(out, cancel, pods, "set logger level", |pod| async move {
                factory.client_for(&pod).await?.set_logger_level(name, level).await?;
                Ok(String::new())
            })
            .await
        }

        Command::Logger {
            name,
            level: None,
            all_loggers,
        } => {
            let view = LoggerView {
                prefix: name.as_deref(),
                show_all: *all_loggers,
            };
            let view = &view;
            run_for_each_pod(out, cancel, pods, "get loggers", |pod| async move {
                let loggers = factory.client_for(&pod).await?.loggers().await?;
                Ok(render_loggers(&loggers, view))
            })
            .await
        }

        Command::ScheduledTasks { output } => {
            let wide = output.is_some();
            run_for_each_pod(out, cancel, pods, "get scheduled tasks", |pod| async move {
                let tasks = factory.client_for(&pod).await?.scheduled_tasks().await?;
                Ok(render_scheduled_tasks(&tasks, wide, Utc::now()))
            })
            .await
        }

        Command::Metrics { name, filter } => {
            let (name, filter) = (name.as_deref(), filter.as_deref());
            run_for_each_pod(out, cancel, pods, "get metrics", |pod| async move {
                let client = factory.client_for(&pod).await?;
                match name {
                    Some(name) => Ok(render_metric(&client.metric(name).await?)),
                    None => Ok(render_metric_names(&client.metrics().await?, filter)),
                }
            })
            .await
        }

        Command::Env {
            property,
            filter,
            output,
        } => {
            let (property, filter, names_only) = (property.as_deref(), filter.as_deref(), output.is_some());
            run_for_each_pod(out, cancel, pods, "get env", |pod| async move {
                let client = factory.client_for(&pod).await?;
                if let Some(property) = property {
                    return Ok(render_env_property(property, &client.env_property(property).await?));
                }
                let env = client.env().await?;
                Ok(if names_only {
                    render_env_names(&env, filter)
                } else {
                    render_env(&env, filter)
                })
            })
            .await
        }

        Command::Threaddump {
            output,
            state,
            name,
            summary,
            no_stacktrace,
        } => {
            let view = ThreadDumpView {
                state: state.as_deref(),
                name: name.as_deref(),
                summary_only: *summary,
                no_stacktrace: *no_stacktrace,
                wide: output.is_some(),
            };
            let view = &view;
            run_for_each_pod(out, cancel, pods, "get threaddump", |pod| async move {
                let dump = factory.client_for(&pod).await?.thread_dump().await?;
                Ok(render_thread_dump(&dump, view))
            })
            .await
        }

        Command::Beans { filter, output } => {
            let (filter, output) = (filter.as_deref(), *output);
            run_for_each_pod(out, cancel, pods, "get beans", |pod| async move {
                let beans = factory.client_for(&pod).await?.beans().await?;
                Ok(match output {
                    Some(BeansFormat::Name) => render_bean_names(&beans, filter),
                    Some(BeansFormat::Wide) => render_beans_wide(&beans, filter),
                    None => render_beans(&beans, filter),
                })
            })
            .await
        }

        Command::Raw { endpoint } => run_raw(out, factory, pods, cancel, endpoint).await,

        Command::Endpoints => {
            let pod = pods.first().ok_or(ActuatorError::NoTargetsSelected)?;
            let endpoints = factory.client_for(pod).await?.available_endpoints().await?;
            for endpoint in endpoints {
                writeln!(out, "{}", endpoint)?;
            }
            Ok(())
        }

        Command::Completions { .. } | Command::Version => {
            run_local(command, out)?;
            Ok(())
        }
    }
}

/// One JSON document for all pods; failures are recorded per pod
async fn run_raw<W: Write>(
    out: &mut W,
    factory: &ActuatorClientFactory,
    pods: &ResolvedPodSet,
    cancel: &CancellationToken,
    endpoint: &str,
) -> Result<()> {
    let mut output = RawOutput::default();
    let mut failed = 0usize;

    for pod in pods.iter() {
        if cancel.is_cancelled() {
            return Err(ActuatorError::Cancelled);
        }

        let result = match factory.client_for(pod).await {
            Err(e) => PodResult::failure(pod, format!("failed to create actuator client: {}", e)),
            Ok(client) => match client.raw(endpoint).await {
                Ok(body) => PodResult::success(pod, &body),
                Err(e) => PodResult::failure(pod, e),
            },
        };
        if result.error.is_some() {
            failed += 1;
        }
        output.push(result);
    }

    out.write_all(output.render()?.as_bytes())?;
    out.flush()?;

    if failed > 0 {
        return Err(ActuatorError::PodsFailed {
            action: "get raw".to_string(),
            count: failed,
        });
    }
    Ok(())
}

fn generate_completions<W: Write>(shell: Shell, out: &mut W) {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as ClapShell};

    let mut cmd = Args::command();
    let shell = match shell {
        Shell::Bash => ClapShell::Bash,
        Shell::Zsh => ClapShell::Zsh,
        Shell::Fish => ClapShell::Fish,
        Shell::PowerShell => ClapShell::PowerShell,
        Shell::Elvish => ClapShell::Elvish,
    };

    generate(shell, &mut cmd, "kubectl-actuator", out);
}

fn handle_error(error: ActuatorError) -> ExitStatus {
    eprintln!("Error: {}", error);
    ExitStatus::Error
}
