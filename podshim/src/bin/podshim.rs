//! podshim command-line front end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use podshim::logging::init_logging;
use podshim::{
    ContainerConfig, ContainerFilter, ContainerMetadata, ContainerState, Labels, Mount,
    PodSandboxFilter, PodShim, SandboxConfig, SandboxMetadata, ShimOptions, SystemClock,
};

/// Pod lifecycle shim over a container engine
#[derive(Parser, Debug)]
#[command(name = "podshim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run pod sandboxes and containers as labelled engine records", long_about = None)]
struct Cli {
    /// Home directory for the record database and logs
    #[arg(global = true, long = "home", env = "PODSHIM_HOME")]
    home: Option<PathBuf>,

    /// Engine backend
    #[arg(global = true, long = "engine", value_enum, default_value = "local")]
    engine: EngineKind,

    /// Print results as JSON
    #[arg(global = true, long = "json")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EngineKind {
    /// Records kept in a local SQLite database
    Local,
    /// Local Docker daemon
    Docker,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateArg {
    Created,
    Running,
    Exited,
    Unknown,
}

impl From<StateArg> for ContainerState {
    fn from(s: StateArg) -> Self {
        match s {
            StateArg::Created => ContainerState::Created,
            StateArg::Running => ContainerState::Running,
            StateArg::Exited => ContainerState::Exited,
            StateArg::Unknown => ContainerState::Unknown,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and start a pod sandbox
    RunSandbox {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long)]
        uid: String,
        #[arg(long, default_value = "0")]
        attempt: u32,
        /// Infra image (defaults to the configured sandbox image)
        #[arg(long)]
        image: Option<String>,
        /// KEY=VALUE, repeatable
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
        /// KEY=VALUE, repeatable
        #[arg(long = "annotation", value_parser = parse_key_value)]
        annotations: Vec<(String, String)>,
    },

    /// Create a container inside a sandbox
    Create {
        /// Sandbox id
        #[arg(long)]
        sandbox: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        attempt: u32,
        #[arg(long)]
        image: String,
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
        #[arg(long = "annotation", value_parser = parse_key_value)]
        annotations: Vec<(String, String)>,
        /// HOST:CONTAINER[:ro], repeatable
        #[arg(long = "mount", value_parser = parse_mount)]
        mounts: Vec<Mount>,
    },

    /// Start a created container
    Start { id: String },

    /// Stop a container
    Stop {
        id: String,
        /// Grace period in seconds
        #[arg(long, short = 't', default_value = "10")]
        timeout: u64,
    },

    /// Remove a container
    Rm { id: String },

    /// Show container status
    Inspect { id: String },

    /// List containers
    Ps {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        sandbox: Option<String>,
        #[arg(long, value_enum)]
        state: Option<StateArg>,
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
    },

    /// List pod sandboxes
    Sandboxes {
        #[arg(long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
    },

    /// Stop a sandbox and its containers
    StopSandbox { id: String },

    /// Remove a sandbox and its containers
    RmSandbox { id: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn parse_mount(s: &str) -> Result<Mount, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let (host, container, readonly) = match parts.as_slice() {
        [host, container] => (*host, *container, false),
        [host, container, "ro"] => (*host, *container, true),
        [host, container, "rw"] => (*host, *container, false),
        _ => return Err(format!("expected HOST:CONTAINER[:ro], got '{}'", s)),
    };
    if host.is_empty() || container.is_empty() {
        return Err(format!("empty path in mount '{}'", s));
    }
    Ok(Mount {
        container_path: container.to_string(),
        host_path: host.to_string(),
        readonly,
    })
}

fn to_labels(pairs: Vec<(String, String)>) -> Labels {
    pairs.into_iter().collect()
}

fn print_json<T: Serialize>(value: &T) -> AnyhowResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_shim(cli: &Cli) -> AnyhowResult<PodShim> {
    let mut options = ShimOptions::default();
    if let Some(home) = &cli.home {
        options.home_dir = home.clone();
    }

    match cli.engine {
        EngineKind::Local => PodShim::open_with_clock(options, Arc::new(SystemClock))
            .context("Failed to open local engine"),
        #[cfg(feature = "docker")]
        EngineKind::Docker => PodShim::docker(options)
            .await
            .context("Failed to connect to Docker"),
        #[cfg(not(feature = "docker"))]
        EngineKind::Docker => anyhow::bail!("podshim was built without the docker feature"),
    }
}

impl Cli {
    async fn run(self) -> AnyhowResult<()> {
        let shim = open_shim(&self).await?;
        let json = self.json;

        match self.command {
            Commands::RunSandbox {
                name,
                namespace,
                uid,
                attempt,
                image,
                labels,
                annotations,
            } => {
                let config = SandboxConfig {
                    metadata: SandboxMetadata {
                        name,
                        namespace,
                        uid,
                        attempt,
                    },
                    labels: to_labels(labels),
                    annotations: to_labels(annotations),
                };
                let id = shim.run_pod_sandbox(&config, image.as_deref()).await?;
                println!("{}", id);
            }

            Commands::Create {
                sandbox,
                name,
                attempt,
                image,
                labels,
                annotations,
                mounts,
            } => {
                let status = shim
                    .pod_sandbox_status(&sandbox)
                    .await
                    .with_context(|| format!("Sandbox {} not usable", sandbox))?;
                let sandbox_config = SandboxConfig {
                    metadata: status.metadata,
                    labels: status.labels,
                    annotations: status.annotations,
                };
                let config = ContainerConfig {
                    metadata: ContainerMetadata { name, attempt },
                    image,
                    labels: to_labels(labels),
                    annotations: to_labels(annotations),
                    mounts,
                };
                let id = shim.create_container(&sandbox, config, &sandbox_config).await?;
                println!("{}", id);
            }

            Commands::Start { id } => shim.start_container(&id).await?,

            Commands::Stop { id, timeout } => {
                shim.stop_container(&id, Duration::from_secs(timeout)).await?
            }

            Commands::Rm { id } => shim.remove_container(&id).await?,

            Commands::Inspect { id } => {
                let status = shim.container_status(&id).await?;
                if json {
                    print_json(&status)?;
                } else {
                    println!("id:        {}", status.id);
                    println!("name:      {}", status.metadata.name);
                    println!("attempt:   {}", status.metadata.attempt);
                    println!("state:     {}", status.state);
                    println!("image:     {}", status.image);
                    println!("image_ref: {}", status.image_ref);
                    println!("created:   {}", status.created_at);
                    println!("started:   {}", status.started_at);
                    println!("finished:  {}", status.finished_at);
                    if status.state == ContainerState::Exited {
                        println!("exit_code: {}", status.exit_code);
                        println!("reason:    {}", status.reason);
                        if !status.message.is_empty() {
                            println!("message:   {}", status.message);
                        }
                    }
                }
            }

            Commands::Ps {
                id,
                sandbox,
                state,
                labels,
            } => {
                let filter = ContainerFilter {
                    id,
                    pod_sandbox_id: sandbox,
                    state: state.map(Into::into),
                    label_selector: to_labels(labels),
                };
                let containers = shim.list_containers(Some(&filter)).await?;
                if json {
                    print_json(&containers)?;
                } else {
                    println!(
                        "{:<28} {:<28} {:<20} {:<8} {}",
                        "ID", "SANDBOX", "NAME", "STATE", "IMAGE"
                    );
                    for c in containers {
                        println!(
                            "{:<28} {:<28} {:<20} {:<8} {}",
                            c.id, c.pod_sandbox_id, c.metadata.name, c.state, c.image
                        );
                    }
                }
            }

            Commands::Sandboxes { labels } => {
                let filter = PodSandboxFilter {
                    label_selector: to_labels(labels),
                    ..Default::default()
                };
                let sandboxes = shim.list_pod_sandboxes(Some(&filter)).await?;
                if json {
                    print_json(&sandboxes)?;
                } else {
                    println!("{:<28} {:<20} {:<16} {}", "ID", "NAME", "NAMESPACE", "STATE");
                    for s in sandboxes {
                        println!(
                            "{:<28} {:<20} {:<16} {}",
                            s.id, s.metadata.name, s.metadata.namespace, s.state
                        );
                    }
                }
            }

            Commands::StopSandbox { id } => shim.stop_pod_sandbox(&id).await?,

            Commands::RmSandbox { id } => shim.remove_pod_sandbox(&id).await?,
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();

    let mut options = ShimOptions::default();
    if let Some(home) = &cli.home {
        options.home_dir = home.clone();
    }
    let _guard = init_logging(&options.log_filter, Some(&options.logs_dir()))
        .context("Failed to initialize logging")?;

    cli.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("app=web").unwrap(),
            ("app".to_string(), "web".to_string())
        );
        assert_eq!(
            parse_key_value("k=a=b").unwrap(),
            ("k".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_parse_mount() {
        let m = parse_mount("/host:/data:ro").unwrap();
        assert_eq!(m.host_path, "/host");
        assert_eq!(m.container_path, "/data");
        assert!(m.readonly);
        assert!(!parse_mount("/host:/data").unwrap().readonly);
        assert!(parse_mount("/host").is_err());
        assert!(parse_mount("/host:/data:xx").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "podshim", "--json", "ps", "--state", "running", "--label", "app=web",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Ps { state: Some(StateArg::Running), .. }));
    }
}
