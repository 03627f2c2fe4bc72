use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bunny_config::Config;
use bunny_reconciler::converge::{cluster, policy, reset, user, vhost};
use bunny_reconciler::ctl::CtlConfig;
use bunny_reconciler::{Outcome, RealRabbitmqctl};

#[derive(Parser)]
#[command(name = "bunny", version, about = "RabbitMQ node convergence tool")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "bunny.toml", global = true)]
    config: PathBuf,

    /// Override the rabbitmqctl binary path
    #[arg(long, global = true)]
    ctl_bin: Option<PathBuf>,

    /// Override the HOME directory used for rabbitmqctl invocations
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Override the systemd service unit name
    #[arg(long, global = true)]
    service: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the node to the full configured state
    Apply,
    /// Cluster membership operations
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
    /// Vhost operations
    Vhost {
        #[command(subcommand)]
        command: VhostCommands,
    },
    /// User and permission operations
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Policy operations
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Reset the local node (destructive)
    Reset {
        /// Reason for the reset, logged as a warning
        reason: String,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Join the configured cluster if not already a member
    Join,
}

#[derive(Subcommand)]
enum VhostCommands {
    /// Create the vhost if it does not exist
    Ensure {
        /// Vhost name (must be declared in the configuration)
        name: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create the user and align its tags
    Ensure {
        /// User name (must be declared in the configuration)
        name: String,
    },
    /// Converge all configured permission grants for a user
    Permissions {
        /// User name
        name: String,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Set a configured policy (always overwrites)
    Set {
        /// Policy name (must be declared in the configuration)
        name: String,
    },
    /// Clear a policy if it exists
    Clear {
        /// Policy name (must be declared in the configuration)
        name: String,
    },
    /// Print the broker's runtime parameters
    List,
}

fn build_ctl_config(cli: &Cli) -> CtlConfig {
    let mut config = CtlConfig::from_env();
    if let Some(bin) = &cli.ctl_bin {
        config.bin = bin.clone();
    }
    if let Some(home) = &cli.home {
        config.home = home.clone();
    }
    if let Some(service) = &cli.service {
        config.service = service.clone();
    }
    if let Some(secs) = cli.timeout {
        config.command_timeout = Duration::from_secs(secs);
    }
    config
}

fn log_outcome(action: &str, subject: &str, outcome: Outcome) {
    info!(action, subject, outcome = outcome.as_str(), "done");
}

/// Runs every configured convergence step in dependency order:
/// cluster first, then vhosts, users, permissions and policies.
async fn apply(backend: &RealRabbitmqctl, config: &Config) -> anyhow::Result<()> {
    if let Some(spec) = &config.cluster {
        let outcome = cluster::join(backend, spec).await?;
        log_outcome("cluster join", &spec.name, outcome);
    }

    for spec in &config.vhosts {
        let outcome = vhost::ensure(backend, &spec.name).await?;
        log_outcome("vhost ensure", &spec.name, outcome);
    }

    for spec in &config.users {
        let outcome = user::ensure_user(backend, spec).await?;
        log_outcome("user ensure", &spec.name, outcome);
    }

    for spec in &config.permissions {
        let outcome = user::ensure_permissions(backend, spec).await?;
        log_outcome("permissions", &spec.user, outcome);
    }

    for spec in &config.policies {
        let outcome = policy::set(backend, spec).await?;
        log_outcome("policy set", &spec.name, outcome);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let backend = RealRabbitmqctl::new(build_ctl_config(&cli));

    match &cli.command {
        Commands::Apply => apply(&backend, &config).await?,
        Commands::Cluster { command } => match command {
            ClusterCommands::Join => {
                let spec = config
                    .cluster
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no [cluster] section in {}", cli.config.display()))?;
                let outcome = cluster::join(&backend, spec).await?;
                log_outcome("cluster join", &spec.name, outcome);
            }
        },
        Commands::Vhost { command } => match command {
            VhostCommands::Ensure { name } => {
                let spec = config
                    .vhost(name)
                    .ok_or_else(|| anyhow::anyhow!("vhost {name:?} is not declared in the configuration"))?;
                let outcome = vhost::ensure(&backend, &spec.name).await?;
                log_outcome("vhost ensure", &spec.name, outcome);
            }
        },
        Commands::User { command } => match command {
            UserCommands::Ensure { name } => {
                let spec = config
                    .user(name)
                    .ok_or_else(|| anyhow::anyhow!("user {name:?} is not declared in the configuration"))?;
                let outcome = user::ensure_user(&backend, spec).await?;
                log_outcome("user ensure", &spec.name, outcome);
            }
            UserCommands::Permissions { name } => {
                let grants = config.permissions_for(name);
                if grants.is_empty() {
                    anyhow::bail!("no permissions declared for user {name:?}");
                }
                for spec in grants {
                    let outcome = user::ensure_permissions(&backend, spec).await?;
                    log_outcome("permissions", &spec.user, outcome);
                }
            }
        },
        Commands::Policy { command } => match command {
            PolicyCommands::Set { name } => {
                let spec = config
                    .policy(name)
                    .ok_or_else(|| anyhow::anyhow!("policy {name:?} is not declared in the configuration"))?;
                let outcome = policy::set(&backend, spec).await?;
                log_outcome("policy set", &spec.name, outcome);
            }
            PolicyCommands::Clear { name } => {
                let spec = config
                    .policy(name)
                    .ok_or_else(|| anyhow::anyhow!("policy {name:?} is not declared in the configuration"))?;
                let outcome = policy::clear(&backend, spec).await?;
                log_outcome("policy clear", &spec.name, outcome);
            }
            PolicyCommands::List => {
                let output = policy::list(&backend).await?;
                print!("{output}");
            }
        },
        Commands::Reset { reason } => {
            let outcome = reset::reset(&backend, reason).await?;
            log_outcome("reset", "local node", outcome);
        }
    }

    Ok(ExitCode::SUCCESS)
}
