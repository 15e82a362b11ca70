/*!
 * baomon CLI - Command Line Interface
 *
 * Every command except `dump-config read|write` loads the configuration,
 * sets up logging, optionally refreshes topology and secrets from Kubernetes,
 * runs, and then writes the store back when it came from the file.
 */

use anyhow::Context;
use baomon::{
    commands::{self, dump_config, init::InitOptions, CommandContext},
    config::MonitorConfig,
    daemon::{cancel_on_shutdown, Monitor},
    error::{MonitorError, EXIT_FAILURE, EXIT_SUCCESS},
    logging::{self, LogSettings},
    platform::KubeClient,
    HttpClientFactory, TopologyResolver, TopologySource, ValidationPolicy,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "baomon")]
#[command(version, about = "A monitor service for managing the secret servers", long_about = None)]
struct Cli {
    /// File path to the monitor config file
    #[arg(long, global = true, default_value = "/workdir/testConfig.yaml")]
    config: PathBuf,

    /// Use addresses, tokens and key shards from Kubernetes instead
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    k8s: Option<bool>,

    /// Set when the monitor runs in a Kubernetes pod
    #[arg(long = "in-cluster", global = true, num_args = 0..=1, default_missing_value = "true")]
    in_cluster: Option<bool>,

    /// Path of the Kubernetes config file used outside the cluster
    #[arg(long, global = true, default_value = "/etc/kubernetes/admin.conf")]
    kubeconfig: PathBuf,

    /// Seconds the client waits for each request; zero or negative means 60
    #[arg(long, global = true, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Minimum log level (DEBUG, INFO, WARN, ERROR or 1-5)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the health status of the server on HOST
    Health { host: String },

    /// Unseal the server on HOST with every non-recovery key shard
    Unseal { host: String },

    /// Initialize the server on HOST and store the issued keys
    Init {
        host: String,

        /// A JSON file containing the options for init
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// The number of shares to split the root key into
        #[arg(long = "secret-shares")]
        secret_shares: Option<u32>,

        /// The number of shares required to reconstruct the root key
        #[arg(long = "secret-threshold")]
        secret_threshold: Option<u32>,
    },

    /// Join NODE to the raft cluster
    #[command(name = "join-raft", alias = "joinRaft")]
    JoinRaft {
        node: String,

        /// A JSON file containing the API parameters for the join
        #[arg(long = "raft-config")]
        raft_config: Option<PathBuf>,

        /// Address of the leader node in the raft cluster
        #[arg(long = "raft-address")]
        raft_address: Option<String>,
    },

    /// Snapshot related commands
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Developer commands for the YAML config file
    #[command(subcommand, name = "dump-config", alias = "dumpConfig")]
    DumpConfig(DumpConfigCommand),

    /// Keep every server unsealed
    Run {
        /// Seconds between checks; WaitInterval in the config file wins
        #[arg(long = "wait-interval", alias = "waitInterval")]
        wait_interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Check that every server is unsealed
    Precheck,

    /// Write a raft snapshot of HOST to FILE
    Create { host: String, file: PathBuf },

    /// Restore HOST from the snapshot in FILE
    Restore {
        host: String,
        file: PathBuf,

        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum DumpConfigCommand {
    /// Read a config file and print it
    Read { file: PathBuf },

    /// Copy a config file through the YAML reader and writer
    Write { from: PathBuf, to: PathBuf },

    /// Print the configuration as loaded for a command
    Global,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Until logging is set up, and whenever it goes to a file, errors are
    // also written to stderr
    let mut echo_errors = true;

    let code = match run(cli, &mut echo_errors).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("The monitor failed with error: {:#}", e);
            if echo_errors {
                eprintln!("Error: {:#}", e);
            }
            e.downcast_ref::<MonitorError>()
                .map_or(EXIT_FAILURE, MonitorError::exit_code)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, echo_errors: &mut bool) -> anyhow::Result<()> {
    let policy = ValidationPolicy::default();

    // These only touch the files they are given
    if let Commands::DumpConfig(ref action) = cli.command {
        match action {
            DumpConfigCommand::Read { file } => {
                let config = dump_config::read(file, &policy)?;
                println!("Result: \n{:#?}", config);
                return Ok(());
            }
            DumpConfigCommand::Write { from, to } => {
                dump_config::write(from, to, &policy)?;
                println!("Write Complete");
                return Ok(());
            }
            DumpConfigCommand::Global => {}
        }
    }

    let mut ctx = setup(&cli, &policy, echo_errors).await?;

    match cli.command {
        Commands::Health { ref host } => {
            let health = commands::health::run(&ctx, host).await?;
            println!(
                "Health check successful. Result:\n{}",
                serde_json::to_string_pretty(&health)?
            );
        }
        Commands::Unseal { ref host } => {
            commands::unseal::run(&ctx, host).await?;
        }
        Commands::Init {
            ref host,
            ref file,
            secret_shares,
            secret_threshold,
        } => {
            let request =
                InitOptions::from_flags(file.clone(), secret_shares, secret_threshold)?
                    .into_request()?;
            commands::init::run(&mut ctx, host, &request).await?;
        }
        Commands::JoinRaft {
            ref node,
            ref raft_config,
            ref raft_address,
        } => {
            let request =
                commands::raft::join_request(&ctx.config, raft_config.clone(), raft_address.clone())?;
            commands::raft::run(&ctx, node, &request).await?;
        }
        Commands::Snapshot(ref action) => match action {
            SnapshotCommand::Precheck => commands::snapshot::precheck(&ctx).await?,
            SnapshotCommand::Create { host, file } => {
                commands::snapshot::create(&ctx, host, file).await?;
            }
            SnapshotCommand::Restore { host, file, force } => {
                commands::snapshot::restore(&ctx, host, file, *force).await?;
            }
        },
        Commands::DumpConfig(_) => {
            println!("{}", dump_config::global(&ctx.config)?);
        }
        Commands::Run { wait_interval } => {
            ctx = run_monitor(ctx, wait_interval).await?;
        }
    }

    let written = ctx
        .finish(&cli.config)
        .with_context(|| format!("error with writing the changed configs to {}", cli.config.display()))?;
    if written {
        info!(path = %cli.config.display(), "Configuration written back");
    }
    Ok(())
}

/// Load the config, apply flag overrides, start logging and pull the
/// platform view when requested
async fn setup(
    cli: &Cli,
    policy: &ValidationPolicy,
    echo_errors: &mut bool,
) -> anyhow::Result<CommandContext> {
    let mut config = MonitorConfig::load_with_policy(&cli.config, policy)
        .with_context(|| format!("error in parsing config file {}", cli.config.display()))?;

    let use_k8s = cli.k8s.unwrap_or(config.use_k8s_config);
    let in_cluster = cli.in_cluster.unwrap_or(config.use_in_cluster_config);
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    if let Some(ref level) = cli.log_level {
        config.log_level = level.clone();
    }

    let log_settings = LogSettings::from_config(&config, policy)?;
    logging::init_logging(&log_settings)?;
    *echo_errors = log_settings.logs_to_file();
    info!(level = %log_settings.level, "Logging initialized");

    let resolver = if use_k8s {
        let platform = if in_cluster {
            KubeClient::in_cluster(config.request_timeout())
        } else {
            KubeClient::from_kubeconfig(&cli.kubeconfig, config.request_timeout())
        }
        .map_err(|e| MonitorError::TopologyUnavailable(e.to_string()))?;
        TopologyResolver::new(
            TopologySource::Platform(Arc::new(platform)),
            policy.clone(),
        )
    } else {
        TopologyResolver::new(TopologySource::Static, policy.clone())
    };

    let mut ctx = CommandContext::new(config, resolver, Arc::new(HttpClientFactory::new()));
    ctx.refresh().await?;
    Ok(ctx)
}

async fn run_monitor(ctx: CommandContext, wait_interval: Option<u64>) -> anyhow::Result<CommandContext> {
    let interval = ctx.config.wait_interval(wait_interval);
    let CommandContext {
        config,
        resolver,
        factory,
    } = ctx;

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    let mut monitor = Monitor::new(config, resolver.clone(), factory.clone()).with_interval(interval);
    let result = monitor.run(cancel).await;
    let ctx = CommandContext::new(monitor.into_config(), resolver, factory);
    result?;
    Ok(ctx)
}

