mod error;
mod handlers;
mod server;


use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stake_client::{HeartbeatDriver, HolderState, HttpLeaseApi, LeaseApi};
use stake_core::config::{StakeConfig, DEFAULT_CATALOG_SIZE};
use stake_core::types::ClaimantForm;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(
    name = "stake",
    about = "Stake: lease and commit coordination for uniquely-assignable resources",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Stake HTTP coordination server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "STAKE_STORAGE")]
        storage: String,

        /// Lease time-to-live in seconds
        #[arg(long, default_value = "600", env = "STAKE_LEASE_TTL_SECS")]
        lease_ttl_secs: u64,

        /// Client heartbeat interval in seconds
        #[arg(long, default_value = "30", env = "STAKE_HEARTBEAT_SECS")]
        heartbeat_secs: u64,

        /// Token required in X-Admin-Token for /admin routes
        #[arg(long, env = "STAKE_ADMIN_TOKEN")]
        admin_token: Option<String>,

        /// Maximum requests processed at once
        #[arg(long, default_value = "256", env = "STAKE_MAX_INFLIGHT")]
        max_inflight: usize,

        /// Seed this many catalog resources if the registry is empty
        #[arg(long)]
        seed: Option<usize>,
    },

    /// Seed the default catalog into a storage backend
    Seed {
        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "STAKE_STORAGE")]
        storage: String,

        /// Number of resources to create
        #[arg(long, default_value_t = DEFAULT_CATALOG_SIZE)]
        count: usize,
    },

    /// Print resource statuses from a running server
    Status {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000", env = "STAKE_SERVER")]
        server: String,

        /// Report leases held by this token as the caller's
        #[arg(long)]
        holder_token: Option<String>,
    },

    /// Hold a lease with heartbeats, optionally committing a claimant payload
    Hold {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000", env = "STAKE_SERVER")]
        server: String,

        /// Resource key to claim
        resource: String,

        /// File that persists the holder token so a restart resumes the lease
        #[arg(long)]
        token_file: Option<PathBuf>,

        /// JSON claimant payload to commit once the lease is held
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Heartbeat interval in seconds
        #[arg(long, default_value = "30", env = "STAKE_HEARTBEAT_SECS")]
        heartbeat_secs: u64,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result: CliResult = match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            lease_ttl_secs,
            heartbeat_secs,
            admin_token,
            max_inflight,
            seed,
        } => match StakeConfig::from_secs(lease_ttl_secs, heartbeat_secs) {
            Ok(config) => {
                server::run(server::ServeOptions {
                    host,
                    port,
                    storage,
                    config,
                    admin_token,
                    max_inflight,
                    seed,
                })
                .await
            }
            Err(e) => Err(e.into()),
        },
        Commands::Seed { storage, count } => seed(&storage, count),
        Commands::Status {
            server,
            holder_token,
        } => status(&server, holder_token.as_deref()).await,
        Commands::Hold {
            server,
            resource,
            token_file,
            payload,
            heartbeat_secs,
        } => {
            hold(
                &server,
                &resource,
                token_file.as_deref(),
                payload.as_deref(),
                Duration::from_secs(heartbeat_secs.max(1)),
            )
            .await
        }
        Commands::Version => {
            println!("stake {}", env!("CARGO_PKG_VERSION"));
            println!("Lease and commit coordination for uniquely-assignable resources");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn seed(storage: &str, count: usize) -> CliResult {
    let coordinator = server::create_coordinator(storage, StakeConfig::default())?;
    let created = coordinator.seed_catalog(count)?;
    if created == 0 {
        println!("Registry already populated, nothing seeded");
    } else {
        println!("Seeded {} resources", created);
    }
    Ok(())
}

async fn status(server: &str, holder_token: Option<&str>) -> CliResult {
    let api = HttpLeaseApi::new(server)?;
    let report = api.statuses(holder_token).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_token(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn forget_token(path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove token file");
            }
        }
    }
}

async fn hold(
    server: &str,
    resource: &str,
    token_file: Option<&Path>,
    payload: Option<&Path>,
    heartbeat: Duration,
) -> CliResult {
    let form: Option<ClaimantForm> = match payload {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let api = HttpLeaseApi::with_timeout(server, heartbeat / 2)?;
    let driver = HeartbeatDriver::spawn(Arc::new(api), heartbeat);
    let previous = token_file.and_then(read_token);
    if previous.is_some() {
        tracing::info!(resource_key = %resource, "Resuming with persisted holder token");
    }

    let grant = driver.select(resource, previous).await?;
    if let Some(path) = token_file {
        std::fs::write(path, &grant.holder_token)?;
    }
    println!("{}", serde_json::to_string_pretty(&grant)?);

    if let Some(form) = form {
        let outcome = driver.commit(form).await;
        driver.shutdown().await;
        forget_token(token_file);
        let assignment = outcome?;
        println!("{}", serde_json::to_string_pretty(&assignment)?);
        return Ok(());
    }

    let mut state = driver.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(resource_key = %resource, "Interrupted, releasing lease");
        }
        _ = state.wait_for(|s| matches!(s, HolderState::Lost { .. })) => {
            forget_token(token_file);
            return Err(format!("lease on '{}' was lost", resource).into());
        }
    }

    driver.shutdown().await;
    forget_token(token_file);
    Ok(())
}
