//! replicafs CLI - Store, retrieve and maintain replicated files
//!
//! This binary drives the placement engine against the local metadata store
//! and the WebDAV storage hosts. `replicate` and `erase` are meant to be run
//! periodically (e.g. from cron).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use replicafs_client::WebDavClient;
use replicafs_common::{Config, Host, HostId, HostStatus};
use replicafs_engine::{ERASE_LOCK, Engine, EraseReport, REPLICATION_LOCK, ReplicationReport};
use replicafs_meta_store::{MetaStore, MetadataStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "replicafs-cli")]
#[command(about = "replicafs replica placement CLI")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/replicafs/replicafs.toml")]
    config: String,

    /// Metadata database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a local file and print its file id
    Store {
        /// File to store
        path: PathBuf,
        /// Original file name, consulted for the extension
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print a URL serving the file
    Get {
        /// File ID
        file_id: String,
    },
    /// Mark a file deleted; its objects go on the next erase run
    Delete {
        /// File ID
        file_id: String,
    },
    /// Copy under-replicated files onto more hosts
    Replicate {
        /// Additional copies per file (defaults to batch.replication_factor)
        #[arg(short, long)]
        factor: Option<usize>,
    },
    /// Remove soft-deleted replicas from their hosts
    Erase,
    /// Storage host operations
    Host {
        #[command(subcommand)]
        action: HostCommands,
    },
    /// Show the batch job locks
    Locks,
}

#[derive(Subcommand, Debug)]
enum HostCommands {
    /// Register or update a storage host
    Add {
        /// Host ID
        host_id: String,
        /// Hostname of the WebDAV server
        hostname: String,
        /// Capacity (e.g. 500G, 2T)
        #[arg(short, long)]
        total: String,
        /// WebDAV port
        #[arg(short, long)]
        port: Option<u16>,
        /// Collection under which objects are stored
        #[arg(short, long, default_value = "")]
        root: String,
        /// Register the host without accepting new replicas
        #[arg(long)]
        inactive: bool,
    },
    /// List all hosts
    List,
    /// Change a host's status
    Status {
        /// Host ID
        host_id: String,
        /// New status
        status: StatusArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for HostStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Inactive => Self::Inactive,
        }
    }
}

/// Parse a human-readable size string (e.g. "10G", "1T", "500M") into bytes.
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num, multiplier) = if let Some(n) = s.strip_suffix('T') {
        (n, 1024 * 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024)
    } else {
        // Assume bytes if no suffix
        (s, 1)
    };
    let value: u64 = num
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid size: '{s}'"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Size out of range: '{s}'"))
}

/// Format bytes as a human-readable size string.
fn format_size(bytes: u64) -> String {
    const TIB: u64 = 1024 * 1024 * 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn print_hosts(hosts: &[Host]) {
    println!("Hosts");
    println!("=====");
    if hosts.is_empty() {
        println!("No hosts registered");
        return;
    }
    println!(
        "{:<16} {:<32} {:<10} {:>12} {:>12} {:>12}",
        "HOST ID", "BASE URL", "STATUS", "TOTAL", "USED", "FREE"
    );
    println!("{}", "-".repeat(99));
    for host in hosts {
        println!(
            "{:<16} {:<32} {:<10} {:>12} {:>12} {:>12}",
            host.host_id,
            host.base_url(),
            host.status,
            format_size(host.disk_total),
            format_size(host.disk_used),
            format_size(host.free_capacity()),
        );
    }
}

fn print_replication(report: &ReplicationReport) {
    if report.skipped {
        println!("Replication skipped: another run holds the lock");
        return;
    }
    println!("Replication");
    println!("===========");
    println!("Files examined:     {}", report.files_examined);
    println!("Copies created:     {}", report.copies_created);
    println!("Copies failed:      {}", report.copies_failed);
    println!("Index failures:     {}", report.index_failures);
    println!("Files without host: {}", report.files_without_hosts);
    if let Some(reason) = &report.aborted {
        println!("Aborted:            {reason}");
    }
}

fn print_erase(report: &EraseReport) {
    if report.skipped {
        println!("Erase skipped: another run holds the lock");
        return;
    }
    println!("Erase");
    println!("=====");
    println!("Replicas examined: {}", report.examined);
    println!("Replicas erased:   {}", report.erased);
    println!("Replicas failed:   {}", report.failed);
    println!("Reclaimed:         {}", format_size(report.bytes_reclaimed));
    if let Some(reason) = &report.aborted {
        println!("Aborted:           {reason}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let config: Config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)?;
        toml::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {}", e);
            Config::default()
        })
    } else {
        Config::default()
    };

    // Merge CLI args with config file (CLI takes precedence)
    let db_path = args.db.unwrap_or(config.meta.db_path);
    let log_level = if args.log_level != "info" {
        args.log_level
    } else {
        config.logging.level
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let meta = Arc::new(
        MetaStore::open(&db_path)
            .with_context(|| format!("Failed to open metadata store {}", db_path.display()))?,
    );

    let transport = Arc::new(WebDavClient::new(&config.transport)?);
    let factor = config.batch.replication_factor;
    let engine = Engine::new(meta.clone(), transport, config.batch);

    run(&engine, meta.as_ref(), args.command, factor).await
}

async fn run(
    engine: &Engine,
    meta: &dyn MetadataStore,
    command: Commands,
    default_factor: usize,
) -> Result<()> {
    match command {
        Commands::Store { path, name } => {
            let file_id = engine.store(&path, name.as_deref()).await?;
            println!("{file_id}");
        }
        Commands::Get { file_id } => {
            println!("{}", engine.resolve(&file_id)?);
        }
        Commands::Delete { file_id } => {
            let marked = engine.mark_deleted(&file_id)?;
            println!("{marked} replicas of {file_id} marked deleted");
        }
        Commands::Replicate { factor } => {
            let report = engine.replicate(factor.unwrap_or(default_factor)).await;
            print_replication(&report);
        }
        Commands::Erase => {
            let report = engine.erase().await;
            print_erase(&report);
        }
        Commands::Host { action } => match action {
            HostCommands::Add {
                host_id,
                hostname,
                total,
                port,
                root,
                inactive,
            } => {
                let host_id = HostId::new(host_id);
                // re-registering keeps the accounted usage
                let disk_used = meta.get_host(&host_id)?.map_or(0, |h| h.disk_used);
                let host = Host {
                    host_id,
                    hostname,
                    port,
                    root_path: root,
                    status: if inactive {
                        HostStatus::Inactive
                    } else {
                        HostStatus::Active
                    },
                    disk_total: parse_size(&total)?,
                    disk_used,
                };
                meta.put_host(&host)?;
                info!("Registered host {} at {}", host.host_id, host.base_url());
                println!("Host {} registered ({})", host.host_id, host.status);
            }
            HostCommands::List => print_hosts(&meta.list_hosts()?),
            HostCommands::Status { host_id, status } => {
                let host = meta.set_host_status(&HostId::new(host_id), status.into())?;
                println!("Host {} is now {}", host.host_id, host.status);
            }
        },
        Commands::Locks => {
            let locks = engine.locks();
            println!("Locks");
            println!("=====");
            for key in [REPLICATION_LOCK, ERASE_LOCK] {
                let state = if locks.is_locked(key) { "held" } else { "free" };
                println!("{:<12} {:<5} {}", key, state, locks.marker_path(key).display());
            }
        }
    }
    Ok(())
}
