//! tempstore: ephemeral handle-addressed file store
//!
//! Usage:
//!   tempstore serve  --config config.toml                  # GC on startup, then HTTP API
//!   tempstore create --config config.toml --name a.pdf --mime application/pdf --input a.pdf
//!   tempstore stat   --config config.toml 3
//!   tempstore cat    --config config.toml 3 --output out.pdf
//!   tempstore rm     --config config.toml 3
//!   tempstore list   --config config.toml
//!   tempstore gc     --config config.toml [--ttl-secs 3600]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tempstore::api::{self, AppState};
use tempstore::config::Config;
use tempstore::{FileHandle, TempStore};

#[derive(Parser)]
#[command(name = "tempstore", about = "Ephemeral handle-addressed file store", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect expired files, then serve the HTTP API until CTRL+C.
    Serve,
    /// Create a file and print its handle.
    Create {
        /// Display name recorded for the file.
        #[arg(long)]
        name: Option<String>,
        /// Mime type recorded for the file (defaults to */*).
        #[arg(long)]
        mime: Option<String>,
        /// File to copy in. Reads stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print name, mime type and size of a handle.
    Stat { handle: FileHandle },
    /// Copy a file's bytes to stdout or `--output`.
    Cat {
        handle: FileHandle,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove a handle.
    Rm { handle: FileHandle },
    /// List all live handles.
    List,
    /// Remove expired files and orphan blobs.
    Gc {
        /// Override the configured TTL.
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Serve => run_serve(cfg).await,
        Command::Create { name, mime, input } => {
            run_create(&cfg, name.as_deref(), mime.as_deref(), input)
        }
        Command::Stat { handle } => run_stat(&cfg, handle),
        Command::Cat { handle, output } => run_cat(&cfg, handle, output),
        Command::Rm { handle } => run_rm(&cfg, handle),
        Command::List => run_list(&cfg),
        Command::Gc { ttl_secs } => run_gc(&cfg, ttl_secs),
    };

    if let Err(e) = result {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}

fn open_store(cfg: &Config) -> anyhow::Result<TempStore> {
    TempStore::open(&cfg.storage.base_path).with_context(|| {
        format!("cannot open store at {}", cfg.storage.base_path.display())
    })
}

async fn run_serve(cfg: Config) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&cfg)?);

    info!(
        base_path = ?store.base_path(),
        ttl_secs = cfg.storage.ttl_secs,
        entries = store.len()?,
        "Starting tempstore"
    );

    if cfg.storage.gc_on_startup {
        let removed = store.cleanup(cfg.storage.ttl())?;
        let report = store.reconcile()?;
        info!(
            removed,
            orphan_blobs_removed = report.orphan_blobs_removed,
            dangling_rows = report.dangling_rows,
            "Startup garbage collection done"
        );
    }

    if !cfg.api.enabled {
        info!("HTTP API disabled, nothing left to do");
        return Ok(());
    }

    let port = cfg.api.port;
    let state = Arc::new(AppState { store, config: cfg });
    tokio::select! {
        _ = api::start_server(state, port) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("signal error")?;
            info!("Received CTRL+C, shutting down…");
        }
    }
    Ok(())
}

fn run_create(
    cfg: &Config,
    name: Option<&str>,
    mime: Option<&str>,
    input: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut data = Vec::new();
    match &input {
        Some(path) => {
            data = std::fs::read(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
        }
        None => {
            std::io::stdin().read_to_end(&mut data).context("cannot read stdin")?;
        }
    }

    let store = open_store(cfg)?;
    let handle = store.create(name, mime)?;
    let mut file = store.open_for_write(handle)?;
    file.write_all(&data)?;
    file.sync_all()?;

    println!("{handle}");
    Ok(())
}

fn run_stat(cfg: &Config, handle: FileHandle) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    let Some(stat) = store.stat(handle)? else {
        bail!("handle {handle} not found");
    };
    println!("Handle : {handle}");
    println!("Name   : {}", stat.display_name.as_deref().unwrap_or("-"));
    println!("Mime   : {}", stat.mime_type);
    println!("Size   : {} bytes", stat.size);
    Ok(())
}

fn run_cat(cfg: &Config, handle: FileHandle, output: Option<PathBuf>) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    let Some(mut file) = store.open_for_read(handle)? else {
        bail!("handle {handle} not found");
    };
    match output {
        Some(path) => {
            let mut out = std::fs::File::create(&path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            std::io::copy(&mut file, &mut out)?;
        }
        None => {
            std::io::copy(&mut file, &mut std::io::stdout().lock())?;
        }
    }
    Ok(())
}

fn run_rm(cfg: &Config, handle: FileHandle) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    if !store.remove(handle)? {
        bail!("handle {handle} not found");
    }
    Ok(())
}

fn run_list(cfg: &Config) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    let entries = store.list()?;
    println!("{:>8}  {:<20}  {:<24}  NAME", "HANDLE", "CREATED", "MIME");
    for e in &entries {
        println!(
            "{:>8}  {:<20}  {:<24}  {}",
            e.handle.id(),
            e.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            e.mime_type,
            e.display_name.as_deref().unwrap_or("-")
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

fn run_gc(cfg: &Config, ttl_secs: Option<u64>) -> anyhow::Result<()> {
    if ttl_secs == Some(0) {
        bail!("--ttl-secs must be > 0");
    }
    let ttl = ttl_secs.map(Duration::from_secs).unwrap_or_else(|| cfg.storage.ttl());
    let store = open_store(cfg)?;
    let removed = store.cleanup(ttl)?;
    let report = store.reconcile()?;
    println!(
        "Removed {removed} expired files, {} orphan blobs ({} dangling rows left)",
        report.orphan_blobs_removed, report.dangling_rows
    );
    Ok(())
}
