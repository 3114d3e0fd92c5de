//! Command-line front end over the Jensen session and operations manager.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use jensen::config::JensenConfig;
use jensen::ops::OperationsManager;
use jensen::session::Session;

#[derive(Parser, Debug)]
#[command(name = "jensen-cli", about = "Talk to a Jensen USB voice recorder")]
struct Args {
    /// Path to a JSON config file. Falls back to defaults if absent.
    #[arg(long, default_value = "jensen.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print device identity and firmware version.
    Info,
    /// List files on the device's storage.
    List,
    /// Download one file to the configured download directory.
    Download {
        filename: String,
    },
    /// Delete one file from the device.
    Delete {
        filename: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = JensenConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let session = Arc::new(
        Session::connect(config.device_serial.as_deref())
            .await
            .context("connecting to device")?,
    );
    info!("connected to {}", session.profile().model);

    match args.command {
        Command::Info => run_info(&session).await,
        Command::List => run_list(&session).await,
        Command::Download { filename } => run_download(session, config, filename).await,
        Command::Delete { filename } => run_delete(&session, filename).await,
    }
}

async fn run_info(session: &Session) -> Result<()> {
    let info = session.get_device_info().await?;
    println!("model:    {}", session.profile().model);
    println!("firmware: {}", info.version_number);
    println!("serial:   {}", info.serial_number);
    Ok(())
}

async fn run_list(session: &Session) -> Result<()> {
    let entries = session.list_files().await?;
    for entry in &entries {
        println!("{}\t{} bytes", entry.filename, entry.size_bytes);
    }
    println!("{} file(s)", entries.len());
    Ok(())
}

async fn run_download(session: Arc<Session>, config: JensenConfig, filename: String) -> Result<()> {
    std::fs::create_dir_all(&config.download_dir).context("creating download directory")?;

    let entries = session.list_files().await?;
    let manager = OperationsManager::new(session.clone(), config.worker_count, config.download_dir.clone());
    manager.ingest_file_list(&entries);

    let mut progress = manager.subscribe();
    let op_id = manager.queue_download(&filename);

    while let Ok(event) = progress.recv().await {
        if event.op_id != op_id {
            continue;
        }
        println!("{:?} {}/{:?}", event.status, event.bytes_done, event.bytes_total);
        if event.is_terminal() {
            break;
        }
    }

    Ok(())
}

async fn run_delete(session: &Session, filename: String) -> Result<()> {
    let outcome = session.delete_file(&filename).await?;
    println!("{outcome:?}");
    Ok(())
}
