use anyhow::Context;
use clap::{Parser, Subcommand};
use dropvault::config::AppConfig;
use dropvault::logging::init_logging;
use dropvault::service::{ResourceService, ServiceError};
use dropvault::sync::index::ResourceRecord;

/// Offline mirror of a WebDAV tree.
#[derive(Debug, Parser)]
#[command(name = "dropvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Discard the local mirror and rebuild it from the server
    Sync,
    /// List the children of a resource (the root by default)
    Ls {
        identifier: Option<String>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the local cache path of a resource
    Path { identifier: String },
    /// Remove a resource and everything below it from the mirror
    Rm { identifier: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::from_env()?;
    let service = ResourceService::open(&config)
        .await
        .with_context(|| format!("failed to open index at {:?}", config.db_path))?;

    run(cli.command, &service).await.map_err(|err| {
        let auth = err
            .downcast_ref::<ServiceError>()
            .is_some_and(ServiceError::is_auth);
        if auth {
            err.context("authentication failed, check DROPVAULT_USERNAME and DROPVAULT_PASSWORD")
        } else {
            err
        }
    })
}

async fn run(command: Command, service: &ResourceService) -> anyhow::Result<()> {
    match command {
        Command::Sync => {
            let report = service.sync().await?;
            println!(
                "synced {} folders, {} files ({} bytes)",
                report.folders, report.files, report.bytes
            );
        }
        Command::Ls { identifier, json } => {
            let resource = lookup(service, identifier.as_deref()).await?;
            let children = service.get_children(&resource).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&children)?);
            } else {
                for child in &children {
                    println!("{}", format_entry(child));
                }
            }
        }
        Command::Path { identifier } => {
            let resource = lookup(service, Some(&identifier)).await?;
            println!("{}", service.get_file(&resource).await?.display());
        }
        Command::Rm { identifier } => {
            let resource = lookup(service, Some(&identifier)).await?;
            let removed = service.delete(&resource).await?;
            println!("removed {removed} entries");
        }
    }
    Ok(())
}

async fn lookup(
    service: &ResourceService,
    identifier: Option<&str>,
) -> anyhow::Result<ResourceRecord> {
    match identifier {
        Some(identifier) => service
            .get_resource(identifier)
            .await?
            .with_context(|| format!("unknown resource: {identifier}")),
        None => service
            .get_root()
            .await?
            .context("nothing synchronized yet, run `dropvault sync` first"),
    }
}

fn format_entry(record: &ResourceRecord) -> String {
    if record.is_file() {
        let size = record
            .size
            .map(|size| size.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{size:>12}  {}  {}", record.name, record.identifier)
    } else {
        format!("{:>12}  {}/  {}", "dir", record.name, record.identifier)
    }
}
