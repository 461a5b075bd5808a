//! Cloud File Storage CLI: manage a user's files in an S3-compatible bucket
//!
//! Usage:
//!   cfs-cli check                         Verify bucket access
//!   cfs-cli ls [folder]                   List a folder
//!   cfs-cli mkdir <name> [parent]         Create a folder
//!   cfs-cli put <local> [folder]          Upload a file
//!   cfs-cli get <path> [local]            Download a file
//!   cfs-cli zip <folder> [local]          Download a folder as zip
//!   cfs-cli rm <path>                     Delete a file or folder
//!   cfs-cli mv <path> <new-name>          Rename a file or folder
//!   cfs-cli search <query>                Search by name

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use cloud_file_storage::config::{self, StorageConfig};
use cloud_file_storage::path::{self as vpath, UserId};
use cloud_file_storage::store::{S3Config, S3Store};
use cloud_file_storage::{FileStorageService, ListingEntry};

#[derive(Parser)]
#[command(
    name = "cfs-cli",
    about = "Cloud File Storage CLI: per-user folders on S3-compatible storage",
    version,
    long_about = "Credentials and bucket come from the config file and may be overridden with\nAWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION, CFS_BUCKET and CFS_S3_ENDPOINT."
)]
struct Cli {
    /// Config file (default: <config dir>/cloud-file-storage/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Id of the user whose files are addressed
    #[arg(short, long, global = true, default_value_t = 1)]
    user: UserId,

    /// Print debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify that the bucket is reachable with the configured credentials
    Check,
    /// List a folder
    Ls {
        /// Folder path (default: /)
        #[arg(default_value = "/")]
        folder: String,
    },
    /// Create a folder
    Mkdir {
        /// Name of the new folder
        name: String,
        /// Parent folder (default: /)
        #[arg(default_value = "/")]
        parent: String,
    },
    /// Upload a local file
    Put {
        /// Local file path
        local: PathBuf,
        /// Destination folder (default: /)
        #[arg(default_value = "/")]
        folder: String,
        /// Name in the destination folder (default: local file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file
    Get {
        /// File path
        path: String,
        /// Local destination (default: file name)
        local: Option<PathBuf>,
    },
    /// Download a folder as a zip archive
    Zip {
        /// Folder path
        folder: String,
        /// Local destination (default: <folder>-<timestamp>.zip)
        local: Option<PathBuf>,
    },
    /// Delete a file or a folder with everything in it
    Rm {
        /// File or folder path
        path: String,
    },
    /// Rename a file or folder
    Mv {
        /// File or folder path
        path: String,
        /// New name (leaf only)
        new_name: String,
    },
    /// Search files and folders by name
    Search {
        /// Case-insensitive part of the name
        query: String,
    },
}

fn load_storage_config(path: Option<&Path>) -> anyhow::Result<StorageConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config::apply_env_overrides(&mut config);
    config::validate_config(&config)?;
    Ok(config)
}

fn print_entries(entries: &[ListingEntry]) {
    for entry in entries {
        if entry.is_folder {
            println!("{:<40} {}", entry.display_name(), entry.path);
        } else {
            println!("{:<40} {}", entry.name, entry.path);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_storage_config(cli.config.as_deref())?;
    let store = S3Store::new(S3Config::from_storage_config(&config)?, config.retry.clone())?;

    if let Commands::Check = cli.command {
        store.verify_bucket().await?;
        println!("Bucket '{}' is reachable", config.bucket);
        return Ok(());
    }

    let service = FileStorageService::new(Arc::new(store), config.codec())
        .with_compression_level(config.zip_compression_level);
    let user = cli.user;

    match cli.command {
        Commands::Check => {}
        Commands::Ls { folder } => {
            let trail: Vec<String> = vpath::breadcrumbs(&folder)
                .into_iter()
                .map(|crumb| crumb.name)
                .collect();
            println!("{}", trail.join(" > "));
            println!();
            let entries = service.list(user, &folder).await?;
            if entries.is_empty() {
                println!("(empty)");
            }
            print_entries(&entries);
        }
        Commands::Mkdir { name, parent } => {
            service.create_folder(user, &name, &parent).await?;
            println!("Created {}{}/", parent, name);
        }
        Commands::Put { local, folder, name } => {
            let file_name = match name {
                Some(name) => name,
                None => match local.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => bail!("Cannot derive a file name from {}", local.display()),
                },
            };
            let file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("Failed to open {}", local.display()))?;
            let size = file.metadata().await?.len();
            let content_type = mime_guess::from_path(&local).first_or_octet_stream();

            service
                .upload(user, &file_name, file, size, content_type.essence_str(), &folder)
                .await?;
            println!("Uploaded {} → {}{} ({} bytes)", local.display(), folder, file_name, size);
        }
        Commands::Get { path, local } => {
            let data = service.download_file(user, &path).await?;
            let local = local.unwrap_or_else(|| PathBuf::from(vpath::leaf_name(&path)));
            tokio::fs::write(&local, &data)
                .await
                .with_context(|| format!("Failed to write {}", local.display()))?;
            println!("Downloaded {} → {} ({} bytes)", path, local.display(), data.len());
        }
        Commands::Zip { folder, local } => {
            let data = service.download_folder_as_zip(user, &folder).await?;
            let local = local
                .unwrap_or_else(|| PathBuf::from(vpath::zip_file_name(&folder, chrono::Utc::now())));
            tokio::fs::write(&local, &data)
                .await
                .with_context(|| format!("Failed to write {}", local.display()))?;
            println!("Downloaded {} → {} ({} bytes)", folder, local.display(), data.len());
        }
        Commands::Rm { path } => {
            service.delete(user, &path).await?;
            println!("Deleted {}", path);
        }
        Commands::Mv { path, new_name } => {
            service.rename(user, &new_name, &path).await?;
            println!("Renamed {} → {}", path, vpath::renamed_path(&path, &new_name));
        }
        Commands::Search { query } => {
            let found = service.search(user, &query).await?;
            if found.is_empty() {
                println!("No matches for '{}'", query);
            }
            print_entries(&found);
        }
    }

    Ok(())
}
