//! drive_fetch CLI - List and fetch tabular files from a Drive folder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drive_fetch::{DriveClient, DriveConfig};

/// CLI tool for retrieving tabular files from a Google Drive folder.
#[derive(Parser)]
#[command(name = "drive_fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing credentials.json; the token cache is kept there too.
    #[arg(long, env = "DRIVE_CREDENTIALS_DIR")]
    credentials_dir: PathBuf,

    /// Id of the Drive folder to operate on.
    #[arg(long, env = "DRIVE_FOLDER_ID")]
    folder: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in the folder.
    List,

    /// Download a file by id and print it as a table.
    Fetch {
        /// Id of the file to fetch.
        file_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = DriveConfig::new(&cli.credentials_dir, &cli.folder);
    let client = DriveClient::new(config);

    match cli.command {
        Commands::List => {
            let files = client
                .list_files()
                .await
                .with_context(|| format!("Failed to list files in folder: {}", cli.folder))?;

            if files.is_empty() {
                println!("No files found.");
            } else {
                let mut entries: Vec<_> = files.into_iter().collect();
                entries.sort();
                println!("{:<40} {}", "NAME", "ID");
                println!("{}", "-".repeat(80));
                for (name, id) in entries {
                    println!("{:<40} {}", name, id);
                }
            }
        }

        Commands::Fetch { file_id } => {
            let table = client
                .get_file(&file_id)
                .await
                .with_context(|| format!("Failed to fetch file: {}", file_id))?;

            let (rows, columns) = table.shape();
            print!("{}", table);
            eprintln!("{} rows x {} columns", rows, columns);
        }
    }

    Ok(())
}
