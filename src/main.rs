use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use murmur::{Config, FormatMigrator, LocalFileStore, NoteRepository, PromotionPipeline, TempArtifactStore};

#[derive(Parser)]
#[command(name = "murmur", about = "Local voice note store maintenance")]
struct Cli {
    /// Config file (without extension), e.g. config/murmur
    #[arg(long, default_value = "config/murmur")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List committed notes, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Search notes by title or transcript
    Search { query: String },
    /// Delete a note (audio bytes first, then the row)
    Delete { id: String },
    /// Count notes stored in a legacy audio format
    ScanLegacy,
    /// Re-encode legacy audio to the canonical format
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config);
    info!("{} starting (data dir: {})", cfg.service.name, cfg.storage.data_dir);

    let files = Arc::new(LocalFileStore::new(&cfg.storage.data_dir));
    let repo = Arc::new(NoteRepository::open(
        PathBuf::from(&cfg.storage.data_dir).join(&cfg.storage.database_file),
    )?);
    let temp = Arc::new(TempArtifactStore::new(files.clone()));

    // Startup sweep: reclaim temp recordings abandoned by earlier runs
    let max_age = Duration::seconds(cfg.storage.temp_max_age_secs as i64);
    temp.sweep_abandoned(max_age).await?;

    match cli.command {
        Command::List { json } => {
            let notes = repo.get_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
            } else {
                for note in notes {
                    println!(
                        "{}  {:>7.1}s  [{}]  {}",
                        note.created_at.format("%Y-%m-%d %H:%M"),
                        note.duration_secs,
                        note.transcription_status.as_str(),
                        note.title
                    );
                }
            }
        }
        Command::Search { query } => {
            for note in repo.search(&query)? {
                println!("{}  {}", note.id, note.title);
            }
        }
        Command::Delete { id } => {
            let promoter = PromotionPipeline::new(files.clone(), temp.clone(), repo.clone());
            promoter.remove(&id).await?;
            println!("Deleted note {id}");
        }
        Command::ScanLegacy => {
            let migrator = FormatMigrator::new(repo.clone(), files.clone());
            let count = migrator.scan_for_legacy_audio().await?;
            println!("{count} note(s) stored in a legacy format");
        }
        Command::Migrate => {
            let migrator = FormatMigrator::new(repo.clone(), files.clone());
            let report = migrator
                .migrate_all(|progress| {
                    println!(
                        "[{}/{}] {}",
                        progress.completed, progress.total, progress.current_title
                    );
                    true
                })
                .await?;
            println!(
                "Migration complete: {} succeeded, {} failed",
                report.succeeded.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  {}: {}", failure.note_id, failure.reason);
            }
        }
    }

    Ok(())
}
