// Crawlmark operator CLI
//
// Decision: Use clap derive for argument parsing, like the other workspace CLIs.
// Decision: Runtime parameters come from HarvestConfig (environment + .env), not flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crawlmark_harvester::persistence::{MarkingStore, PostgresMarkingStore};
use crawlmark_harvester::requirement::Requirement;
use crawlmark_harvester::{seed, telemetry, HarvestConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "crawlmark")]
#[command(about = "Crawlmark - manage marking tables for the scraping requirements")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SeedTarget {
    /// Personage URLs into the marking table
    Persons,
    /// Subject URLs into the subject_marking table
    Subjects,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Insert markings from a file of catalogue URLs, skipping existing ones
    Seed {
        /// Which marking table to fill
        #[arg(value_enum)]
        target: SeedTarget,

        /// File with one URL per line
        file: PathBuf,
    },

    /// Show stored record counts per requirement
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("crawlmark_harvester=info,crawlmark=info")?;

    let cli = Cli::parse();
    let config = HarvestConfig::load()?;
    let store = PostgresMarkingStore::connect(config.require_database_url()?).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            info!("Migrations applied");
        }
        Commands::Seed { target, file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let inserted = match target {
                SeedTarget::Persons => {
                    store
                        .seed_markings(seed::person_ids_from_urls(&text))
                        .await?
                }
                SeedTarget::Subjects => {
                    store
                        .seed_subject_markings(seed::subjects_from_urls(&text))
                        .await?
                }
            };
            info!(inserted, file = %file.display(), "Seeding finished");
        }
        Commands::Status => {
            for requirement in Requirement::ALL {
                let count = store.count_records(requirement).await?;
                println!("{:<14} {:>10}", requirement.column(), count);
            }
        }
    }

    Ok(())
}
