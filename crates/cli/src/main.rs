mod check;
mod client;
mod dades_personals;
mod fix_tutor_data;
mod import_csv;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "entrevistes", about = "Entrevistes maintenance CLI - imports, checks and data repair")]
struct Cli {
    /// Base URL of the Entrevistes server
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    server: String,

    /// Bearer token sent to the server (an email when auth is disabled)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server and its database answer
    Check,

    /// Import personal and family data from the school export CSV
    ImportDadesPersonals {
        /// Path to the CSV file
        csv: PathBuf,
    },

    /// Import personal tutorships from a CSV
    ImportTutories {
        /// Path to the CSV file
        csv: PathBuf,

        /// Academic year for rows with a blank or level-only anyCurs, e.g. 2025-2026
        #[arg(long)]
        any_curs: String,
    },

    /// Import tutor-to-student assignments from a CSV
    ImportAssignacions {
        /// Path to the CSV file
        csv: PathBuf,
    },

    /// Spread the distinct family contact sets over students with personal data
    FixTutorData {
        /// PostgreSQL connection URL
        #[arg(long)]
        database_url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entrevistes=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check => match ApiClient::new(&cli.server, cli.token) {
            Ok(client) => check::run_check(&client).await,
            Err(e) => Err(e),
        },
        Commands::ImportDadesPersonals { csv } => match ApiClient::new(&cli.server, cli.token) {
            Ok(client) => dades_personals::run_import(&client, &csv).await,
            Err(e) => Err(e),
        },
        Commands::ImportTutories { csv, any_curs } => match ApiClient::new(&cli.server, cli.token) {
            Ok(client) => import_csv::run_import_tutories(&client, &csv, &any_curs).await,
            Err(e) => Err(e),
        },
        Commands::ImportAssignacions { csv } => match ApiClient::new(&cli.server, cli.token) {
            Ok(client) => import_csv::run_import_assignacions(&client, &csv).await,
            Err(e) => Err(e),
        },
        Commands::FixTutorData { database_url } => fix_tutor_data::run_fix(&database_url).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
