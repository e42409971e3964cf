//! festconnect - command-line front end for the FestConnect store
//!
//! Inspects and edits the local store the app keeps: profile, festivals,
//! connections, scanned contacts, and the one-time legacy import.
//! Results are printed as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use festconnect_core::config::{resolve_data_folder, StoreConfig, StoreLocation, LEGACY_FILE};
use festconnect_core::db::models::{FestivalId, NewFestival, ProfileData, ScannedContact};
use festconnect_core::db::open;
use festconnect_core::legacy::{migrate_legacy, JsonFileLegacyStore, MigrationOutcome};
use festconnect_core::{ScanOutcome, Session};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "festconnect")]
#[command(about = "Local contact store for festival connections")]
#[command(version)]
struct Args {
    /// Data folder holding the database and the legacy file
    #[arg(short, long, global = true, env = "FESTCONNECT_DATA_DIR")]
    data_dir: Option<String>,

    /// Run without persistent storage
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Store(StoreCommand),

    /// Import data left by older builds
    Migrate,
}

/// Commands served through an initialized session
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Profile of the current festival
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Festival management
    #[command(subcommand)]
    Festival(FestivalCommand),

    /// Connections of the current festival
    #[command(subcommand)]
    Connections(ConnectionsCommand),

    /// Record a scanned contact payload (JSON)
    Scan { payload: String },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    Set {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        festival: String,
        #[arg(long)]
        whatsapp: Option<String>,
        #[arg(long)]
        instagram: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum FestivalCommand {
    List,
    Current,
    Create {
        name: String,
        #[arg(long)]
        year: Option<i32>,
        /// Make the new festival the current one
        #[arg(long)]
        activate: bool,
    },
    Switch { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ConnectionsCommand {
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting festconnect v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let data_dir = resolve_data_folder(args.data_dir.as_deref());
    let config = if args.headless {
        StoreConfig::headless()
    } else {
        StoreConfig::in_folder(&data_dir)
    };
    info!("Data folder: {}", data_dir.display());

    match args.command {
        Command::Migrate => migrate(&config.location, data_dir.join(LEGACY_FILE)).await,
        Command::Store(command) => {
            let legacy = JsonFileLegacyStore::new(data_dir.join(LEGACY_FILE));
            let session = Session::new(config).with_legacy(Arc::new(legacy));
            session.init().await.context("Failed to open store")?;
            run(&session, command).await
        }
    }
}

async fn run(session: &Session, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Profile(ProfileCommand::Show) => print(&session.get_profile().await?),
        StoreCommand::Profile(ProfileCommand::Set {
            name,
            festival,
            whatsapp,
            instagram,
        }) => {
            let data = ProfileData {
                name,
                festival,
                whatsapp,
                instagram,
            };
            match session.save_profile(&data).await? {
                Some(profile) => print(&profile),
                None => bail!("Profile not saved: no persistent storage"),
            }
        }
        StoreCommand::Festival(FestivalCommand::List) => print(&session.list_festivals().await?),
        StoreCommand::Festival(FestivalCommand::Current) => {
            print(&session.get_current_festival().await?)
        }
        StoreCommand::Festival(FestivalCommand::Create {
            name,
            year,
            activate,
        }) => {
            let draft = NewFestival {
                name,
                year,
                is_active: activate,
            };
            let id = session.create_festival(&draft).await?;
            print(&json!({ "id": id }))
        }
        StoreCommand::Festival(FestivalCommand::Switch { id }) => {
            session.switch_festival(FestivalId(id)).await?;
            print(&session.get_current_festival().await?)
        }
        StoreCommand::Connections(ConnectionsCommand::List) => {
            print(&session.get_connections().await?)
        }
        StoreCommand::Scan { payload } => {
            let scanned: ScannedContact =
                serde_json::from_str(&payload).context("Invalid scan payload")?;
            match session.add_scanned_connection(scanned, payload).await? {
                ScanOutcome::Added(id) => print(&json!({ "added": id })),
                ScanOutcome::Duplicate { name } => print(&json!({ "duplicate": name })),
            }
        }
    }
}

/// Run the legacy import directly and report what it did
async fn migrate(location: &StoreLocation, legacy_path: PathBuf) -> Result<()> {
    let store = open(location).await.context("Failed to open store")?;
    let legacy = JsonFileLegacyStore::new(legacy_path);

    let report = match migrate_legacy(&store, &legacy).await? {
        MigrationOutcome::NothingToMigrate => json!({ "outcome": "nothingToMigrate" }),
        MigrationOutcome::Migrated {
            festival_id,
            connections,
            profile,
        } => json!({
            "outcome": "migrated",
            "festivalId": festival_id,
            "connections": connections,
            "profile": profile,
        }),
        MigrationOutcome::AlreadyImported { festival_id } => json!({
            "outcome": "alreadyImported",
            "festivalId": festival_id,
        }),
    };
    store.close().await;
    print(&report)
}

fn print<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate() {
        let args = Args::try_parse_from(["festconnect", "migrate"]).unwrap();
        assert!(matches!(args.command, Command::Migrate));

        let args = Args::try_parse_from(["festconnect", "festival", "switch", "3"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Store(StoreCommand::Festival(FestivalCommand::Switch { id: 3 }))
        ));
    }

    #[test]
    fn test_parse_scan() {
        let args = Args::try_parse_from([
            "festconnect",
            "--data-dir",
            "/tmp/fc",
            "scan",
            r#"{"name":"Sam"}"#,
        ])
        .unwrap();
        assert_eq!(args.data_dir.as_deref(), Some("/tmp/fc"));
        assert!(matches!(
            args.command,
            Command::Store(StoreCommand::Scan { .. })
        ));
    }
}
