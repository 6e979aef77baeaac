mod commands;
mod error;

use crate::error::{ErrorKind, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;
use veil_config::{Config, Loader};
use veil_store::{EntityId, EntityType, UserId};

#[derive(Parser, Debug)]
#[command(name = "veil", version, about = "Per-user visibility exclusions for a media library")]
struct Cli {
    /// Read configuration from this file instead of the platform config directory.
    #[arg(short, long, env = "VEIL_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Override the configured database path.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild exclusion sets from scratch.
    Recompute {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        user: Option<UserId>,
        #[arg(long)]
        all: bool,
    },
    /// Signal that the library sync finished.
    SyncComplete,
    /// Signal that a user's content restrictions changed.
    RestrictionChanged {
        #[arg(long)]
        user: UserId,
    },
    /// Hide an entity for a user.
    Hide(Target),
    /// Unhide an entity for a user and run the queued recompute.
    Unhide {
        #[command(flatten)]
        target: Target,
        /// Only queue the recompute; leave it to a running worker.
        #[arg(long)]
        no_drain: bool,
    },
    /// List what a user can see.
    List(ListArgs),
    /// How many entities of a type a user can see.
    Count {
        #[arg(long)]
        user: UserId,
        #[arg(long = "type", value_parser = parse_entity_type)]
        entity_type: EntityType,
    },
    /// Exclusion-table size per user and per type, and pending recomputes.
    Report,
    /// Drain deferred recomputes until interrupted.
    Worker,
}

#[derive(Args, Debug)]
struct Target {
    #[arg(long)]
    user: UserId,
    #[arg(long = "type", value_parser = parse_entity_type)]
    entity_type: EntityType,
    #[arg(long)]
    id: EntityId,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    user: UserId,
    #[arg(long = "type", value_parser = parse_entity_type)]
    entity_type: EntityType,
    /// Case-insensitive substring of the name or title.
    #[arg(long)]
    query: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = veil_query::DEFAULT_PAGE_SIZE)]
    page_size: u32,
    #[arg(long, value_enum, default_value_t = SortArg::Id)]
    sort: SortArg,
    #[arg(long)]
    desc: bool,
    /// Print ids only.
    #[arg(long)]
    ids: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Id,
    Name,
    Created,
}

fn parse_entity_type(value: &str) -> std::result::Result<EntityType, String> {
    value.parse().map_err(|_| format!("unknown entity type: {value}"))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut loader = Loader::default();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let mut config = loader.load().or_raise(|| ErrorKind::Config)?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    init_tracing(&config);
    match commands::run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "command failed");
            ExitCode::FAILURE
        },
    }
}
