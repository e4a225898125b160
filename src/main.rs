//! interview - command-line client for a running interview server

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use interview_room::client::{self, commands};
use interview_room::config::Config;
use interview_room::external::FixedIdentity;
use interview_room::session::Identity;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "interview")]
#[command(about = "Schedule, join and run live coding interviews")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server instance name
    #[arg(short, long, default_value = "default")]
    server: String,

    /// Identity to act as (defaults to the config, then $USER)
    #[arg(long = "as")]
    identity: Option<String>,

    /// Display name shown to other participants
    #[arg(long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a new interview
    Schedule {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Start time (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Invite a candidate (repeatable)
        #[arg(short, long)]
        invite: Vec<String>,
    },
    /// List interviews you host or are invited to
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Join an interview and follow it live
    Watch { call_id: String },
    /// Post a chat message
    Say { call_id: String, text: String },
    /// Change the shared question, language or code
    Code {
        call_id: String,

        #[arg(short, long)]
        question: Option<String>,

        #[arg(short, long)]
        language: Option<String>,

        /// Replace the code with the contents of this file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// End an interview you host
    End { call_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let identity = cli
        .identity
        .or_else(|| config.general.identity.clone())
        .or_else(|| std::env::var("USER").ok())
        .map(Identity::new);
    let display_name = cli.name.or_else(|| config.general.display_name.clone());

    let mut client = client::connect_or_spawn(
        &config,
        &cli.server,
        &FixedIdentity(identity),
        display_name,
    )
    .await?;

    match cli.command {
        Commands::Schedule {
            title,
            description,
            start,
            invite,
        } => {
            commands::schedule(
                &mut client,
                commands::ScheduleArgs {
                    title,
                    description,
                    start,
                    invite,
                },
            )
            .await
        }
        Commands::List { json } => commands::list(&mut client, json).await,
        Commands::Watch { call_id } => commands::watch(client, &call_id).await,
        Commands::Say { call_id, text } => commands::say(client, &call_id, &text).await,
        Commands::Code {
            call_id,
            question,
            language,
            file,
        } => {
            commands::code(
                client,
                &call_id,
                commands::CodeArgs {
                    question,
                    language,
                    file,
                },
            )
            .await
        }
        Commands::End { call_id } => commands::end(client, &call_id).await,
    }
}
