use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gator::commands::{self, current_user, State};
use gator::config::Config;
use gator::database;

#[derive(Parser)]
#[command(name = "gator", version, about = "Personal RSS feed aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new user and set it as the current user
    Register { name: String },
    /// Set the current user
    Login { name: String },
    /// Remove all users, along with their feeds, follows and posts
    Reset,
    /// List all users
    Users,
    /// Run the feed aggregator, fetching one feed per tick (e.g. "1m", "30s")
    Agg { interval: String },
    /// Add a feed and follow it as the current user
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds followed by the current user
    Following,
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// Show recent posts from followed feeds
    Browse { limit: Option<i64> },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Argument errors exit with the same code as handler errors.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::read()?;
    let db = database::get_db_pool(&config.db_url).await?;
    let mut state = State { db, config };

    dispatch(&mut state, cli.command).await
}

/// Map each command to its handler. Commands acting on behalf of a user
/// resolve the configured current user first and pass it along.
async fn dispatch(state: &mut State, command: Command) -> Result<()> {
    match command {
        Command::Register { name } => commands::register(state, &name).await,
        Command::Login { name } => commands::login(state, &name).await,
        Command::Reset => commands::reset(state).await,
        Command::Users => commands::users(state).await,
        Command::Agg { interval } => commands::agg(state, &interval).await,
        Command::Addfeed { name, url } => {
            let user = current_user(state).await?;
            commands::addfeed(state, user, &name, &url).await
        }
        Command::Feeds => commands::feeds(state).await,
        Command::Follow { url } => {
            let user = current_user(state).await?;
            commands::follow(state, user, &url).await
        }
        Command::Following => commands::following(state).await,
        Command::Unfollow { url } => {
            let user = current_user(state).await?;
            commands::unfollow(state, user, &url).await
        }
        Command::Browse { limit } => {
            let user = current_user(state).await?;
            commands::browse(state, user, limit).await
        }
    }
}
