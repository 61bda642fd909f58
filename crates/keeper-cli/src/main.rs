//! Keeper CLI - sign in to the backend and use the session from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use keeper_config::{init_logging, Config, Paths};
use tracing::debug;

/// Keeper CLI - manage a role-gated backend session.
#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Sign in, inspect and use a backend session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with username and password
    Login {
        /// Username (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Logout and clear the saved session
    Logout,

    /// Show the saved session, validating it against the backend
    Status,

    /// Show the signed-in user's profile
    Whoami,

    /// Send an authenticated request
    Request {
        /// HTTP method
        method: keeper::Method,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Hold the session open interactively; each input line counts as activity
    Watch,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging("keeper-cli", level, Some(paths.log_file()));
    debug!(api_url = %config.api_url, "Configuration loaded");

    let ctx = keeper::SessionContext::from_config(&config, &paths)?;
    let format = cli.format;

    match cli.command {
        Commands::Login { username } => commands::login(&ctx, username, &format).await,
        Commands::Logout => commands::logout(&ctx, &format).await,
        Commands::Status => commands::status(&ctx, &format).await,
        Commands::Whoami => commands::whoami(&ctx, &format).await,
        Commands::Request {
            method,
            path,
            data,
            query,
        } => commands::request(&ctx, method, &path, data.as_deref(), query, &format).await,
        Commands::Watch => commands::watch(&ctx, &format).await,
    }
}
