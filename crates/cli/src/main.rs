//! Policy Agent CLI, the main entry point.
//!
//! Commands:
//! - `chat`     Interactive chat with named sessions (default)
//! - `ask`      Send a single message and print the answer
//! - `doctor`   Diagnose configuration and credentials
//! - `tools`    List the available tools
//! - `config`   Show the configuration

use clap::{Parser, Subcommand};
use policy_agent_config::AppConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod commands;
mod render;
mod sessions;

#[derive(Parser)]
#[command(
    name = "policy-agent",
    about = "Policy Agent: policy search, business translation and email assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.policy-agent/config.toml)
    #[arg(short, long, global = true, env = "POLICY_AGENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant interactively
    Chat,

    /// Send a single message instead of entering interactive mode
    Ask {
        #[arg(short, long)]
        message: String,
    },

    /// Diagnose configuration and credentials
    Doctor,

    /// List the tools the assistant can call
    Tools,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the loaded configuration with secrets masked
    Show,
    /// Print the default configuration file
    Defaults,
    /// Print the default config file path
    Path,
}

/// Load the `.env` file, then parse the arguments, so `.env` can also set
/// `POLICY_AGENT_CONFIG`. `None` searches the current directory and its parents.
fn load_env_then_parse<I, T>(
    dotenv_path: Option<&Path>,
    args: I,
) -> Result<(Cli, Result<(), dotenvy::Error>), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let dotenv = match dotenv_path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    let cli = Cli::try_parse_from(args)?;
    Ok((cli, dotenv))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let (cli, dotenv) = match load_env_then_parse(None, std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    // Initialize tracing on stderr so logs stay out of the transcript
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // A missing .env is fine; values may come from the real environment.
    if let Err(e) = dotenv {
        tracing::debug!("No .env loaded: {e}");
    }

    let config_path = cli
        .config
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let config = AppConfig::load_with(&config_path, |key| std::env::var(key).ok())?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::agent::chat(&config).await?,
        Commands::Ask { message } => return commands::agent::ask(&config, message).await,
        Commands::Doctor => commands::doctor::run(&config_path, &config),
        Commands::Tools => commands::tools::run(&config)?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Defaults) {
            ConfigAction::Show => commands::config_cmd::show(&config)?,
            ConfigAction::Defaults => commands::config_cmd::defaults(),
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(ExitCode::SUCCESS)
}
