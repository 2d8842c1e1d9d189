use clap::{Parser, Subcommand};
use spike::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spike")]
#[command(about = "Collect social media posts into rotating batch files", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect from the configured source until it is exhausted or stopped
    Run,
    /// Mirror rotated files into object storage
    Archive {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented starter config
    Init {
        #[arg(long)]
        stdout: bool,
    },
    /// Load and validate the config without starting anything
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spike=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            spike::cli::run::run(config_path).await?;
        }
        Some(Commands::Archive { once }) => {
            spike::cli::archive::archive(config_path, once).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                spike::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                spike::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
