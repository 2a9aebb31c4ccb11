mod cmd_analyze;
mod cmd_chat;
mod cmd_recall;
mod cmd_serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitpulse_core::config::{Config, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "gitpulse", version, about = "Chat with a GitHub repository and score its health")]
struct Cli {
    /// Config file (default: ./gitpulse.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Analyze a repository, draft contributor emails and store the campaign
    Analyze {
        owner: String,
        repo: String,
        /// Directory for the analysis report (overrides config)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Chat about a repository with a running server, one question per line
    Chat {
        owner: String,
        repo: String,
        /// Chat endpoint (default: http://{bind}:{port}/api/chat from config)
        #[arg(long)]
        url: Option<String>,
    },
    /// Print a stored campaign record
    Recall {
        /// Campaign key, e.g. acme-widget-1717243200000
        key: Option<String>,
        /// List stored keys instead
        #[arg(long)]
        list: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gitpulse=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = Config::load_with_env(&config_path)?;

    match cli.cmd {
        Command::Serve { bind, port } => cmd_serve::execute(config, bind, port),
        Command::Analyze {
            owner,
            repo,
            output_dir,
        } => cmd_analyze::execute(config, &owner, &repo, output_dir),
        Command::Chat { owner, repo, url } => cmd_chat::execute(&config, &owner, &repo, url),
        Command::Recall { key, list } => cmd_recall::execute(&config, key.as_deref(), list),
    }
}
