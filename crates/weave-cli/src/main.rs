mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    agent::AgentSubcommand, analytics::AnalyticsSubcommand, config::ConfigSubcommand,
    message::MessageSubcommand, state::StateSubcommand, work::WorkSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "weave",
    about = "Agent coordination store with a shared field coherence engine",
    version,
    propagate_version = true
)]
struct Cli {
    /// Weave root (default: nearest ancestor holding .weave/, else cwd)
    #[arg(long, global = true, env = "WEAVE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .weave/ with a default config and an empty store
    Init,

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Register and inspect agents
    Agent {
        #[command(subcommand)]
        subcommand: AgentSubcommand,
    },

    /// Send and read messages
    Message {
        #[command(subcommand)]
        subcommand: MessageSubcommand,
    },

    /// Shared key/value state
    State {
        #[command(subcommand)]
        subcommand: StateSubcommand,
    },

    /// Manage work items and their transitions
    Work {
        #[command(subcommand)]
        subcommand: WorkSubcommand,
    },

    /// Current field coherence and quality
    Field,

    /// Transition and message rollups
    Analytics {
        #[command(subcommand)]
        subcommand: AnalyticsSubcommand,
    },

    /// Agents, recent activity, open work and field state in one view
    Dashboard,

    /// Demote inactive agents and prune old messages once
    Cleanup,

    /// Run cleanup periodically until interrupted
    Maintain {
        /// Override the configured interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Maintain { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Agent { subcommand } => cmd::agent::run(&root, subcommand, cli.json),
        Commands::Message { subcommand } => cmd::message::run(&root, subcommand, cli.json),
        Commands::State { subcommand } => cmd::state::run(&root, subcommand, cli.json),
        Commands::Work { subcommand } => cmd::work::run(&root, subcommand, cli.json),
        Commands::Field => cmd::field::run(&root, cli.json),
        Commands::Analytics { subcommand } => cmd::analytics::run(&root, subcommand, cli.json),
        Commands::Dashboard => cmd::dashboard::run(&root, cli.json),
        Commands::Cleanup => cmd::cleanup::run(&root, cli.json),
        Commands::Maintain { interval } => cmd::maintain::run(&root, interval),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
