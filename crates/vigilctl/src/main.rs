//! Vigil Control - operator CLI for the vigild daemon.
//!
//! Every subcommand is one RPC round-trip over the daemon's Unix socket.

mod commands;
mod rpc_client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use vigil_common::claim::ClaimType;
use vigil_common::error::VigilError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vigilctl")]
#[command(about = "Vigil - curiosity safety control core", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Socket path (default: $VIGILD_SOCKET, then /run/vigil/vigil.sock)
    #[arg(long, global = true)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,

    /// Show every breaker in the bank
    Breakers,

    /// Trip a breaker by hand
    ForceOpen { breaker: String },

    /// Close a breaker by hand, bypassing half-open trials
    ForceClose { breaker: String },

    /// Acknowledge and close a breaker that does not auto-recover
    Acknowledge { breaker: String },

    /// Show the scheduler's tick state
    TickState,

    /// Clear the current period's grounding budget counters for one tool
    ResetBudget { tool: String },

    /// Queue a claim for review against a prior belief
    Submit {
        /// Belief key the claim bears on (e.g. "deploy.region")
        #[arg(long)]
        belief: String,

        /// The prior belief text the claim is scored against
        #[arg(long)]
        premise: String,

        /// The claim text
        text: String,

        /// Claim type tag: factual, numerical, temporal, attribution,
        /// scientific, opinion, hypothetical, meta, general_knowledge,
        /// reasoning_chain, creative_content
        #[arg(long, default_value = "factual")]
        claim_type: ClaimType,
    },

    /// Show recent claim reviews, newest first
    Reviews {
        /// Show at most this many
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Ask a question through the degraded responder
    Respond { query: String },

    /// Dump the daemon's running configuration as TOML
    Config,

    /// Dump Prometheus text-format metrics
    Metrics,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red());
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let socket = cli.socket.as_deref();
    match cli.command {
        Commands::Status => commands::status(socket).await,
        Commands::Breakers => commands::breakers(socket).await,
        Commands::ForceOpen { breaker } => commands::force_open(socket, &breaker).await,
        Commands::ForceClose { breaker } => commands::force_close(socket, &breaker).await,
        Commands::Acknowledge { breaker } => commands::acknowledge(socket, &breaker).await,
        Commands::TickState => commands::tick_state(socket).await,
        Commands::ResetBudget { tool } => commands::reset_budget(socket, &tool).await,
        Commands::Submit {
            belief,
            premise,
            text,
            claim_type,
        } => commands::submit(socket, belief, premise, text, claim_type).await,
        Commands::Reviews { limit } => commands::reviews(socket, limit).await,
        Commands::Respond { query } => commands::respond(socket, &query).await,
        Commands::Config => commands::config(socket).await,
        Commands::Metrics => commands::metrics(socket).await,
    }
}

/// Client-side failures carry their own exit codes; anything else is 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<VigilError>().map_or(1, VigilError::code)
}
