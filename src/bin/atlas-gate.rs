//! atlas-gate — policy and governance gateway
//!
//! Usage:
//!   atlas-gate call --workspace /path --role EXECUTION '{"tool": "init_session", "args": {...}}'
//!   atlas-gate call --workspace /path <request.json      → read the request from stdin
//!   atlas-gate tools                                       → list registered tool definitions
//!   atlas-gate version                                    → show version
//!
//! `call` is a single-shot dispatcher: one request in, one JSON response
//! out, then exit. spec.md places the transport that delivers tool calls
//! outside this crate's scope (§1), so this is deliberately not a
//! persistent network listener — a real deployment fronts the same
//! registry with its own framing and calls `atlas_gate_gateway::
//! dispatch_request` per request instead of shelling out to this binary.

use atlas_gate_core::session::ClientRole;
use clap::{Parser, Subcommand};
use std::io::Read;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "atlas-gate",
    about = "Policy and governance gateway for AI-coding-assistant writes",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "atlas-gate mediates every mutating filesystem operation from an AI \
                   coding assistant through plan authorization, static content policy, \
                   and intent-artifact validation, producing a tamper-evident audit log."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch one {"tool": ..., "args": ...} request and print the JSON response
    Call {
        /// Workspace root this session's tools operate against; tools still
        /// must lock it via init_session before any write-capable call succeeds
        #[arg(short, long)]
        workspace: Option<String>,

        /// Client role bound to this process's session: EXECUTION, PLANNING, or READ_ONLY
        #[arg(short, long, default_value = "EXECUTION")]
        role: String,

        /// Write logs to a file (in addition to stderr)
        #[arg(long)]
        log_file: Option<String>,

        /// The {"tool": ..., "args": ...} request, as a JSON string. Read from
        /// stdin instead when omitted.
        request: Option<String>,
    },
    /// List every registered tool's name, description, and input schema
    Tools,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("atlas-gate v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Tools => {
            let registry = atlas_gate_gateway::build_registry();
            let defs = registry.get_definitions();
            println!("{}", serde_json::to_string_pretty(&defs)?);
        }
        Commands::Call { workspace, role, log_file, request } => {
            init_tracing(log_file.as_deref());
            let client_role = parse_client_role(&role)?;

            let request_json = match request {
                Some(r) => r,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let registry = atlas_gate_gateway::build_registry();
            let state = atlas_gate_gateway::new_state(client_role);
            tracing::info!(session_id = %state.session.session_id, role = %role, workspace = ?workspace, "dispatching atlas-gate request");

            let response = atlas_gate_gateway::dispatch_request(&registry, &state, &request_json).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if response.get("ok").and_then(|v| v.as_bool()) == Some(false) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn parse_client_role(role: &str) -> anyhow::Result<ClientRole> {
    match role.to_uppercase().as_str() {
        "EXECUTION" => Ok(ClientRole::Execution),
        "PLANNING" => Ok(ClientRole::Planning),
        "READ_ONLY" | "READONLY" => Ok(ClientRole::ReadOnly),
        other => Err(anyhow::anyhow!("unknown client role '{}', expected EXECUTION, PLANNING, or READ_ONLY", other)),
    }
}

fn init_tracing(log_file: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "atlas_gate=info".into());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path).expect("failed to open log file");
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(tracing_subscriber::fmt::layer().json().with_writer(file))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
