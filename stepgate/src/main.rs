//! `stepgate` CLI.
//!
//! Runs a planner document through the gate against a workspace. State lives
//! in `<workspace>/.stepgate/` (config, session, event logs, run reports).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use stepgate::exit_codes;
use stepgate::gate::ConfirmationToken;
use stepgate::io::config::{GateConfig, load_config};
use stepgate::io::event_log::JsonlRecorder;
use stepgate::io::init::{InitOptions, StatePaths, init_state};
use stepgate::io::process::{ChildTransport, SHUTDOWN_GRACE};
use stepgate::io::session_store::{load_session, write_session};
use stepgate::io::workspace::{WorkspaceLocks, WorkspaceRoot};
use stepgate::logging;
use stepgate::orchestrator::{Orchestrator, RunRequest};
use stepgate::protocol::client::ToolClient;

#[derive(Parser)]
#[command(
    name = "stepgate",
    version,
    about = "Validate, preview and confirm planned git and file operations"
)]
struct Cli {
    /// Workspace root every path must stay inside.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,
    /// Config file (default: `<workspace>/.stepgate/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a plan: preview its writes, and execute them when confirmed.
    Run {
        /// Plan JSON file, or `-` for stdin.
        #[arg(long)]
        plan: PathBuf,
        /// Confirmation token; without it the run stops after the preview.
        #[arg(long)]
        confirm: Option<String>,
        /// Bind the confirmation to the preview with this fingerprint.
        #[arg(long, requires = "confirm")]
        fingerprint: Option<String>,
    },
    /// Validate, classify and decide a plan without starting the tool server.
    Check {
        /// Plan JSON file, or `-` for stdin.
        #[arg(long)]
        plan: PathBuf,
    },
    /// List the tools the tool server hosts.
    Tools,
    /// List workspace resources, or read one.
    Resources {
        #[arg(long)]
        read: Option<String>,
    },
    /// Create `.stepgate/` with a default config.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workspace = WorkspaceRoot::open(&cli.workspace)?;
    let paths = StatePaths::new(workspace.path());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| paths.config_path.clone());

    match cli.command {
        Command::Init { force } => {
            let paths = init_state(workspace.path(), &InitOptions { force })?;
            println!("{}", paths.state_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Check { plan } => {
            let cfg = load_config(&config_path)?;
            let orchestrator =
                Orchestrator::from_config(workspace, Arc::new(WorkspaceLocks::new()), &cfg)?;
            let report = orchestrator.check(&read_plan(&plan)?);
            print_json(&report)?;
            Ok(exit_codes::for_state(report.state))
        }
        Command::Run {
            plan,
            confirm,
            fingerprint,
        } => {
            let cfg = load_config(&config_path)?;
            cmd_run(&cfg, workspace, &paths, &plan, confirm, fingerprint)
        }
        Command::Tools => {
            let cfg = load_config(&config_path)?;
            let mut client = connect(&cfg, &workspace)?;
            let tools = client.list_tools();
            disconnect(client);
            print_json(&tools?)?;
            Ok(exit_codes::OK)
        }
        Command::Resources { read } => {
            let cfg = load_config(&config_path)?;
            let mut client = connect(&cfg, &workspace)?;
            match read {
                Some(uri) => {
                    let contents = client.read_resource(&uri);
                    disconnect(client);
                    let contents = contents?;
                    print!("{}", contents.text);
                    if contents.truncated {
                        warn!(uri = %uri, "resource truncated");
                    }
                }
                None => {
                    let resources = client.list_resources();
                    disconnect(client);
                    print_json(&resources?)?;
                }
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_run(
    cfg: &GateConfig,
    workspace: WorkspaceRoot,
    paths: &StatePaths,
    plan: &Path,
    confirm: Option<String>,
    fingerprint: Option<String>,
) -> Result<i32> {
    let doc = read_plan(plan)?;
    let confirmation = confirm.map(|input| {
        let token = ConfirmationToken::new(input);
        match fingerprint {
            Some(fp) => token.with_fingerprint(fp),
            None => token,
        }
    });

    let mut session = load_session(&paths.session_path)?;
    let mut recorder = JsonlRecorder::new(paths.clone());
    let mut client = connect(cfg, &workspace)?;
    let orchestrator =
        Orchestrator::from_config(workspace, Arc::new(WorkspaceLocks::new()), cfg)?;

    let outcome = orchestrator.run(
        RunRequest {
            plan: doc,
            confirmation,
        },
        &mut client,
        &mut recorder,
        &mut session,
    );
    disconnect(client);
    let outcome = outcome?;

    write_session(&paths.session_path, &session)?;
    print_json(&outcome)?;
    Ok(exit_codes::for_state(outcome.state))
}

fn connect(cfg: &GateConfig, workspace: &WorkspaceRoot) -> Result<ToolClient<ChildTransport>> {
    let transport = ChildTransport::spawn(&cfg.tool_server_command(), workspace.path())?;
    Ok(ToolClient::new(transport, cfg.tool_timeout()))
}

fn disconnect(client: ToolClient<ChildTransport>) {
    if let Err(err) = client.into_transport().shutdown(SHUTDOWN_GRACE) {
        warn!(err = %format!("{err:#}"), "tool server shutdown failed");
    }
}

fn read_plan(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read plan from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parse plan JSON")
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
