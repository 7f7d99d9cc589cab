//! `stepgate-tools`: hosts the git and file tools behind the tool protocol.
//!
//! Reads one request per line on stdin and answers on stdout. Logs go to
//! stderr only, so stdout carries nothing but protocol lines.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use stepgate::io::workspace::WorkspaceRoot;
use stepgate::logging;
use stepgate::tools::{DEFAULT_LIMIT_BYTES, ToolContext, builtin_server};

#[derive(Parser)]
#[command(
    name = "stepgate-tools",
    version,
    about = "Tool server for stepgate (line-delimited JSON-RPC on stdio)"
)]
struct Cli {
    /// Workspace root; every path argument must resolve inside it.
    #[arg(long)]
    workspace: PathBuf,
    /// Cap on bytes returned by reads.
    #[arg(long, default_value_t = DEFAULT_LIMIT_BYTES)]
    limit_bytes: usize,
    /// File name that is never read or written (repeatable; replaces the
    /// built-in list).
    #[arg(long = "sensitive-name")]
    sensitive_names: Vec<String>,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = WorkspaceRoot::open(&cli.workspace)?;
    info!(root = %root.path().display(), "serving tools");
    let mut ctx = ToolContext::new(root).with_limit_bytes(cli.limit_bytes);
    if !cli.sensitive_names.is_empty() {
        let names: BTreeSet<String> = cli.sensitive_names.into_iter().collect();
        ctx = ctx.with_sensitive_names(names);
    }
    let server = builtin_server(ctx).context("build tool registry")?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    server.serve(stdin.lock(), stdout.lock())
}
