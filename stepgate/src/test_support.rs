//! Fixtures for unit and integration tests: scratch git repositories,
//! in-process transports, a recorder that keeps records in memory, and a
//! scripted tool registry.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::outcome::ExecutionOutcome;
use crate::core::plan::{Capability, KNOWN_OPERATIONS, capability_of};
use crate::error::ProtocolError;
use crate::io::event_log::{EventRecord, Recorder};
use crate::protocol::client::ToolClient;
use crate::protocol::registry::{CallMode, ToolError, ToolRegistry, ToolSpec};
use crate::protocol::server::ToolServer;
use crate::protocol::transport::{ChannelTransport, Recv, Transport};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Git repository in a temp dir with one commit (`README.md`) on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Self { dir };
        repo.git(&["init", "--quiet"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.write_file("README.md", "# test\n");
        repo.commit_all("initial");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write file");
    }

    pub fn read_file(&self, rel: &str) -> String {
        fs::read_to_string(self.join(rel)).expect("read file")
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "--quiet", "-m", message]);
    }

    /// `git status --porcelain` output.
    pub fn status(&self) -> String {
        self.git(&["status", "--porcelain=v1", "-uall"])
    }

    /// Run git in the repo, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .expect("spawn git");
        assert!(
            out.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).into_owned()
    }
}

/// In-process transport: every sent line is answered by a [`ToolServer`].
pub struct LoopbackTransport {
    server: ToolServer,
    pending: VecDeque<String>,
    sent: Vec<String>,
    /// Stop answering after this many responses.
    answer_limit: Option<usize>,
    answered: usize,
}

impl LoopbackTransport {
    pub fn new(server: ToolServer) -> Self {
        Self {
            server,
            pending: VecDeque::new(),
            sent: Vec::new(),
            answer_limit: None,
            answered: 0,
        }
    }

    /// Go silent after `limit` answered requests.
    pub fn silent_after(mut self, limit: usize) -> Self {
        self.answer_limit = Some(limit);
        self
    }

    /// Request lines sent so far.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Methods of the requests sent so far.
    pub fn sent_methods(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, line: &str) -> Result<(), ProtocolError> {
        self.sent.push(line.to_string());
        if self.answer_limit.is_none_or(|limit| self.answered < limit) {
            self.answered += 1;
            self.pending.push_back(self.server.handle_line(line));
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Recv, ProtocolError> {
        match self.pending.pop_front() {
            Some(line) => Ok(Recv::Line(line)),
            None => {
                thread::sleep(timeout);
                Ok(Recv::TimedOut)
            }
        }
    }
}

pub fn loopback_client(registry: ToolRegistry) -> ToolClient<LoopbackTransport> {
    ToolClient::new(LoopbackTransport::new(ToolServer::new(registry)), TEST_TIMEOUT)
}

/// Peer that accepts every request and never answers.
pub struct SilentTransport {
    inner: ChannelTransport,
    _keep_open: Sender<std::io::Result<String>>,
}

impl Default for SilentTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SilentTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            inner: ChannelTransport::from_parts(Box::new(std::io::sink()), rx),
            _keep_open: tx,
        }
    }
}

impl Transport for SilentTransport {
    fn send(&mut self, line: &str) -> Result<(), ProtocolError> {
        self.inner.send(line)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Recv, ProtocolError> {
        self.inner.recv(timeout)
    }
}

/// Recorder that keeps everything in memory.
#[derive(Default)]
pub struct MemoryRecorder {
    pub records: Vec<EventRecord>,
    pub finished: Vec<ExecutionOutcome>,
    /// Refuse appends once this many records are stored.
    pub fail_after: Option<usize>,
}

impl Recorder for MemoryRecorder {
    fn append(&mut self, record: &EventRecord) -> Result<()> {
        if self.fail_after.is_some_and(|n| self.records.len() >= n) {
            return Err(anyhow!("recorder unavailable"));
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self, outcome: &ExecutionOutcome) -> Result<()> {
        self.finished.push(outcome.clone());
        Ok(())
    }
}

/// Calls observed by a [`ScriptedTools`] registry.
pub type CallLog = Arc<Mutex<Vec<(String, CallMode)>>>;

/// Registry for every known operation with canned results.
///
/// Write tools echo their `path`/`paths` arguments as `files`.
#[derive(Clone, Default)]
pub struct ScriptedTools {
    calls: CallLog,
    fail_execute: Option<String>,
    fail_preview: Option<String>,
    omit: Vec<String>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_execute(mut self, tool: &str) -> Self {
        self.fail_execute = Some(tool.to_string());
        self
    }

    pub fn failing_preview(mut self, tool: &str) -> Self {
        self.fail_preview = Some(tool.to_string());
        self
    }

    /// Leave `tool` out of the catalogue.
    pub fn without(mut self, tool: &str) -> Self {
        self.omit.push(tool.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, CallMode)> {
        self.calls.lock().expect("call log").clone()
    }

    pub fn calls_in(&self, mode: CallMode) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, m)| *m == mode)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in KNOWN_OPERATIONS {
            if self.omit.iter().any(|omit| omit == name) {
                continue;
            }
            let schema = json!({ "type": "object" });
            let spec = match capability_of(name) {
                Some(Capability::Read) => ToolSpec::read(name, "scripted", schema),
                _ => ToolSpec::write(name, "scripted", schema),
            };
            let tool = name.to_string();
            let calls = Arc::clone(&self.calls);
            let fail_execute = self.fail_execute.as_deref() == Some(*name);
            let fail_preview = self.fail_preview.as_deref() == Some(*name);
            registry
                .register(spec, move |args: &Value, mode: CallMode| {
                    calls.lock().expect("call log").push((tool.clone(), mode));
                    let failing = match mode {
                        CallMode::Preview => fail_preview,
                        CallMode::Execute => fail_execute,
                    };
                    if failing {
                        return Err(ToolError::failed(format!("{tool} refused")));
                    }
                    let files = files_of(args);
                    let summary = match mode {
                        CallMode::Preview => format!("would {tool}"),
                        CallMode::Execute => format!("{tool} done"),
                    };
                    Ok(json!({ "summary": summary, "files": files }))
                })
                .expect("register scripted tool");
        }
        registry
    }
}

fn files_of(args: &Value) -> Vec<String> {
    if let Some(path) = args.get("path").and_then(Value::as_str) {
        return vec![path.to_string()];
    }
    args.get("paths")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn scripted_registry() -> ToolRegistry {
    ScriptedTools::new().registry()
}
