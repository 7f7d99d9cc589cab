//! Tool server child process wired up as a protocol transport.

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::ProtocolError;
use crate::protocol::transport::{ChannelTransport, Recv, Transport};

/// How long a server gets to exit on its own after stdin closes.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Tool server running as a child with piped stdin/stdout.
///
/// Dropping the transport without [`ChildTransport::shutdown`] still closes
/// stdin and reaps the child.
pub struct ChildTransport {
    child: Option<Child>,
    channel: ChannelTransport,
}

impl ChildTransport {
    /// Spawn `command` with `--workspace <root>` appended.
    #[instrument(skip_all, fields(program = command.first().map(String::as_str).unwrap_or("")))]
    pub fn spawn(command: &[String], workspace: &Path) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("tool server command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--workspace")
            .arg(workspace)
            .current_dir(workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!("spawning tool server");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn tool server");
                return Err(e).with_context(|| format!("spawn tool server '{program}'"));
            }
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        info!(pid = child.id(), "tool server started");
        Ok(Self {
            child: Some(child),
            channel: ChannelTransport::new(stdin, stdout),
        })
    }

    /// Close stdin, wait up to `grace`, then kill.
    pub fn shutdown(mut self, grace: Duration) -> Result<ExitStatus> {
        let child = self
            .child
            .take()
            .ok_or_else(|| anyhow!("tool server already reaped"))?;
        stop_child(&mut self.channel, child, grace)
    }
}

fn stop_child(channel: &mut ChannelTransport, mut child: Child, grace: Duration) -> Result<ExitStatus> {
    channel.close_writer();
    let status = match child.wait_timeout(grace).context("wait for tool server")? {
        Some(status) => status,
        None => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "tool server did not exit, killing"
            );
            child.kill().context("kill tool server")?;
            child.wait().context("wait tool server after kill")?
        }
    };
    debug!(exit_code = ?status.code(), "tool server stopped");
    Ok(status)
}

impl Transport for ChildTransport {
    fn send(&mut self, line: &str) -> Result<(), ProtocolError> {
        self.channel.send(line)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Recv, ProtocolError> {
        self.channel.recv(timeout)
    }
}

impl Drop for ChildTransport {
    fn drop(&mut self) {
        if let Some(child) = self.child.take()
            && let Err(err) = stop_child(&mut self.channel, child, SHUTDOWN_GRACE)
        {
            warn!(err = %err, "failed to stop tool server");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()]
    }

    #[test]
    fn echoes_lines_through_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut transport =
            ChildTransport::spawn(&sh("while read -r line; do echo \"$line\"; done"), temp.path())
                .expect("spawn");
        transport.send("{\"ping\":1}").expect("send");
        let got = transport.recv(Duration::from_secs(5)).expect("recv");
        assert_eq!(got, Recv::Line("{\"ping\":1}".to_string()));
        let status = transport.shutdown(Duration::from_secs(5)).expect("shutdown");
        assert!(status.success());
    }

    #[test]
    fn silent_child_times_out_and_is_killed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut transport =
            ChildTransport::spawn(&sh("trap '' HUP; sleep 30"), temp.path()).expect("spawn");
        transport.send("{}").expect("send");
        let got = transport.recv(Duration::from_millis(100)).expect("recv");
        assert_eq!(got, Recv::TimedOut);
        let status = transport
            .shutdown(Duration::from_millis(100))
            .expect("shutdown");
        assert!(!status.success());
    }

    #[test]
    fn spawn_failure_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = vec!["definitely-not-a-real-binary-xyz".to_string()];
        assert!(ChildTransport::spawn(&command, temp.path()).is_err());
    }
}
