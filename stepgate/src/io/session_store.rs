//! Session context persistence (`.stepgate/session.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::session::SessionContext;

/// Load the session; a missing file is an empty session.
pub fn load_session(path: &Path) -> Result<SessionContext> {
    if !path.exists() {
        debug!(path = %path.display(), "no session file, starting fresh");
        return Ok(SessionContext::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let session: SessionContext = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    debug!(
        recent_files = session.recent_files.len(),
        history = session.history.len(),
        "session loaded"
    );
    Ok(session)
}

/// Atomically write the session (temp file + rename).
pub fn write_session(path: &Path, session: &SessionContext) -> Result<()> {
    debug!(path = %path.display(), "writing session");
    let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
