//! `.stepgate/` state directory layout and scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::io::config::{GateConfig, write_config};

/// Everything under the state dir is ignored, including the `.gitignore`
/// itself, so gate artifacts never show up as workspace changes.
const STATE_GITIGNORE: &str = "*\n";

/// All canonical paths within `.stepgate/` for a workspace.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub session_path: PathBuf,
    pub logs_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl StatePaths {
    pub fn new(workspace: &Path) -> Self {
        Self::in_dir(workspace.join(".stepgate"))
    }

    pub fn in_dir(state_dir: PathBuf) -> Self {
        Self {
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            session_path: state_dir.join("session.json"),
            logs_dir: state_dir.join("logs"),
            runs_dir: state_dir.join("runs"),
            state_dir,
        }
    }

    pub fn log_path(&self, trace_id: &str) -> PathBuf {
        self.logs_dir.join(format!("{trace_id}.jsonl"))
    }

    pub fn run_dir(&self, trace_id: &str) -> PathBuf {
        self.runs_dir.join(trace_id)
    }

    /// Create the state dir and its `.gitignore` if missing.
    pub fn ensure(&self) -> Result<()> {
        if self.state_dir.exists() && !self.state_dir.is_dir() {
            return Err(anyhow!(
                "{} exists but is not a directory",
                self.state_dir.display()
            ));
        }
        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("create directory {}", self.state_dir.display()))?;
        if !self.gitignore_path.exists() {
            fs::write(&self.gitignore_path, STATE_GITIGNORE)
                .with_context(|| format!("write {}", self.gitignore_path.display()))?;
        }
        Ok(())
    }
}

/// Options for `init_state`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Overwrite an existing config with defaults.
    pub force: bool,
}

/// Create `.stepgate/` scaffolding with a default config.
pub fn init_state(workspace: &Path, options: &InitOptions) -> Result<StatePaths> {
    let paths = StatePaths::new(workspace);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "stepgate init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    paths.ensure()?;
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("create directory {}", paths.logs_dir.display()))?;
    fs::create_dir_all(&paths.runs_dir)
        .with_context(|| format!("create directory {}", paths.runs_dir.display()))?;
    write_config(&paths.config_path, &GateConfig::default())?;
    info!(state_dir = %paths.state_dir.display(), "initialized state dir");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_layout_and_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_state(temp.path(), &InitOptions { force: false }).expect("init");
        assert!(paths.logs_dir.is_dir());
        assert!(paths.runs_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("gitignore"),
            "*\n"
        );
        assert_eq!(
            load_config(&paths.config_path).expect("config"),
            GateConfig::default()
        );
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_state(temp.path(), &InitOptions { force: false }).expect("first");
        assert!(init_state(temp.path(), &InitOptions { force: false }).is_err());
        init_state(temp.path(), &InitOptions { force: true }).expect("forced");
    }

    #[test]
    fn paths_are_stable() {
        let paths = StatePaths::new(Path::new("/ws"));
        assert_eq!(paths.state_dir, Path::new("/ws/.stepgate"));
        assert_eq!(paths.log_path("t1"), Path::new("/ws/.stepgate/logs/t1.jsonl"));
        assert_eq!(paths.run_dir("t1"), Path::new("/ws/.stepgate/runs/t1"));
    }
}
