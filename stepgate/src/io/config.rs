//! Gate configuration stored under `.stepgate/config.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::plan::RiskLevel;
use crate::core::policy::{
    BlacklistRule, DEFAULT_BLACKLIST, DEFAULT_MAX_WRITE_STEPS, DEFAULT_SENSITIVE_NAMES,
    PolicyEngine,
};
use crate::core::risk::RiskTable;
use crate::gate::DEFAULT_CONFIRM_TOKEN;

/// Gate configuration (TOML).
///
/// Risk levels and blacklist patterns are policy data. Every load validates
/// them so a bad entry fails startup instead of weakening the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum write-classified steps per plan.
    pub max_write_steps: usize,

    /// Per-call tool timeout in seconds.
    pub tool_timeout_secs: u64,

    /// Input that counts as an affirmative confirmation.
    pub confirm_token: String,

    /// Cap on bytes returned by file reads and file resources.
    pub resource_limit_bytes: usize,

    pub tool_server: ToolServerConfig,
    pub policy: PolicyConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolServerConfig {
    /// Command that starts the tool server. The read limit, the sensitive
    /// names and `--workspace <root>` are appended as flags.
    pub command: Vec<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["stepgate-tools".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub blacklist: Vec<BlacklistEntry>,
    pub sensitive_names: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            blacklist: DEFAULT_BLACKLIST
                .iter()
                .map(|(name, pattern)| BlacklistEntry {
                    name: (*name).to_string(),
                    pattern: (*pattern).to_string(),
                })
                .collect(),
            sensitive_names: DEFAULT_SENSITIVE_NAMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RiskConfig {
    /// Operation name -> base level.
    pub overrides: BTreeMap<String, RiskLevel>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_write_steps: DEFAULT_MAX_WRITE_STEPS,
            tool_timeout_secs: 30,
            confirm_token: DEFAULT_CONFIRM_TOKEN.to_string(),
            resource_limit_bytes: 256 * 1024,
            tool_server: ToolServerConfig::default(),
            policy: PolicyConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_write_steps == 0 {
            return Err(anyhow!("max_write_steps must be > 0"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.resource_limit_bytes == 0 {
            return Err(anyhow!("resource_limit_bytes must be > 0"));
        }
        if self.confirm_token.trim().is_empty() {
            return Err(anyhow!("confirm_token must not be empty"));
        }
        if self
            .tool_server
            .command
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!("tool_server.command must be a non-empty array"));
        }
        if self
            .policy
            .sensitive_names
            .iter()
            .any(|name| name.trim().is_empty() || name.contains('/'))
        {
            return Err(anyhow!(
                "policy.sensitive_names entries must be non-empty file names"
            ));
        }
        self.blacklist_rules()?;
        self.risk_table()?;
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Tool server command line carrying the limits the server enforces.
    pub fn tool_server_command(&self) -> Vec<String> {
        let mut command = self.tool_server.command.clone();
        command.push("--limit-bytes".to_string());
        command.push(self.resource_limit_bytes.to_string());
        for name in &self.policy.sensitive_names {
            command.push("--sensitive-name".to_string());
            command.push(name.clone());
        }
        command
    }

    pub fn blacklist_rules(&self) -> Result<Vec<BlacklistRule>> {
        self.policy
            .blacklist
            .iter()
            .map(|entry| {
                BlacklistRule::new(entry.name.clone(), &entry.pattern).with_context(|| {
                    format!("policy.blacklist rule '{}' has an invalid pattern", entry.name)
                })
            })
            .collect()
    }

    pub fn risk_table(&self) -> Result<RiskTable> {
        RiskTable::with_overrides(&self.risk.overrides)
            .map_err(|err| anyhow!("risk.overrides: {err}"))
    }

    pub fn policy_engine(&self) -> Result<PolicyEngine> {
        let sensitive: BTreeSet<String> = self.policy.sensitive_names.iter().cloned().collect();
        Ok(PolicyEngine::new(
            self.blacklist_rules()?,
            sensitive,
            self.max_write_steps,
        ))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GateConfig::default()`.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = GateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GateConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = GateConfig::default();
        cfg.max_write_steps = 4;
        cfg.risk
            .overrides
            .insert("log".to_string(), RiskLevel::Medium);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_write_steps = 3\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_write_steps, 3);
        assert_eq!(cfg.confirm_token, "YES");
        assert_eq!(cfg.policy, PolicyConfig::default());
    }

    #[test]
    fn invalid_blacklist_pattern_fails_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[[policy.blacklist]]\nname = \"broken\"\npattern = \"([\"\n",
        )
        .expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }

    #[test]
    fn unknown_risk_override_fails_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[risk.overrides]\nrebase = \"low\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("rebase"));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let cfg = GateConfig {
            max_write_steps: 0,
            ..GateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_tool_command_is_rejected() {
        let mut cfg = GateConfig::default();
        cfg.tool_server.command.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tool_server_command_carries_limits() {
        let mut cfg = GateConfig::default();
        cfg.resource_limit_bytes = 1024;
        cfg.policy.sensitive_names = vec![".env".to_string()];
        assert_eq!(
            cfg.tool_server_command(),
            vec![
                "stepgate-tools",
                "--limit-bytes",
                "1024",
                "--sensitive-name",
                ".env"
            ]
        );
    }
}
