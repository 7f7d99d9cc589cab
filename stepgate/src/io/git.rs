//! Git subprocess adapter used by the tool server.
//!
//! Every mutation the tools perform goes through this wrapper, so the set of
//! git invocations stays small and explicit.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// Index column is set (change already staged).
    pub fn is_staged(&self) -> bool {
        let index = self.code.chars().next().unwrap_or(' ');
        index != ' ' && index != '?'
    }

    /// Worktree column is set (untracked counts), so `git add` would pick it up.
    pub fn has_unstaged(&self) -> bool {
        let worktree = self.code.chars().nth(1).unwrap_or(' ');
        worktree != ' '
    }

    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// One-line commit summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitLine {
    pub sha: String,
    pub subject: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Current branch name, `None` on detached HEAD or an unborn repo.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if !out.status.success() {
            debug!("detached HEAD");
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    pub fn head_short_sha(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--short", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    pub fn rev_exists(&self, rev: &str) -> Result<bool> {
        let spec = format!("{rev}^{{commit}}");
        Ok(self
            .run(&["rev-parse", "--verify", "--quiet", &spec])?
            .status
            .success())
    }

    /// Status entries (including untracked), optionally limited to pathspecs.
    pub fn status_porcelain(&self, pathspecs: &[&str]) -> Result<Vec<StatusEntry>> {
        let mut args = vec!["status", "--porcelain=v1", "-z", "-uall"];
        if !pathspecs.is_empty() {
            args.push("--");
            args.extend_from_slice(pathspecs);
        }
        parse_status_z(&self.run_capture(&args)?)
    }

    /// Paths staged for the next commit.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only", "-z"])?;
        Ok(nul_fields(&out))
    }

    /// Paths that differ between two commits.
    pub fn changed_between(&self, before: &str, after: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--name-only", "-z", before, after])?;
        Ok(nul_fields(&out))
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    pub fn branches(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["branch", "--list", "--format=%(refname:short)"])?;
        Ok(non_empty_lines(&out))
    }

    pub fn remote_exists(&self, remote: &str) -> Result<bool> {
        Ok(self.run(&["remote", "get-url", remote])?.status.success())
    }

    /// Commits reachable from `rev` (or HEAD), newest first.
    pub fn log(&self, range: Option<&str>, limit: u32) -> Result<Vec<CommitLine>> {
        let count = format!("-{limit}");
        let mut args = vec!["log", "--format=%h%x09%s", count.as_str()];
        if let Some(range) = range {
            args.push(range);
        }
        let out = self.run(&args)?;
        if !out.status.success() {
            // Unborn branch: no commits yet.
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| {
                let (sha, subject) = line.split_once('\t')?;
                Some(CommitLine {
                    sha: sha.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }

    /// Number of stash entries.
    pub fn stash_count(&self) -> Result<usize> {
        let out = self.run_capture(&["stash", "list"])?;
        Ok(non_empty_lines(&out).len())
    }

    pub fn stash_files(&self, index: u32) -> Result<Vec<String>> {
        let entry = format!("stash@{{{index}}}");
        let out = self.run_capture(&["stash", "show", "--name-only", "-z", &entry])?;
        Ok(nul_fields(&out))
    }

    /// Run git and return stdout, failing on non-zero exit.
    pub fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run git, failing with stderr on non-zero exit.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fields of `-z` output. Paths come through verbatim, never quoted.
fn nul_fields(out: &str) -> Vec<String> {
    out.split('\0')
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `status --porcelain=v1 -z`: `XY path` records, where renames and
/// copies are followed by an extra field holding the original path.
fn parse_status_z(out: &str) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut fields = out.split('\0').filter(|field| !field.is_empty());
    while let Some(record) = fields.next() {
        let entry = parse_status_record(record)?;
        if entry.code.contains(['R', 'C']) {
            fields.next();
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_status_record(record: &str) -> Result<StatusEntry> {
    if record.len() < 4
        || !record.is_char_boundary(2)
        || !record.is_char_boundary(3)
        || &record[2..3] != " "
    {
        return Err(anyhow!("unexpected porcelain record: '{record}'"));
    }
    Ok(StatusEntry {
        code: record[..2].to_string(),
        path: record[3..].to_string(),
    })
}
