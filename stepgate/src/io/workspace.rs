//! Workspace root resolution and per-workspace run locks.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::policy::PathSandbox;

/// Canonical absolute workspace path, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Canonicalize `path`. It must exist and be a directory.
    pub fn open(path: &Path) -> Result<Self> {
        let root = fs::canonicalize(path)
            .with_context(|| format!("resolve workspace {}", path.display()))?;
        if !root.is_dir() {
            return Err(anyhow!("workspace {} is not a directory", root.display()));
        }
        debug!(root = %root.display(), "workspace opened");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `raw` to a canonical path inside the workspace.
    ///
    /// Components are applied one at a time from the root: every prefix that
    /// exists is canonicalized (following symlinks) before the next component
    /// is applied, so `..` always steps out of a real directory. Components
    /// that do not exist yet are kept as written. A dangling symlink is refused.
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf, String> {
        if raw.contains('\0') {
            return Err("path contains a NUL byte".to_string());
        }
        let raw_path = Path::new(raw);
        let mut resolved = if raw_path.is_absolute() {
            PathBuf::new()
        } else {
            self.root.clone()
        };

        for component in raw_path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    resolved.push(component.as_os_str());
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => {
                    resolved.push(part);
                    match fs::canonicalize(&resolved) {
                        Ok(canonical) => resolved = canonical,
                        Err(_) if fs::symlink_metadata(&resolved).is_ok() => {
                            return Err(format!("'{raw}' goes through a dangling symlink"));
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(format!("'{raw}' resolves outside the workspace"))
        }
    }

    /// Path relative to the root, `/`-separated, for display and git.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            Some(".".to_string())
        } else {
            Some(parts.join("/"))
        }
    }
}

impl PathSandbox for WorkspaceRoot {
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        self.resolve_path(raw)
    }
}

/// Process-wide registry of per-workspace reader/writer locks.
///
/// Write runs take the write side; read-only runs share the read side.
#[derive(Debug, Default)]
pub struct WorkspaceLocks {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `root`, created on first use.
    pub fn lock_for(&self, root: &WorkspaceRoot) -> Result<Arc<RwLock<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow!("workspace lock registry is poisoned"))?;
        Ok(locks
            .entry(root.path().to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_missing_paths_inside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");

        let existing = ws.resolve_path("src").expect("existing");
        assert_eq!(existing, ws.path().join("src"));

        let missing = ws.resolve_path("src/new/deep.txt").expect("missing");
        assert_eq!(missing, ws.path().join("src/new/deep.txt"));

        let dotted = ws.resolve_path("./src/../README.md").expect("dotted");
        assert_eq!(dotted, ws.path().join("README.md"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert!(ws.resolve_path("../../etc/passwd").is_err());
        assert!(ws.resolve_path("missing/../../../outside").is_err());
    }

    #[test]
    fn absolute_path_outside_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert!(ws.resolve_path("/etc/passwd").is_err());
        let inside = ws.path().join("a.txt");
        assert!(ws.resolve_path(&inside.to_string_lossy()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_pointing_outside_is_rejected() {
        let outside = tempfile::tempdir().expect("outside");
        let temp = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert!(ws.resolve_path("link/secret.txt").is_err());
        assert!(ws.resolve_path("link").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_after_missing_parent_is_rejected() {
        let outside = tempfile::tempdir().expect("outside");
        let temp = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert!(ws.resolve_path("missing/../link/pwned.txt").is_err());
        assert!(ws.resolve_path("a/b/../../link/x").is_err());
        assert!(ws.resolve_path("./missing/./../link").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_rejected() {
        let outside = tempfile::tempdir().expect("outside");
        let temp = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(
            outside.path().join("not-yet.txt"),
            temp.path().join("dangling"),
        )
        .expect("symlink");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert!(ws.resolve_path("dangling").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_resolves_to_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("real")).expect("mkdir");
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias"))
            .expect("symlink");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        let resolved = ws.resolve_path("missing/../alias/new.txt").expect("inside");
        assert_eq!(resolved, ws.path().join("real/new.txt"));
    }

    #[test]
    fn open_rejects_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("f.txt");
        fs::write(&file, "x").expect("write");
        assert!(WorkspaceRoot::open(&file).is_err());
    }

    #[test]
    fn relative_renders_forward_slashes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        assert_eq!(
            ws.relative(&ws.path().join("a").join("b.txt")).as_deref(),
            Some("a/b.txt")
        );
        assert_eq!(ws.relative(ws.path()).as_deref(), Some("."));
    }

    #[test]
    fn locks_are_shared_per_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceRoot::open(temp.path()).expect("open");
        let locks = WorkspaceLocks::new();
        let a = locks.lock_for(&ws).expect("lock");
        let b = locks.lock_for(&ws).expect("lock");
        assert!(Arc::ptr_eq(&a, &b));
        let _write = a.write().expect("write guard");
        assert!(b.try_read().is_err());
    }
}
