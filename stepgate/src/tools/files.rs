//! Workspace file tools.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{ToolContext, add, failed, object_schema, parse_args, truncate};
use crate::protocol::registry::{CallMode, RegistryError, ToolError, ToolRegistry, ToolSpec};

/// Directories never listed or descended into.
const SKIP_DIRS: &[&str] = &[".git", ".stepgate"];
const MAX_LISTED_FILES: usize = 2000;

pub(crate) fn register(
    registry: &mut ToolRegistry,
    ctx: &Arc<ToolContext>,
) -> Result<(), RegistryError> {
    let path = json!({ "type": "string", "minLength": 1 });
    add(
        registry,
        ctx,
        ToolSpec::read(
            "read-file",
            "Read a text file inside the workspace",
            object_schema(json!({ "path": path }), &["path"]),
        ),
        read_file,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::read(
            "list-files",
            "List files under a directory",
            object_schema(json!({ "dir": path }), &[]),
        ),
        list_files,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "write-file",
            "Create or overwrite a text file",
            object_schema(
                json!({ "path": path, "content": { "type": "string" } }),
                &["path", "content"],
            ),
        ),
        write_file,
    )?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

fn read_file(ctx: &ToolContext, args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let args: ReadArgs = parse_args(args)?;
    let path = ctx.resolve(&args.path)?;
    if !path.is_file() {
        return Err(ToolError::failed(format!("'{}' is not a file", args.path)));
    }
    let bytes = fs::read(&path)
        .map_err(|err| ToolError::failed(format!("read '{}': {err}", args.path)))?;
    let size = bytes.len();
    let (content, truncated) = truncate(
        String::from_utf8_lossy(&bytes).into_owned(),
        ctx.limit_bytes(),
    );
    Ok(json!({
        "path": ctx.relative(&path),
        "content": content,
        "bytes": size,
        "truncated": truncated,
    }))
}

#[derive(Deserialize)]
struct ListArgs {
    dir: Option<String>,
}

fn list_files(ctx: &ToolContext, args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let args: ListArgs = parse_args(args)?;
    let dir = ctx.resolve(args.dir.as_deref().unwrap_or("."))?;
    if !dir.is_dir() {
        return Err(ToolError::failed(format!(
            "'{}' is not a directory",
            ctx.relative(&dir)
        )));
    }
    let mut files = Vec::new();
    walk(ctx, &dir, &mut files).map_err(failed)?;
    files.sort();
    let truncated = files.len() > MAX_LISTED_FILES;
    files.truncate(MAX_LISTED_FILES);
    Ok(json!({ "files": files, "truncated": truncated }))
}

/// Collect files under `dir`, not following symlinked directories.
pub(crate) fn walk(ctx: &ToolContext, dir: &Path, out: &mut Vec<String>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if SKIP_DIRS.iter().any(|skip| name == *skip) {
            continue;
        }
        let kind = entry.file_type()?;
        if kind.is_dir() {
            walk(ctx, &entry.path(), out)?;
        } else if out.len() <= MAX_LISTED_FILES {
            out.push(ctx.relative(&entry.path()));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

fn write_file(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: WriteArgs = parse_args(args)?;
    let path = ctx.resolve(&args.path)?;
    if path.is_dir() {
        return Err(ToolError::failed(format!("'{}' is a directory", args.path)));
    }
    let rel = ctx.relative(&path);
    let old = if path.is_file() {
        Some(
            fs::read(&path)
                .map_err(|err| ToolError::failed(format!("read '{rel}': {err}")))?,
        )
    } else {
        None
    };
    let new_sha = sha256_hex(args.content.as_bytes());
    let new_lines = args.content.lines().count();

    if mode == CallMode::Preview {
        let (verb, old_lines) = match &old {
            Some(bytes) => ("overwrite", String::from_utf8_lossy(bytes).lines().count()),
            None => ("create", 0),
        };
        let unchanged = old
            .as_deref()
            .is_some_and(|bytes| bytes == args.content.as_bytes());
        return Ok(json!({
            "summary": format!("would {verb} {rel} ({old_lines} -> {new_lines} lines)"),
            "files": [rel],
            "exists": old.is_some(),
            "unchanged": unchanged,
            "old_sha256": old.as_deref().map(sha256_hex),
            "new_sha256": new_sha,
        }));
    }
    crate::io::write_atomic(&path, &args.content).map_err(failed)?;
    info!(path = %rel, bytes = args.content.len(), "wrote file");
    Ok(json!({
        "summary": format!("wrote {rel} ({} bytes)", args.content.len()),
        "files": [rel],
        "sha256": new_sha,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::workspace::WorkspaceRoot;
    use crate::protocol::envelope::codes;

    fn setup() -> (tempfile::TempDir, ToolContext) {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ToolContext::new(WorkspaceRoot::open(temp.path()).expect("open"));
        (temp, ctx)
    }

    #[test]
    fn write_preview_leaves_disk_untouched() {
        let (temp, ctx) = setup();
        let args = json!({ "path": "docs/new.md", "content": "a\nb\n" });
        let out = write_file(&ctx, &args, CallMode::Preview).expect("preview");
        assert_eq!(out["exists"], false);
        assert_eq!(out["files"], json!(["docs/new.md"]));
        assert!(!temp.path().join("docs").exists());

        write_file(&ctx, &args, CallMode::Execute).expect("write");
        let written = fs::read_to_string(temp.path().join("docs/new.md")).expect("read");
        assert_eq!(written, "a\nb\n");
    }

    #[test]
    fn overwrite_preview_reports_old_digest() {
        let (temp, ctx) = setup();
        fs::write(temp.path().join("a.txt"), "old\n").expect("seed");
        let args = json!({ "path": "a.txt", "content": "new\n" });
        let out = write_file(&ctx, &args, CallMode::Preview).expect("preview");
        assert_eq!(out["exists"], true);
        assert_eq!(out["old_sha256"], sha256_hex(b"old\n"));
        assert_eq!(out["unchanged"], false);
    }

    #[test]
    fn escapes_and_sensitive_files_are_refused() {
        let (_temp, ctx) = setup();
        for path in ["../outside.txt", "/etc/passwd", ".env"] {
            let err = write_file(
                &ctx,
                &json!({ "path": path, "content": "x" }),
                CallMode::Preview,
            )
            .unwrap_err();
            assert_eq!(err.code, codes::SANDBOX_VIOLATION, "{path}");
        }
        let err = read_file(&ctx, &json!({ "path": ".env" }), CallMode::Execute).unwrap_err();
        assert_eq!(err.code, codes::SANDBOX_VIOLATION);
    }

    #[cfg(unix)]
    #[test]
    fn write_through_symlink_behind_missing_dir_is_refused() {
        let outside = tempfile::tempdir().expect("outside");
        let (temp, ctx) = setup();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let args = json!({ "path": "missing/../link/pwned.txt", "content": "owned" });
        for mode in [CallMode::Preview, CallMode::Execute] {
            let err = write_file(&ctx, &args, mode).unwrap_err();
            assert_eq!(err.code, codes::SANDBOX_VIOLATION);
        }
        assert!(!outside.path().join("pwned.txt").exists());
    }

    #[test]
    fn read_truncates_to_limit() {
        let (temp, ctx) = setup();
        let ctx = ctx.with_limit_bytes(4);
        fs::write(temp.path().join("big.txt"), "0123456789").expect("seed");
        let out = read_file(&ctx, &json!({ "path": "big.txt" }), CallMode::Execute).expect("read");
        assert_eq!(out["content"], "0123");
        assert_eq!(out["truncated"], true);
        assert_eq!(out["bytes"], 10);
    }

    #[test]
    fn list_skips_git_and_state_dirs() {
        let (temp, ctx) = setup();
        for rel in ["b.txt", "src/a.rs", ".git/HEAD", ".stepgate/session.json"] {
            let path = temp.path().join(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, "x").expect("write");
        }
        let out = list_files(&ctx, &json!({}), CallMode::Execute).expect("list");
        assert_eq!(out["files"], json!(["b.txt", "src/a.rs"]));
    }
}
