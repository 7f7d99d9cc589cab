//! Git tools. Mutations go through [`Git`](crate::io::git::Git) only.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{ToolContext, add, failed, object_schema, parse_args, truncate};
use crate::core::plan::ResetMode;
use crate::io::git::StatusEntry;
use crate::protocol::registry::{CallMode, RegistryError, ToolError, ToolRegistry, ToolSpec};

const DEFAULT_LOG_LIMIT: u32 = 10;
const MAX_LOG_LIMIT: u32 = 200;

pub(crate) fn register(
    registry: &mut ToolRegistry,
    ctx: &Arc<ToolContext>,
) -> Result<(), RegistryError> {
    let paths = json!({ "type": "array", "items": { "type": "string", "minLength": 1 } });
    let name = json!({ "type": "string" });
    let flag = json!({ "type": "boolean" });

    add(
        registry,
        ctx,
        ToolSpec::read(
            "status",
            "Working tree status",
            object_schema(json!({}), &[]),
        ),
        status,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::read(
            "diff",
            "Unstaged or staged diff, optionally limited to paths",
            object_schema(json!({ "staged": flag, "paths": paths }), &[]),
        ),
        diff,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::read(
            "log",
            "Recent commits on HEAD",
            object_schema(
                json!({ "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LOG_LIMIT } }),
                &[],
            ),
        ),
        log,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::read(
            "show",
            "Commit header and file stats",
            object_schema(json!({ "rev": name }), &[]),
        ),
        show,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::read(
            "list-branches",
            "Local branches and the current one",
            object_schema(json!({}), &[]),
        ),
        list_branches,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "stage",
            "Stage the given paths",
            object_schema(
                json!({ "paths": { "type": "array", "items": { "type": "string", "minLength": 1 }, "minItems": 1 }, "allow_all": flag }),
                &["paths"],
            ),
        ),
        stage,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "stage-all-changes",
            "Stage every change in the working tree",
            object_schema(json!({}), &[]),
        ),
        stage_all_changes,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "commit",
            "Commit the staged changes",
            object_schema(
                json!({ "message": { "type": "string", "minLength": 1 }, "amend": flag }),
                &["message"],
            ),
        ),
        commit,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "switch-branch",
            "Switch to a branch, optionally creating it",
            object_schema(json!({ "branch": name, "create": flag }), &["branch"]),
        ),
        switch_branch,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "create-branch",
            "Create a branch without switching to it",
            object_schema(json!({ "name": name, "from": name }), &["name"]),
        ),
        create_branch,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "delete-branch",
            "Delete a local branch",
            object_schema(json!({ "name": name, "force": flag }), &["name"]),
        ),
        delete_branch,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "merge",
            "Merge a branch into the current one",
            object_schema(json!({ "branch": name }), &["branch"]),
        ),
        merge,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "stash-push",
            "Stash tracked changes",
            object_schema(json!({ "message": name }), &[]),
        ),
        stash_push,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "stash-pop",
            "Apply and drop a stash entry",
            object_schema(json!({ "index": { "type": "integer", "minimum": 0 } }), &[]),
        ),
        stash_pop,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "reset",
            "Move HEAD with a soft or mixed reset",
            object_schema(
                json!({ "mode": { "type": "string", "enum": ["soft", "mixed", "hard", "--soft", "--mixed", "--hard"] }, "target": name }),
                &[],
            ),
        ),
        reset,
    )?;
    add(
        registry,
        ctx,
        ToolSpec::write(
            "push",
            "Push a branch to a remote",
            object_schema(json!({ "remote": name, "branch": name, "force": flag }), &[]),
        ),
        push,
    )?;
    Ok(())
}

/// Refuse empty refs and anything git would read as an option.
fn check_ref(value: &str, what: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::invalid(format!("{what} must not be empty")));
    }
    if value.starts_with('-') || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ToolError::invalid(format!("'{value}' is not a valid {what}")));
    }
    Ok(())
}

fn check_branch_name(ctx: &ToolContext, branch: &str) -> Result<(), ToolError> {
    check_ref(branch, "branch name")?;
    ctx.git()
        .run_checked(&["check-ref-format", "--branch", branch])
        .map_err(|_| ToolError::invalid(format!("'{branch}' is not a valid branch name")))?;
    Ok(())
}

fn paths_of(entries: &[StatusEntry]) -> Vec<String> {
    entries.iter().map(|e| e.path.clone()).collect()
}

fn head(ctx: &ToolContext) -> Result<Option<String>, ToolError> {
    ctx.git().head_short_sha().map_err(failed)
}

fn status(ctx: &ToolContext, _args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let git = ctx.git();
    let entries = git.status_porcelain(&[]).map_err(failed)?;
    let branch = git.current_branch().map_err(failed)?;
    Ok(json!({
        "summary": format!("{} changed file(s)", entries.len()),
        "branch": branch,
        "clean": entries.is_empty(),
        "entries": entries,
    }))
}

#[derive(Deserialize)]
struct DiffArgs {
    #[serde(default)]
    staged: bool,
    #[serde(default)]
    paths: Vec<String>,
}

fn diff(ctx: &ToolContext, args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let args: DiffArgs = parse_args(args)?;
    let mut pathspecs = Vec::new();
    for raw in &args.paths {
        pathspecs.push(ctx.relative(&ctx.resolve(raw)?));
    }
    let mut cmd = vec!["diff"];
    if args.staged {
        cmd.push("--cached");
    }
    if !pathspecs.is_empty() {
        cmd.push("--");
        cmd.extend(pathspecs.iter().map(String::as_str));
    }
    let out = ctx.git().run_capture(&cmd).map_err(failed)?;
    let (diff, truncated) = truncate(out, ctx.limit_bytes());
    Ok(json!({ "diff": diff, "truncated": truncated }))
}

#[derive(Deserialize)]
struct LogArgs {
    limit: Option<u32>,
}

fn log(ctx: &ToolContext, args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let args: LogArgs = parse_args(args)?;
    let limit = args.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    let commits = ctx.git().log(None, limit).map_err(failed)?;
    Ok(json!({ "commits": commits }))
}

#[derive(Deserialize)]
struct ShowArgs {
    rev: Option<String>,
}

fn show(ctx: &ToolContext, args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let args: ShowArgs = parse_args(args)?;
    let rev = args.rev.unwrap_or_else(|| "HEAD".to_string());
    check_ref(&rev, "revision")?;
    if !ctx.git().rev_exists(&rev).map_err(failed)? {
        return Err(ToolError::failed(format!("unknown revision '{rev}'")));
    }
    let out = ctx
        .git()
        .run_capture(&["show", "--stat", "--format=%H%n%an <%ae>%n%ad%n%n%B", &rev])
        .map_err(failed)?;
    let (text, truncated) = truncate(out, ctx.limit_bytes());
    Ok(json!({ "rev": rev, "text": text, "truncated": truncated }))
}

fn list_branches(ctx: &ToolContext, _args: &Value, _mode: CallMode) -> Result<Value, ToolError> {
    let git = ctx.git();
    Ok(json!({
        "current": git.current_branch().map_err(failed)?,
        "branches": git.branches().map_err(failed)?,
    }))
}

#[derive(Deserialize)]
struct StageArgs {
    paths: Vec<String>,
    #[serde(default)]
    allow_all: bool,
}

/// Pathspecs that stage the whole tree.
fn is_catch_all(raw: &str) -> bool {
    matches!(raw.trim(), "." | "*" | "./" | ":/" | "-A" | "--all")
}

fn stage(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: StageArgs = parse_args(args)?;
    if args.paths.is_empty() {
        return Err(ToolError::invalid("stage needs at least one path"));
    }
    let mut pathspecs = Vec::new();
    for raw in &args.paths {
        if is_catch_all(raw) && !args.allow_all {
            return Err(ToolError::invalid(format!(
                "'{raw}' stages everything; use stage-all-changes or set allow_all"
            )));
        }
        if raw.starts_with('-') {
            return Err(ToolError::invalid(format!("'{raw}' is not a path")));
        }
        pathspecs.push(ctx.relative(&ctx.resolve(raw)?));
    }
    let specs: Vec<&str> = pathspecs.iter().map(String::as_str).collect();
    let entries = ctx.git().status_porcelain(&specs).map_err(failed)?;
    let pending: Vec<StatusEntry> = entries.into_iter().filter(StatusEntry::has_unstaged).collect();
    let files = paths_of(&pending);

    if mode == CallMode::Preview {
        return Ok(json!({
            "summary": format!("would stage {} file(s)", files.len()),
            "files": files,
            "entries": pending,
        }));
    }
    let mut cmd = vec!["add", "--"];
    cmd.extend(specs);
    ctx.git().run_checked(&cmd).map_err(failed)?;
    info!(files = files.len(), "staged paths");
    Ok(json!({
        "summary": format!("staged {} file(s)", files.len()),
        "files": files,
    }))
}

fn stage_all_changes(ctx: &ToolContext, _args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let entries = ctx.git().status_porcelain(&[]).map_err(failed)?;
    let pending: Vec<StatusEntry> = entries.into_iter().filter(StatusEntry::has_unstaged).collect();
    let files = paths_of(&pending);

    if mode == CallMode::Preview {
        return Ok(json!({
            "summary": format!("would stage {} file(s)", files.len()),
            "files": files,
            "entries": pending,
        }));
    }
    ctx.git().run_checked(&["add", "-A"]).map_err(failed)?;
    info!(files = files.len(), "staged all changes");
    Ok(json!({
        "summary": format!("staged {} file(s)", files.len()),
        "files": files,
    }))
}

#[derive(Deserialize)]
struct CommitArgs {
    message: String,
    #[serde(default)]
    amend: bool,
}

fn commit(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: CommitArgs = parse_args(args)?;
    if args.message.trim().is_empty() {
        return Err(ToolError::invalid("commit message must not be blank"));
    }
    let staged = ctx.git().staged_files().map_err(failed)?;

    if mode == CallMode::Preview {
        let mut warnings = Vec::new();
        if staged.is_empty() && !args.amend {
            warnings.push("nothing is staged yet".to_string());
        }
        let verb = if args.amend { "amend HEAD with" } else { "commit" };
        return Ok(json!({
            "summary": format!("would {verb} {} staged file(s): {:?}", staged.len(), args.message),
            "files": staged,
            "message": args.message,
            "amend": args.amend,
            "warnings": warnings,
        }));
    }
    if staged.is_empty() && !args.amend {
        return Err(ToolError::failed("nothing staged to commit"));
    }
    let mut cmd = vec!["commit", "--quiet", "-m", args.message.as_str()];
    if args.amend {
        cmd.push("--amend");
    }
    ctx.git().run_checked(&cmd).map_err(failed)?;
    let sha = head(ctx)?;
    info!(sha = ?sha, files = staged.len(), "committed");
    Ok(json!({
        "summary": format!("committed {}", sha.as_deref().unwrap_or("HEAD")),
        "commit": sha,
        "files": staged,
    }))
}

#[derive(Deserialize)]
struct SwitchArgs {
    branch: String,
    #[serde(default)]
    create: bool,
}

fn switch_branch(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: SwitchArgs = parse_args(args)?;
    check_branch_name(ctx, &args.branch)?;
    let git = ctx.git();
    let exists = git.branch_exists(&args.branch).map_err(failed)?;
    let dirty: Vec<String> = git
        .status_porcelain(&[])
        .map_err(failed)?
        .into_iter()
        .filter(|e| !e.is_untracked())
        .map(|e| e.path)
        .collect();
    let from = git.current_branch().map_err(failed)?;

    if mode == CallMode::Preview {
        let mut warnings = Vec::new();
        if !exists && !args.create {
            warnings.push(format!("branch '{}' does not exist yet", args.branch));
        }
        if exists && args.create {
            warnings.push(format!("branch '{}' already exists", args.branch));
        }
        if !dirty.is_empty() {
            warnings.push(format!("{} uncommitted change(s) in the way", dirty.len()));
        }
        return Ok(json!({
            "summary": format!(
                "would switch from {} to {}{}",
                from.as_deref().unwrap_or("detached HEAD"),
                args.branch,
                if args.create { " (new)" } else { "" }
            ),
            "from": from,
            "to": args.branch,
            "exists": exists,
            "warnings": warnings,
        }));
    }
    if !exists && !args.create {
        return Err(ToolError::failed(format!(
            "branch '{}' does not exist",
            args.branch
        )));
    }
    if exists && args.create {
        return Err(ToolError::failed(format!(
            "branch '{}' already exists",
            args.branch
        )));
    }
    if !dirty.is_empty() {
        return Err(ToolError::failed(format!(
            "working tree has {} uncommitted change(s); commit or stash them first",
            dirty.len()
        )));
    }
    let mut cmd = vec!["switch", "--quiet"];
    if args.create {
        cmd.push("-c");
    }
    cmd.push(args.branch.as_str());
    git.run_checked(&cmd).map_err(failed)?;
    info!(branch = %args.branch, "switched branch");
    Ok(json!({
        "summary": format!("switched to {}", args.branch),
        "from": from,
        "to": args.branch,
    }))
}

#[derive(Deserialize)]
struct CreateArgs {
    name: String,
    from: Option<String>,
}

fn create_branch(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: CreateArgs = parse_args(args)?;
    check_branch_name(ctx, &args.name)?;
    if let Some(from) = &args.from {
        check_ref(from, "start point")?;
    }
    let git = ctx.git();
    let exists = git.branch_exists(&args.name).map_err(failed)?;
    let start = args.from.clone().unwrap_or_else(|| "HEAD".to_string());

    if mode == CallMode::Preview {
        let warnings: Vec<String> = exists
            .then(|| format!("branch '{}' already exists", args.name))
            .into_iter()
            .collect();
        return Ok(json!({
            "summary": format!("would create branch {} at {start}", args.name),
            "name": args.name,
            "from": start,
            "exists": exists,
            "warnings": warnings,
        }));
    }
    if exists {
        return Err(ToolError::failed(format!(
            "branch '{}' already exists",
            args.name
        )));
    }
    if !git.rev_exists(&start).map_err(failed)? {
        return Err(ToolError::failed(format!("unknown start point '{start}'")));
    }
    git.run_checked(&["branch", &args.name, &start])
        .map_err(failed)?;
    info!(branch = %args.name, from = %start, "created branch");
    Ok(json!({ "summary": format!("created branch {} at {start}", args.name) }))
}

#[derive(Deserialize)]
struct DeleteArgs {
    name: String,
    #[serde(default)]
    force: bool,
}

fn delete_branch(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: DeleteArgs = parse_args(args)?;
    check_ref(&args.name, "branch name")?;
    let git = ctx.git();
    let exists = git.branch_exists(&args.name).map_err(failed)?;
    let current = git.current_branch().map_err(failed)?;
    let is_current = current.as_deref() == Some(args.name.as_str());

    if mode == CallMode::Preview {
        let mut warnings = Vec::new();
        if !exists {
            warnings.push(format!("branch '{}' does not exist", args.name));
        }
        if is_current {
            warnings.push(format!("branch '{}' is checked out", args.name));
        }
        return Ok(json!({
            "summary": format!(
                "would delete branch {}{}",
                args.name,
                if args.force { " (force)" } else { "" }
            ),
            "name": args.name,
            "exists": exists,
            "warnings": warnings,
        }));
    }
    if !exists {
        return Err(ToolError::failed(format!(
            "branch '{}' does not exist",
            args.name
        )));
    }
    if is_current {
        return Err(ToolError::failed(format!(
            "cannot delete the checked out branch '{}'",
            args.name
        )));
    }
    let flag = if args.force { "-D" } else { "-d" };
    git.run_checked(&["branch", flag, &args.name])
        .map_err(failed)?;
    info!(branch = %args.name, force = args.force, "deleted branch");
    Ok(json!({ "summary": format!("deleted branch {}", args.name) }))
}

#[derive(Deserialize)]
struct MergeArgs {
    branch: String,
}

fn merge(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: MergeArgs = parse_args(args)?;
    check_ref(&args.branch, "branch name")?;
    let git = ctx.git();
    let exists = git.rev_exists(&args.branch).map_err(failed)?;

    if mode == CallMode::Preview {
        let commits = if exists {
            git.log(Some(&format!("HEAD..{}", args.branch)), MAX_LOG_LIMIT)
                .map_err(failed)?
        } else {
            Vec::new()
        };
        let warnings: Vec<String> = (!exists)
            .then(|| format!("'{}' does not exist yet", args.branch))
            .into_iter()
            .collect();
        return Ok(json!({
            "summary": format!("would merge {} commit(s) from {}", commits.len(), args.branch),
            "commits": commits,
            "warnings": warnings,
        }));
    }
    if !exists {
        return Err(ToolError::failed(format!(
            "unknown branch '{}'",
            args.branch
        )));
    }
    let before = head(ctx)?;
    git.run_checked(&["merge", "--no-edit", "--quiet", &args.branch])
        .map_err(failed)?;
    let after = head(ctx)?;
    let files = match (&before, &after) {
        (Some(before), Some(after)) if before != after => {
            git.changed_between(before, after).map_err(failed)?
        }
        _ => Vec::new(),
    };
    info!(branch = %args.branch, "merged");
    Ok(json!({
        "summary": format!("merged {} into HEAD", args.branch),
        "commit": after,
        "files": files,
    }))
}

#[derive(Deserialize)]
struct StashPushArgs {
    message: Option<String>,
}

fn stash_push(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: StashPushArgs = parse_args(args)?;
    let tracked: Vec<String> = ctx
        .git()
        .status_porcelain(&[])
        .map_err(failed)?
        .into_iter()
        .filter(|e| !e.is_untracked())
        .map(|e| e.path)
        .collect();

    if mode == CallMode::Preview {
        return Ok(json!({
            "summary": format!("would stash {} file(s)", tracked.len()),
            "files": tracked,
        }));
    }
    if tracked.is_empty() {
        return Err(ToolError::failed("no local changes to stash"));
    }
    let mut cmd = vec!["stash", "push", "--quiet"];
    if let Some(message) = &args.message {
        cmd.push("-m");
        cmd.push(message);
    }
    ctx.git().run_checked(&cmd).map_err(failed)?;
    info!(files = tracked.len(), "stashed changes");
    Ok(json!({
        "summary": format!("stashed {} file(s)", tracked.len()),
        "files": tracked,
    }))
}

#[derive(Deserialize)]
struct StashPopArgs {
    index: Option<u32>,
}

fn stash_pop(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: StashPopArgs = parse_args(args)?;
    let index = args.index.unwrap_or(0);
    let git = ctx.git();
    let count = git.stash_count().map_err(failed)?;
    let present = (index as usize) < count;
    let files = if present {
        git.stash_files(index).map_err(failed)?
    } else {
        Vec::new()
    };

    if mode == CallMode::Preview {
        let warnings: Vec<String> = (!present)
            .then(|| format!("stash@{{{index}}} does not exist yet"))
            .into_iter()
            .collect();
        return Ok(json!({
            "summary": format!("would apply stash@{{{index}}} ({} file(s))", files.len()),
            "files": files,
            "warnings": warnings,
        }));
    }
    if !present {
        return Err(ToolError::failed(format!(
            "stash@{{{index}}} does not exist ({count} entries)"
        )));
    }
    let entry = format!("stash@{{{index}}}");
    git.run_checked(&["stash", "pop", "--quiet", &entry])
        .map_err(failed)?;
    info!(index, "popped stash");
    Ok(json!({
        "summary": format!("applied {entry}"),
        "files": files,
    }))
}

#[derive(Deserialize)]
struct ResetArgs {
    mode: Option<String>,
    target: Option<String>,
}

fn reset(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: ResetArgs = parse_args(args)?;
    let reset_mode = match args.mode.as_deref() {
        None => ResetMode::Mixed,
        Some(raw) => ResetMode::parse(raw)
            .ok_or_else(|| ToolError::invalid(format!("unknown reset mode '{raw}'")))?,
    };
    if reset_mode == ResetMode::Hard {
        return Err(ToolError::failed("hard reset is not supported by this server"));
    }
    let target = args.target.unwrap_or_else(|| "HEAD".to_string());
    check_ref(&target, "reset target")?;
    let git = ctx.git();
    let staged = git.staged_files().map_err(failed)?;

    if mode == CallMode::Preview {
        let exists = git.rev_exists(&target).map_err(failed)?;
        let warnings: Vec<String> = (!exists)
            .then(|| format!("unknown revision '{target}'"))
            .into_iter()
            .collect();
        return Ok(json!({
            "summary": format!("would reset {} to {target}", reset_mode.flag()),
            "files": staged,
            "warnings": warnings,
        }));
    }
    if !git.rev_exists(&target).map_err(failed)? {
        return Err(ToolError::failed(format!("unknown revision '{target}'")));
    }
    git.run_checked(&["reset", "--quiet", reset_mode.flag(), &target])
        .map_err(failed)?;
    debug!(target = %target, "reset");
    Ok(json!({
        "summary": format!("reset {} to {target}", reset_mode.flag()),
        "files": staged,
    }))
}

#[derive(Deserialize)]
struct PushArgs {
    remote: Option<String>,
    branch: Option<String>,
    #[serde(default)]
    force: bool,
}

fn push(ctx: &ToolContext, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
    let args: PushArgs = parse_args(args)?;
    if args.force {
        return Err(ToolError::failed("forced push is not supported by this server"));
    }
    let remote = args.remote.unwrap_or_else(|| "origin".to_string());
    check_ref(&remote, "remote")?;
    let git = ctx.git();
    let branch = match args.branch {
        Some(branch) => branch,
        None => git
            .current_branch()
            .map_err(failed)?
            .ok_or_else(|| ToolError::failed("detached HEAD; name a branch to push"))?,
    };
    check_ref(&branch, "branch name")?;
    let remote_exists = git.remote_exists(&remote).map_err(failed)?;

    if mode == CallMode::Preview {
        let warnings: Vec<String> = (!remote_exists)
            .then(|| format!("remote '{remote}' is not configured"))
            .into_iter()
            .collect();
        return Ok(json!({
            "summary": format!("would push {branch} to {remote}"),
            "remote": remote,
            "branch": branch,
            "warnings": warnings,
        }));
    }
    if !remote_exists {
        return Err(ToolError::failed(format!(
            "remote '{remote}' is not configured"
        )));
    }
    git.run_checked(&["push", "--quiet", &remote, &branch])
        .map_err(failed)?;
    info!(remote = %remote, branch = %branch, "pushed");
    Ok(json!({ "summary": format!("pushed {branch} to {remote}") }))
}
