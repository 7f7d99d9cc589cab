//! Read-only workspace resources served over `resources/*`.

use std::fs;
use std::sync::Arc;

use serde_json::json;

use super::{ToolContext, files::walk, truncate};
use crate::protocol::registry::ToolError;
use crate::protocol::server::{ResourceContents, ResourceDescriptor, ResourceProvider};

const INFO_URI: &str = "workspace/info";
const TREE_URI: &str = "workspace/tree";
const FILE_PREFIX: &str = "file:";

pub struct WorkspaceResources {
    ctx: Arc<ToolContext>,
}

impl WorkspaceResources {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    fn info(&self) -> Result<String, ToolError> {
        let git = self.ctx.git();
        let is_repo = git.is_repo();
        let (branch, changed) = if is_repo {
            let branch = git.current_branch().map_err(super::failed)?;
            let changed = git.status_porcelain(&[]).map_err(super::failed)?.len();
            (branch, changed)
        } else {
            (None, 0)
        };
        let body = json!({
            "root": self.ctx.root().path().display().to_string(),
            "git_repo": is_repo,
            "branch": branch,
            "changed_files": changed,
        });
        serde_json::to_string_pretty(&body).map_err(|err| ToolError::failed(err.to_string()))
    }

    fn tree(&self) -> Result<String, ToolError> {
        let mut files = Vec::new();
        walk(&self.ctx, self.ctx.root().path(), &mut files).map_err(super::failed)?;
        files.sort();
        Ok(files.join("\n"))
    }

    fn file(&self, raw: &str) -> Result<String, ToolError> {
        let path = self.ctx.resolve(raw)?;
        if !path.is_file() {
            return Err(ToolError::not_found(format!("no file '{raw}'")));
        }
        let bytes =
            fs::read(&path).map_err(|err| ToolError::failed(format!("read '{raw}': {err}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl ResourceProvider for WorkspaceResources {
    fn list(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor {
                uri: INFO_URI.to_string(),
                name: "workspace info".to_string(),
                description: "Root path, branch and change count".to_string(),
                mime_type: "application/json".to_string(),
            },
            ResourceDescriptor {
                uri: TREE_URI.to_string(),
                name: "workspace tree".to_string(),
                description: "Every file in the workspace, one per line".to_string(),
                mime_type: "text/plain".to_string(),
            },
            ResourceDescriptor {
                uri: format!("{FILE_PREFIX}{{path}}"),
                name: "workspace file".to_string(),
                description: "Contents of one workspace file".to_string(),
                mime_type: "text/plain".to_string(),
            },
        ]
    }

    fn read(&self, uri: &str) -> Result<ResourceContents, ToolError> {
        let (text, mime_type) = match uri {
            INFO_URI => (self.info()?, "application/json"),
            TREE_URI => (self.tree()?, "text/plain"),
            _ => match uri.strip_prefix(FILE_PREFIX) {
                Some(raw) => (self.file(raw)?, "text/plain"),
                None => return Err(ToolError::not_found(format!("unknown resource '{uri}'"))),
            },
        };
        let (text, truncated) = truncate(text, self.ctx.limit_bytes());
        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type: mime_type.to_string(),
            text,
            truncated,
        })
    }
}
