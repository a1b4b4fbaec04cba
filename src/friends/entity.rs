use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::frontmatter::{self, Frontmatter, FrontmatterValue};

/// File extensions recognised as friend documents.
const DOCUMENT_EXTENSIONS: [&str; 2] = ["md", "mdx"];

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Failed to list friends directory {}: {source}", path.display())]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read friend document {}: {source}", path.display())]
    ReadDocument {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reachability status persisted in a friend document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    #[default]
    Active,
    Inactive,
}

impl FriendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendStatus::Active => "active",
            FriendStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for FriendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One friend link, backed by a document in the friends directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEntity {
    /// File name without extension; unique within the directory
    pub id: String,
    /// Document this entity was read from (and is written back to)
    pub path: PathBuf,
    pub name: String,
    /// Site to probe; entities without one are never checked
    pub website: Option<String>,
    /// Feed URL, consumed by the feed fan-out only
    pub rss: Option<String>,
    pub status: FriendStatus,
    pub last_checked: Option<DateTime<Utc>>,
    /// Consecutive failed probes
    pub failed_count: u32,
    pub hidden: bool,
}

impl TrackedEntity {
    /// Builds an entity from a parsed frontmatter map, applying the field
    /// defaults: `active`, zero failures, not hidden.
    pub fn from_frontmatter(id: &str, path: &Path, data: &Frontmatter) -> Self {
        let text = |key: &str| {
            data.get(key)
                .and_then(FrontmatterValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let name = text("name").unwrap_or_else(|| {
            tracing::warn!(friend = %id, "Friend document has no name, using its id");
            id.to_string()
        });

        let status = match data.get("status").and_then(FrontmatterValue::as_str) {
            Some("inactive") => FriendStatus::Inactive,
            _ => FriendStatus::Active,
        };

        let failed_count = data
            .get("failedCount")
            .and_then(FrontmatterValue::as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n.min(u32::MAX as f64) as u32)
            .unwrap_or(0);

        Self {
            id: id.to_string(),
            path: path.to_path_buf(),
            name,
            website: text("website"),
            rss: text("rss"),
            status,
            last_checked: data.get("lastChecked").and_then(FrontmatterValue::as_date),
            failed_count,
            hidden: data
                .get("hidden")
                .and_then(FrontmatterValue::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Lists every friend document in `dir` and parses its frontmatter.
///
/// Only `.md` and `.mdx` files are considered. Results are ordered by id so a
/// cycle visits friends in a stable order on every filesystem.
///
/// # Errors
///
/// Returns [`EntityError`] if the directory cannot be listed or a document
/// cannot be read. Documents without a valid frontmatter block are still
/// returned, with every field at its default.
pub async fn load_entities(dir: &Path) -> Result<Vec<TrackedEntity>, EntityError> {
    let list_err = |source| EntityError::ListDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::read_dir(dir).await.map_err(list_err)?;
    let mut entities = Vec::new();

    while let Some(entry) = reader.next_entry().await.map_err(list_err)? {
        let path = entry.path();
        let Some(id) = document_id(&path) else {
            continue;
        };
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| EntityError::ReadDocument {
                path: path.clone(),
                source,
            })?;

        let data = frontmatter::parse(&content);
        if data.is_empty() {
            tracing::warn!(path = %path.display(), "Friend document has no frontmatter");
        }
        entities.push(TrackedEntity::from_frontmatter(&id, &path, &data));
    }

    entities.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::debug!(dir = %dir.display(), count = entities.len(), "Loaded friend documents");
    Ok(entities)
}

fn document_id(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !DOCUMENT_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}
