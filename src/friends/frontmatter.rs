use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::entity::FriendStatus;

/// Line that opens and closes the frontmatter block.
pub const DELIMITER: &str = "---";

/// Consecutive failures after which a friend is written as `hidden: true`.
pub const HIDE_THRESHOLD: u32 = 3;

/// Prefixes of the lines owned by [`update_status`]. A line is managed when its
/// trimmed text starts with one of these, colon included, so `  hidden:true`
/// is replaced while `statusNote:` is kept.
const MANAGED_PREFIXES: [&str; 4] = ["status:", "lastChecked:", "failedCount:", "hidden:"];

/// Why a document has no usable frontmatter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("first line is not '---'")]
    MissingStart,
    #[error("no closing '---' line")]
    MissingEnd,
}

#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid frontmatter in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: BlockError },
}

/// A coerced frontmatter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontmatterValue {
    String(String),
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
}

impl FrontmatterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FrontmatterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FrontmatterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FrontmatterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FrontmatterValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Parsed `key: value` pairs of a frontmatter block.
pub type Frontmatter = BTreeMap<String, FrontmatterValue>;

/// Parses the frontmatter block at the top of `text`.
///
/// A document whose first line is not exactly `---`, or that never closes the
/// block, yields an empty map rather than an error. Inside the block every line
/// with a colon after position 0 becomes one entry, split on the first colon.
/// Later duplicates of a key win.
///
/// # Examples
///
/// ```
/// use friendlink::friends::{parse_frontmatter, FrontmatterValue};
///
/// let fm = parse_frontmatter("---\nname: \"Alice\"\nfailedCount: 2\n---\nbody");
/// assert_eq!(fm["name"], FrontmatterValue::String("Alice".into()));
/// assert_eq!(fm["failedCount"], FrontmatterValue::Number(2.0));
/// ```
pub fn parse(text: &str) -> Frontmatter {
    let lines: Vec<&str> = text.split('\n').collect();
    let Ok(end) = locate_block(&lines) else {
        return Frontmatter::new();
    };

    let mut data = Frontmatter::new();
    for line in &lines[1..end] {
        let Some(colon) = line.find(':') else {
            continue;
        };
        if colon == 0 {
            continue;
        }
        let key = line[..colon].trim();
        let raw = line[colon + 1..].trim();
        data.insert(key.to_string(), coerce(raw));
    }
    data
}

/// Returns the index of the closing delimiter, with the opening one at index 0.
fn locate_block(lines: &[&str]) -> Result<usize, BlockError> {
    if lines.first() != Some(&DELIMITER) {
        return Err(BlockError::MissingStart);
    }
    lines
        .iter()
        .skip(1)
        .position(|line| *line == DELIMITER)
        .map(|pos| pos + 1)
        .ok_or(BlockError::MissingEnd)
}

/// Quote stripping first, then boolean, number and ISO date coercion on the
/// unquoted text. A quoted `'2024-01-01T00:00:00Z'` is therefore a date.
fn coerce(raw: &str) -> FrontmatterValue {
    let value = strip_quotes(raw);

    match value {
        "true" => return FrontmatterValue::Bool(true),
        "false" => return FrontmatterValue::Bool(false),
        _ => {}
    }

    if let Some(n) = parse_number(value) {
        return FrontmatterValue::Number(n);
    }

    if value.contains('T') && value.contains('Z') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return FrontmatterValue::Date(dt.with_timezone(&Utc));
        }
    }

    FrontmatterValue::String(value.to_string())
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn parse_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Rewrites the managed status lines of the document at `path`, stamping
/// `lastChecked` with the current time.
///
/// See [`update_status_at`] for the exact rewrite rules.
pub fn update_status(
    path: &Path,
    status: FriendStatus,
    failed_count: Option<u32>,
) -> Result<(), FrontmatterError> {
    update_status_at(path, status, failed_count, Utc::now())
}

/// Rewrites the managed status lines of the document at `path`.
///
/// Existing `status:`, `lastChecked:`, `failedCount:` and `hidden:` lines are
/// removed from the block and fresh ones appended. `failedCount` is only
/// written when supplied, and `hidden: true` only once the count reaches
/// [`HIDE_THRESHOLD`]. The text after the closing delimiter is copied
/// byte-for-byte, and the file is replaced as a whole.
///
/// # Errors
///
/// - [`FrontmatterError::Read`] if the document cannot be read
/// - [`FrontmatterError::Malformed`] if the block is missing or unclosed
/// - [`FrontmatterError::Write`] if the replacement cannot be written
pub fn update_status_at(
    path: &Path,
    status: FriendStatus,
    failed_count: Option<u32>,
    now: DateTime<Utc>,
) -> Result<(), FrontmatterError> {
    let content = std::fs::read_to_string(path).map_err(|source| FrontmatterError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let updated = apply_status(&content, status, failed_count, now).map_err(|reason| {
        FrontmatterError::Malformed {
            path: path.to_path_buf(),
            reason,
        }
    })?;

    write_replacing(path, &updated).map_err(|source| FrontmatterError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let hidden = failed_count.unwrap_or(0) >= HIDE_THRESHOLD;
    tracing::debug!(
        path = %path.display(),
        status = %status,
        failed_count = ?failed_count,
        hidden = hidden,
        "Updated friend status"
    );
    Ok(())
}

/// Pure form of [`update_status_at`]: returns the rewritten document text.
pub fn apply_status(
    content: &str,
    status: FriendStatus,
    failed_count: Option<u32>,
    now: DateTime<Utc>,
) -> Result<String, BlockError> {
    let lines: Vec<&str> = content.split('\n').collect();
    let end = locate_block(&lines)?;

    let mut block: Vec<String> = lines[1..end]
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            !MANAGED_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .map(|line| line.to_string())
        .collect();

    block.push(format!("status: '{}'", status));
    block.push(format!(
        "lastChecked: '{}'",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    if let Some(count) = failed_count {
        block.push(format!("failedCount: {}", count));
    }
    if failed_count.unwrap_or(0) >= HIDE_THRESHOLD {
        block.push("hidden: true".to_string());
    }

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 4);
    out.push(lines[0]);
    out.extend(block.iter().map(String::as_str));
    out.extend_from_slice(&lines[end..]);
    Ok(out.join("\n"))
}

/// Replaces `path` with `content` via a sibling temp file and a rename, so a
/// failed write never leaves a truncated document behind.
fn write_replacing(path: &Path, content: &str) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        #[cfg(windows)]
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
