use crate::error::{Result, WeaveError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const WEAVE_DIR: &str = ".weave";
pub const CONFIG_FILE: &str = ".weave/config.yaml";
pub const DB_FILE: &str = ".weave/weave.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn weave_dir(root: &Path) -> PathBuf {
    root.join(WEAVE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

// ---------------------------------------------------------------------------
// Work id validation
// ---------------------------------------------------------------------------

static WORK_ID_RE: OnceLock<Regex> = OnceLock::new();

fn work_id_re() -> &'static Regex {
    WORK_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap())
}

/// Work ids travel through CLI arguments and message metadata, so they are
/// restricted to a conservative character set.
pub fn validate_work_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !work_id_re().is_match(id) {
        return Err(WeaveError::InvalidWorkId(id.to_string()));
    }
    Ok(())
}

/// Generate an id for a work item created without one.
pub fn generate_work_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("work_{}", &uuid[..12])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
