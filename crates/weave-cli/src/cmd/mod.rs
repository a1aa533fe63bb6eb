pub mod agent;
pub mod analytics;
pub mod cleanup;
pub mod config;
pub mod dashboard;
pub mod field;
pub mod init;
pub mod maintain;
pub mod message;
pub mod state;
pub mod work;

use anyhow::Context;
use std::path::Path;
use weave_core::Weave;

/// Open the weave under `root`. The store is created on first use.
pub fn open(root: &Path) -> anyhow::Result<Weave> {
    Weave::open(root).with_context(|| format!("failed to open weave at {}", root.display()))
}
