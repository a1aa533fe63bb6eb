use std::path::{Path, PathBuf};
use weave_core::paths::WEAVE_DIR;

/// Resolve the weave root.
///
/// Priority:
/// 1. `--root` flag / `WEAVE_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of cwd containing `.weave/`
/// 3. cwd
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_weave_root(&cwd).unwrap_or(cwd)
}

fn find_weave_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(WEAVE_DIR).is_dir())
        .map(Path::to_path_buf)
}
