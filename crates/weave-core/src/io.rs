use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `data` in a single rename. The temp file is created
/// beside the target so the rename stays on one filesystem.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".weave-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Seed a file the user may edit later. Returns whether it was written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.try_exists()? {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".weave/nested/config.yaml");
        atomic_write(&path, b"version: 1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "version: 1\n");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn write_if_missing_keeps_user_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".gitignore");
        assert!(write_if_missing(&path, b"weave.db\n").unwrap());
        std::fs::write(&path, b"edited").unwrap();
        assert!(!write_if_missing(&path, b"weave.db\n").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited");
    }
}
