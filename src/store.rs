use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::naming::{FileKind, SequenceContext};

/// Filesystem capabilities consumed by capture tasks and the naming scheme.
///
/// [`LocalStore`] is the real implementation.
pub trait FileStore: Send + Sync {
    /// Create `path` and any missing parents.
    fn create_dir(&self, path: &Path) -> std::io::Result<()>;
    /// Write `bytes` to `path` so readers never observe a partial file.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Number of direct children of `dir`; zero if it does not exist.
    fn entry_count(&self, dir: &Path) -> usize;
}

/// [`FileStore`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl FileStore for LocalStore {
    fn create_dir(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn entry_count(&self, dir: &Path) -> usize {
        if !dir.is_dir() {
            return 0;
        }
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .count()
    }
}

/// Delete both directories of a scene the user chose to discard.
pub fn discard_scene(context: &SequenceContext) -> Result<()> {
    for kind in [FileKind::Jpeg, FileKind::Raw] {
        let dir = context.directory(kind);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            log::info!("Discarded {}", dir.display());
        }
    }
    Ok(())
}

/// Rename both directories of a scene to carry a user label.
///
/// `Scene-004_JPG_<ts>` becomes `Scene-004-<label>_JPG_<ts>`. Returns the new
/// JPEG and RAW directory paths.
pub fn label_scene(context: &SequenceContext, label: &str) -> Result<(PathBuf, PathBuf)> {
    let label = sanitize_label(label);
    if label.is_empty() {
        anyhow::bail!("Scene label must contain at least one letter or digit");
    }

    let jpeg = rename_scene_dir(context, FileKind::Jpeg, &label)?;
    let raw = rename_scene_dir(context, FileKind::Raw, &label)?;
    Ok((jpeg, raw))
}

fn rename_scene_dir(context: &SequenceContext, kind: FileKind, label: &str) -> Result<PathBuf> {
    let from = context.directory(kind);
    let to = context.labeled_directory(kind, label);
    if from.exists() {
        std::fs::rename(&from, &to)
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))?;
        log::info!("Labeled {} -> {}", from.display(), to.display());
    }
    Ok(to)
}

/// Keep labels filesystem-safe: letters, digits, dash and underscore.
fn sanitize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingScheme;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn context_in(root: &Path) -> SequenceContext {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        NamingScheme::new("dev1", root).begin_scene(&LocalStore, now)
    }

    #[test]
    fn write_atomic_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        LocalStore.write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        // No temp files left behind
        assert_eq!(LocalStore.entry_count(dir.path()), 1);
    }

    #[test]
    fn write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"old").unwrap();
        LocalStore.write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn write_atomic_fails_without_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a.bin");
        assert!(LocalStore.write_atomic(&path, b"x").is_err());
    }

    #[test]
    fn entry_count_missing_dir_is_zero() {
        assert_eq!(LocalStore.entry_count(Path::new("/nonexistent/root")), 0);
    }

    #[test]
    fn entry_count_is_shallow() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a").join("deep.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        assert_eq!(LocalStore.entry_count(dir.path()), 2);
    }

    #[test]
    fn discard_removes_both_directories() {
        let dir = TempDir::new().unwrap();
        let ctx = context_in(dir.path());
        fs::create_dir_all(ctx.directory(FileKind::Jpeg)).unwrap();
        fs::create_dir_all(ctx.directory(FileKind::Raw)).unwrap();

        discard_scene(&ctx).unwrap();
        assert!(!ctx.directory(FileKind::Jpeg).exists());
        assert!(!ctx.directory(FileKind::Raw).exists());
    }

    #[test]
    fn label_renames_both_directories() {
        let dir = TempDir::new().unwrap();
        let ctx = context_in(dir.path());
        fs::create_dir_all(ctx.directory(FileKind::Jpeg)).unwrap();
        fs::create_dir_all(ctx.directory(FileKind::Raw)).unwrap();

        let (jpeg, raw) = label_scene(&ctx, "back yard").unwrap();
        assert!(jpeg.ends_with("Scene-001-back-yard_JPG_20240301-120000"));
        assert!(raw.ends_with("Scene-001-back-yard_DNG_20240301-120000"));
        assert!(jpeg.is_dir());
        assert!(raw.is_dir());
    }

    #[test]
    fn label_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let ctx = context_in(dir.path());
        assert!(label_scene(&ctx, "  ?! ").is_err());
    }
}
