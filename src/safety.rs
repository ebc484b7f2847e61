//! File safety: backups, integrity hashing, and the guarded safe-write
//! protocol every adapter mutation goes through.
//!
//! A metadata operation either fully succeeds or leaves the original file
//! byte-identical to its pre-operation state. The one residual risk: if the
//! primary write fails *and* the restore-from-backup copy also fails, the
//! target may be left modified — that double fault is logged and the original
//! error still propagates.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{MetadataError, Result};

const HASH_CHUNK_SIZE: usize = 4096;

/// Manages backups, integrity checks, and atomic file replacement.
#[derive(Debug, Default, Clone)]
pub struct FileSafetyManager {
    /// Custom backup directory. `None` places backups next to the original.
    backup_dir: Option<PathBuf>,
}

impl FileSafetyManager {
    pub fn new() -> Self {
        Self { backup_dir: None }
    }

    /// Use a dedicated directory for all backups instead of siblings.
    pub fn with_backup_dir(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: Some(backup_dir.into()),
        }
    }

    /// Timestamped backup path for `original`: `name.backup.<unix_ts>.ext`.
    pub fn backup_path_for(&self, original: &Path) -> PathBuf {
        let dir = self
            .backup_dir
            .clone()
            .unwrap_or_else(|| original.parent().unwrap_or(Path::new(".")).to_path_buf());
        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let ext = original
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        dir.join(format!("{stem}.backup.{}{ext}", unix_timestamp()))
    }

    /// Copy `file_path` to a timestamped sibling (or `backup_path` if given).
    ///
    /// Fails with [`MetadataError::Backup`] if the source is missing or the
    /// destination cannot be created — callers rely on this for rollback
    /// safety, so the failure is never swallowed.
    pub fn create_backup(&self, file_path: &Path, backup_path: Option<&Path>) -> Result<PathBuf> {
        if !file_path.exists() {
            return Err(MetadataError::Backup(format!(
                "cannot backup non-existent file: {}",
                file_path.display()
            )));
        }

        let backup_path = match backup_path {
            Some(p) => p.to_path_buf(),
            None => self.backup_path_for(file_path),
        };

        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Backup(format!("cannot create backup dir: {e}")))?;
        }
        fs::copy(file_path, &backup_path)
            .map_err(|e| MetadataError::Backup(format!("failed to create backup: {e}")))?;

        log::info!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }

    /// Streaming SHA-256 of the whole file.
    ///
    /// Returns an empty string — not an error — on any I/O failure. Callers
    /// must treat `""` as "hash unavailable", never as a valid digest.
    pub fn calculate_file_hash(&self, file_path: &Path) -> String {
        let mut hasher = Sha256::new();
        let mut file = match File::open(file_path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("Failed to open {} for hashing: {e}", file_path.display());
                return String::new();
            }
        };

        let mut buf = [0u8; HASH_CHUNK_SIZE];
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) => {
                    log::error!("Failed to hash {}: {e}", file_path.display());
                    return String::new();
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Coarse existence + size sanity check between an original and its
    /// modified counterpart. Warns (does not fail) when sizes differ by more
    /// than `tolerance` (a ratio, e.g. `0.10`). Finer pixel-level checks are
    /// the adapter's job.
    pub fn verify_file_integrity(
        &self,
        original: &Path,
        modified: &Path,
        tolerance: f64,
    ) -> bool {
        if !modified.exists() {
            log::error!("Modified file does not exist: {}", modified.display());
            return false;
        }

        let (orig_size, mod_size) = match (fs::metadata(original), fs::metadata(modified)) {
            (Ok(o), Ok(m)) => (o.len(), m.len()),
            _ => {
                log::error!("File integrity check failed: cannot stat files");
                return false;
            }
        };

        if orig_size > 0 {
            let ratio = (mod_size as f64 - orig_size as f64).abs() / orig_size as f64;
            if ratio > tolerance {
                log::warn!("Significant size difference: {orig_size} -> {mod_size}");
            }
        }
        true
    }

    /// Begin a guarded write against `target`.
    ///
    /// The returned [`SafeFileOperation`] owns a private temp copy of the
    /// target (when it exists). Mutate the file at
    /// [`temp_path`](SafeFileOperation::temp_path), then call
    /// [`commit`](SafeFileOperation::commit) to atomically move it over the
    /// target. Dropping the guard without committing aborts: the target is
    /// restored from the backup (when one was taken) and the temp file and
    /// its directory are removed on every exit path.
    pub fn begin_safe_operation(
        &self,
        target: &Path,
        create_backup: bool,
    ) -> Result<SafeFileOperation> {
        let backup_path = if create_backup && target.exists() {
            Some(self.create_backup(target, None)?)
        } else {
            None
        };

        let temp_dir = target.parent().unwrap_or(Path::new(".")).join(".sweep-tmp");
        fs::create_dir_all(&temp_dir)?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        // Millisecond timestamp plus pid reduces (does not eliminate) collisions;
        // callers must serialize concurrent writes to the same path.
        let temp_path = temp_dir.join(format!(
            "tmp_{}_{}_{name}",
            millis_timestamp(),
            std::process::id()
        ));

        if target.exists() {
            fs::copy(target, &temp_path)?;
        }

        log::debug!(
            "Starting safe operation: {} -> {}",
            target.display(),
            temp_path.display()
        );

        Ok(SafeFileOperation {
            target: target.to_path_buf(),
            temp_path,
            temp_dir,
            backup_path,
            committed: false,
        })
    }

    /// Delete the oldest backups of `file_path` beyond `keep_count`, newest
    /// first. Missing or undeletable backups are skipped with a warning.
    /// Returns the number deleted.
    pub fn cleanup_backups(&self, file_path: &Path, keep_count: usize) -> usize {
        let dir = self
            .backup_dir
            .clone()
            .unwrap_or_else(|| file_path.parent().unwrap_or(Path::new(".")).to_path_buf());
        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = file_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut backups: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .is_some_and(|n| {
                        n.starts_with(&format!("{stem}.backup."))
                            && (ext.is_empty() || n.ends_with(&format!(".{ext}")))
                    })
            })
            .filter_map(|p| {
                let mtime = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
                Some((p, mtime))
            })
            .collect();

        if backups.len() <= keep_count {
            return 0;
        }

        // Newest first
        backups.sort_by(|a, b| b.1.cmp(&a.1));

        let mut deleted = 0;
        for (path, _) in backups.into_iter().skip(keep_count) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    log::debug!("Deleted old backup: {}", path.display());
                }
                Err(e) => log::warn!("Failed to delete backup {}: {e}", path.display()),
            }
        }

        if deleted > 0 {
            log::info!("Cleaned up {deleted} old backups for {}", file_path.display());
        }
        deleted
    }
}

/// RAII guard for one safe-write scope. See
/// [`FileSafetyManager::begin_safe_operation`].
#[derive(Debug)]
pub struct SafeFileOperation {
    target: PathBuf,
    temp_path: PathBuf,
    temp_dir: PathBuf,
    backup_path: Option<PathBuf>,
    committed: bool,
}

impl SafeFileOperation {
    /// The private working file to mutate in place.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Path of the backup taken at scope start, if any.
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// Atomically move the temp file over the target.
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.temp_path, &self.target)?;
        self.committed = true;
        log::info!("Safe operation completed: {}", self.target.display());
        Ok(self.target.clone())
    }
}

impl Drop for SafeFileOperation {
    fn drop(&mut self) {
        if !self.committed {
            // Aborted scope: the target was never replaced, but restore from
            // backup anyway in case the caller touched it directly.
            if let Some(backup) = &self.backup_path {
                if backup.exists() && self.target.exists() {
                    match fs::copy(backup, &self.target) {
                        Ok(_) => log::info!("Restored from backup: {}", backup.display()),
                        Err(e) => log::error!("Failed to restore from backup: {e}"),
                    }
                }
            }
        }

        if self.temp_path.exists() {
            if let Err(e) = fs::remove_file(&self.temp_path) {
                log::warn!("Failed to cleanup temp file: {e}");
            }
        }

        // Remove the temp directory only when empty; other in-flight scopes
        // may still be using it.
        if let Ok(mut entries) = fs::read_dir(&self.temp_dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&self.temp_dir);
            }
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn millis_timestamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    // ── hashing ──────────────────────────────────────────────────────

    #[test]
    fn file_hash_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.bin", b"hello world");

        let manager = FileSafetyManager::new();
        let h1 = manager.calculate_file_hash(&path);
        let h2 = manager.calculate_file_hash(&path);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn file_hash_missing_file_is_empty_sentinel() {
        let manager = FileSafetyManager::new();
        assert_eq!(manager.calculate_file_hash(Path::new("/nonexistent")), "");
    }

    // ── backups ──────────────────────────────────────────────────────

    #[test]
    fn backup_copies_contents() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.png", b"fake png");

        let manager = FileSafetyManager::new();
        let backup = manager.create_backup(&path, None).unwrap();
        assert!(backup.exists());
        assert_eq!(fs::read(&backup).unwrap(), b"fake png");

        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("img.backup."));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn backup_of_missing_file_fails() {
        let manager = FileSafetyManager::new();
        let err = manager
            .create_backup(Path::new("/nonexistent/file.jpg"), None)
            .unwrap_err();
        assert!(matches!(err, MetadataError::Backup(_)));
    }

    #[test]
    fn backup_honors_custom_directory() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let path = write_file(&dir, "img.gif", b"x");

        let manager = FileSafetyManager::with_backup_dir(&backups);
        let backup = manager.create_backup(&path, None).unwrap();
        assert!(backup.starts_with(&backups));
    }

    // ── safe-write scope ─────────────────────────────────────────────

    #[test]
    fn commit_replaces_target_and_cleans_temp() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.webp", b"original");

        let manager = FileSafetyManager::new();
        let op = manager.begin_safe_operation(&path, false).unwrap();
        fs::write(op.temp_path(), b"modified").unwrap();
        op.commit().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"modified");
        assert!(!dir.path().join(".sweep-tmp").exists());
    }

    #[test]
    fn abort_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.jpg", b"original");

        let manager = FileSafetyManager::new();
        let before = manager.calculate_file_hash(&path);
        {
            let op = manager.begin_safe_operation(&path, true).unwrap();
            fs::write(op.temp_path(), b"half-written garbage").unwrap();
            // Guard dropped without commit — simulated mid-operation failure.
        }
        assert_eq!(manager.calculate_file_hash(&path), before);
        assert!(!dir.path().join(".sweep-tmp").exists());
    }

    #[test]
    fn temp_starts_as_copy_of_target() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.png", b"contents");

        let manager = FileSafetyManager::new();
        let op = manager.begin_safe_operation(&path, false).unwrap();
        assert_eq!(fs::read(op.temp_path()).unwrap(), b"contents");
        drop(op);
    }

    // ── cleanup ──────────────────────────────────────────────────────

    #[test]
    fn cleanup_keeps_newest_backups() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.tiff", b"x");
        let manager = FileSafetyManager::new();

        for i in 0..4 {
            let backup = dir.path().join(format!("img.backup.{i}.tiff"));
            fs::write(&backup, b"b").unwrap();
        }

        let deleted = manager.cleanup_backups(&path, 2);
        assert_eq!(deleted, 2);

        let remaining = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
            .count();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn cleanup_under_limit_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "img.png", b"x");
        let manager = FileSafetyManager::new();
        assert_eq!(manager.cleanup_backups(&path, 5), 0);
    }

    #[test]
    fn size_check_tolerates_metadata_delta() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", &[0u8; 1000]);
        let b = write_file(&dir, "b.bin", &[0u8; 1050]);

        let manager = FileSafetyManager::new();
        assert!(manager.verify_file_integrity(&a, &b, 0.10));
        assert!(!manager.verify_file_integrity(&a, Path::new("/nonexistent"), 0.10));
    }
}
