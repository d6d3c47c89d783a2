//! Write-temp-then-rename file replacement.
//!
//! A reader of the target path sees either the previous contents or the new
//! contents, never a partial write. On any failure the temp file is removed
//! and the target is left untouched.
//!
//! [`StagedFile`] splits the two halves so several files can be fully
//! written and synced before any of them replaces its target.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replace `path` with `data` atomically.
pub async fn atomic_write(path: impl Into<PathBuf>, data: Vec<u8>) -> io::Result<()> {
    let path = path.into();
    tokio::task::spawn_blocking(move || atomic_write_with(&path, |file| file.write_all(&data)))
        .await
        .map_err(io::Error::other)?
}

/// Replace `path` with whatever `write` puts into the temp file.
pub fn atomic_write_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    StagedFile::stage_with(path, write)?.commit()
}

/// A fully written, synced temp file waiting to replace its target.
///
/// Dropping it without [`commit`](StagedFile::commit) removes the temp file
/// and leaves the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    temp: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `data` next to `path` without touching `path`.
    pub fn stage(path: &Path, data: &[u8]) -> io::Result<Self> {
        Self::stage_with(path, |file| file.write_all(data))
    }

    pub fn stage_with<F>(path: &Path, write: F) -> io::Result<Self>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let staged = Self {
            target: path.to_path_buf(),
            temp: temp_path_for(path),
            committed: false,
        };

        let mut file = File::create(&staged.temp)?;
        write(&mut file)?;
        file.sync_all()?;
        Ok(staged)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Rename the temp file onto the target.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.temp, &self.target)?;
        self.committed = true;
        sync_parent(&self.target);
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Rename durability needs the directory entry synced too; best effort.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Hidden, unique sibling of `path` so the rename stays on one filesystem.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("checkpoint");
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_atomic_write_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.csv");

        atomic_write(&path, b"first".to_vec()).await.unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        atomic_write(&path, b"second".to_vec()).await.unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(entries(dir.path()), vec!["store.csv"]);
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.csv");
        fs::write(&path, b"committed").unwrap();

        let err = atomic_write_with(&path, |file| {
            file.write_all(b"half a ro")?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert_eq!(fs::read(&path).unwrap(), b"committed");
        assert_eq!(entries(dir.path()), vec!["store.csv"]);
    }

    #[test]
    fn test_failed_first_write_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.csv");

        let result = atomic_write_with(&path, |_| Err(io::Error::other("interrupted")));

        assert!(result.is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_dropped_stage_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.csv");
        fs::write(&path, b"committed").unwrap();

        let staged = StagedFile::stage(&path, b"next").unwrap();
        assert!(staged.temp_path().exists());
        drop(staged);

        assert_eq!(fs::read(&path).unwrap(), b"committed");
        assert_eq!(entries(dir.path()), vec!["store.csv"]);
    }

    #[test]
    fn test_staged_files_commit_together() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");

        let staged = vec![
            StagedFile::stage(&a, b"alpha").unwrap(),
            StagedFile::stage(&b, b"beta").unwrap(),
        ];
        assert!(!a.exists() && !b.exists());

        for file in staged {
            file.commit().unwrap();
        }
        assert_eq!(fs::read(&a).unwrap(), b"alpha");
        assert_eq!(fs::read(&b).unwrap(), b"beta");
        assert_eq!(entries(dir.path()), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/data/out/results.csv"));
        assert_eq!(temp.parent(), Some(Path::new("/data/out")));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".results.csv."));
        assert!(name.ends_with(".tmp"));
    }
}
