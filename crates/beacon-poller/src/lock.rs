//! Advisory run lock so two processes never interleave reads and writes of
//! the same store.

use std::{
  fs::{File, OpenOptions},
  io::ErrorKind,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use fs2::FileExt;
use tracing::debug;

/// An exclusive lock on a lock file, released on drop.
#[derive(Debug)]
pub struct RunLock {
  file: File,
  path: PathBuf,
}

impl RunLock {
  /// Try to take the lock without blocking. `Ok(None)` means another run
  /// holds it.
  pub fn try_acquire(path: &Path) -> anyhow::Result<Option<Self>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
      .create(true)
      .read(true)
      .write(true)
      .truncate(false)
      .open(path)
      .with_context(|| format!("failed to open run lock {}", path.display()))?;

    match FileExt::try_lock_exclusive(&file) {
      Ok(()) => {
        debug!(path = %path.display(), "acquired run lock");
        Ok(Some(Self {
          file,
          path: path.to_path_buf(),
        }))
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
      Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
        Ok(None)
      }
      Err(e) => Err(e).with_context(|| {
        format!("failed to acquire run lock {}", path.display())
      }),
    }
  }
}

impl Drop for RunLock {
  fn drop(&mut self) {
    let _ = FileExt::unlock(&self.file);
    debug!(path = %self.path.display(), "released run lock");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_acquire_is_refused_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("beacon.lock");

    let first = RunLock::try_acquire(&path).unwrap();
    assert!(first.is_some());
    assert!(RunLock::try_acquire(&path).unwrap().is_none());

    drop(first);
    assert!(RunLock::try_acquire(&path).unwrap().is_some());
  }
}
