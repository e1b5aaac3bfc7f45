use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Locked set of every temp artifact the run creates.
///
/// Paths are registered before any data is written to them, so an
/// interrupted run can always be swept clean. Deletion is idempotent:
/// already-missing paths are fine, and `delete_all` may run more than once.
/// The access pattern is append-seldom / delete-all-once, so a mutex-guarded
/// list is enough; the pipeline's hot paths go through channels instead.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
  files: Mutex<Vec<PathBuf>>,
  dirs: Mutex<Vec<PathBuf>>,
}

impl CleanupRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register_file(&self, path: &Path) {
    if let Ok(mut files) = self.files.lock() {
      files.push(path.to_path_buf());
    }
  }

  pub fn register_dir(&self, path: &Path) {
    if let Ok(mut dirs) = self.dirs.lock() {
      dirs.push(path.to_path_buf());
    }
  }

  /// Deletes one tracked file right away and forgets it.
  pub fn delete_file(&self, path: &Path) {
    if let Ok(mut files) = self.files.lock() {
      files.retain(|tracked| tracked != path);
    }
    remove_file_quiet(path);
  }

  /// Deletes every tracked file, then every tracked directory.
  pub fn delete_all(&self) {
    if let Ok(mut files) = self.files.lock() {
      for path in files.drain(..) {
        remove_file_quiet(&path);
      }
    }
    if let Ok(mut dirs) = self.dirs.lock() {
      for path in dirs.drain(..) {
        if let Err(err) = fs::remove_dir_all(&path) {
          if err.kind() != io::ErrorKind::NotFound {
            warn!("could not remove temp dir '{}': {err}", path.display());
          }
        }
      }
    }
  }
}

fn remove_file_quiet(path: &Path) {
  if let Err(err) = fs::remove_file(path) {
    if err.kind() != io::ErrorKind::NotFound {
      warn!("could not remove temp file '{}': {err}", path.display());
    }
  }
}
