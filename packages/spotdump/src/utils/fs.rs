use crate::error::{DumpError, IoContext, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub fn absolute_path(path: impl AsRef<Path>) -> Result<PathBuf> {
  let path = path.as_ref();

  let absolute_path = if path.is_absolute() {
    path.to_path_buf()
  } else {
    env::current_dir()
      .op("getting current working directory")?
      .join(path)
  };

  Ok(absolute_path)
}

/// Creates the parent directory of `filepath` if it does not exist yet.
pub fn ensure_dir(filepath: impl AsRef<Path>) -> Result<()> {
  let filepath = filepath.as_ref();
  let parent_dir = filepath.parent().ok_or_else(|| {
    DumpError::Usage(format!(
      "unable to get parent path for '{}'",
      filepath.display()
    ))
  })?;
  if parent_dir.as_os_str().is_empty() {
    return Ok(());
  }
  let parent_path = absolute_path(parent_dir)?;
  fs::create_dir_all(&parent_path).op("creating output directory")
}
