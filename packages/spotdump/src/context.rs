use crate::concurrent::quit::QuitFlag;
use crate::error::{IoContext, Result};
use crate::output::cleanup::CleanupRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared run state threaded through constructors: the per-run temp
/// directory, the cleanup registry, and the cooperative quit flag. There is
/// no module-level mutable state anywhere in the pipeline.
#[derive(Debug, Clone)]
pub struct RunContext {
  temp_dir: PathBuf,
  pub cleanup: Arc<CleanupRegistry>,
  pub quit: QuitFlag,
}

impl RunContext {
  /// Creates a uniquely named scratch directory under `temp_root` and
  /// registers it for deletion.
  pub fn create(temp_root: &Path) -> Result<Self> {
    let cleanup = Arc::new(CleanupRegistry::new());
    let unique: u32 = rand::random();
    let temp_dir = temp_root.join(format!("spotdump_{}_{unique:08x}", std::process::id()));
    fs::create_dir_all(&temp_dir).op("creating scratch directory")?;
    cleanup.register_dir(&temp_dir);
    Ok(Self {
      temp_dir,
      cleanup,
      quit: QuitFlag::new(),
    })
  }

  pub fn temp_dir(&self) -> &Path {
    &self.temp_dir
  }

  /// Path of a scratch file; the caller is expected to register it with the
  /// cleanup registry before writing to it.
  pub fn temp_path(&self, name: &str) -> PathBuf {
    self.temp_dir.join(name)
  }
}
