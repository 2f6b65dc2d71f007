//! The socket repository: persists `SocketConfig` values either in memory or
//! as one JSON file per socket on disk. Writes to the file-backed repository
//! go through a temp-file-then-rename so a crash mid-write never leaves a
//! half-written config behind.

use crate::model::SocketConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
  #[error("socket {0:?} not found")]
  NotFound(String),
  #[error("invalid socket name {0:?}")]
  InvalidName(String),
  #[error("stored config for {name:?} is corrupt")]
  Corrupt {
    name: String,
    #[source]
    source: serde_json::Error,
  },
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub trait SocketRepository: Send + Sync {
  fn save(&self, config: &SocketConfig) -> Result<(), RepositoryError>;
  fn load(&self, name: &str) -> Result<SocketConfig, RepositoryError>;
  fn delete(&self, name: &str) -> Result<(), RepositoryError>;
  fn list(&self) -> Result<Vec<SocketConfig>, RepositoryError>;
}

/// Backs a repository with a plain in-process map. Useful for tests, and for
/// a manager instantiated without a configured persistence directory.
#[derive(Default)]
pub struct InMemoryRepository {
  configs: RwLock<HashMap<String, SocketConfig>>,
}

impl InMemoryRepository {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SocketRepository for InMemoryRepository {
  fn save(&self, config: &SocketConfig) -> Result<(), RepositoryError> {
    self.configs.write().insert(config.name.clone(), config.clone());
    Ok(())
  }

  fn load(&self, name: &str) -> Result<SocketConfig, RepositoryError> {
    self
      .configs
      .read()
      .get(name)
      .cloned()
      .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
  }

  fn delete(&self, name: &str) -> Result<(), RepositoryError> {
    self
      .configs
      .write()
      .remove(name)
      .map(|_| ())
      .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
  }

  fn list(&self) -> Result<Vec<SocketConfig>, RepositoryError> {
    Ok(self.configs.read().values().cloned().collect())
  }
}

/// Backs a repository with one `<name>.json` file per socket under `dir`.
pub struct FileRepository {
  dir: PathBuf,
}

impl FileRepository {
  pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))?;
    Ok(Self { dir })
  }

  /// Sanitize `name` into a safe on-disk filename: path separators and `..`
  /// segments are replaced with `_` rather than rejected outright.
  fn path_for(&self, name: &str) -> Result<PathBuf, RepositoryError> {
    if name.is_empty() {
      return Err(RepositoryError::InvalidName(name.to_string()));
    }
    let sanitized = name.replace('/', "_").replace("..", "_");
    Ok(self.dir.join(format!("{sanitized}.json")))
  }

  fn not_found_aware(name: &str, err: std::io::Error) -> RepositoryError {
    if err.kind() == std::io::ErrorKind::NotFound {
      RepositoryError::NotFound(name.to_string())
    } else {
      RepositoryError::Io(err)
    }
  }
}

impl SocketRepository for FileRepository {
  fn save(&self, config: &SocketConfig) -> Result<(), RepositoryError> {
    let path = self.path_for(&config.name)?;
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(config).map_err(|source| RepositoryError::Corrupt {
      name: config.name.clone(),
      source,
    })?;
    fs::write(&tmp_path, &body)?;
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o644))?;
    fs::rename(&tmp_path, &path)?;
    Ok(())
  }

  fn load(&self, name: &str) -> Result<SocketConfig, RepositoryError> {
    let path = self.path_for(name)?;
    let body = fs::read(&path).map_err(|e| Self::not_found_aware(name, e))?;
    serde_json::from_slice(&body).map_err(|source| RepositoryError::Corrupt {
      name: name.to_string(),
      source,
    })
  }

  fn delete(&self, name: &str) -> Result<(), RepositoryError> {
    let path = self.path_for(name)?;
    fs::remove_file(&path).map_err(|e| Self::not_found_aware(name, e))
  }

  fn list(&self) -> Result<Vec<SocketConfig>, RepositoryError> {
    let mut result = Vec::new();
    for entry in fs::read_dir(&self.dir)? {
      let path = entry?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      match fs::read(&path) {
        Ok(body) => match serde_json::from_slice::<SocketConfig>(&body) {
          Ok(config) => result.push(config),
          Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable socket config"),
        },
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable socket config"),
      }
    }
    Ok(result)
  }
}
