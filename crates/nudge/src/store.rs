//! Artifact persistence.
//!
//! There is at most one artifact per [`ArtifactKey`]. Writing goes through
//! [`ArtifactStore::replace`], which swaps the previous artifact for the new one
//! in a single step so readers never observe a key with no artifact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{ArtifactKey, InterventionArtifact};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Artifact store I/O error at {path}: {message}")]
  Io { path: String, message: String },

  #[error("Stored artifact at {path} is corrupt: {message}")]
  Corrupt { path: String, message: String },
}

impl StoreError {
  fn io(path: &Path, error: impl std::fmt::Display) -> Self {
    Self::Io { path: path.display().to_string(), message: error.to_string() }
  }

  fn corrupt(path: &Path, error: impl std::fmt::Display) -> Self {
    Self::Corrupt { path: path.display().to_string(), message: error.to_string() }
  }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
  /// Store `artifact`, returning the one it replaced.
  async fn replace(
    &self,
    artifact: InterventionArtifact,
  ) -> Result<Option<InterventionArtifact>, StoreError>;

  async fn get(&self, key: &ArtifactKey) -> Result<Option<InterventionArtifact>, StoreError>;

  async fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError>;

  /// Every artifact for `user`, oldest record date first.
  async fn list_for_user(&self, user: &str) -> Result<Vec<InterventionArtifact>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
  artifacts: RwLock<BTreeMap<ArtifactKey, InterventionArtifact>>,
}

impl MemoryArtifactStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.artifacts.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.artifacts.read().await.is_empty()
  }

  pub async fn all(&self) -> Vec<InterventionArtifact> {
    self.artifacts.read().await.values().cloned().collect()
  }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
  async fn replace(
    &self,
    artifact: InterventionArtifact,
  ) -> Result<Option<InterventionArtifact>, StoreError> {
    let mut artifacts = self.artifacts.write().await;
    Ok(artifacts.insert(artifact.key(), artifact))
  }

  async fn get(&self, key: &ArtifactKey) -> Result<Option<InterventionArtifact>, StoreError> {
    Ok(self.artifacts.read().await.get(key).cloned())
  }

  async fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
    Ok(self.artifacts.write().await.remove(key).is_some())
  }

  async fn list_for_user(&self, user: &str) -> Result<Vec<InterventionArtifact>, StoreError> {
    Ok(
      self
        .artifacts
        .read()
        .await
        .iter()
        .filter(|(key, _)| key.user == user)
        .map(|(_, artifact)| artifact.clone())
        .collect(),
    )
  }
}

/// One pretty-printed JSON file per key: `<root>/<user>/<record_date>-<category>.json`.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
  root: PathBuf,
}

impl FileArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
    self
      .root
      .join(user_dir(&key.user))
      .join(format!("{}-{}.json", key.record_date, key.category))
  }

  async fn read(path: &Path) -> Result<Option<InterventionArtifact>, StoreError> {
    match tokio::fs::read_to_string(path).await {
      Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| StoreError::corrupt(path, e)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(StoreError::io(path, e)),
    }
  }

  /// Reads the artifact stored for `key`, rejecting a file that belongs to another key.
  async fn read_key(&self, key: &ArtifactKey) -> Result<Option<InterventionArtifact>, StoreError> {
    let path = self.path_for(key);
    match Self::read(&path).await? {
      Some(artifact) if artifact.key() != *key => Err(StoreError::corrupt(
        &path,
        format!("holds the artifact for user {} instead of {}", artifact.user, key.user),
      )),
      found => Ok(found),
    }
  }
}

/// Directory name for a user id. Anything outside `[A-Za-z0-9_-]` is
/// percent-encoded per UTF-8 byte, so distinct ids never share a directory and
/// no id can name `.`, `..` or a nested path. The empty id becomes `%`.
fn user_dir(user: &str) -> String {
  if user.is_empty() {
    return "%".to_string();
  }
  let mut encoded = String::with_capacity(user.len());
  for byte in user.bytes() {
    if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
      encoded.push(byte as char);
    } else {
      encoded.push_str(&format!("%{byte:02X}"));
    }
  }
  encoded
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
  async fn replace(
    &self,
    artifact: InterventionArtifact,
  ) -> Result<Option<InterventionArtifact>, StoreError> {
    let key = artifact.key();
    let path = self.path_for(&key);
    let dir = path.parent().unwrap_or(&self.root).to_path_buf();
    tokio::fs::create_dir_all(&dir).await.map_err(|e| StoreError::io(&dir, e))?;

    let previous = self.read_key(&key).await.unwrap_or_else(|e| {
      tracing::warn!(error = %e, "replacing unreadable artifact");
      None
    });

    let content = serde_json::to_string_pretty(&artifact).map_err(|e| StoreError::corrupt(&path, e))?;
    let temp = dir.join(format!(".{}.tmp", artifact.run_id));
    tokio::fs::write(&temp, content).await.map_err(|e| StoreError::io(&temp, e))?;
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
      let _ = tokio::fs::remove_file(&temp).await;
      return Err(StoreError::io(&path, e));
    }

    Ok(previous)
  }

  async fn get(&self, key: &ArtifactKey) -> Result<Option<InterventionArtifact>, StoreError> {
    self.read_key(key).await
  }

  async fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
    let path = self.path_for(key);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(StoreError::io(&path, e)),
    }
  }

  async fn list_for_user(&self, user: &str) -> Result<Vec<InterventionArtifact>, StoreError> {
    let dir = self.root.join(user_dir(user));
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(StoreError::io(&dir, e)),
    };

    let mut artifacts = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&dir, e))? {
      let path = entry.path();
      let is_artifact = path.extension().is_some_and(|ext| ext == "json")
        && !path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('.'));
      if !is_artifact {
        continue;
      }
      match Self::read(&path).await? {
        Some(artifact) if artifact.user == user => artifacts.push(artifact),
        Some(artifact) => {
          tracing::warn!(
            path = %path.display(),
            owner = %artifact.user,
            "skipping artifact filed under another user"
          );
        }
        None => {}
      }
    }

    artifacts.sort_by_key(|a| (a.record_date, a.category));
    Ok(artifacts)
  }
}
