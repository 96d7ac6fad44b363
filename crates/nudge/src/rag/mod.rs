//! Retrieval-augmented context for prompts.
//!
//! A [`RagService`] owns the embedding model and one similarity index per
//! topic. Both are loaded on first use, once, and shared for the life of the
//! service. Retrieval never fails outward: any problem yields an empty context.

pub mod embedding_model;
pub mod index;
pub mod lexical;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};

pub use embedding_model::{EmbeddingModel, LexicalEmbeddingModel, MockEmbeddingModel};
pub use index::{cosine_similarity, FlatIndex, Metric};

pub const DEFAULT_TOP_K: usize = 2;

#[derive(Error, Debug)]
pub enum RagError {
  #[error("Failed to read {path}: {message}")]
  Unreadable { path: String, message: String },

  #[error("Invalid index: {message}")]
  InvalidIndex { message: String },

  #[error("Query has {actual} dimensions but the index has {expected}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Embedding failed: {message}")]
  Embedding { message: String },
}

impl RagError {
  pub fn unreadable(path: &Path, message: impl Into<String>) -> Self {
    Self::Unreadable { path: path.display().to_string(), message: message.into() }
  }

  pub fn invalid_index(message: impl Into<String>) -> Self {
    Self::InvalidIndex { message: message.into() }
  }

  pub fn embedding(message: impl Into<String>) -> Self {
    Self::Embedding { message: message.into() }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
  Diet,
  Sleep,
  Exercise,
}

impl Topic {
  pub const ALL: [Topic; 3] = [Topic::Diet, Topic::Sleep, Topic::Exercise];

  pub fn as_str(&self) -> &'static str {
    match self {
      Topic::Diet => "diet",
      Topic::Sleep => "sleep",
      Topic::Exercise => "exercise",
    }
  }

  /// Fixed guideline query used to retrieve context for this topic.
  pub fn query(&self) -> &'static str {
    match self {
      Topic::Diet => {
        "Clinical guidelines for IBS dietary management, low FODMAP diet, and recommended meals"
      }
      Topic::Sleep => {
        "Guidelines on sleep quality, sleep hygiene, and sleep disorders in IBS patients"
      }
      Topic::Exercise => {
        "Recommendations on physical activity and walking for symptom relief in IBS"
      }
    }
  }
}

impl fmt::Display for Topic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A topic index paired with the text chunk behind each vector.
#[derive(Debug, Clone)]
pub struct TopicIndex {
  index: FlatIndex,
  chunks: Vec<String>,
}

impl TopicIndex {
  pub fn new(index: FlatIndex, chunks: Vec<String>) -> Result<Self, RagError> {
    if index.len() != chunks.len() {
      return Err(RagError::invalid_index(format!(
        "{} vectors but {} chunks",
        index.len(),
        chunks.len()
      )));
    }
    Ok(Self { index, chunks })
  }

  /// Text of the `k` nearest chunks, best first.
  pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<&str>, RagError> {
    Ok(self.index.search(query, k)?.into_iter().map(|i| self.chunks[i].as_str()).collect())
  }
}

#[derive(Debug, Clone)]
pub struct TopicIndices {
  pub diet: TopicIndex,
  pub sleep: TopicIndex,
  pub exercise: TopicIndex,
}

impl TopicIndices {
  pub fn get(&self, topic: Topic) -> &TopicIndex {
    match topic {
      Topic::Diet => &self.diet,
      Topic::Sleep => &self.sleep,
      Topic::Exercise => &self.exercise,
    }
  }
}

pub type BoxedEmbeddingModel = Box<dyn EmbeddingModel + Send>;

/// Supplies the heavy resources a [`RagService`] initialises lazily.
#[async_trait]
pub trait RagLoader: Send + Sync {
  async fn load_model(&self) -> Result<BoxedEmbeddingModel, RagError>;
  async fn load_indices(&self) -> Result<TopicIndices, RagError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EmbedderKind {
  Lexical {
    #[serde(default = "default_lexical_dimension")]
    dimension: usize,
  },
  Onnx {
    #[serde(default = "default_onnx_model")]
    model_id: String,
  },
}

fn default_lexical_dimension() -> usize {
  embedding_model::DEFAULT_LEXICAL_DIMENSION
}

fn default_onnx_model() -> String {
  "BAAI/bge-base-en-v1.5".to_string()
}

impl Default for EmbedderKind {
  fn default() -> Self {
    EmbedderKind::Lexical { dimension: default_lexical_dimension() }
  }
}

/// Loads indices from `<dir>/index/<topic>.json` and chunks from
/// `<dir>/chunks/<topic>.json`.
#[derive(Debug, Clone)]
pub struct FileRagLoader {
  dir: PathBuf,
  embedder: EmbedderKind,
}

impl FileRagLoader {
  pub fn new(dir: impl Into<PathBuf>, embedder: EmbedderKind) -> Self {
    Self { dir: dir.into(), embedder }
  }

  fn load_topic(&self, topic: Topic) -> Result<TopicIndex, RagError> {
    let index_path = self.dir.join("index").join(format!("{topic}.json"));
    let chunks_path = self.dir.join("chunks").join(format!("{topic}.json"));

    let index = FlatIndex::from_file(&index_path)?;
    let content = std::fs::read_to_string(&chunks_path)
      .map_err(|e| RagError::unreadable(&chunks_path, e.to_string()))?;
    let chunks: Vec<String> = serde_json::from_str(&content)
      .map_err(|e| RagError::invalid_index(format!("{}: {e}", chunks_path.display())))?;

    TopicIndex::new(index, chunks)
  }
}

#[async_trait]
impl RagLoader for FileRagLoader {
  async fn load_model(&self) -> Result<BoxedEmbeddingModel, RagError> {
    match &self.embedder {
      EmbedderKind::Lexical { dimension } => Ok(Box::new(LexicalEmbeddingModel::new(*dimension))),
      #[cfg(feature = "neural")]
      EmbedderKind::Onnx { model_id } => {
        let model = embedding_model::OnnxEmbeddingModel::load(model_id)
          .await
          .map_err(|e| RagError::embedding(e.to_string()))?;
        Ok(Box::new(model))
      }
      #[cfg(not(feature = "neural"))]
      EmbedderKind::Onnx { model_id } => Err(RagError::embedding(format!(
        "embedder '{model_id}' needs the `neural` feature"
      ))),
    }
  }

  async fn load_indices(&self) -> Result<TopicIndices, RagError> {
    Ok(TopicIndices {
      diet: self.load_topic(Topic::Diet)?,
      sleep: self.load_topic(Topic::Sleep)?,
      exercise: self.load_topic(Topic::Exercise)?,
    })
  }
}

/// Shared retrieval service. Clone the surrounding `Arc`, not the service.
pub struct RagService {
  loader: Box<dyn RagLoader>,
  top_k: usize,
  model: OnceCell<Mutex<BoxedEmbeddingModel>>,
  indices: OnceCell<TopicIndices>,
}

impl RagService {
  pub fn new(loader: impl RagLoader + 'static) -> Self {
    Self::with_top_k(loader, DEFAULT_TOP_K)
  }

  pub fn with_top_k(loader: impl RagLoader + 'static, top_k: usize) -> Self {
    Self { loader: Box::new(loader), top_k, model: OnceCell::new(), indices: OnceCell::new() }
  }

  /// Retrieved guideline text for `topic`, or `""` when anything fails.
  pub async fn context(&self, topic: Topic) -> String {
    match self.try_context(topic).await {
      Ok(context) => context,
      Err(e) => {
        herald::warn!(&format!("RAG context for {topic} unavailable: {e}"));
        String::new()
      }
    }
  }

  pub async fn try_context(&self, topic: Topic) -> Result<String, RagError> {
    let model = self
      .model
      .get_or_try_init(|| async { self.loader.load_model().await.map(Mutex::new) })
      .await?;
    let indices = self.indices.get_or_try_init(|| self.loader.load_indices()).await?;

    let query = vec![topic.query().to_string()];
    let embedding = {
      let mut model = model.lock().await;
      model
        .compute_embeddings(&query)
        .map_err(|e| RagError::embedding(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::embedding("model returned no embedding"))?
    };

    let chunks = indices.get(topic).nearest(&embedding, self.top_k)?;
    tracing::debug!(topic = %topic, chunks = chunks.len(), "retrieved context");
    Ok(chunks.join("\n\n"))
  }

  /// Free transient model buffers between topic calls.
  pub async fn release_transient(&self) {
    if let Some(model) = self.model.get() {
      model.lock().await.release_buffers();
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.model.initialized() && self.indices.initialized()
  }
}
