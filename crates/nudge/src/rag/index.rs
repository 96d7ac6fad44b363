use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RagError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
  /// Smallest Euclidean distance first
  #[default]
  L2,
  /// Largest cosine similarity first
  Cosine,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
  #[serde(default)]
  metric: Metric,
  vectors: Vec<Vec<f32>>,
}

/// Exhaustive nearest-neighbour index over a fixed set of vectors.
#[derive(Debug, Clone)]
pub struct FlatIndex {
  metric: Metric,
  dimension: usize,
  vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
  pub fn new(metric: Metric, vectors: Vec<Vec<f32>>) -> Result<Self, RagError> {
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if let Some(pos) = vectors.iter().position(|v| v.len() != dimension) {
      return Err(RagError::invalid_index(format!(
        "vector {pos} has {} dimensions, expected {dimension}",
        vectors[pos].len()
      )));
    }
    Ok(Self { metric, dimension, vectors })
  }

  pub fn from_file(path: &Path) -> Result<Self, RagError> {
    let content = std::fs::read_to_string(path)
      .map_err(|e| RagError::unreadable(path, e.to_string()))?;
    let file: IndexFile = serde_json::from_str(&content)
      .map_err(|e| RagError::invalid_index(format!("{}: {e}", path.display())))?;
    Self::new(file.metric, file.vectors)
  }

  pub fn len(&self) -> usize {
    self.vectors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vectors.is_empty()
  }

  pub fn dimension(&self) -> usize {
    self.dimension
  }

  pub fn metric(&self) -> Metric {
    self.metric
  }

  /// Positions of the `k` nearest vectors, best first. Ties keep index order.
  pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<usize>, RagError> {
    if self.is_empty() || k == 0 {
      return Ok(Vec::new());
    }
    if query.len() != self.dimension {
      return Err(RagError::DimensionMismatch { expected: self.dimension, actual: query.len() });
    }

    let mut scored: Vec<(usize, f32)> = self
      .vectors
      .iter()
      .enumerate()
      .map(|(i, v)| match self.metric {
        Metric::L2 => (i, squared_distance(query, v)),
        Metric::Cosine => (i, -cosine_similarity(query, v)),
      })
      .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    Ok(scored.into_iter().take(k).map(|(i, _)| i).collect())
  }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cosine similarity, 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    0.0
  } else {
    dot_product / (magnitude_a * magnitude_b)
  }
}
