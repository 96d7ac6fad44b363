use anyhow::{anyhow, Result};

use super::lexical::{fnv1a, tokenize};

pub trait EmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

  /// Drop scratch buffers held between calls.
  fn release_buffers(&mut self) {}
}

pub const DEFAULT_LEXICAL_DIMENSION: usize = 256;

/// Signed feature hashing over stop-word filtered words.
///
/// Needs no model download, so it is what indices are built with when the
/// `neural` feature is off.
#[derive(Debug, Clone)]
pub struct LexicalEmbeddingModel {
  dimension: usize,
}

impl LexicalEmbeddingModel {
  pub fn new(dimension: usize) -> Self {
    Self { dimension: dimension.max(1) }
  }

  pub fn embed(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; self.dimension];
    for word in tokenize(text) {
      let hash = fnv1a(word.as_bytes());
      let bucket = (hash % self.dimension as u64) as usize;
      let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
      vector[bucket] += sign;
    }
    normalize_vector(vector)
  }
}

impl Default for LexicalEmbeddingModel {
  fn default() -> Self {
    Self::new(DEFAULT_LEXICAL_DIMENSION)
  }
}

impl EmbeddingModel for LexicalEmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    validate_inputs(texts)?;
    Ok(texts.iter().map(|t| self.embed(t)).collect())
  }
}

pub struct MockEmbeddingModel {
  pub fail_on_texts: Vec<String>,
  pub response_embeddings: Vec<Vec<f32>>,
  pub released: usize,
}

impl MockEmbeddingModel {
  pub fn new() -> Self {
    Self { fail_on_texts: vec![], response_embeddings: vec![vec![0.1, 0.2, 0.3]; 10], released: 0 }
  }

  pub fn returning(embedding: Vec<f32>) -> Self {
    Self { response_embeddings: vec![embedding], ..Self::new() }
  }
}

impl Default for MockEmbeddingModel {
  fn default() -> Self {
    Self::new()
  }
}

impl EmbeddingModel for MockEmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    for text in texts {
      if self.fail_on_texts.contains(text) {
        return Err(anyhow!("Mock failure for text: {}", text));
      }
    }

    let mut result = Vec::new();
    for (i, _text) in texts.iter().enumerate() {
      let embedding_index = i % self.response_embeddings.len();
      result.push(self.response_embeddings[embedding_index].clone());
    }

    Ok(result)
  }

  fn release_buffers(&mut self) {
    self.released += 1;
  }
}

pub fn normalize_vector(vector: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if magnitude > 0.0 {
    vector.into_iter().map(|x| x / magnitude).collect()
  } else {
    vector
  }
}

fn validate_inputs(texts: &[String]) -> Result<()> {
  if texts.is_empty() {
    return Err(anyhow!("Input texts cannot be empty"));
  }

  for text in texts {
    if text.len() > 8192 {
      return Err(anyhow!("Text too long: {} characters (max 8192)", text.len()));
    }
  }

  Ok(())
}

#[cfg(feature = "neural")]
pub use neural::OnnxEmbeddingModel;

#[cfg(feature = "neural")]
mod neural {
  use anyhow::{anyhow, Result};
  use hf_hub::api::tokio::Api;
  use ort::session::{builder::GraphOptimizationLevel, Session};
  use ort::value::Tensor;
  use tokenizers::Tokenizer;

  use super::{normalize_vector, validate_inputs, EmbeddingModel};

  const TOKENIZER_FILE: &str = "tokenizer.json";
  const MODEL_FILE: &str = "onnx/model.onnx";

  /// Sentence-transformer encoder run through ONNX Runtime, mean pooled.
  pub struct OnnxEmbeddingModel {
    session: Session,
    tokenizer: Tokenizer,
    scratch: Vec<i64>,
  }

  impl OnnxEmbeddingModel {
    /// Fetch `model_id` from the Hugging Face hub (cached locally) and load it.
    pub async fn load(model_id: &str) -> Result<Self> {
      herald::info!(&format!("loading embedding model {model_id}..."));

      let api = Api::new().map_err(|e| anyhow!("HF API initialization failed: {}", e))?;
      let repo = api.model(model_id.to_string());
      let tokenizer_file =
        repo.get(TOKENIZER_FILE).await.map_err(|e| anyhow!("Failed to download tokenizer: {}", e))?;
      let model_path =
        repo.get(MODEL_FILE).await.map_err(|e| anyhow!("Failed to download ONNX model: {}", e))?;

      let tokenizer = Tokenizer::from_file(tokenizer_file)
        .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
      let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level1)?
        .commit_from_file(model_path)
        .map_err(|e| anyhow!("Failed to load ONNX model: {}", e))?;

      Ok(Self { session, tokenizer, scratch: Vec::new() })
    }
  }

  impl EmbeddingModel for OnnxEmbeddingModel {
    fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      validate_inputs(texts)?;

      let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
      let encodings =
        self.tokenizer.encode_batch(refs, true).map_err(|e| anyhow!("Failed to encode texts: {}", e))?;

      let batch = encodings.len();
      let length = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

      self.scratch.clear();
      let mut mask = Vec::with_capacity(batch * length);
      for encoding in &encodings {
        let ids = encoding.get_ids();
        let attention = encoding.get_attention_mask();
        for i in 0..length {
          self.scratch.push(ids.get(i).copied().unwrap_or(0) as i64);
          mask.push(attention.get(i).copied().unwrap_or(0) as i64);
        }
      }
      let type_ids = vec![0i64; batch * length];

      let ids = std::mem::take(&mut self.scratch).into_boxed_slice();
      let ids_tensor = Tensor::from_array(([batch, length], ids))?;
      let mask_tensor = Tensor::from_array(([batch, length], mask.clone().into_boxed_slice()))?;
      let type_tensor = Tensor::from_array(([batch, length], type_ids.into_boxed_slice()))?;

      let outputs = self.session.run(ort::inputs![
        "input_ids" => ids_tensor,
        "attention_mask" => mask_tensor,
        "token_type_ids" => type_tensor
      ])?;
      let output = outputs
        .get("last_hidden_state")
        .ok_or_else(|| anyhow!("Model produced no last_hidden_state output"))?;
      let (shape, data) = output.try_extract_tensor::<f32>()?;
      let hidden = *shape.last().ok_or_else(|| anyhow!("Empty output shape"))? as usize;

      Ok(mean_pool(data, &mask, batch, length, hidden))
    }

    fn release_buffers(&mut self) {
      self.scratch = Vec::new();
    }
  }

  /// Average token vectors where the attention mask is set.
  fn mean_pool(data: &[f32], mask: &[i64], batch: usize, length: usize, hidden: usize) -> Vec<Vec<f32>> {
    (0..batch)
      .map(|b| {
        let mut pooled = vec![0.0f32; hidden];
        let mut count = 0.0f32;
        for t in 0..length {
          if mask[b * length + t] == 0 {
            continue;
          }
          count += 1.0;
          let start = (b * length + t) * hidden;
          for (acc, &value) in pooled.iter_mut().zip(&data[start..start + hidden]) {
            *acc += value;
          }
        }
        if count > 0.0 {
          pooled.iter_mut().for_each(|v| *v /= count);
        }
        normalize_vector(pooled)
      })
      .collect()
  }
}
