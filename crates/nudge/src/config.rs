//! Configuration loading.
//!
//! Settings come from a YAML file, falling back to defaults, with a handful of
//! `NUDGE_*` environment variables applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{client, ClientConfig, Locale, LlmSettings};
use crate::rag::{EmbedderKind, DEFAULT_TOP_K};
use crate::rules::{steps::DEFAULT_STEP_TARGET, RuleSettings};
use crate::window::DEFAULT_RECENT_FOOD_CAP;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config file {path}: {message}")]
  Unreadable { path: String, message: String },

  #[error("Invalid config file {path}: {message}")]
  Invalid { path: String, message: String },

  #[error("Invalid value for {variable}: {message}")]
  InvalidEnv { variable: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NudgeConfig {
  /// JSON health-record dataset
  #[serde(default = "default_data_path")]
  pub data_path: PathBuf,
  /// Food catalog CSV
  #[serde(default = "default_catalog_path")]
  pub catalog_path: PathBuf,
  /// Directory artifacts are written to
  #[serde(default = "default_artifacts_dir")]
  pub artifacts_dir: PathBuf,
  #[serde(default)]
  pub rag: RagConfig,
  #[serde(default)]
  pub llm: LlmConfig,
  #[serde(default)]
  pub rules: RulesConfig,
  #[serde(default)]
  pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Holds `index/<topic>.json` and `chunks/<topic>.json`
  #[serde(default = "default_rag_dir")]
  pub dir: PathBuf,
  #[serde(default)]
  pub embedder: EmbedderKind,
  #[serde(default = "default_top_k")]
  pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_model")]
  pub model: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default)]
  pub locale: Locale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
  #[serde(default = "default_step_target")]
  pub step_target: i64,
  #[serde(default = "default_sleep_target")]
  pub sleep_target_hours: f64,
  /// `null` keeps every distinct recent food
  #[serde(default = "default_recent_food_cap")]
  pub recent_food_cap: Option<usize>,
  /// Fixed seed for reproducible meal sampling
  #[serde(default)]
  pub diet_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
  /// Offset used to decide what "yesterday" means
  #[serde(default = "default_utc_offset_hours")]
  pub utc_offset_hours: i32,
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  #[serde(default)]
  pub user_deadline_secs: Option<u64>,
}

fn default_data_path() -> PathBuf {
  PathBuf::from("data/records.json")
}
fn default_catalog_path() -> PathBuf {
  PathBuf::from("data/food_catalog.csv")
}
fn default_artifacts_dir() -> PathBuf {
  PathBuf::from(".nudge/artifacts")
}
fn default_rag_dir() -> PathBuf {
  PathBuf::from("data/rag")
}
fn default_true() -> bool {
  true
}
fn default_top_k() -> usize {
  DEFAULT_TOP_K
}
fn default_base_url() -> String {
  client::DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
  client::DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
  client::DEFAULT_TIMEOUT_SECS
}
fn default_step_target() -> i64 {
  DEFAULT_STEP_TARGET
}
fn default_sleep_target() -> f64 {
  8.0
}
fn default_recent_food_cap() -> Option<usize> {
  Some(DEFAULT_RECENT_FOOD_CAP)
}
fn default_utc_offset_hours() -> i32 {
  9
}
fn default_concurrency() -> usize {
  1
}

impl Default for NudgeConfig {
  fn default() -> Self {
    Self {
      data_path: default_data_path(),
      catalog_path: default_catalog_path(),
      artifacts_dir: default_artifacts_dir(),
      rag: RagConfig::default(),
      llm: LlmConfig::default(),
      rules: RulesConfig::default(),
      batch: BatchConfig::default(),
    }
  }
}

impl Default for RagConfig {
  fn default() -> Self {
    Self {
      enabled: default_true(),
      dir: default_rag_dir(),
      embedder: EmbedderKind::default(),
      top_k: default_top_k(),
    }
  }
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      model: default_model(),
      timeout_secs: default_timeout_secs(),
      locale: Locale::default(),
    }
  }
}

impl Default for RulesConfig {
  fn default() -> Self {
    Self {
      step_target: default_step_target(),
      sleep_target_hours: default_sleep_target(),
      recent_food_cap: default_recent_food_cap(),
      diet_seed: None,
    }
  }
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      utc_offset_hours: default_utc_offset_hours(),
      concurrency: default_concurrency(),
      user_deadline_secs: None,
    }
  }
}

impl NudgeConfig {
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    serde_yaml::from_str(&content)
      .map_err(|e| ConfigError::Invalid { path: path.display().to_string(), message: e.to_string() })
  }

  /// Load `explicit` if given, else the first config file found, else defaults.
  /// Environment overrides are applied in every case.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match explicit {
      Some(path) => Self::load_from_file(path)?,
      None => match Self::search_paths().into_iter().find(|p| p.exists()) {
        Some(path) => {
          tracing::debug!(path = %path.display(), "loading config");
          Self::load_from_file(&path)?
        }
        None => Self::default(),
      },
    };
    config.apply_env_overrides()?;
    Ok(config)
  }

  pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("nudge.yaml"), PathBuf::from(".nudge/config.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("nudge").join("config.yaml"));
    }
    paths
  }

  pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var("NUDGE_LLM_URL") {
      self.llm.base_url = url;
    }
    if let Ok(model) = std::env::var("NUDGE_LLM_MODEL") {
      self.llm.model = model;
    }
    if let Ok(timeout) = std::env::var("NUDGE_LLM_TIMEOUT_SECS") {
      self.llm.timeout_secs = timeout.trim().parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::InvalidEnv { variable: "NUDGE_LLM_TIMEOUT_SECS".to_string(), message: e.to_string() }
      })?;
    }
    if let Ok(path) = std::env::var("NUDGE_DATA") {
      self.data_path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("NUDGE_CATALOG") {
      self.catalog_path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("NUDGE_ARTIFACTS") {
      self.artifacts_dir = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("NUDGE_RAG_DIR") {
      self.rag.dir = PathBuf::from(path);
    }
    Ok(())
  }

  pub fn client_config(&self) -> ClientConfig {
    ClientConfig { base_url: self.llm.base_url.clone(), timeout_secs: self.llm.timeout_secs }
  }

  pub fn llm_settings(&self) -> LlmSettings {
    LlmSettings { model: self.llm.model.clone(), locale: self.llm.locale, use_rag: self.rag.enabled }
  }

  pub fn rule_settings(&self) -> RuleSettings {
    RuleSettings {
      step_target: self.rules.step_target,
      sleep_target_hours: self.rules.sleep_target_hours,
      diet_seed: self.rules.diet_seed,
    }
  }
}
