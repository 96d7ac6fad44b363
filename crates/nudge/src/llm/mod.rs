//! LLM-assisted recommendations: retrieve context, prompt the generation
//! server once per topic, then parse the free-text answers.

pub mod client;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use crate::catalog::FoodCatalog;
use crate::model::{AllergyProfile, HealthWindow, RawOutputs, RecommendationResult};
use crate::rag::{RagService, Topic};

pub use client::{ClientConfig, GenerateError, OllamaClient, TextGenerator};
pub use prompt::Locale;

#[derive(Debug, Clone)]
pub struct LlmSettings {
  pub model: String,
  pub locale: Locale,
  pub use_rag: bool,
}

impl Default for LlmSettings {
  fn default() -> Self {
    Self { model: client::DEFAULT_MODEL.to_string(), locale: Locale::default(), use_rag: true }
  }
}

pub struct LlmInputs<'a> {
  pub window: &'a HealthWindow,
  pub allergies: &'a AllergyProfile,
  pub restrictions: &'a [String],
  pub catalog: &'a FoodCatalog,
}

/// Parsed result, verbatim responses and an error message (`""` when clean).
#[derive(Debug, Clone, Default)]
pub struct LlmOutcome {
  pub result: RecommendationResult,
  pub raw_outputs: RawOutputs,
  pub error_message: String,
}

pub struct LlmOrchestrator {
  generator: Arc<dyn TextGenerator>,
  rag: Option<Arc<RagService>>,
  settings: LlmSettings,
}

impl LlmOrchestrator {
  pub fn new(
    generator: Arc<dyn TextGenerator>,
    rag: Option<Arc<RagService>>,
    settings: LlmSettings,
  ) -> Self {
    Self { generator, rag, settings }
  }

  pub fn model(&self) -> &str {
    &self.settings.model
  }

  pub fn uses_rag(&self) -> bool {
    self.settings.use_rag && self.rag.is_some()
  }

  async fn context(&self, topic: Topic) -> String {
    match (&self.rag, self.settings.use_rag) {
      (Some(rag), true) => rag.context(topic).await,
      _ => String::new(),
    }
  }

  async fn release_transient(&self) {
    if let Some(rag) = &self.rag {
      rag.release_transient().await;
    }
  }

  /// Generated text, or a placeholder describing why there is none.
  async fn generate(&self, topic: &str, prompt: String) -> String {
    match self.generator.generate(&self.settings.model, &prompt).await {
      Ok(text) => text,
      Err(e) => {
        herald::warn!(&format!("{topic} generation failed: {e}"));
        e.placeholder()
      }
    }
  }

  async fn ask_topic(&self, topic: Topic, build: impl FnOnce(&str) -> String) -> String {
    let raw = {
      let context = self.context(topic).await;
      let prompt = build(&context);
      self.generate(topic.as_str(), prompt).await
    };
    self.release_transient().await;
    raw
  }

  async fn ask_diet_evaluation(&self, today_foods: &[String]) -> String {
    let prompt = prompt::diet_evaluation_prompt(self.settings.locale, today_foods);
    self.generate("diet evaluation", prompt).await
  }

  /// Diet, sleep and exercise recommendations plus an evaluation of today's diet.
  pub async fn recommend_all(&self, inputs: &LlmInputs<'_>) -> LlmOutcome {
    let locale = self.settings.locale;

    let catalog_table = match inputs.catalog.to_table_text() {
      Ok(table) => table,
      Err(e) => {
        return LlmOutcome {
          error_message: format!("Intervention inference error: {e}"),
          ..Default::default()
        }
      }
    };

    let mut raw = RawOutputs::default();
    raw.diet = self
      .ask_topic(Topic::Diet, |context| {
        prompt::diet_prompt(
          locale,
          &prompt::DietPromptInput {
            allergies: inputs.allergies,
            restrictions: inputs.restrictions,
            recent_foods: &inputs.window.recent_food_names,
            catalog_table: &catalog_table,
            context,
          },
        )
      })
      .await;
    raw.sleep = self
      .ask_topic(Topic::Sleep, |context| {
        prompt::sleep_prompt(locale, inputs.window.sleep_hours, context)
      })
      .await;
    raw.exercise = self
      .ask_topic(Topic::Exercise, |context| {
        prompt::exercise_prompt(locale, &inputs.window.weekly_step_counts, context)
      })
      .await;
    raw.diet_evaluation = self.ask_diet_evaluation(&inputs.window.today_food_names).await;

    interpret_all(raw)
  }

  /// Sleep-only recommendation.
  pub async fn recommend_sleep(&self, window: &HealthWindow) -> LlmOutcome {
    let locale = self.settings.locale;
    let raw_sleep = self
      .ask_topic(Topic::Sleep, |context| prompt::sleep_prompt(locale, window.sleep_hours, context))
      .await;

    let mut outcome = LlmOutcome {
      raw_outputs: RawOutputs { sleep: raw_sleep, ..Default::default() },
      ..Default::default()
    };
    match parse::parse_sleep(&outcome.raw_outputs.sleep) {
      Ok((evaluation, target)) => {
        outcome.result.sleep.evaluation = evaluation;
        outcome.result.sleep.target = target;
      }
      Err(e) => outcome.error_message = format!("Result parsing error: {e}"),
    }
    outcome
  }

  /// Free-text evaluation of the foods eaten today, with its raw response.
  pub async fn evaluate_diet(&self, today_foods: &[String]) -> (String, String) {
    let raw = self.ask_diet_evaluation(today_foods).await;
    (parse::parse_diet_evaluation(&raw), raw)
  }
}

/// Turn raw responses into the canonical result.
///
/// A diet response that cannot be read discards the whole result. Sleep and
/// exercise failures only blank their own section.
pub fn interpret_all(raw: RawOutputs) -> LlmOutcome {
  let diet_targets = match parse::parse_diet(&raw.diet) {
    Ok(targets) => targets,
    Err(e) => {
      return LlmOutcome {
        result: RecommendationResult::default(),
        raw_outputs: raw,
        error_message: format!("Result parsing error: {e}"),
      }
    }
  };

  let mut result = RecommendationResult::default();
  let mut errors = Vec::new();

  result.diet.target = diet_targets;
  result.diet.evaluation = parse::parse_diet_evaluation(&raw.diet_evaluation);

  match parse::parse_sleep(&raw.sleep) {
    Ok((evaluation, target)) => {
      result.sleep.evaluation = evaluation;
      result.sleep.target = target;
    }
    Err(e) => errors.push(format!("Result parsing error: {e}")),
  }
  match parse::parse_exercise(&raw.exercise) {
    Ok((evaluation, target)) => {
      result.exercise.evaluation = evaluation;
      result.exercise.target = target;
    }
    Err(e) => errors.push(format!("Result parsing error: {e}")),
  }

  LlmOutcome { result, raw_outputs: raw, error_message: errors.join("; ") }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use async_trait::async_trait;
  use std::sync::Mutex;

  /// Answers prompts by keyword and records every prompt it saw.
  pub struct ScriptedGenerator {
    pub diet: Result<String, u16>,
    pub sleep: Result<String, u16>,
    pub exercise: Result<String, u16>,
    pub evaluation: Result<String, u16>,
    pub prompts: Mutex<Vec<String>>,
  }

  impl ScriptedGenerator {
    pub fn well_behaved() -> Self {
      Self {
        diet: Ok("Breakfast: rice porridge\nLunch: rice noodles\nDinner: white rice, tofu\nSummary: Gentle day.".into()),
        sleep: Ok("Evaluation: A little short.\nTarget: \"7.5\"".into()),
        exercise: Ok("Evaluation: Steady walking.\nTarget: \"7000\"".into()),
        evaluation: Ok("Evaluation: Mostly low FODMAP.".into()),
        prompts: Mutex::new(Vec::new()),
      }
    }

    pub fn prompts(&self) -> Vec<String> {
      self.prompts.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<String, GenerateError> {
      self.prompts.lock().unwrap().push(prompt.to_string());
      let answer = if prompt.contains("Plan tomorrow's") {
        &self.diet
      } else if prompt.contains("sleep coach") {
        &self.sleep
      } else if prompt.contains("exercise coach") {
        &self.exercise
      } else {
        &self.evaluation
      };
      answer.clone().map_err(|status| GenerateError::Status { status })
    }
  }
}
