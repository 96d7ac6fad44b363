//! Deterministic recommendation rules. Pure functions with no I/O.

pub mod diet;
pub mod food;
pub mod sleep;
pub mod steps;

use thiserror::Error;

use crate::catalog::FoodCatalog;
use crate::model::{AllergyProfile, HealthWindow, RecommendationResult};

pub use diet::{recommend_diet, DietRequest, MealPlan};
pub use food::review_food_day;
pub use sleep::{recommend_sleep, SleepBand};
pub use steps::{assess_steps, recommend_step, StepAssessment, StepLevel, StepRegularity};

pub const DIET_EVALUATION: &str = "Diet recommendations have been generated.";
pub const DIET_SUMMARY: &str = "A balanced diet is recommended.";

#[derive(Error, Debug, PartialEq)]
pub enum RuleError {
  #[error("Invalid input: {message}")]
  InvalidInput { message: String },
}

impl RuleError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput { message: message.into() }
  }
}

/// Tunables for the rule engine.
#[derive(Debug, Clone)]
pub struct RuleSettings {
  pub step_target: i64,
  pub sleep_target_hours: f64,
  /// `None` draws a fresh seed for every run
  pub diet_seed: Option<u64>,
}

impl Default for RuleSettings {
  fn default() -> Self {
    Self { step_target: steps::DEFAULT_STEP_TARGET, sleep_target_hours: 8.0, diet_seed: None }
  }
}

/// Full rule-mode recommendation: diet, sleep and exercise.
pub fn recommend_all(
  catalog: &FoodCatalog,
  window: &HealthWindow,
  allergies: &AllergyProfile,
  restrictions: &[String],
  settings: &RuleSettings,
) -> Result<RecommendationResult, RuleError> {
  let plan = recommend_diet(
    catalog,
    &DietRequest {
      recent_foods: &window.recent_food_names,
      dislikes: restrictions,
      allergies,
      seed: settings.diet_seed,
    },
  );
  let steps = assess_steps(&window.weekly_step_counts, settings.step_target)?;

  let mut result = RecommendationResult::default();
  result.diet.evaluation = DIET_EVALUATION.to_string();
  result.diet.target.breakfast = plan.breakfast.join(", ");
  result.diet.target.lunch = plan.lunch.join(", ");
  result.diet.target.dinner = plan.dinner.join(", ");
  result.diet.target.summary = DIET_SUMMARY.to_string();
  result.sleep.evaluation = recommend_sleep(window.sleep_hours).to_string();
  result.sleep.target = settings.sleep_target_hours;
  result.exercise.evaluation = steps.evaluation;
  result.exercise.target = steps.target;

  Ok(result)
}

/// Rule-mode result with only the sleep section populated.
pub fn recommend_sleep_only(window: &HealthWindow, settings: &RuleSettings) -> RecommendationResult {
  let mut result = RecommendationResult::default();
  result.sleep.evaluation = recommend_sleep(window.sleep_hours).to_string();
  result.sleep.target = settings.sleep_target_hours;
  result
}
