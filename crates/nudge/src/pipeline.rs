//! Mode dispatch. A run never fails outward: every internal error turns into
//! the empty result plus an error message.

use std::sync::Arc;

use crate::catalog::{CatalogSource, FoodCatalog};
use crate::llm::{LlmInputs, LlmOrchestrator};
use crate::model::{
  AllergyProfile, FoodReview, HealthWindow, Mode, RawOutputs, RecommendationResult, RunCategory,
};
use crate::rules::{self, food::tally_fodmap, RuleSettings};

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
  pub window: HealthWindow,
  pub allergies: AllergyProfile,
  pub restrictions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
  pub result: RecommendationResult,
  pub raw_outputs: RawOutputs,
  pub food_review: Option<FoodReview>,
  /// Empty on success
  pub error_message: String,
}

impl PipelineOutcome {
  fn failure(message: String) -> Self {
    Self { error_message: message, ..Default::default() }
  }

  pub fn is_success(&self) -> bool {
    self.error_message.is_empty()
  }
}

pub struct RecommendationPipeline {
  catalog: Arc<dyn CatalogSource>,
  rules: RuleSettings,
  llm: Option<Arc<LlmOrchestrator>>,
}

impl RecommendationPipeline {
  pub fn new(catalog: Arc<dyn CatalogSource>, rules: RuleSettings) -> Self {
    Self { catalog, rules, llm: None }
  }

  pub fn with_llm(mut self, orchestrator: LlmOrchestrator) -> Self {
    self.llm = Some(Arc::new(orchestrator));
    self
  }

  /// Name recorded on artifacts: the generation model, or `RULE`.
  pub fn model_label(&self, mode: Mode) -> String {
    match (mode, &self.llm) {
      (Mode::Llm, Some(llm)) => llm.model().to_string(),
      _ => Mode::Rule.to_string(),
    }
  }

  pub fn uses_rag(&self, mode: Mode) -> bool {
    mode == Mode::Llm && self.llm.as_ref().is_some_and(|llm| llm.uses_rag())
  }

  fn load_catalog(&self) -> Result<FoodCatalog, String> {
    self.catalog.load().map_err(|e| format!("Intervention inference error: {e}"))
  }

  pub async fn run(
    &self,
    mode: Mode,
    category: RunCategory,
    inputs: &PipelineInputs,
  ) -> PipelineOutcome {
    let outcome = match mode {
      Mode::Rule => self.run_rules(category, inputs),
      Mode::Llm => match &self.llm {
        Some(llm) => self.run_llm(llm, category, inputs).await,
        None => PipelineOutcome::failure(
          "Intervention inference error: LLM mode is not configured".to_string(),
        ),
      },
    };

    if !outcome.is_success() {
      tracing::debug!(%mode, %category, error = %outcome.error_message, "pipeline finished with error");
    }
    outcome
  }

  fn run_rules(&self, category: RunCategory, inputs: &PipelineInputs) -> PipelineOutcome {
    match category {
      RunCategory::Sleep => PipelineOutcome {
        result: rules::recommend_sleep_only(&inputs.window, &self.rules),
        ..Default::default()
      },
      RunCategory::Food => match self.load_catalog() {
        Ok(catalog) => {
          let review = rules::review_food_day(&catalog, &inputs.window.today_food_names);
          food_outcome(review, RawOutputs::default())
        }
        Err(message) => PipelineOutcome::failure(message),
      },
      RunCategory::All => {
        let catalog = match self.load_catalog() {
          Ok(catalog) => catalog,
          Err(message) => return PipelineOutcome::failure(message),
        };
        match rules::recommend_all(
          &catalog,
          &inputs.window,
          &inputs.allergies,
          &inputs.restrictions,
          &self.rules,
        ) {
          Ok(result) => PipelineOutcome { result, ..Default::default() },
          Err(e) => PipelineOutcome::failure(format!("Rule-based intervention error: {e}")),
        }
      }
    }
  }

  async fn run_llm(
    &self,
    llm: &LlmOrchestrator,
    category: RunCategory,
    inputs: &PipelineInputs,
  ) -> PipelineOutcome {
    match category {
      RunCategory::Sleep => {
        let outcome = llm.recommend_sleep(&inputs.window).await;
        PipelineOutcome {
          result: outcome.result,
          raw_outputs: outcome.raw_outputs,
          food_review: None,
          error_message: outcome.error_message,
        }
      }
      RunCategory::Food => {
        let catalog = match self.load_catalog() {
          Ok(catalog) => catalog,
          Err(message) => return PipelineOutcome::failure(message),
        };
        let (evaluation, raw) = llm.evaluate_diet(&inputs.window.today_food_names).await;
        let review = FoodReview {
          evaluation,
          tally: Some(tally_fodmap(&catalog, &inputs.window.today_food_names)),
        };
        food_outcome(review, RawOutputs { diet_evaluation: raw, ..Default::default() })
      }
      RunCategory::All => {
        let catalog = match self.load_catalog() {
          Ok(catalog) => catalog,
          Err(message) => return PipelineOutcome::failure(message),
        };
        let outcome = llm
          .recommend_all(&LlmInputs {
            window: &inputs.window,
            allergies: &inputs.allergies,
            restrictions: &inputs.restrictions,
            catalog: &catalog,
          })
          .await;
        PipelineOutcome {
          result: outcome.result,
          raw_outputs: outcome.raw_outputs,
          food_review: None,
          error_message: outcome.error_message,
        }
      }
    }
  }
}

fn food_outcome(review: FoodReview, raw_outputs: RawOutputs) -> PipelineOutcome {
  let mut result = RecommendationResult::default();
  result.diet.evaluation = review.evaluation.clone();
  PipelineOutcome { result, raw_outputs, food_review: Some(review), error_message: String::new() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::CatalogFile;
  use crate::llm::testing::ScriptedGenerator;
  use crate::llm::LlmSettings;
  use crate::model::FodmapTally;

  const CATALOG: &str = "\
food,category,fodmap,fiber,allergy_tag
white rice,rice,low,low,none
rice porridge,porridge,low,low,none
miso soup,soup,high,low,soy allergy
spinach,side-dish,low,high,none
udon,noodle,high,low,gluten allergy
chicken breast,protein-main,low,low,none
";

  fn catalog() -> Arc<dyn CatalogSource> {
    Arc::new(FoodCatalog::from_reader(CATALOG.as_bytes()).unwrap())
  }

  fn inputs() -> PipelineInputs {
    PipelineInputs {
      window: HealthWindow {
        sleep_hours: 7.0,
        recent_food_names: vec![],
        today_food_names: vec!["udon".into(), "white rice".into()],
        weekly_step_counts: vec![6000; 7],
      },
      allergies: AllergyProfile::new(),
      restrictions: vec![],
    }
  }

  fn llm_pipeline(generator: ScriptedGenerator) -> RecommendationPipeline {
    RecommendationPipeline::new(catalog(), RuleSettings::default()).with_llm(LlmOrchestrator::new(
      Arc::new(generator),
      None,
      LlmSettings::default(),
    ))
  }

  #[tokio::test]
  async fn test_rule_mode_makes_no_generation_calls() {
    let generator = Arc::new(ScriptedGenerator::well_behaved());
    let pipeline = RecommendationPipeline::new(catalog(), RuleSettings::default()).with_llm(
      LlmOrchestrator::new(generator.clone(), None, LlmSettings::default()),
    );

    let outcome = pipeline.run(Mode::Rule, RunCategory::All, &inputs()).await;

    assert!(outcome.is_success());
    assert!(generator.prompts().is_empty());
    assert_eq!(outcome.raw_outputs, RawOutputs::default());
    assert_eq!(outcome.result.exercise.target, 6500);
    assert_eq!(pipeline.model_label(Mode::Rule), "RULE");
  }

  #[tokio::test]
  async fn test_rule_error_is_reported_not_raised() {
    let pipeline = RecommendationPipeline::new(catalog(), RuleSettings::default());
    let mut inputs = inputs();
    inputs.window.weekly_step_counts.clear();

    let outcome = pipeline.run(Mode::Rule, RunCategory::All, &inputs).await;

    assert_eq!(outcome.result, RecommendationResult::default());
    assert!(outcome.error_message.starts_with("Rule-based intervention error:"));
  }

  #[tokio::test]
  async fn test_missing_catalog_is_fatal_for_run_only() {
    let pipeline =
      RecommendationPipeline::new(Arc::new(CatalogFile::new("/nonexistent.csv")), RuleSettings::default());

    let outcome = pipeline.run(Mode::Rule, RunCategory::All, &inputs()).await;
    assert!(outcome.error_message.starts_with("Intervention inference error:"));

    // sleep runs never touch the catalog
    let sleep = pipeline.run(Mode::Rule, RunCategory::Sleep, &inputs()).await;
    assert!(sleep.is_success());
    assert_eq!(sleep.result.sleep.target, 8.0);
  }

  #[tokio::test]
  async fn test_llm_mode_without_orchestrator() {
    let pipeline = RecommendationPipeline::new(catalog(), RuleSettings::default());
    let outcome = pipeline.run(Mode::Llm, RunCategory::All, &inputs()).await;
    assert!(outcome.error_message.contains("not configured"));
  }

  #[tokio::test]
  async fn test_llm_mode_full_run() {
    let pipeline = llm_pipeline(ScriptedGenerator::well_behaved());
    let outcome = pipeline.run(Mode::Llm, RunCategory::All, &inputs()).await;

    assert!(outcome.is_success(), "{}", outcome.error_message);
    assert_eq!(outcome.result.sleep.target, 7.5);
    assert!(!outcome.raw_outputs.diet.is_empty());
    assert_eq!(pipeline.model_label(Mode::Llm), "gpt-oss:20b");
    assert!(!pipeline.uses_rag(Mode::Llm));
  }

  #[tokio::test]
  async fn test_food_run_rule_mode_tallies() {
    let pipeline = RecommendationPipeline::new(catalog(), RuleSettings::default());
    let outcome = pipeline.run(Mode::Rule, RunCategory::Food, &inputs()).await;

    let review = outcome.food_review.unwrap();
    assert_eq!(review.tally, Some(FodmapTally { total: 2, low: 1, high: 1, unknown: 0 }));
    assert_eq!(outcome.result.diet.evaluation, review.evaluation);
  }

  #[tokio::test]
  async fn test_food_run_llm_mode_uses_evaluation_call() {
    let pipeline = llm_pipeline(ScriptedGenerator::well_behaved());
    let outcome = pipeline.run(Mode::Llm, RunCategory::Food, &inputs()).await;

    assert_eq!(outcome.result.diet.evaluation, "Mostly low FODMAP.");
    assert_eq!(outcome.raw_outputs.diet_evaluation, "Evaluation: Mostly low FODMAP.");
    assert_eq!(outcome.food_review.unwrap().tally.unwrap().high, 1);
  }
}
