use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mockito::{Matcher, Server};
use tokio::sync::Mutex;

use nudge::batch::{BatchFlavor, BatchOptions, BatchRunner};
use nudge::catalog::FoodCatalog;
use nudge::llm::{ClientConfig, GenerateError, LlmOrchestrator, LlmSettings, OllamaClient, TextGenerator};
use nudge::model::{
  ArtifactKey, InterventionArtifact, Mode, ProfileFlags, RecordKind, RunCategory,
};
use nudge::pipeline::RecommendationPipeline;
use nudge::records::{
  FoodEntry, MealSlot, MemoryHealthRecords, SleepEntry, StepEntry, UserRecords, WaterEntry,
};
use nudge::rules::RuleSettings;
use nudge::store::{ArtifactStore, MemoryArtifactStore, StoreError};

const CATALOG: &str = "\
food,category,fodmap,fiber,allergy_tag
white rice,rice,low,low,none
brown rice,rice,low,high,none
rice porridge,porridge,low,low,none
pumpkin porridge,porridge,high,high,none
miso soup,soup,high,low,soy allergy
clear broth,soup,low,low,none
spinach,side-dish,low,high,none
egg roll,side-dish,low,low,egg allergy
udon,noodle,high,low,gluten allergy
rice noodles,noodle,low,low,none
chicken breast,protein-main,low,low,none
grilled fish,protein-main,low,low,seafood allergy
";

fn day(d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

fn complete_user(id: &str, date: NaiveDate) -> UserRecords {
  let mut user = UserRecords::new(id);
  user.profile.allergies = ProfileFlags { egg: true, ..Default::default() };
  user.sleep = vec![SleepEntry { date, minutes: 390 }];
  user.food = vec![
    FoodEntry { date, meal: MealSlot::Breakfast, name: "white rice".into() },
    FoodEntry { date, meal: MealSlot::Dinner, name: "udon".into() },
  ];
  user.water = vec![WaterEntry { date, ml: 1500 }];
  user.exercise = (0..7)
    .map(|back| StepEntry { date: date - chrono::Duration::days(back), steps: 6000 })
    .collect();
  user.questionnaires.ibs_sss = vec![date];
  user.questionnaires.ibs_qol = vec![date];
  user.questionnaires.pss = vec![date];
  user
}

fn records() -> Arc<MemoryHealthRecords> {
  let date = day(10);
  let mut partial = complete_user("bob", date);
  partial.exercise.clear();
  partial.questionnaires.pss.clear();

  let mut minimal = complete_user("carol", date);
  minimal.questionnaires = Default::default();
  minimal.water.clear();

  Arc::new([complete_user("alice", date), partial, minimal].into_iter().collect())
}

fn rule_pipeline() -> Arc<RecommendationPipeline> {
  let catalog = FoodCatalog::from_reader(CATALOG.as_bytes()).unwrap();
  let settings = RuleSettings { diet_seed: Some(42), ..Default::default() };
  Arc::new(RecommendationPipeline::new(Arc::new(catalog), settings))
}

fn runner(store: Arc<MemoryArtifactStore>) -> BatchRunner {
  BatchRunner::new(records(), rule_pipeline(), store)
}

#[tokio::test]
async fn test_minimal_batch_writes_artifacts_and_skips_incomplete_users() {
  let store = Arc::new(MemoryArtifactStore::new());
  let options = BatchOptions::new(BatchFlavor::Minimal, Mode::Rule, day(10));

  let report = runner(store.clone()).run(&options).await.unwrap();

  assert_eq!(report.processed, 2);
  assert_eq!(report.errored, 0);
  assert_eq!(report.skipped.len(), 1);
  assert_eq!(report.skipped[0].user, "bob");
  assert_eq!(report.skipped[0].missing, vec![RecordKind::Exercise]);
  assert_eq!(report.target_date, day(11));

  let artifact = store.get(&ArtifactKey::new("alice", day(10), RunCategory::All)).await.unwrap().unwrap();
  assert_eq!(artifact.model, "RULE");
  assert_eq!(artifact.target_date, day(11));
  assert_eq!(artifact.result.exercise.target, 6500);
  assert_eq!(artifact.result.sleep.target, 8.0);
  assert_eq!(artifact.inputs_snapshot.window.sleep_hours, 6.5);
  assert_eq!(artifact.inputs_snapshot.allergies, vec!["egg allergy"]);
  assert!(!artifact.inputs_snapshot.use_rag);
  assert!(artifact.error_message.is_none());

  let diet = &artifact.result.diet.target;
  let planned = [&diet.breakfast, &diet.lunch, &diet.dinner];
  assert!(planned.iter().all(|meal| !meal.contains("egg roll")));
  assert!(planned.iter().all(|meal| !meal.contains("udon")));
}

#[tokio::test]
async fn test_full_flavor_requires_questionnaires() {
  let store = Arc::new(MemoryArtifactStore::new());
  let options = BatchOptions::new(BatchFlavor::Full, Mode::Rule, day(10));

  let report = runner(store.clone()).run(&options).await.unwrap();

  assert_eq!(report.processed, 1);
  let carol = report.skipped.iter().find(|s| s.user == "carol").unwrap();
  assert_eq!(
    carol.missing,
    vec![RecordKind::Water, RecordKind::IbsSss, RecordKind::IbsQol, RecordKind::Pss]
  );
}

/// Memory store that remembers every artifact handed to `replace`.
#[derive(Default)]
struct RecordingStore {
  inner: MemoryArtifactStore,
  written: Mutex<Vec<InterventionArtifact>>,
}

#[async_trait]
impl ArtifactStore for RecordingStore {
  async fn replace(
    &self,
    artifact: InterventionArtifact,
  ) -> Result<Option<InterventionArtifact>, StoreError> {
    self.written.lock().await.push(artifact.clone());
    self.inner.replace(artifact).await
  }

  async fn get(&self, key: &ArtifactKey) -> Result<Option<InterventionArtifact>, StoreError> {
    self.inner.get(key).await
  }

  async fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
    self.inner.delete(key).await
  }

  async fn list_for_user(&self, user: &str) -> Result<Vec<InterventionArtifact>, StoreError> {
    self.inner.list_for_user(user).await
  }
}

#[tokio::test]
async fn test_rerun_replaces_instead_of_duplicating() {
  let store = Arc::new(RecordingStore::default());
  let mut options = BatchOptions::new(BatchFlavor::Minimal, Mode::Rule, day(10));
  options.user = Some("alice".to_string());
  let runner = BatchRunner::new(records(), rule_pipeline(), store.clone());
  let key = ArtifactKey::new("alice", day(10), RunCategory::All);

  runner.run(&options).await.unwrap();
  let first = store.get(&key).await.unwrap().unwrap();
  runner.run(&options).await.unwrap();
  let second = store.get(&key).await.unwrap().unwrap();

  let written = store.written.lock().await;
  assert_eq!(written.len(), 2);
  assert_eq!(first, written[0]);
  assert_eq!(second, written[1]);
  assert_ne!(first.run_id, second.run_id);
  assert_eq!(store.inner.len().await, 1);
  assert_eq!(store.list_for_user("alice").await.unwrap(), vec![second]);
}

#[tokio::test]
async fn test_categories_keep_separate_artifacts() {
  let store = Arc::new(MemoryArtifactStore::new());
  let runner = runner(store.clone());

  runner.run(&BatchOptions::new(BatchFlavor::Minimal, Mode::Rule, day(10))).await.unwrap();
  let sleep_report =
    runner.run(&BatchOptions::new(BatchFlavor::Sleep, Mode::Rule, day(10))).await.unwrap();
  let food_report =
    runner.run(&BatchOptions::new(BatchFlavor::Food, Mode::Rule, day(10))).await.unwrap();

  assert_eq!(sleep_report.processed, 3);
  assert_eq!(food_report.target_date, day(10));
  assert_eq!(store.list_for_user("alice").await.unwrap().len(), 3);

  let sleep = store.get(&ArtifactKey::new("bob", day(10), RunCategory::Sleep)).await.unwrap().unwrap();
  assert_eq!(sleep.result.sleep.target, 8.0);
  assert_eq!(sleep.result.exercise.target, 0);
  assert!(sleep.result.diet.target.breakfast.is_empty());

  let food = store.get(&ArtifactKey::new("alice", day(10), RunCategory::Food)).await.unwrap().unwrap();
  let tally = food.food_review.as_ref().and_then(|r| r.tally).unwrap();
  assert_eq!((tally.total, tally.low, tally.high), (2, 1, 1));
  assert_eq!(food.target_date, day(10));
}

#[tokio::test]
async fn test_single_user_and_unknown_user() {
  let store = Arc::new(MemoryArtifactStore::new());
  let runner = runner(store.clone());

  let mut options = BatchOptions::new(BatchFlavor::Minimal, Mode::Rule, day(10));
  options.user = Some("alice".into());
  let report = runner.run(&options).await.unwrap();
  assert_eq!(report.total(), 1);
  assert_eq!(store.len().await, 1);

  options.user = Some("mallory".into());
  let error = runner.run(&options).await.unwrap_err();
  assert_eq!(error.to_string(), "Unknown user: mallory");
}

#[tokio::test]
async fn test_cancelled_batch_starts_nobody() {
  let store = Arc::new(MemoryArtifactStore::new());
  let options = BatchOptions::new(BatchFlavor::Minimal, Mode::Rule, day(10));
  options.cancel.cancel();

  let report = runner(store.clone()).run(&options).await.unwrap();

  assert_eq!(report.cancelled, 3);
  assert_eq!(report.processed, 0);
  assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_workers_process_each_user_once() {
  let store = Arc::new(MemoryArtifactStore::new());
  let mut options = BatchOptions::new(BatchFlavor::Sleep, Mode::Rule, day(10));
  options.concurrency = 4;

  let report = runner(store.clone()).run(&options).await.unwrap();

  assert_eq!(report.processed, 3);
  assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn test_llm_mode_without_orchestrator_records_error_artifacts() {
  let store = Arc::new(MemoryArtifactStore::new());
  let options = BatchOptions::new(BatchFlavor::Minimal, Mode::Llm, day(10));

  let report = runner(store.clone()).run(&options).await.unwrap();

  assert_eq!(report.errored, 2);
  let artifact = store.get(&ArtifactKey::new("alice", day(10), RunCategory::All)).await.unwrap().unwrap();
  assert!(artifact.is_error());
  assert_eq!(artifact.result, Default::default());
}

struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
  async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, GenerateError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(String::new())
  }
}

#[tokio::test]
async fn test_user_deadline_yields_error_artifact() {
  let catalog = FoodCatalog::from_reader(CATALOG.as_bytes()).unwrap();
  let pipeline = RecommendationPipeline::new(Arc::new(catalog), RuleSettings::default()).with_llm(
    LlmOrchestrator::new(Arc::new(StalledGenerator), None, LlmSettings::default()),
  );
  let store = Arc::new(MemoryArtifactStore::new());
  let runner = BatchRunner::new(records(), Arc::new(pipeline), store.clone());

  let mut options = BatchOptions::new(BatchFlavor::Sleep, Mode::Llm, day(10));
  options.user = Some("alice".into());
  options.user_deadline = Some(Duration::from_millis(50));

  let report = runner.run(&options).await.unwrap();

  assert_eq!(report.errored, 1);
  let artifact = store.get(&ArtifactKey::new("alice", day(10), RunCategory::Sleep)).await.unwrap().unwrap();
  assert!(artifact.error_message.unwrap().contains("deadline"));
}

#[tokio::test]
async fn test_llm_batch_against_generation_server() {
  let mut server = Server::new_async().await;
  let reply = |body: &str| serde_json::json!({ "response": body }).to_string();

  let diet = server
    .mock("POST", "/api/generate")
    .match_body(Matcher::Regex("Plan tomorrow".into()))
    .with_status(200)
    .with_body(reply("Breakfast: rice porridge\nLunch: rice noodles\nDinner: chicken breast\nSummary: Gentle day."))
    .expect(2)
    .create_async()
    .await;
  server
    .mock("POST", "/api/generate")
    .match_body(Matcher::Regex("sleep coach".into()))
    .with_status(200)
    .with_body(reply("Evaluation: A bit short.\nTarget: \"7.5\""))
    .create_async()
    .await;
  server
    .mock("POST", "/api/generate")
    .match_body(Matcher::Regex("exercise coach".into()))
    .with_status(500)
    .create_async()
    .await;
  server
    .mock("POST", "/api/generate")
    .match_body(Matcher::Regex("Today the patient ate".into()))
    .with_status(200)
    .with_body(reply("Evaluation: Udon is high FODMAP."))
    .create_async()
    .await;

  let client = OllamaClient::new(ClientConfig { base_url: server.url(), timeout_secs: 5 }).unwrap();
  let settings = LlmSettings { model: "test-model".into(), ..Default::default() };
  let catalog = FoodCatalog::from_reader(CATALOG.as_bytes()).unwrap();
  let pipeline = RecommendationPipeline::new(Arc::new(catalog), RuleSettings::default())
    .with_llm(LlmOrchestrator::new(Arc::new(client), None, settings));
  let store = Arc::new(MemoryArtifactStore::new());
  let runner = BatchRunner::new(records(), Arc::new(pipeline), store.clone());

  let report = runner.run(&BatchOptions::new(BatchFlavor::Minimal, Mode::Llm, day(10))).await.unwrap();

  diet.assert_async().await;
  assert_eq!(report.errored, 2);

  let artifact = store.get(&ArtifactKey::new("alice", day(10), RunCategory::All)).await.unwrap().unwrap();
  assert_eq!(artifact.model, "test-model");
  assert_eq!(artifact.result.diet.target.dinner, "chicken breast");
  assert_eq!(artifact.result.diet.evaluation, "Udon is high FODMAP.");
  assert_eq!(artifact.result.sleep.target, 7.5);
  assert_eq!(artifact.result.exercise.target, 0);
  assert_eq!(artifact.raw_model_outputs.exercise, "API call error: 500");
  assert!(artifact.error_message.unwrap().starts_with("Result parsing error:"));
}
