use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use colored::*;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use nudge::batch::{default_record_date, BatchFlavor, BatchOptions, BatchReport, BatchRunner};
use nudge::catalog::CatalogFile;
use nudge::llm::{LlmOrchestrator, OllamaClient};
use nudge::model::{AllergyProfile, HealthWindow, Mode, RunCategory};
use nudge::pipeline::{PipelineInputs, RecommendationPipeline};
use nudge::rag::{FileRagLoader, RagService};
use nudge::records::MemoryHealthRecords;
use nudge::store::{ArtifactStore, FileArtifactStore};
use nudge::NudgeConfig;

/// Build the pipeline for `mode`. The generation client and RAG service are
/// only constructed when LLM mode needs them.
pub fn build_pipeline(config: &NudgeConfig, mode: Mode) -> Result<RecommendationPipeline> {
  let catalog = Arc::new(CatalogFile::new(&config.catalog_path));
  let pipeline = RecommendationPipeline::new(catalog, config.rule_settings());
  if mode == Mode::Rule {
    return Ok(pipeline);
  }

  let client = OllamaClient::new(config.client_config())
    .map_err(|e| anyhow!("Failed to create generation client: {e}"))?;
  let rag = config.rag.enabled.then(|| {
    let loader = FileRagLoader::new(&config.rag.dir, config.rag.embedder.clone());
    Arc::new(RagService::with_top_k(loader, config.rag.top_k))
  });

  Ok(pipeline.with_llm(LlmOrchestrator::new(Arc::new(client), rag, config.llm_settings())))
}

pub struct BatchCommand {
  pub flavor: BatchFlavor,
  pub mode: Mode,
  pub date: Option<NaiveDate>,
  pub target_date: Option<NaiveDate>,
  pub user: Option<String>,
  pub concurrency: Option<usize>,
  pub deadline_secs: Option<u64>,
  pub json: bool,
}

fn resolve_record_date(config: &NudgeConfig, command: &BatchCommand) -> Result<NaiveDate> {
  if let Some(date) = command.date {
    return Ok(date);
  }
  if let Some(target) = command.target_date {
    return match command.flavor.category() {
      RunCategory::Food => Ok(target),
      _ => target.pred_opt().ok_or_else(|| anyhow!("No day before {target}")),
    };
  }
  Ok(default_record_date(Utc::now(), config.batch.utc_offset_hours)?)
}

pub async fn run_batch(config: &NudgeConfig, command: BatchCommand) -> Result<()> {
  let record_date = resolve_record_date(config, &command)?;
  let records = MemoryHealthRecords::from_json_file(&config.data_path)?;
  let store = FileArtifactStore::new(&config.artifacts_dir);
  let pipeline = build_pipeline(config, command.mode)?;

  let runner = BatchRunner::new(Arc::new(records), Arc::new(pipeline), Arc::new(store))
    .with_recent_food_cap(config.rules.recent_food_cap);

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      herald::warn!("Interrupted, finishing users already in progress");
      on_interrupt.cancel();
    }
  });

  let mut options = BatchOptions::new(command.flavor, command.mode, record_date);
  options.user = command.user;
  options.concurrency = command.concurrency.unwrap_or(config.batch.concurrency);
  options.user_deadline =
    command.deadline_secs.or(config.batch.user_deadline_secs).map(Duration::from_secs);
  options.cancel = cancel;

  let report = runner.run(&options).await?;
  if command.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_report(&report);
  }
  Ok(())
}

fn print_report(report: &BatchReport) {
  println!(
    "{} {} -> {} ({:?}, {})",
    "Batch".bold(),
    report.record_date.to_string().cyan(),
    report.target_date.to_string().cyan(),
    report.flavor,
    report.mode
  );
  println!("  {} processed: {}", "✓".green(), report.processed);
  println!("  {} errored:   {}", "✗".red(), report.errored);
  println!("  {} skipped:   {}", "-".yellow(), report.skipped.len());
  for skipped in &report.skipped {
    let missing: Vec<String> = skipped.missing.iter().map(|k| k.to_string()).collect();
    println!("      {} (missing {})", skipped.user.yellow(), missing.join(", ").dimmed());
  }
  if report.cancelled > 0 {
    println!("  {} cancelled: {}", "!".red(), report.cancelled);
  }
}

/// Window, allergies and restrictions for a single dry run.
#[derive(Debug, Deserialize)]
struct RecommendInput {
  window: HealthWindow,
  #[serde(default)]
  allergies: Vec<String>,
  #[serde(default)]
  restrictions: Vec<String>,
}

/// Run the pipeline once on a JSON input file and print the outcome. Nothing is stored.
pub async fn recommend(
  config: &NudgeConfig,
  input: &Path,
  mode: Mode,
  category: RunCategory,
) -> Result<()> {
  let content = std::fs::read_to_string(input)
    .with_context(|| format!("Failed to read input file {}", input.display()))?;
  let input: RecommendInput = serde_json::from_str(&content)
    .with_context(|| format!("Invalid input file {}", input.display()))?;

  let pipeline = build_pipeline(config, mode)?;
  let inputs = PipelineInputs {
    window: input.window,
    allergies: AllergyProfile::from_tokens(&input.allergies),
    restrictions: input.restrictions,
  };
  let outcome = pipeline.run(mode, category, &inputs).await;

  if !outcome.is_success() {
    herald::error!(&outcome.error_message);
  }
  let mut output = serde_json::json!({ "result": outcome.result });
  if let Some(review) = outcome.food_review {
    output["food_review"] = serde_json::to_value(review)?;
  }
  if mode == Mode::Llm {
    output["raw_model_outputs"] = serde_json::to_value(outcome.raw_outputs)?;
  }
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

/// Print stored artifacts for a user, optionally narrowed to one record date.
pub async fn show(
  config: &NudgeConfig,
  user: &str,
  date: Option<NaiveDate>,
  category: RunCategory,
) -> Result<()> {
  let store = FileArtifactStore::new(&config.artifacts_dir);

  match date {
    Some(date) => {
      let key = nudge::model::ArtifactKey::new(user, date, category);
      match store.get(&key).await? {
        Some(artifact) => println!("{}", serde_json::to_string_pretty(&artifact)?),
        None => println!("No artifact for {}", key.to_string().yellow()),
      }
    }
    None => {
      let artifacts = store.list_for_user(user).await?;
      if artifacts.is_empty() {
        println!("No artifacts for {}", user.yellow());
      }
      for artifact in artifacts {
        let status = if artifact.is_error() { "✗".red() } else { "✓".green() };
        println!(
          "{} {} {} {} ({})",
          status,
          artifact.record_date.to_string().cyan(),
          artifact.category.to_string().bold(),
          artifact.mode,
          artifact.model.dimmed()
        );
      }
    }
  }
  Ok(())
}
