//! Batch runner: one artifact per qualifying user for a record date.
//!
//! Users without the records a flavor needs are skipped. Everyone else gets an
//! artifact, successful or not, swapped in for any earlier artifact with the
//! same key. Work is spread over a bounded pool of `concurrency` workers and
//! stops picking up new users once the cancellation token fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::{
  AllergyProfile, InputsSnapshot, InterventionArtifact, Mode, RecordKind, RunCategory, UserId,
};
use crate::pipeline::{PipelineInputs, PipelineOutcome, RecommendationPipeline};
use crate::records::{HealthRecordSource, RecordError};
use crate::store::ArtifactStore;
use crate::window::{WindowCollector, DEFAULT_RECENT_FOOD_CAP};

#[derive(Error, Debug)]
pub enum BatchError {
  #[error("Unknown user: {user}")]
  UnknownUser { user: String },

  #[error("Invalid UTC offset: {hours} hours")]
  InvalidOffset { hours: i32 },

  #[error(transparent)]
  Records(#[from] RecordError),
}

/// Which records a user needs before a run, and what the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BatchFlavor {
  /// Every record type, including the three questionnaires
  Full,
  /// Sleep, food and exercise only
  Minimal,
  /// Sleep recommendation alone
  Sleep,
  /// Same-day review of what was eaten
  Food,
}

impl BatchFlavor {
  pub fn required_records(&self) -> &'static [RecordKind] {
    match self {
      BatchFlavor::Full => &[
        RecordKind::Sleep,
        RecordKind::Food,
        RecordKind::Water,
        RecordKind::Exercise,
        RecordKind::IbsSss,
        RecordKind::IbsQol,
        RecordKind::Pss,
      ],
      BatchFlavor::Minimal => &[RecordKind::Sleep, RecordKind::Food, RecordKind::Exercise],
      BatchFlavor::Sleep => &[RecordKind::Sleep],
      BatchFlavor::Food => &[RecordKind::Food],
    }
  }

  pub fn category(&self) -> RunCategory {
    match self {
      BatchFlavor::Full | BatchFlavor::Minimal => RunCategory::All,
      BatchFlavor::Sleep => RunCategory::Sleep,
      BatchFlavor::Food => RunCategory::Food,
    }
  }
}

/// Food reviews cover the day itself; everything else plans the next day.
pub fn target_date_for(category: RunCategory, record_date: NaiveDate) -> NaiveDate {
  match category {
    RunCategory::Food => record_date,
    _ => record_date.succ_opt().unwrap_or(record_date),
  }
}

/// The day before `now` on a clock `offset_hours` ahead of UTC.
pub fn default_record_date(now: DateTime<Utc>, offset_hours: i32) -> Result<NaiveDate, BatchError> {
  let offset = offset_hours
    .checked_mul(3600)
    .and_then(FixedOffset::east_opt)
    .ok_or(BatchError::InvalidOffset { hours: offset_hours })?;
  let today = now.with_timezone(&offset).date_naive();
  Ok(today.pred_opt().unwrap_or(today))
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
  pub flavor: BatchFlavor,
  pub mode: Mode,
  pub record_date: NaiveDate,
  /// Restrict the run to one user
  pub user: Option<UserId>,
  pub concurrency: usize,
  pub user_deadline: Option<Duration>,
  pub cancel: CancellationToken,
}

impl BatchOptions {
  pub fn new(flavor: BatchFlavor, mode: Mode, record_date: NaiveDate) -> Self {
    Self {
      flavor,
      mode,
      record_date,
      user: None,
      concurrency: 1,
      user_deadline: None,
      cancel: CancellationToken::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUser {
  pub user: UserId,
  pub missing: Vec<RecordKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
  pub flavor: BatchFlavor,
  pub mode: Mode,
  pub record_date: NaiveDate,
  pub target_date: NaiveDate,
  /// Artifacts written without an error
  pub processed: usize,
  /// Artifacts written with an error, or users whose artifact could not be stored
  pub errored: usize,
  pub skipped: Vec<SkippedUser>,
  /// Users never started because the run was cancelled
  pub cancelled: usize,
}

impl BatchReport {
  pub fn total(&self) -> usize {
    self.processed + self.errored + self.skipped.len() + self.cancelled
  }
}

enum UserOutcome {
  Succeeded,
  Failed,
  Skipped(SkippedUser),
  Cancelled,
}

pub struct BatchRunner {
  records: Arc<dyn HealthRecordSource>,
  pipeline: Arc<RecommendationPipeline>,
  store: Arc<dyn ArtifactStore>,
  recent_food_cap: Option<usize>,
}

impl BatchRunner {
  pub fn new(
    records: Arc<dyn HealthRecordSource>,
    pipeline: Arc<RecommendationPipeline>,
    store: Arc<dyn ArtifactStore>,
  ) -> Self {
    Self { records, pipeline, store, recent_food_cap: Some(DEFAULT_RECENT_FOOD_CAP) }
  }

  pub fn with_recent_food_cap(mut self, cap: Option<usize>) -> Self {
    self.recent_food_cap = cap;
    self
  }

  pub async fn run(&self, options: &BatchOptions) -> Result<BatchReport, BatchError> {
    let users = self.select_users(options.user.as_deref()).await?;
    let category = options.flavor.category();
    let target_date = target_date_for(category, options.record_date);

    herald::announce!(&format!(
      "Intervention batch {} ({:?}, {}) for {} user(s)",
      options.record_date,
      options.flavor,
      options.mode,
      users.len()
    ));

    let collector = WindowCollector::new(self.records.clone())
      .with_recent_food_cap(self.recent_food_cap)
      .require_sleep(options.flavor.required_records().contains(&RecordKind::Sleep));

    let outcomes: Vec<UserOutcome> = stream::iter(users)
      .map(|user| self.process_user(user, options, &collector, target_date))
      .buffer_unordered(options.concurrency.max(1))
      .collect()
      .await;

    let mut report = BatchReport {
      flavor: options.flavor,
      mode: options.mode,
      record_date: options.record_date,
      target_date,
      processed: 0,
      errored: 0,
      skipped: Vec::new(),
      cancelled: 0,
    };
    for outcome in outcomes {
      match outcome {
        UserOutcome::Succeeded => report.processed += 1,
        UserOutcome::Failed => report.errored += 1,
        UserOutcome::Skipped(skipped) => report.skipped.push(skipped),
        UserOutcome::Cancelled => report.cancelled += 1,
      }
    }
    report.skipped.sort_by(|a, b| a.user.cmp(&b.user));

    herald::flourish!(&format!(
      "Batch complete: {} processed, {} errored, {} skipped, {} cancelled",
      report.processed,
      report.errored,
      report.skipped.len(),
      report.cancelled
    ));

    Ok(report)
  }

  async fn select_users(&self, only: Option<&str>) -> Result<Vec<UserId>, BatchError> {
    let users = self.records.users().await?;
    match only {
      None => Ok(users),
      Some(user) if users.iter().any(|u| u == user) => Ok(vec![user.to_string()]),
      Some(user) => Err(BatchError::UnknownUser { user: user.to_string() }),
    }
  }

  async fn missing_records(
    &self,
    user: &str,
    flavor: BatchFlavor,
    date: NaiveDate,
  ) -> Result<Vec<RecordKind>, RecordError> {
    let mut missing = Vec::new();
    for kind in flavor.required_records() {
      if !self.records.has_record(user, *kind, date).await? {
        missing.push(*kind);
      }
    }
    Ok(missing)
  }

  async fn process_user(
    &self,
    user: UserId,
    options: &BatchOptions,
    collector: &WindowCollector,
    target_date: NaiveDate,
  ) -> UserOutcome {
    if options.cancel.is_cancelled() {
      return UserOutcome::Cancelled;
    }

    let missing = match self.missing_records(&user, options.flavor, options.record_date).await {
      Ok(missing) => missing,
      Err(e) => {
        herald::error!(&format!("{user}: failed to check records: {e}"));
        return UserOutcome::Failed;
      }
    };
    if !missing.is_empty() {
      let names: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
      herald::warn!(&format!("{user}: skipped, missing {}", names.join(", ")));
      return UserOutcome::Skipped(SkippedUser { user, missing });
    }

    let started = Instant::now();
    let (snapshot, outcome) = self.evaluate(&user, options, collector).await;
    let artifact = InterventionArtifact {
      run_id: Uuid::new_v4(),
      user: user.clone(),
      record_date: options.record_date,
      target_date,
      category: options.flavor.category(),
      mode: options.mode,
      model: self.pipeline.model_label(options.mode),
      inputs_snapshot: snapshot,
      raw_model_outputs: outcome.raw_outputs,
      result: outcome.result,
      food_review: outcome.food_review,
      processing_time_seconds: started.elapsed().as_secs_f64(),
      error_message: (!outcome.error_message.is_empty()).then_some(outcome.error_message),
      created_at: Utc::now(),
    };
    let failed = artifact.is_error();
    let elapsed = artifact.processing_time_seconds;
    let error_message = artifact.error_message.clone().unwrap_or_default();

    match self.store.replace(artifact).await {
      Ok(previous) => {
        if previous.is_some() {
          herald::debug!(&format!("{user}: replaced earlier artifact"));
        }
      }
      Err(e) => {
        herald::error!(&format!("{user}: failed to store artifact: {e}"));
        return UserOutcome::Failed;
      }
    }

    if failed {
      herald::event_error!(&format!("{user}: {error_message}"));
      UserOutcome::Failed
    } else {
      herald::event_success!(&format!("{user}: done in {elapsed:.2}s"));
      UserOutcome::Succeeded
    }
  }

  /// Collect the window and run the pipeline. Never fails: errors land in the outcome.
  async fn evaluate(
    &self,
    user: &str,
    options: &BatchOptions,
    collector: &WindowCollector,
  ) -> (InputsSnapshot, PipelineOutcome) {
    let mut snapshot =
      InputsSnapshot { use_rag: self.pipeline.uses_rag(options.mode), ..Default::default() };

    let profile = match self.records.profile(user).await {
      Ok(profile) => profile.unwrap_or_default(),
      Err(e) => return (snapshot, failure(format!("Intervention inference error: {e}"))),
    };
    let window = match collector.collect(user, options.record_date).await {
      Ok(window) => window,
      Err(e) => return (snapshot, failure(format!("Intervention inference error: {e}"))),
    };

    let inputs = PipelineInputs {
      window,
      allergies: AllergyProfile::from_flags(&profile.allergies),
      restrictions: profile.restrictions,
    };
    snapshot.window = inputs.window.clone();
    snapshot.allergies = inputs.allergies.labels();
    snapshot.restrictions = inputs.restrictions.clone();

    let run = self.pipeline.run(options.mode, options.flavor.category(), &inputs);
    let outcome = match options.user_deadline {
      Some(deadline) => match tokio::time::timeout(deadline, run).await {
        Ok(outcome) => outcome,
        Err(_) => failure(format!(
          "Intervention inference error: deadline of {:.1}s exceeded",
          deadline.as_secs_f64()
        )),
      },
      None => run.await,
    };
    (snapshot, outcome)
  }
}

fn failure(message: String) -> PipelineOutcome {
  PipelineOutcome { error_message: message, ..Default::default() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_default_record_date_uses_offset() {
    // 2025-03-01 20:00 UTC is already 2025-03-02 in UTC+9
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
    assert_eq!(default_record_date(now, 9).unwrap(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(default_record_date(now, 0).unwrap(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    assert!(default_record_date(now, 48).is_err());
    assert!(matches!(
      default_record_date(now, i32::MAX),
      Err(BatchError::InvalidOffset { hours: i32::MAX })
    ));
  }

  #[test]
  fn test_target_dates() {
    let day = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    assert_eq!(target_date_for(RunCategory::All, day), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    assert_eq!(target_date_for(RunCategory::Sleep, day), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    assert_eq!(target_date_for(RunCategory::Food, day), day);
  }

  #[test]
  fn test_flavor_requirements() {
    assert_eq!(BatchFlavor::Full.required_records().len(), 7);
    assert_eq!(
      BatchFlavor::Minimal.required_records(),
      &[RecordKind::Sleep, RecordKind::Food, RecordKind::Exercise]
    );
    assert_eq!(BatchFlavor::Sleep.category(), RunCategory::Sleep);
    assert_eq!(BatchFlavor::Food.category(), RunCategory::Food);
    assert_eq!(BatchFlavor::Full.category(), RunCategory::All);
  }
}
