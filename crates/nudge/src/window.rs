//! Assembles the [`HealthWindow`] a recommendation is computed from.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::model::HealthWindow;
use crate::records::{HealthRecordSource, RecordError};

pub const DEFAULT_RECENT_FOOD_CAP: usize = 10;

/// Days before the evaluated date included in the recent-food window.
const RECENT_FOOD_DAYS: i64 = 2;
/// Days before the evaluated date included in the step window.
const STEP_WINDOW_DAYS: i64 = 6;

#[derive(Error, Debug)]
pub enum CollectError {
  #[error("No sleep record for {user} on {date}")]
  MissingSleep { user: String, date: NaiveDate },

  #[error(transparent)]
  Source(#[from] RecordError),
}

#[derive(Clone)]
pub struct WindowCollector {
  source: Arc<dyn HealthRecordSource>,
  recent_food_cap: Option<usize>,
  require_sleep: bool,
}

impl WindowCollector {
  pub fn new(source: Arc<dyn HealthRecordSource>) -> Self {
    Self { source, recent_food_cap: Some(DEFAULT_RECENT_FOOD_CAP), require_sleep: true }
  }

  /// `None` keeps every distinct recent food.
  pub fn with_recent_food_cap(mut self, cap: Option<usize>) -> Self {
    self.recent_food_cap = cap;
    self
  }

  /// When off, a missing sleep record yields `0.0` hours instead of an error.
  pub fn require_sleep(mut self, require: bool) -> Self {
    self.require_sleep = require;
    self
  }

  pub fn source(&self) -> &Arc<dyn HealthRecordSource> {
    &self.source
  }

  pub async fn collect(&self, user: &str, date: NaiveDate) -> Result<HealthWindow, CollectError> {
    let sleep_hours = match self.source.sleep_minutes(user, date).await? {
      Some(minutes) => minutes_to_hours(minutes),
      None if self.require_sleep => {
        return Err(CollectError::MissingSleep { user: user.to_string(), date })
      }
      None => 0.0,
    };

    let recent = self.source.foods_between(user, date - Duration::days(RECENT_FOOD_DAYS), date).await?;
    let mut recent_food_names = dedup(recent.iter().map(|f| f.name.as_str()));
    if let Some(cap) = self.recent_food_cap {
      recent_food_names.truncate(cap);
    }

    let today_food_names = dedup(recent.iter().filter(|f| f.date == date).map(|f| f.name.as_str()));

    let steps = self.source.steps_between(user, date - Duration::days(STEP_WINDOW_DAYS), date).await?;
    let mut weekly_step_counts: Vec<i64> = steps.iter().map(|s| s.steps).collect();
    if weekly_step_counts.len() > 7 {
      weekly_step_counts.drain(..weekly_step_counts.len() - 7);
    }

    tracing::debug!(
      user,
      %date,
      sleep_hours,
      recent_foods = recent_food_names.len(),
      step_days = weekly_step_counts.len(),
      "collected health window"
    );

    Ok(HealthWindow { sleep_hours, recent_food_names, today_food_names, weekly_step_counts })
  }
}

/// Hours rounded to one decimal.
pub fn minutes_to_hours(minutes: u32) -> f64 {
  (f64::from(minutes) / 60.0 * 10.0).round() / 10.0
}

fn dedup<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut seen = HashSet::new();
  names
    .map(str::trim)
    .filter(|n| !n.is_empty() && seen.insert(n.to_string()))
    .map(str::to_string)
    .collect()
}
