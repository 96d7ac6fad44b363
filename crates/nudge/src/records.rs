//! Read access to users' daily health records.
//!
//! Persistence belongs to the host application. The engine only needs the
//! handful of queries on [`HealthRecordSource`]. [`MemoryHealthRecords`] backs
//! it with a JSON dataset for the CLI and tests.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ProfileFlags, RecordKind, UserId};

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("Failed to load health records from {path}: {message}")]
  Unreadable { path: String, message: String },

  #[error("Health record source unavailable: {message}")]
  Unavailable { message: String },
}

impl RecordError {
  pub fn unavailable(message: impl Into<String>) -> Self {
    Self::Unavailable { message: message.into() }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
  Breakfast,
  Lunch,
  Dinner,
  Snack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
  pub date: NaiveDate,
  pub meal: MealSlot,
  pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
  pub date: NaiveDate,
  pub steps: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepEntry {
  pub date: NaiveDate,
  pub minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterEntry {
  pub date: NaiveDate,
  pub ml: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  #[serde(default)]
  pub allergies: ProfileFlags,
  /// Disliked ingredients
  #[serde(default)]
  pub restrictions: Vec<String>,
}

#[async_trait]
pub trait HealthRecordSource: Send + Sync {
  async fn users(&self) -> Result<Vec<UserId>, RecordError>;

  async fn profile(&self, user: &str) -> Result<Option<UserProfile>, RecordError>;

  async fn has_record(&self, user: &str, kind: RecordKind, date: NaiveDate)
    -> Result<bool, RecordError>;

  /// Minutes slept on `date`, if logged.
  async fn sleep_minutes(&self, user: &str, date: NaiveDate) -> Result<Option<u32>, RecordError>;

  /// Foods logged within `[start, end]`, ordered by date then meal slot.
  async fn foods_between(
    &self,
    user: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<FoodEntry>, RecordError>;

  /// Step counts within `[start, end]`, ordered by date.
  async fn steps_between(
    &self,
    user: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<StepEntry>, RecordError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Questionnaires {
  #[serde(default)]
  pub ibs_sss: Vec<NaiveDate>,
  #[serde(default)]
  pub ibs_qol: Vec<NaiveDate>,
  #[serde(default)]
  pub pss: Vec<NaiveDate>,
}

/// Everything one user has logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecords {
  pub id: UserId,
  #[serde(default)]
  pub profile: UserProfile,
  #[serde(default)]
  pub sleep: Vec<SleepEntry>,
  #[serde(default)]
  pub food: Vec<FoodEntry>,
  #[serde(default)]
  pub water: Vec<WaterEntry>,
  #[serde(default)]
  pub exercise: Vec<StepEntry>,
  #[serde(default)]
  pub questionnaires: Questionnaires,
}

impl UserRecords {
  pub fn new(id: impl Into<UserId>) -> Self {
    Self { id: id.into(), ..Default::default() }
  }

  fn has(&self, kind: RecordKind, date: NaiveDate) -> bool {
    match kind {
      RecordKind::Sleep => self.sleep.iter().any(|r| r.date == date),
      RecordKind::Food => self.food.iter().any(|r| r.date == date),
      RecordKind::Water => self.water.iter().any(|r| r.date == date),
      RecordKind::Exercise => self.exercise.iter().any(|r| r.date == date),
      RecordKind::IbsSss => self.questionnaires.ibs_sss.contains(&date),
      RecordKind::IbsQol => self.questionnaires.ibs_qol.contains(&date),
      RecordKind::Pss => self.questionnaires.pss.contains(&date),
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Dataset {
  #[serde(default)]
  users: Vec<UserRecords>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHealthRecords {
  users: BTreeMap<UserId, UserRecords>,
}

impl MemoryHealthRecords {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RecordError> {
    let path = path.as_ref();
    let unreadable = |message: String| RecordError::Unreadable { path: path.display().to_string(), message };

    let content = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let dataset: Dataset = serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?;
    Ok(dataset.users.into_iter().collect())
  }

  pub fn insert(&mut self, records: UserRecords) {
    self.users.insert(records.id.clone(), records);
  }

  pub fn len(&self) -> usize {
    self.users.len()
  }

  pub fn is_empty(&self) -> bool {
    self.users.is_empty()
  }
}

impl FromIterator<UserRecords> for MemoryHealthRecords {
  fn from_iter<I: IntoIterator<Item = UserRecords>>(iter: I) -> Self {
    let mut records = MemoryHealthRecords::new();
    for user in iter {
      records.insert(user);
    }
    records
  }
}

#[async_trait]
impl HealthRecordSource for MemoryHealthRecords {
  async fn users(&self) -> Result<Vec<UserId>, RecordError> {
    Ok(self.users.keys().cloned().collect())
  }

  async fn profile(&self, user: &str) -> Result<Option<UserProfile>, RecordError> {
    Ok(self.users.get(user).map(|u| u.profile.clone()))
  }

  async fn has_record(
    &self,
    user: &str,
    kind: RecordKind,
    date: NaiveDate,
  ) -> Result<bool, RecordError> {
    Ok(self.users.get(user).is_some_and(|u| u.has(kind, date)))
  }

  async fn sleep_minutes(&self, user: &str, date: NaiveDate) -> Result<Option<u32>, RecordError> {
    Ok(
      self
        .users
        .get(user)
        .and_then(|u| u.sleep.iter().find(|r| r.date == date))
        .map(|r| r.minutes),
    )
  }

  async fn foods_between(
    &self,
    user: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<FoodEntry>, RecordError> {
    let mut foods: Vec<FoodEntry> = self
      .users
      .get(user)
      .map(|u| u.food.iter().filter(|f| start <= f.date && f.date <= end).cloned().collect())
      .unwrap_or_default();
    foods.sort_by_key(|f| (f.date, f.meal));
    Ok(foods)
  }

  async fn steps_between(
    &self,
    user: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<StepEntry>, RecordError> {
    let mut steps: Vec<StepEntry> = self
      .users
      .get(user)
      .map(|u| u.exercise.iter().filter(|s| start <= s.date && s.date <= end).copied().collect())
      .unwrap_or_default();
    steps.sort_by_key(|s| s.date);
    Ok(steps)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
  }

  #[tokio::test]
  async fn test_load_dataset_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"users": [{{
        "id": "alice",
        "profile": {{"allergies": {{"egg": true}}, "restrictions": ["onion"]}},
        "sleep": [{{"date": "2025-03-02", "minutes": 420}}],
        "food": [
          {{"date": "2025-03-02", "meal": "dinner", "name": "udon"}},
          {{"date": "2025-03-02", "meal": "breakfast", "name": "porridge"}}
        ],
        "questionnaires": {{"pss": ["2025-03-02"]}}
      }}]}}"#
    )
    .unwrap();

    let records = MemoryHealthRecords::from_json_file(file.path()).unwrap();
    assert_eq!(records.users().await.unwrap(), vec!["alice".to_string()]);

    let profile = records.profile("alice").await.unwrap().unwrap();
    assert!(profile.allergies.egg);
    assert_eq!(profile.restrictions, vec!["onion"]);

    assert_eq!(records.sleep_minutes("alice", day(2)).await.unwrap(), Some(420));
    assert!(records.has_record("alice", RecordKind::Pss, day(2)).await.unwrap());
    assert!(!records.has_record("alice", RecordKind::Water, day(2)).await.unwrap());

    let foods = records.foods_between("alice", day(1), day(2)).await.unwrap();
    assert_eq!(foods[0].name, "porridge");
    assert_eq!(foods[1].name, "udon");
  }

  #[tokio::test]
  async fn test_unknown_user_has_nothing() {
    let records = MemoryHealthRecords::new();
    assert_eq!(records.profile("ghost").await.unwrap(), None);
    assert!(!records.has_record("ghost", RecordKind::Sleep, day(1)).await.unwrap());
    assert!(records.steps_between("ghost", day(1), day(7)).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_steps_are_range_filtered_and_sorted() {
    let mut user = UserRecords::new("bob");
    user.exercise = vec![
      StepEntry { date: day(5), steps: 500 },
      StepEntry { date: day(1), steps: 100 },
      StepEntry { date: day(9), steps: 900 },
    ];
    let records: MemoryHealthRecords = std::iter::once(user).collect();

    let steps = records.steps_between("bob", day(1), day(7)).await.unwrap();
    assert_eq!(steps.iter().map(|s| s.steps).collect::<Vec<_>>(), vec![100, 500]);
  }

  #[test]
  fn test_missing_file() {
    assert!(matches!(
      MemoryHealthRecords::from_json_file("/nope/records.json"),
      Err(RecordError::Unreadable { .. })
    ));
  }
}
