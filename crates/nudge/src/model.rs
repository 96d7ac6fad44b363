//! Core data types shared by the rule engine, the LLM orchestrator and the
//! batch runner.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = String;

/// How a recommendation is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
  /// Deterministic rule engine, no external calls
  Rule,
  /// Retrieval-augmented prompting against a text generation server
  Llm,
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Mode::Rule => write!(f, "RULE"),
      Mode::Llm => write!(f, "LLM"),
    }
  }
}

impl FromStr for Mode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "RULE" => Ok(Mode::Rule),
      "LLM" => Ok(Mode::Llm),
      other => Err(format!("unknown mode '{other}' (expected RULE or LLM)")),
    }
  }
}

/// Which part of the recommendation a run produces. Part of the artifact key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunCategory {
  All,
  Sleep,
  Food,
}

impl RunCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunCategory::All => "all",
      RunCategory::Sleep => "sleep",
      RunCategory::Food => "food",
    }
  }
}

impl fmt::Display for RunCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Kinds of daily records a user can log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
  Sleep,
  Food,
  Water,
  Exercise,
  IbsSss,
  IbsQol,
  Pss,
}

impl fmt::Display for RecordKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RecordKind::Sleep => "sleep",
      RecordKind::Food => "food",
      RecordKind::Water => "water",
      RecordKind::Exercise => "exercise",
      RecordKind::IbsSss => "ibs_sss",
      RecordKind::IbsQol => "ibs_qol",
      RecordKind::Pss => "pss",
    };
    f.write_str(name)
  }
}

/// Snapshot of a user's recent records, assembled per invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthWindow {
  pub sleep_hours: f64,
  #[serde(default)]
  pub recent_food_names: Vec<String>,
  #[serde(default)]
  pub today_food_names: Vec<String>,
  /// Chronological, most recent last, at most seven entries
  #[serde(default)]
  pub weekly_step_counts: Vec<i64>,
}

/// One of the six allergen categories the food catalog is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Allergen {
  Gluten,
  Lactose,
  Nut,
  Seafood,
  Egg,
  Soy,
}

impl Allergen {
  pub const ALL: [Allergen; 6] = [
    Allergen::Gluten,
    Allergen::Lactose,
    Allergen::Nut,
    Allergen::Seafood,
    Allergen::Egg,
    Allergen::Soy,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Allergen::Gluten => "gluten allergy",
      Allergen::Lactose => "lactose allergy",
      Allergen::Nut => "nut allergy",
      Allergen::Seafood => "seafood allergy",
      Allergen::Egg => "egg allergy",
      Allergen::Soy => "soy allergy",
    }
  }

  /// Label used by catalogs and prompts written in Korean.
  pub fn korean_label(&self) -> &'static str {
    match self {
      Allergen::Gluten => "글루텐 알러지",
      Allergen::Lactose => "유당 알러지",
      Allergen::Nut => "견과류 알러지",
      Allergen::Seafood => "해산물 알러지",
      Allergen::Egg => "계란 알러지",
      Allergen::Soy => "대두 알러지",
    }
  }

  /// Every canonical allergen the token refers to.
  ///
  /// A token matches a label when it equals it, contains it, or is contained
  /// in it, so `"soy"` and `"severe soy allergy"` both resolve to soy. Broad
  /// tokens such as `"allergy"` match all six.
  pub fn canonicalize(token: &str) -> Vec<Allergen> {
    let token = token.trim().to_lowercase();
    if token.is_empty() {
      return Vec::new();
    }

    Self::ALL
      .into_iter()
      .filter(|allergen| {
        [allergen.label(), allergen.korean_label()]
          .iter()
          .any(|label| token == *label || label.contains(&token) || token.contains(label))
      })
      .collect()
  }
}

impl fmt::Display for Allergen {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Allergy flags as stored on a user profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFlags {
  #[serde(default)]
  pub gluten: bool,
  #[serde(default)]
  pub lactose: bool,
  #[serde(default)]
  pub nut: bool,
  #[serde(default)]
  pub seafood: bool,
  #[serde(default)]
  pub egg: bool,
  #[serde(default)]
  pub soy: bool,
  #[serde(default)]
  pub lactose_intolerance: bool,
}

/// Canonical set of allergens to exclude from recommendations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllergyProfile {
  allergens: BTreeSet<Allergen>,
}

impl AllergyProfile {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_flags(flags: &ProfileFlags) -> Self {
    let mut allergens = BTreeSet::new();
    let mapping = [
      (flags.gluten, Allergen::Gluten),
      (flags.lactose, Allergen::Lactose),
      (flags.lactose_intolerance, Allergen::Lactose),
      (flags.nut, Allergen::Nut),
      (flags.seafood, Allergen::Seafood),
      (flags.egg, Allergen::Egg),
      (flags.soy, Allergen::Soy),
    ];
    for (set, allergen) in mapping {
      if set {
        allergens.insert(allergen);
      }
    }
    Self { allergens }
  }

  /// Build a profile from free-form tokens using the fuzzy canonical match.
  pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
    let allergens =
      tokens.iter().flat_map(|token| Allergen::canonicalize(token.as_ref())).collect();
    Self { allergens }
  }

  pub fn insert(&mut self, allergen: Allergen) {
    self.allergens.insert(allergen);
  }

  pub fn contains(&self, allergen: Allergen) -> bool {
    self.allergens.contains(&allergen)
  }

  pub fn is_empty(&self) -> bool {
    self.allergens.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = Allergen> + '_ {
    self.allergens.iter().copied()
  }

  pub fn intersects(&self, other: &BTreeSet<Allergen>) -> bool {
    !self.allergens.is_disjoint(other)
  }

  pub fn labels(&self) -> Vec<String> {
    self.allergens.iter().map(|a| a.label().to_string()).collect()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealTargets {
  #[serde(rename = "Breakfast")]
  pub breakfast: String,
  #[serde(rename = "Lunch")]
  pub lunch: String,
  #[serde(rename = "Dinner")]
  pub dinner: String,
  #[serde(rename = "Summary")]
  pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietRecommendation {
  #[serde(rename = "Evaluation")]
  pub evaluation: String,
  #[serde(rename = "Target")]
  pub target: MealTargets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepRecommendation {
  #[serde(rename = "Evaluation")]
  pub evaluation: String,
  /// Hours
  #[serde(rename = "Target")]
  pub target: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecommendation {
  #[serde(rename = "Evaluation")]
  pub evaluation: String,
  /// Steps
  #[serde(rename = "Target")]
  pub target: i64,
}

/// Canonical recommendation. Always fully populated: failures leave the
/// defaults (empty strings and zeros) in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
  #[serde(rename = "Diet")]
  pub diet: DietRecommendation,
  #[serde(rename = "Sleep")]
  pub sleep: SleepRecommendation,
  #[serde(rename = "Exercise")]
  pub exercise: ExerciseRecommendation,
}

/// Verbatim model responses, kept for audit. Empty in rule mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutputs {
  #[serde(default)]
  pub diet: String,
  #[serde(default)]
  pub sleep: String,
  #[serde(default)]
  pub exercise: String,
  #[serde(default)]
  pub diet_evaluation: String,
}

/// How many of the day's foods fall in each FODMAP class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FodmapTally {
  pub total: usize,
  pub low: usize,
  pub high: usize,
  pub unknown: usize,
}

/// Same-day review of what the user actually ate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodReview {
  pub evaluation: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tally: Option<FodmapTally>,
}

/// Inputs recorded alongside an artifact so a run can be audited later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsSnapshot {
  pub window: HealthWindow,
  #[serde(default)]
  pub allergies: Vec<String>,
  #[serde(default)]
  pub restrictions: Vec<String>,
  pub use_rag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
  pub user: UserId,
  pub record_date: NaiveDate,
  pub category: RunCategory,
}

impl ArtifactKey {
  pub fn new(user: impl Into<UserId>, record_date: NaiveDate, category: RunCategory) -> Self {
    Self { user: user.into(), record_date, category }
  }
}

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.user, self.record_date, self.category)
  }
}

/// Persisted outcome of one run for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionArtifact {
  pub run_id: Uuid,
  pub user: UserId,
  /// The evaluated day
  pub record_date: NaiveDate,
  /// The day the recommendation is for
  pub target_date: NaiveDate,
  pub category: RunCategory,
  pub mode: Mode,
  /// Generation model name, or `RULE`
  pub model: String,
  pub inputs_snapshot: InputsSnapshot,
  #[serde(default)]
  pub raw_model_outputs: RawOutputs,
  pub result: RecommendationResult,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub food_review: Option<FoodReview>,
  pub processing_time_seconds: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl InterventionArtifact {
  pub fn key(&self) -> ArtifactKey {
    ArtifactKey::new(self.user.clone(), self.record_date, self.category)
  }

  pub fn is_error(&self) -> bool {
    self.error_message.as_deref().is_some_and(|m| !m.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_canonicalize_accepts_partial_and_full_labels() {
    assert_eq!(Allergen::canonicalize("soy"), vec![Allergen::Soy]);
    assert_eq!(Allergen::canonicalize("Gluten Allergy"), vec![Allergen::Gluten]);
    assert_eq!(Allergen::canonicalize("severe nut allergy"), vec![Allergen::Nut]);
    assert_eq!(Allergen::canonicalize("대두"), vec![Allergen::Soy]);
    assert_eq!(Allergen::canonicalize("계란 알러지"), vec![Allergen::Egg]);
  }

  #[test]
  fn test_canonicalize_ignores_blank_and_unknown() {
    assert!(Allergen::canonicalize("   ").is_empty());
    assert!(Allergen::canonicalize("peach").is_empty());
  }

  #[test]
  fn test_broad_token_matches_everything() {
    assert_eq!(Allergen::canonicalize("allergy").len(), 6);
  }

  #[test]
  fn test_profile_from_flags_maps_lactose_intolerance() {
    let flags = ProfileFlags { lactose_intolerance: true, egg: true, ..Default::default() };
    let profile = AllergyProfile::from_flags(&flags);

    assert!(profile.contains(Allergen::Lactose));
    assert!(profile.contains(Allergen::Egg));
    assert!(!profile.contains(Allergen::Soy));
    assert_eq!(profile.labels(), vec!["lactose allergy", "egg allergy"]);
  }

  #[test]
  fn test_profile_from_tokens_dedups() {
    let profile = AllergyProfile::from_tokens(&["lactose", "lactose allergy", "  "]);
    assert_eq!(profile.iter().collect::<Vec<_>>(), vec![Allergen::Lactose]);
  }

  #[test]
  fn test_result_serializes_with_canonical_field_names() {
    let json = serde_json::to_value(RecommendationResult::default()).unwrap();
    assert_eq!(json["Diet"]["Target"]["Breakfast"], "");
    assert_eq!(json["Sleep"]["Target"], 0.0);
    assert_eq!(json["Exercise"]["Target"], 0);
  }

  #[test]
  fn test_mode_parsing() {
    assert_eq!("rule".parse::<Mode>().unwrap(), Mode::Rule);
    assert_eq!(" LLM ".parse::<Mode>().unwrap(), Mode::Llm);
    assert!("gpt".parse::<Mode>().is_err());
    assert_eq!(Mode::Rule.to_string(), "RULE");
  }

  #[test]
  fn test_artifact_key_display() {
    let key = ArtifactKey::new("alice", NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(), RunCategory::Food);
    assert_eq!(key.to_string(), "alice/2025-03-02/food");
  }
}
