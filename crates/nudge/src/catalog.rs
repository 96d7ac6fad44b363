//! Food catalog loaded from a CSV export.
//!
//! Column names are trimmed and lowercased before use. `food`, `fodmap` and
//! `fiber` are mandatory; `category` and the allergy column are optional.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Allergen;

const REQUIRED_COLUMNS: [&str; 3] = ["food", "fodmap", "fiber"];
const ALLERGY_COLUMNS: [&str; 4] = ["allergy_tag", "allergy_tags", "allergies", "알러지_tag"];
const NO_ALLERGY_SENTINELS: [&str; 2] = ["none", "해당 없음"];

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("Failed to read food catalog {path}: {message}")]
  Unreadable { path: String, message: String },

  #[error("Food catalog is missing required columns: {missing}")]
  MissingColumns { missing: String },

  #[error("Malformed food catalog: {message}")]
  Malformed { message: String },
}

impl CatalogError {
  pub fn unreadable(path: &Path, message: impl Into<String>) -> Self {
    Self::Unreadable { path: path.display().to_string(), message: message.into() }
  }

  pub fn malformed(message: impl Into<String>) -> Self {
    Self::Malformed { message: message.into() }
  }
}

/// Dish categories used to fill meal quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MealCategory {
  Rice,
  Porridge,
  Soup,
  SideDish,
  Noodle,
  ProteinMain,
}

impl MealCategory {
  /// Accepts the English slugs and the Korean labels found in older exports.
  pub fn parse(label: &str) -> Option<Self> {
    match label.trim().to_lowercase().as_str() {
      "rice" | "밥류" => Some(MealCategory::Rice),
      "porridge" | "죽류" => Some(MealCategory::Porridge),
      "soup" | "soup/stew" | "국/찌개/탕" => Some(MealCategory::Soup),
      "side-dish" | "side dish" | "side_dish" | "반찬/나물/무침" => Some(MealCategory::SideDish),
      "noodle" | "noodles" | "면/국수" => Some(MealCategory::Noodle),
      "protein-main" | "protein main" | "protein_main" | "단백질/메인(육·해산물)" => {
        Some(MealCategory::ProteinMain)
      }
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      MealCategory::Rice => "rice",
      MealCategory::Porridge => "porridge",
      MealCategory::Soup => "soup",
      MealCategory::SideDish => "side-dish",
      MealCategory::Noodle => "noodle",
      MealCategory::ProteinMain => "protein-main",
    }
  }
}

impl fmt::Display for MealCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FodmapClass {
  Low,
  High,
}

impl FodmapClass {
  pub fn parse(value: &str) -> Option<Self> {
    let value = value.trim().to_lowercase();
    if value.contains("low") || value.starts_with('저') {
      Some(FodmapClass::Low)
    } else if value.contains("high") || value.starts_with('고') {
      Some(FodmapClass::High)
    } else {
      None
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodCatalogEntry {
  pub food: String,
  /// `None` for categories no meal quota uses
  pub category: Option<MealCategory>,
  pub category_label: String,
  pub fodmap: String,
  pub fiber: String,
  pub allergy_tags: BTreeSet<Allergen>,
  pub allergy_cell: String,
}

impl FoodCatalogEntry {
  pub fn fodmap_class(&self) -> Option<FodmapClass> {
    FodmapClass::parse(&self.fodmap)
  }
}

/// Split an allergy cell into canonical allergens. Tags that match no
/// canonical label are dropped.
pub fn parse_allergy_cell(cell: &str) -> BTreeSet<Allergen> {
  let cell = cell.trim();
  if cell.is_empty() || NO_ALLERGY_SENTINELS.iter().any(|s| cell.eq_ignore_ascii_case(s)) {
    return BTreeSet::new();
  }

  cell
    .split([',', ';', '|'])
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .flat_map(Allergen::canonicalize)
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct FoodCatalog {
  entries: Vec<FoodCatalogEntry>,
  by_name: HashMap<String, usize>,
}

impl FoodCatalog {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| CatalogError::unreadable(path, e.to_string()))?;
    Self::from_reader(file)
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
    let mut csv_reader =
      csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);

    let headers: Vec<String> = csv_reader
      .headers()
      .map_err(|e| CatalogError::malformed(e.to_string()))?
      .iter()
      .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
      .collect();

    let missing: Vec<&str> =
      REQUIRED_COLUMNS.iter().copied().filter(|c| !headers.iter().any(|h| h == c)).collect();
    if !missing.is_empty() {
      return Err(CatalogError::MissingColumns { missing: missing.join(", ") });
    }

    let column = |name: &str| headers.iter().position(|h| h == name);
    let food_idx = column("food");
    let fodmap_idx = column("fodmap");
    let fiber_idx = column("fiber");
    let category_idx = column("category");
    let allergy_idx = ALLERGY_COLUMNS.iter().find_map(|name| column(name));

    let mut catalog = FoodCatalog::default();
    for record in csv_reader.records() {
      let record = record.map_err(|e| CatalogError::malformed(e.to_string()))?;
      let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").to_string();

      let food = cell(food_idx);
      if food.is_empty() {
        continue;
      }
      let category_label = cell(category_idx);
      let allergy_cell = cell(allergy_idx);

      catalog.push(FoodCatalogEntry {
        category: MealCategory::parse(&category_label),
        category_label,
        fodmap: cell(fodmap_idx),
        fiber: cell(fiber_idx),
        allergy_tags: parse_allergy_cell(&allergy_cell),
        allergy_cell,
        food,
      });
    }

    tracing::debug!(entries = catalog.len(), "food catalog loaded");
    Ok(catalog)
  }

  pub fn from_entries(entries: Vec<FoodCatalogEntry>) -> Self {
    let mut catalog = FoodCatalog::default();
    for entry in entries {
      catalog.push(entry);
    }
    catalog
  }

  fn push(&mut self, entry: FoodCatalogEntry) {
    self.by_name.entry(entry.food.clone()).or_insert(self.entries.len());
    self.entries.push(entry);
  }

  pub fn entries(&self) -> &[FoodCatalogEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// First entry with exactly this name.
  pub fn find(&self, food: &str) -> Option<&FoodCatalogEntry> {
    self.by_name.get(food.trim()).map(|&i| &self.entries[i])
  }

  /// The catalog as CSV text, for embedding in prompts.
  pub fn to_table_text(&self) -> Result<String, CatalogError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
      .write_record(["food", "category", "fodmap", "fiber", "allergy_tag"])
      .map_err(|e| CatalogError::malformed(e.to_string()))?;
    for entry in &self.entries {
      writer
        .write_record([
          entry.food.as_str(),
          entry.category_label.as_str(),
          entry.fodmap.as_str(),
          entry.fiber.as_str(),
          entry.allergy_cell.as_str(),
        ])
        .map_err(|e| CatalogError::malformed(e.to_string()))?;
    }

    let bytes = writer.into_inner().map_err(|e| CatalogError::malformed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CatalogError::malformed(e.to_string()))
  }
}

/// Where the pipeline gets its catalog from on each run.
pub trait CatalogSource: Send + Sync {
  fn load(&self) -> Result<FoodCatalog, CatalogError>;
}

/// Reads the catalog CSV from disk on every load.
#[derive(Debug, Clone)]
pub struct CatalogFile {
  path: PathBuf,
}

impl CatalogFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl CatalogSource for CatalogFile {
  fn load(&self) -> Result<FoodCatalog, CatalogError> {
    FoodCatalog::from_path(&self.path)
  }
}

impl CatalogSource for FoodCatalog {
  fn load(&self) -> Result<FoodCatalog, CatalogError> {
    Ok(self.clone())
  }
}
