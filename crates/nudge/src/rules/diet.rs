use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{FoodCatalog, FoodCatalogEntry, MealCategory};
use crate::model::AllergyProfile;

/// Per-meal category quotas, in sampling order.
pub const MEAL_QUOTAS: [(Meal, &[(MealCategory, usize)]); 3] = [
  (
    Meal::Breakfast,
    &[
      (MealCategory::Rice, 2),
      (MealCategory::Porridge, 2),
      (MealCategory::Soup, 3),
      (MealCategory::SideDish, 4),
    ],
  ),
  (
    Meal::Lunch,
    &[
      (MealCategory::Rice, 2),
      (MealCategory::Noodle, 2),
      (MealCategory::Soup, 2),
      (MealCategory::ProteinMain, 4),
    ],
  ),
  (
    Meal::Dinner,
    &[
      (MealCategory::Rice, 2),
      (MealCategory::Porridge, 1),
      (MealCategory::Soup, 2),
      (MealCategory::ProteinMain, 4),
    ],
  ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meal {
  Breakfast,
  Lunch,
  Dinner,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPlan {
  pub breakfast: Vec<String>,
  pub lunch: Vec<String>,
  pub dinner: Vec<String>,
}

impl MealPlan {
  fn slot_mut(&mut self, meal: Meal) -> &mut Vec<String> {
    match meal {
      Meal::Breakfast => &mut self.breakfast,
      Meal::Lunch => &mut self.lunch,
      Meal::Dinner => &mut self.dinner,
    }
  }

  pub fn all_foods(&self) -> impl Iterator<Item = &String> {
    self.breakfast.iter().chain(&self.lunch).chain(&self.dinner)
  }
}

pub struct DietRequest<'a> {
  /// Excluded on exact name match
  pub recent_foods: &'a [String],
  /// Excluded when the food name contains any keyword
  pub dislikes: &'a [String],
  pub allergies: &'a AllergyProfile,
  pub seed: Option<u64>,
}

/// Sample a day of meals from the catalog.
///
/// Filtering happens once up front. A food is never recommended twice in the
/// same plan, and a category whose pool runs dry simply contributes nothing.
pub fn recommend_diet(catalog: &FoodCatalog, request: &DietRequest<'_>) -> MealPlan {
  let mut rng = match request.seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  };

  let candidates = filter_candidates(catalog, request);
  let mut used: HashSet<&str> = HashSet::new();
  let mut plan = MealPlan::default();

  for (meal, quotas) in MEAL_QUOTAS {
    for &(category, quota) in quotas {
      let pool = category_pool(&candidates, category, &used);
      if pool.is_empty() {
        continue;
      }

      let picks: Vec<&str> =
        sample(&mut rng, pool.len(), quota.min(pool.len())).into_iter().map(|i| pool[i]).collect();
      for food in picks {
        used.insert(food);
        plan.slot_mut(meal).push(food.to_string());
      }
    }
  }

  plan
}

fn filter_candidates<'c>(
  catalog: &'c FoodCatalog,
  request: &DietRequest<'_>,
) -> Vec<&'c FoodCatalogEntry> {
  let recent: HashSet<&str> =
    request.recent_foods.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
  let dislikes = dislike_pattern(request.dislikes);

  catalog
    .entries()
    .iter()
    .filter(|entry| !recent.contains(entry.food.as_str()))
    .filter(|entry| dislikes.as_ref().map_or(true, |re| !re.is_match(&entry.food)))
    .filter(|entry| !request.allergies.intersects(&entry.allergy_tags))
    .collect()
}

/// Alternation of the escaped keywords, or `None` when there is nothing to match.
fn dislike_pattern(dislikes: &[String]) -> Option<Regex> {
  let terms: Vec<String> = dislikes
    .iter()
    .map(|k| k.trim())
    .filter(|k| !k.is_empty())
    .map(regex::escape)
    .collect();
  if terms.is_empty() {
    return None;
  }
  Regex::new(&terms.join("|")).ok()
}

/// Unique names of the category not yet used, in catalog order.
fn category_pool<'c>(
  candidates: &[&'c FoodCatalogEntry],
  category: MealCategory,
  used: &HashSet<&str>,
) -> Vec<&'c str> {
  let mut seen = HashSet::new();
  candidates
    .iter()
    .filter(|entry| entry.category == Some(category))
    .map(|entry| entry.food.as_str())
    .filter(|food| !used.contains(food) && seen.insert(*food))
    .collect()
}
