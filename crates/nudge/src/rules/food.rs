use crate::catalog::{FodmapClass, FoodCatalog};
use crate::model::{FodmapTally, FoodReview};

/// Count the day's foods per FODMAP class using the catalog.
pub fn tally_fodmap(catalog: &FoodCatalog, foods: &[String]) -> FodmapTally {
  let mut tally = FodmapTally::default();
  for food in foods.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
    tally.total += 1;
    match catalog.find(food).and_then(|entry| entry.fodmap_class()) {
      Some(FodmapClass::Low) => tally.low += 1,
      Some(FodmapClass::High) => tally.high += 1,
      None => tally.unknown += 1,
    }
  }
  tally
}

/// Rule-mode review of what was eaten on the evaluated day.
pub fn review_food_day(catalog: &FoodCatalog, foods: &[String]) -> FoodReview {
  let tally = tally_fodmap(catalog, foods);

  let evaluation = if tally.total == 0 {
    "No meals were logged today.".to_string()
  } else if tally.high == 0 && tally.low == 0 {
    "None of today's foods could be matched against the food catalog.".to_string()
  } else if tally.high == 0 {
    format!("All {} logged foods with a known FODMAP class were low FODMAP. Keep it up.", tally.low)
  } else if tally.high * 2 > tally.total {
    format!(
      "{} of {} foods today were high FODMAP. Try swapping some of them for low FODMAP options tomorrow.",
      tally.high, tally.total
    )
  } else {
    format!(
      "{} of {} foods today were high FODMAP. Watch how your symptoms respond to them.",
      tally.high, tally.total
    )
  };

  FoodReview { evaluation, tally: Some(tally) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn catalog() -> FoodCatalog {
    let csv = "food,category,fodmap,fiber\nwhite rice,rice,low,low\nudon,noodle,high,low\nkimchi,side-dish,high,high\n";
    FoodCatalog::from_reader(csv.as_bytes()).unwrap()
  }

  fn foods(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_tally_counts_unknown_foods() {
    let tally = tally_fodmap(&catalog(), &foods(&["white rice", "udon", "pizza", " "]));
    assert_eq!(tally, FodmapTally { total: 3, low: 1, high: 1, unknown: 1 });
  }

  #[test]
  fn test_review_empty_day() {
    let review = review_food_day(&catalog(), &[]);
    assert_eq!(review.evaluation, "No meals were logged today.");
    assert_eq!(review.tally, Some(FodmapTally::default()));
  }

  #[test]
  fn test_review_mostly_high() {
    let review = review_food_day(&catalog(), &foods(&["udon", "kimchi", "white rice"]));
    assert!(review.evaluation.starts_with("2 of 3 foods"));
    assert!(review.evaluation.contains("swapping"));
  }

  #[test]
  fn test_review_all_low() {
    let review = review_food_day(&catalog(), &foods(&["white rice"]));
    assert!(review.evaluation.contains("low FODMAP"));
  }
}
