//! Response grammar.
//!
//! A response is split into non-blank lines. Each field has a fixed position
//! (line *i* holds field *i*, value after the first colon) and a label
//! (`Breakfast:`, `Target:`, ...). A labelled line anywhere in the response
//! wins over the positional line. Labels of every locale are recognised.
//!
//! Numeric targets on an unlabelled line must be quoted (`"7.5"`); on a
//! labelled line the first number is taken.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::prompt::{Labels, EN_LABELS, KO_LABELS};
use crate::model::MealTargets;

const ALL_LABELS: [&Labels; 2] = [&EN_LABELS, &KO_LABELS];

static QUOTED_NUMBER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#""\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*""#).expect("valid regex"));
static ANY_NUMBER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"([0-9][0-9,]*(?:\.[0-9]+)?)").expect("valid regex"));

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
  #[error("{topic} response has no {field} line")]
  MissingField { topic: &'static str, field: &'static str },

  #[error("{topic} response has no usable number for {field}")]
  MissingNumber { topic: &'static str, field: &'static str },
}

fn lines(text: &str) -> Vec<&str> {
  text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Value after the first colon, or the whole line when there is none.
fn positional_value(line: &str) -> &str {
  match line.find([':', '：']) {
    Some(pos) => {
      let colon_len = line[pos..].chars().next().map_or(1, char::len_utf8);
      line[pos + colon_len..].trim()
    }
    None => line.trim(),
  }
}

/// Value of `line` if it starts with `label` followed by a colon.
///
/// Leading list markers and bold markers around the label are tolerated.
fn labelled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
  let line = line.trim_start_matches(['-', '*', '#', ' ', '\t']);
  let head = line.get(..label.len())?;
  if !head.eq_ignore_ascii_case(label) {
    return None;
  }
  let rest = line[label.len()..].trim_start_matches(['*', ' ']);
  let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('：'))?;
  Some(rest.trim_start_matches(['*', ' ']).trim())
}

fn find_labelled<'a>(lines: &[&'a str], pick: impl Fn(&Labels) -> &'static str) -> Option<&'a str> {
  lines.iter().rev().copied().find_map(|line| {
    ALL_LABELS.into_iter().find_map(|labels| labelled_value(line, pick(labels)))
  })
}

fn parse_number(re: &Regex, text: &str) -> Option<f64> {
  let captures = re.captures(text)?;
  captures.get(1)?.as_str().replace(',', "").parse().ok()
}

struct TwoLineFields {
  evaluation: Option<String>,
  target: Option<f64>,
}

fn parse_two_line(text: &str) -> TwoLineFields {
  let lines = lines(text);

  let mut evaluation = lines.first().map(|l| positional_value(l).to_string());
  let mut target = lines.get(1).and_then(|l| parse_number(&QUOTED_NUMBER, l));

  if let Some(value) = find_labelled(&lines, |l| l.evaluation) {
    evaluation = Some(value.to_string());
  }
  if let Some(number) = find_labelled(&lines, |l| l.target).and_then(|v| parse_number(&ANY_NUMBER, v)) {
    target = Some(number);
  }

  TwoLineFields { evaluation, target }
}

/// Sleep evaluation and target hours.
pub fn parse_sleep(text: &str) -> Result<(String, f64), ParseError> {
  let fields = parse_two_line(text);
  let evaluation =
    fields.evaluation.ok_or(ParseError::MissingField { topic: "sleep", field: "evaluation" })?;
  let target = fields.target.ok_or(ParseError::MissingNumber { topic: "sleep", field: "target" })?;
  Ok((evaluation, target))
}

/// Exercise evaluation and target steps. Fractions are truncated.
pub fn parse_exercise(text: &str) -> Result<(String, i64), ParseError> {
  let fields = parse_two_line(text);
  let evaluation =
    fields.evaluation.ok_or(ParseError::MissingField { topic: "exercise", field: "evaluation" })?;
  let target =
    fields.target.ok_or(ParseError::MissingNumber { topic: "exercise", field: "target" })?;
  Ok((evaluation, target.trunc() as i64))
}

/// Breakfast, lunch, dinner and summary lines.
pub fn parse_diet(text: &str) -> Result<MealTargets, ParseError> {
  let lines = lines(text);

  let field = |index: usize, name: &'static str, pick: fn(&Labels) -> &'static str| {
    find_labelled(&lines, pick)
      .or_else(|| lines.get(index).map(|l| positional_value(l)))
      .map(str::to_string)
      .ok_or(ParseError::MissingField { topic: "diet", field: name })
  };

  Ok(MealTargets {
    breakfast: field(0, "breakfast", |l| l.breakfast)?,
    lunch: field(1, "lunch", |l| l.lunch)?,
    dinner: field(2, "dinner", |l| l.dinner)?,
    summary: field(3, "summary", |l| l.summary)?,
  })
}

/// The diet evaluation response with a leading evaluation label removed.
pub fn parse_diet_evaluation(text: &str) -> String {
  let text = text.trim();
  let first_line_end = text.find('\n').unwrap_or(text.len());
  let (first, rest) = text.split_at(first_line_end);

  match ALL_LABELS.iter().find_map(|labels| labelled_value(first, labels.evaluation)) {
    Some(value) => format!("{value}{rest}").trim().to_string(),
    None => text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sleep_positional() {
    let (evaluation, target) = parse_sleep("Evaluation: You slept well.\nTarget: \"7.5\"").unwrap();
    assert_eq!(evaluation, "You slept well.");
    assert_eq!(target, 7.5);
  }

  #[test]
  fn test_sleep_unlabelled_lines() {
    let (evaluation, target) = parse_sleep("Short night.\nAim for \"8\" hours").unwrap();
    assert_eq!(evaluation, "Short night.");
    assert_eq!(target, 8.0);
  }

  #[test]
  fn test_unquoted_number_needs_label() {
    assert_eq!(
      parse_sleep("Short night.\nAim for 8 hours"),
      Err(ParseError::MissingNumber { topic: "sleep", field: "target" })
    );
  }

  #[test]
  fn test_labels_override_preamble() {
    let text = "Sure, here is my answer.\n\n**Evaluation:** Too little sleep.\n**Target:** 8 hours";
    let (evaluation, target) = parse_sleep(text).unwrap();
    assert_eq!(evaluation, "Too little sleep.");
    assert_eq!(target, 8.0);
  }

  #[test]
  fn test_korean_labels() {
    let (evaluation, target) = parse_exercise("평가: 잘 걸었습니다.\n목표: \"7,000\"").unwrap();
    assert_eq!(evaluation, "잘 걸었습니다.");
    assert_eq!(target, 7000);
  }

  #[test]
  fn test_exercise_truncates_fraction() {
    let (_, target) = parse_exercise("ok\nTarget: 6500.9").unwrap();
    assert_eq!(target, 6500);
  }

  #[test]
  fn test_empty_response_fails() {
    assert_eq!(
      parse_exercise(""),
      Err(ParseError::MissingField { topic: "exercise", field: "evaluation" })
    );
  }

  #[test]
  fn test_placeholder_text_fails_target() {
    assert!(parse_sleep("API call error: 500").is_err());
  }

  #[test]
  fn test_diet_positional_and_first_colon() {
    let text = "Breakfast: rice porridge, spinach\nLunch: rice noodles\nDinner: white rice, tofu: grilled\nSummary: Gentle low FODMAP day.";
    let targets = parse_diet(text).unwrap();
    assert_eq!(targets.breakfast, "rice porridge, spinach");
    assert_eq!(targets.lunch, "rice noodles");
    assert_eq!(targets.dinner, "white rice, tofu: grilled");
    assert_eq!(targets.summary, "Gentle low FODMAP day.");
  }

  #[test]
  fn test_diet_labels_reorder() {
    let text = "Summary: easy day\nDinner: soup\nLunch: noodles\nBreakfast: porridge";
    let targets = parse_diet(text).unwrap();
    assert_eq!(targets.breakfast, "porridge");
    assert_eq!(targets.summary, "easy day");
  }

  #[test]
  fn test_diet_korean_labels() {
    let targets = parse_diet("아침: 흰죽\n점심: 쌀국수\n저녁: 두부\n요약: 좋습니다").unwrap();
    assert_eq!(targets.breakfast, "흰죽");
    assert_eq!(targets.summary, "좋습니다");
  }

  #[test]
  fn test_diet_too_few_lines() {
    assert_eq!(
      parse_diet("Breakfast: rice\nLunch: noodles"),
      Err(ParseError::MissingField { topic: "diet", field: "dinner" })
    );
  }

  #[test]
  fn test_diet_evaluation_strips_label() {
    assert_eq!(parse_diet_evaluation("  Evaluation: Mostly low FODMAP.  "), "Mostly low FODMAP.");
    assert_eq!(parse_diet_evaluation("평가：괜찮습니다"), "괜찮습니다");
    assert_eq!(parse_diet_evaluation("Plain text answer"), "Plain text answer");
    assert_eq!(
      parse_diet_evaluation("Evaluation: line one\nline two"),
      "line one\nline two"
    );
  }

  #[test]
  fn test_labelled_value_requires_colon() {
    assert_eq!(labelled_value("Targets are hard", "Target"), None);
    assert_eq!(labelled_value("- target : 7", "Target"), Some("7"));
  }
}
