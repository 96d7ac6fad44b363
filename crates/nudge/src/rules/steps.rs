use super::RuleError;

pub const DEFAULT_STEP_TARGET: i64 = 6000;

const WINDOW_DAYS: usize = 7;
const MIN_TARGET: f64 = 4000.0;
const MAX_TARGET: f64 = 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLevel {
  VeryLow,
  Low,
  Adequate,
  High,
}

impl StepLevel {
  fn from_ratio(value: f64, target: f64) -> Self {
    if value < target * 0.5 {
      StepLevel::VeryLow
    } else if value < target * 0.85 {
      StepLevel::Low
    } else if value < target * 1.1 {
      StepLevel::Adequate
    } else {
      StepLevel::High
    }
  }

  fn is_good(self) -> bool {
    matches!(self, StepLevel::Adequate | StepLevel::High)
  }

  /// Target before regularity and growth adjustments.
  fn proposed(self, reference: f64, target: f64) -> f64 {
    match self {
      StepLevel::VeryLow | StepLevel::Low => {
        target.min(MIN_TARGET.max(round_half_even(reference / 500.0) * 500.0 + 1000.0))
      }
      StepLevel::Adequate => 7000.0,
      StepLevel::High => 8000.0,
    }
  }

  fn plain_phrase(self) -> &'static str {
    match self {
      StepLevel::VeryLow => "you fell far short of your step goal",
      StepLevel::Low => "you fell short of your step goal",
      StepLevel::Adequate => "you were close to your step goal",
      StepLevel::High => "you reached your step goal",
    }
  }

  fn contrast_phrase(self) -> &'static str {
    match self {
      StepLevel::Adequate => "on average you were close to your step goal",
      StepLevel::High => "on average you reached your step goal",
      other => other.plain_phrase(),
    }
  }

  fn action(self) -> &'static str {
    match self {
      StepLevel::VeryLow => "You need to walk more",
      StepLevel::Low => "Try adding a few more steps",
      StepLevel::Adequate => "Keep up your current level",
      StepLevel::High => "Keep it steady without overdoing it",
    }
  }
}

/// Week-over-week consistency, judged only by the coefficient of variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRegularity {
  VeryRegular,
  Regular,
  SomewhatIrregular,
  Irregular,
}

impl StepRegularity {
  fn from_cv(cv: f64) -> Self {
    if cv <= 0.15 {
      StepRegularity::VeryRegular
    } else if cv <= 0.30 {
      StepRegularity::Regular
    } else if cv <= 0.50 {
      StepRegularity::SomewhatIrregular
    } else {
      StepRegularity::Irregular
    }
  }

  fn is_bad(self) -> bool {
    matches!(self, StepRegularity::SomewhatIrregular | StepRegularity::Irregular)
  }

  fn phrase(self) -> &'static str {
    match self {
      StepRegularity::VeryRegular => "your walking was very regular",
      StepRegularity::Regular => "your walking was regular",
      StepRegularity::SomewhatIrregular | StepRegularity::Irregular => {
        "your walking was not regular"
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepAssessment {
  pub evaluation: String,
  /// Multiple of 500 within [4000, 10000]
  pub target: i64,
  pub level: StepLevel,
  /// `None` when there were too few days to judge consistency
  pub regularity: Option<StepRegularity>,
}

/// Evaluate the week's steps and pick tomorrow's goal.
///
/// Returns the evaluation sentence and the target as a decimal string.
pub fn recommend_step(steps: &[i64], target: i64) -> Result<(String, String), RuleError> {
  let assessment = assess_steps(steps, target)?;
  Ok((assessment.evaluation, assessment.target.to_string()))
}

pub fn assess_steps(steps: &[i64], target: i64) -> Result<StepAssessment, RuleError> {
  if steps.is_empty() {
    return Err(RuleError::invalid_input("step counts must not be empty"));
  }

  let start = steps.len().saturating_sub(WINDOW_DAYS);
  let xs: Vec<f64> = steps[start..].iter().map(|&v| v.max(0) as f64).collect();

  if xs.len() <= 3 {
    Ok(assess_single_day(xs[xs.len() - 1], target as f64))
  } else {
    Ok(assess_week(&xs, target as f64))
  }
}

fn assess_single_day(today: f64, target: f64) -> StepAssessment {
  let level = StepLevel::from_ratio(today, target);
  let mut base = level.proposed(today, target);

  if today > 0.0 {
    base = base.min((today + growth_allowance(today)).trunc());
  }
  let goal = round_half_even(base / 500.0) * 500.0;
  let goal = goal.clamp(MIN_TARGET, MAX_TARGET);

  let today_phrase = match level {
    StepLevel::VeryLow => "fell far short of your step goal",
    StepLevel::Low => "fell short of your step goal",
    StepLevel::Adequate => "came close to your step goal",
    StepLevel::High => "reached your step goal comfortably",
  };
  let evaluation = format!(
    "There is not enough data this week, so today is evaluated on its own. Today you {today_phrase}. {}.",
    level.action()
  );

  StepAssessment { evaluation, target: goal as i64, level, regularity: None }
}

fn assess_week(xs: &[f64], target: f64) -> StepAssessment {
  let n = xs.len() as f64;
  let mean = xs.iter().sum::<f64>() / n;
  let variance = xs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
  let std = variance.sqrt();
  let cv = if mean > 0.0 { std / mean } else { 0.0 };

  let band_low = (target * 0.8).trunc();
  let band_high = (target * 1.2).trunc();
  let within_band = xs.iter().filter(|&&v| band_low <= v && v <= band_high).count();
  let avg3d = xs[xs.len() - 3..].iter().sum::<f64>() / 3.0;

  let level = StepLevel::from_ratio(mean, target);
  let regularity = StepRegularity::from_cv(cv);

  let mut base = level.proposed(avg3d, target);
  if regularity.is_bad() {
    base = base.clamp(5500.0, 7500.0);
  }
  if within_band < 3 {
    base = base.min(7000.0);
  }
  if avg3d > 0.0 {
    base = base.min((avg3d + growth_allowance(avg3d)).trunc());
  }
  let base = base.clamp(MIN_TARGET, MAX_TARGET);
  let goal = round_half_even(base / 500.0) * 500.0;

  StepAssessment {
    evaluation: week_sentence(level, regularity),
    target: goal as i64,
    level,
    regularity: Some(regularity),
  }
}

fn week_sentence(level: StepLevel, regularity: StepRegularity) -> String {
  let reg_bad = regularity.is_bad();
  let level_good = level.is_good();

  let closing = match (reg_bad, level_good) {
    (true, true) => "Keep walking consistently",
    (true, false) => "Walk more, and more consistently",
    _ => level.action(),
  };

  let reg = regularity.phrase();
  if reg_bad && level_good {
    format!("This week {reg}. But {}. {closing}.", level.contrast_phrase())
  } else if !reg_bad && !level_good {
    format!("This week {reg}. But {}. {closing}.", level.plain_phrase())
  } else {
    format!("This week {reg}. Also, {}. {closing}.", level.plain_phrase())
  }
}

/// Largest permitted increase over a reference count: 10%, at most 1500.
fn growth_allowance(reference: f64) -> f64 {
  (reference * 0.10).trunc().min(1500.0)
}

fn round_half_even(x: f64) -> f64 {
  x.round_ties_even()
}
