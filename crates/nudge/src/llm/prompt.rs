//! Prompt templates. Each template spells out the exact line layout the
//! response parser expects.

use serde::{Deserialize, Serialize};

use crate::model::AllergyProfile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
  #[default]
  En,
  Ko,
}

/// Line labels a response is asked to use.
#[derive(Debug, Clone, Copy)]
pub struct Labels {
  pub breakfast: &'static str,
  pub lunch: &'static str,
  pub dinner: &'static str,
  pub summary: &'static str,
  pub evaluation: &'static str,
  pub target: &'static str,
}

pub const EN_LABELS: Labels = Labels {
  breakfast: "Breakfast",
  lunch: "Lunch",
  dinner: "Dinner",
  summary: "Summary",
  evaluation: "Evaluation",
  target: "Target",
};

pub const KO_LABELS: Labels = Labels {
  breakfast: "아침",
  lunch: "점심",
  dinner: "저녁",
  summary: "요약",
  evaluation: "평가",
  target: "목표",
};

impl Locale {
  pub fn labels(&self) -> &'static Labels {
    match self {
      Locale::En => &EN_LABELS,
      Locale::Ko => &KO_LABELS,
    }
  }
}

pub struct DietPromptInput<'a> {
  pub allergies: &'a AllergyProfile,
  pub restrictions: &'a [String],
  pub recent_foods: &'a [String],
  pub catalog_table: &'a str,
  pub context: &'a str,
}

fn list_or_none(items: &[String], none: &str) -> String {
  let items: Vec<&str> = items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
  if items.is_empty() {
    none.to_string()
  } else {
    items.join(", ")
  }
}

fn allergy_list(locale: Locale, allergies: &AllergyProfile) -> Vec<String> {
  allergies
    .iter()
    .map(|a| match locale {
      Locale::En => a.label().to_string(),
      Locale::Ko => a.korean_label().to_string(),
    })
    .collect()
}

pub fn diet_prompt(locale: Locale, input: &DietPromptInput<'_>) -> String {
  let l = locale.labels();
  match locale {
    Locale::En => format!(
      "You are a clinical dietitian for patients with irritable bowel syndrome (IBS).\n\
       Plan tomorrow's breakfast, lunch and dinner using only foods from the catalog below.\n\
       Prefer low FODMAP foods. Do not use any food the patient ate in the last three days, \
       any food containing a disliked ingredient, or any food tagged with one of the patient's allergies.\n\n\
       Allergies: {allergies}\n\
       Disliked ingredients: {restrictions}\n\
       Foods eaten in the last three days: {recent}\n\n\
       Reference guidelines:\n{context}\n\n\
       Food catalog (CSV):\n{table}\n\
       Answer with exactly four lines and nothing else:\n\
       {b}: <comma-separated foods>\n\
       {lu}: <comma-separated foods>\n\
       {d}: <comma-separated foods>\n\
       {s}: <one sentence explaining the plan>",
      allergies = list_or_none(&allergy_list(locale, input.allergies), "none"),
      restrictions = list_or_none(input.restrictions, "none"),
      recent = list_or_none(input.recent_foods, "none"),
      context = input.context,
      table = input.catalog_table,
      b = l.breakfast,
      lu = l.lunch,
      d = l.dinner,
      s = l.summary,
    ),
    Locale::Ko => format!(
      "당신은 과민성 대장 증후군(IBS) 환자를 위한 임상 영양사입니다.\n\
       아래 음식 목록에 있는 음식만 사용하여 내일의 아침, 점심, 저녁 식단을 추천하세요.\n\
       저포드맵 음식을 우선하고, 최근 3일 동안 먹은 음식, 기피 재료가 들어간 음식, \
       알러지 태그가 있는 음식은 제외하세요.\n\n\
       알러지: {allergies}\n\
       기피 재료: {restrictions}\n\
       최근 3일 섭취 음식: {recent}\n\n\
       참고 가이드라인:\n{context}\n\n\
       음식 목록 (CSV):\n{table}\n\
       다른 말 없이 정확히 네 줄로 답하세요:\n\
       {b}: <쉼표로 구분한 음식>\n\
       {lu}: <쉼표로 구분한 음식>\n\
       {d}: <쉼표로 구분한 음식>\n\
       {s}: <식단을 설명하는 한 문장>",
      allergies = list_or_none(&allergy_list(locale, input.allergies), "없음"),
      restrictions = list_or_none(input.restrictions, "없음"),
      recent = list_or_none(input.recent_foods, "없음"),
      context = input.context,
      table = input.catalog_table,
      b = l.breakfast,
      lu = l.lunch,
      d = l.dinner,
      s = l.summary,
    ),
  }
}

pub fn sleep_prompt(locale: Locale, sleep_hours: f64, context: &str) -> String {
  let l = locale.labels();
  match locale {
    Locale::En => format!(
      "You are a sleep coach for patients with irritable bowel syndrome (IBS).\n\
       Last night the patient slept {sleep_hours} hours.\n\n\
       Reference guidelines:\n{context}\n\n\
       Evaluate last night's sleep and recommend tonight's sleep duration.\n\
       Answer with exactly two lines and nothing else:\n\
       {e}: <one or two sentences>\n\
       {t}: \"<hours as a number, e.g. 7.5>\"",
      e = l.evaluation,
      t = l.target,
    ),
    Locale::Ko => format!(
      "당신은 과민성 대장 증후군(IBS) 환자를 위한 수면 코치입니다.\n\
       환자는 어젯밤 {sleep_hours}시간 잤습니다.\n\n\
       참고 가이드라인:\n{context}\n\n\
       어젯밤 수면을 평가하고 오늘 밤 권장 수면 시간을 제시하세요.\n\
       다른 말 없이 정확히 두 줄로 답하세요:\n\
       {e}: <한두 문장>\n\
       {t}: \"<시간 숫자, 예: 7.5>\"",
      e = l.evaluation,
      t = l.target,
    ),
  }
}

pub fn exercise_prompt(locale: Locale, weekly_steps: &[i64], context: &str) -> String {
  let l = locale.labels();
  let steps = weekly_steps.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
  match locale {
    Locale::En => format!(
      "You are an exercise coach for patients with irritable bowel syndrome (IBS).\n\
       Daily step counts for the past week, oldest first: [{steps}]\n\n\
       Reference guidelines:\n{context}\n\n\
       Evaluate this week's walking and recommend tomorrow's step goal.\n\
       Answer with exactly two lines and nothing else:\n\
       {e}: <one or two sentences>\n\
       {t}: \"<steps as a whole number, e.g. 7000>\"",
      e = l.evaluation,
      t = l.target,
    ),
    Locale::Ko => format!(
      "당신은 과민성 대장 증후군(IBS) 환자를 위한 운동 코치입니다.\n\
       지난 일주일 일별 걸음 수(오래된 순): [{steps}]\n\n\
       참고 가이드라인:\n{context}\n\n\
       이번 주 걷기를 평가하고 내일 목표 걸음 수를 제시하세요.\n\
       다른 말 없이 정확히 두 줄로 답하세요:\n\
       {e}: <한두 문장>\n\
       {t}: \"<걸음 수 정수, 예: 7000>\"",
      e = l.evaluation,
      t = l.target,
    ),
  }
}

pub fn diet_evaluation_prompt(locale: Locale, today_foods: &[String]) -> String {
  let l = locale.labels();
  match locale {
    Locale::En => format!(
      "You are a clinical dietitian for patients with irritable bowel syndrome (IBS).\n\
       Today the patient ate: {foods}\n\
       Evaluate today's diet from a low FODMAP perspective in two or three sentences.\n\
       Answer with a single line starting with \"{e}:\".",
      foods = list_or_none(today_foods, "nothing logged"),
      e = l.evaluation,
    ),
    Locale::Ko => format!(
      "당신은 과민성 대장 증후군(IBS) 환자를 위한 임상 영양사입니다.\n\
       오늘 환자가 먹은 음식: {foods}\n\
       저포드맵 관점에서 오늘의 식단을 두세 문장으로 평가하세요.\n\
       \"{e}:\"로 시작하는 한 줄로 답하세요.",
      foods = list_or_none(today_foods, "기록 없음"),
      e = l.evaluation,
    ),
  }
}
