/// Sleep duration bands, upper bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepBand {
  SevereInsufficient,
  Insufficient,
  Adequate,
  Excessive,
  SevereExcessive,
}

impl SleepBand {
  pub fn from_hours(hours: f64) -> Self {
    if hours <= 4.0 {
      SleepBand::SevereInsufficient
    } else if hours <= 6.0 {
      SleepBand::Insufficient
    } else if hours <= 8.0 {
      SleepBand::Adequate
    } else if hours <= 10.0 {
      SleepBand::Excessive
    } else {
      SleepBand::SevereExcessive
    }
  }

  pub fn message(&self) -> &'static str {
    match self {
      SleepBand::SevereInsufficient => {
        "You slept far too little. Try to go to bed early tonight and sleep at least 7 hours."
      }
      SleepBand::Insufficient => {
        "You did not get enough sleep. Build a habit of sleeping a little longer, aiming for 7-8 hours."
      }
      SleepBand::Adequate => {
        "You got an adequate amount of sleep. Keeping this pattern also helps relieve IBS symptoms."
      }
      SleepBand::Excessive => {
        "You slept longer than average. Too much sleep can disturb your bowel rhythm, so aim for 7-8 hours."
      }
      SleepBand::SevereExcessive => {
        "You slept excessively long. Oversleeping can cause fatigue or worsen symptoms, so try to wake up earlier."
      }
    }
  }
}

pub fn recommend_sleep(hours: f64) -> &'static str {
  SleepBand::from_hours(hours).message()
}
