use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::util::format_duration;

/// What a goal counts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GoalKind {
    /// words read through paced playback
    Words,
    /// books finished
    Books,
    /// reading time, stored in seconds
    Time,
    /// consecutive reading days
    Streak,
}

impl GoalKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "words" => Some(GoalKind::Words),
            "books" => Some(GoalKind::Books),
            "time" => Some(GoalKind::Time),
            "streak" => Some(GoalKind::Streak),
            _ => None,
        }
    }

    /// Convert a target as typed by the user (minutes for time) into stored units
    pub fn stored_target(self, target: u64) -> u64 {
        match self {
            GoalKind::Time => target.saturating_mul(60),
            _ => target,
        }
    }

    /// Human readable amount in this goal's unit
    pub fn describe(self, value: u64) -> String {
        match self {
            GoalKind::Words => format!("{value} words"),
            GoalKind::Books if value == 1 => "1 book".to_string(),
            GoalKind::Books => format!("{value} books"),
            GoalKind::Time => format_duration(value),
            GoalKind::Streak if value == 1 => "1 day".to_string(),
            GoalKind::Streak => format!("{value} days"),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GoalPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl GoalPeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily" => Some(GoalPeriod::Daily),
            "weekly" => Some(GoalPeriod::Weekly),
            "monthly" => Some(GoalPeriod::Monthly),
            "yearly" => Some(GoalPeriod::Yearly),
            _ => None,
        }
    }

    /// Last day (inclusive) of a period starting on `start`
    pub fn end_date(self, start: NaiveDate) -> NaiveDate {
        let next = match self {
            GoalPeriod::Daily => start.checked_add_days(Days::new(1)),
            GoalPeriod::Weekly => start.checked_add_days(Days::new(7)),
            GoalPeriod::Monthly => start.checked_add_months(Months::new(1)),
            GoalPeriod::Yearly => start.checked_add_months(Months::new(12)),
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGoal {
    pub kind: GoalKind,
    /// In stored units, see [`GoalKind::stored_target`]
    pub target_value: u64,
    pub period: GoalPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewGoal {
    /// A goal covering one `period` from `start`, unless an explicit end is given
    pub fn new(
        kind: GoalKind,
        target_value: u64,
        period: GoalPeriod,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            kind,
            target_value,
            period,
            start_date,
            end_date: end_date.unwrap_or_else(|| period.end_date(start_date)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingGoal {
    pub id: i64,
    pub kind: GoalKind,
    pub target_value: u64,
    pub current_value: u64,
    pub period: GoalPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl ReadingGoal {
    pub fn progress_percent(&self) -> f64 {
        if self.target_value == 0 {
            return 0.0;
        }
        (self.current_value as f64 / self.target_value as f64 * 100.0).min(100.0)
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
}
