//! Interval scheduling after a graded recall attempt.
//!
//! The established-card branch is a simplified SM-2: grades 3 and 4 grow
//! the interval by one day, grade 5 multiplies it by the easy bonus.
//!
//! `schedule` is pure: no I/O, no clock, no randomness.

use crate::{Card, Grade, MAX_GRADE};
use serde::{Deserialize, Serialize};

/// Scheduling parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Multiplier applied on grade 5 for an established card
    #[serde(default = "default_easy_bonus")]
    pub easy_bonus: f64,

    #[serde(default = "default_interval_modifier")]
    pub interval_modifier: f64,

    /// Hard cap on any scheduled interval
    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            easy_bonus: default_easy_bonus(),
            interval_modifier: default_interval_modifier(),
            max_interval_days: default_max_interval_days(),
        }
    }
}

fn default_easy_bonus() -> f64 {
    1.3
}

fn default_interval_modifier() -> f64 {
    1.0
}

fn default_max_interval_days() -> u32 {
    365
}

/// Outcome of scheduling one grade
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scheduled {
    pub interval_days: u32,
    pub difficulty: u8,
}

/// Compute the next interval and difficulty for `card` graded `grade`.
///
/// Out-of-range grades are clamped into 0..=5.
pub fn schedule(card: &Card, grade: i64, cfg: &SchedulerConfig) -> Scheduled {
    let grade = Grade::clamped(grade);
    let g = grade.value();

    let interval = if grade.is_failure() {
        1
    } else if card.last_reviewed_at.is_none() || card.interval_days <= 1 {
        match g {
            3 => 1,
            4 => 2,
            _ => 3,
        }
    } else {
        match g {
            3 | 4 => card.interval_days.saturating_add(1),
            _ => scale(card.interval_days, cfg),
        }
    };

    Scheduled {
        interval_days: interval.min(cfg.max_interval_days),
        difficulty: MAX_GRADE - g,
    }
}

/// Apply easy bonus and modifier, rounding half to even.
fn scale(interval_days: u32, cfg: &SchedulerConfig) -> u32 {
    let scaled = (interval_days as f64 * cfg.easy_bonus * cfg.interval_modifier).round_ties_even();
    if !scaled.is_finite() || scaled >= cfg.max_interval_days as f64 {
        return cfg.max_interval_days;
    }
    // A growing branch never schedules a card for "now"
    (scaled as u32).max(1)
}
