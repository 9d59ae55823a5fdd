//! Core domain types for the Recall review core.
//!
//! This module defines the fundamental types used throughout the system:
//! - Card and deck identifiers
//! - The card metadata view
//! - Grades and session phases
//! - Session summaries and live statistics

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Largest interval a stored card may carry, independent of scheduler config.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Upper bound of both grades and difficulty.
pub const MAX_GRADE: u8 = 5;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable card identifier: the card's storage path relative to the store root
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Logical deck path. `.` names the root deck.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(String);

impl DeckId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(".".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeckId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Card
// ============================================================================

/// A flashcard as seen by the review core.
///
/// Only `last_reviewed_at`, `interval_days` and `difficulty` are ever written
/// back; the rest is carried for display.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub title: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub last_reviewed_at: Option<DateTime<FixedOffset>>,
    pub interval_days: u32,
    pub difficulty: u8,
    pub question: String,
    pub answer: String,
}

impl Card {
    /// A never-reviewed card with empty content
    pub fn new(id: impl Into<CardId>) -> Self {
        Self {
            id: id.into(),
            title: None,
            tags: BTreeSet::new(),
            created_at: None,
            last_reviewed_at: None,
            interval_days: 0,
            difficulty: 0,
            question: String::new(),
            answer: String::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_reviewed_at.is_none()
    }
}

// ============================================================================
// Grades and sessions
// ============================================================================

/// Self-rated recall quality, always within 0..=5
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grade(u8);

impl Grade {
    /// Returns `None` if `value` is outside 0..=5
    pub fn new(value: i64) -> Option<Self> {
        if (0..=MAX_GRADE as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    /// Clamp any integer into the grade range
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, MAX_GRADE as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Grades 0-2 mean the card was forgotten
    pub fn is_failure(self) -> bool {
        self.0 <= 2
    }
}

/// Phase of the per-card review state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Question,
    Answer,
    AwaitingRating,
    Completed,
}

/// Final report of an ended session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: Uuid,
    pub deck_id: DeckId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub cards_reviewed: usize,
    pub average_grade: f64,
    pub new_cards_count: usize,
    pub reviewed_cards_count: usize,
}

impl Summary {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }
}

/// Live projection of an active session
#[derive(Clone, Debug)]
pub struct SessionStats {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub average_grade: f64,
    pub progress_pct: f64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}
