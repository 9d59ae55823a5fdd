//! Due-date decisions.
//!
//! Due-ness compares calendar days, not instants, in the timezone the card's
//! `last_reviewed` was stored with (UTC when it carried none). A card
//! reviewed at 23:59 with a one-day interval is due at 00:00 two days later
//! local time, never at 00:01 the next morning.

use crate::Card;
use chrono::{DateTime, Days, NaiveDate, Utc};

/// Calendar day on which the card becomes due, in its own timezone
fn due_date(card: &Card) -> Option<NaiveDate> {
    let last = card.last_reviewed_at?;
    last.date_naive()
        .checked_add_days(Days::new(card.interval_days as u64))
}

/// Whether `card` should be reviewed at `now`
pub fn is_due(card: &Card, now: DateTime<Utc>) -> bool {
    let Some(last) = card.last_reviewed_at else {
        return true;
    };
    match due_date(card) {
        Some(due_on) => due_on <= now.with_timezone(last.offset()).date_naive(),
        None => false,
    }
}

/// Instant the card becomes due: `now` for never-reviewed cards, otherwise
/// local midnight of the due day.
pub fn next_due(card: &Card, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(last) = card.last_reviewed_at else {
        return now;
    };
    due_date(card)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(*last.offset()).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
