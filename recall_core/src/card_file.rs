//! On-disk card format.
//!
//! A card file is an optional `---` delimited YAML header followed by a body.
//! The body splits on its first bare `---` line into question and answer.
//!
//! Rewrites only ever replace the `last_reviewed`, `review_interval` and
//! `difficulty` lines of the header. Every other byte is kept.

use crate::metadata::{format_timestamp, parse_count, parse_tags, parse_timestamp, Header};
use crate::{Card, CardId, Error, Result, MAX_GRADE, MAX_INTERVAL_DAYS};
use chrono::Utc;

pub const LAST_REVIEWED_KEY: &str = "last_reviewed";
pub const INTERVAL_KEY: &str = "review_interval";
pub const DIFFICULTY_KEY: &str = "difficulty";

const DELIMITER: &str = "---";

/// Byte layout of a card file
#[derive(Debug, PartialEq)]
struct Layout {
    /// Range of the header content between the delimiter lines
    header: Option<(usize, usize)>,
    /// Start of the closing delimiter line
    closing: usize,
    body_start: usize,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Lines with their starting byte offsets, line terminators included
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

fn layout(text: &str) -> std::result::Result<Layout, String> {
    let mut lines = lines_with_offsets(text);
    let Some((_, first)) = lines.next() else {
        return Ok(Layout {
            header: None,
            closing: 0,
            body_start: 0,
        });
    };
    if !is_delimiter(first.trim_start_matches('\u{feff}')) {
        return Ok(Layout {
            header: None,
            closing: 0,
            body_start: 0,
        });
    }

    let content_start = first.len();
    for (start, line) in lines {
        if is_delimiter(line) {
            return Ok(Layout {
                header: Some((content_start, start)),
                closing: start,
                body_start: start + line.len(),
            });
        }
    }
    Err("header block is never closed".into())
}

/// Split a body into (question, answer) on its first bare `---` line
pub fn split_body(body: &str) -> (String, String) {
    for (start, line) in lines_with_offsets(body) {
        if is_delimiter(line) {
            let question = body[..start].trim();
            let answer = body[start + line.len()..].trim();
            return (question.to_string(), answer.to_string());
        }
    }
    (body.trim().to_string(), String::new())
}

/// Parse a card file's contents into a [`Card`]
pub fn parse_card(id: &CardId, text: &str) -> Result<Card> {
    let layout = layout(text).map_err(|reason| Error::corrupt(id.as_str(), reason))?;
    let header = match layout.header {
        Some((start, end)) => Header::parse(&text[start..end])
            .map_err(|reason| Error::corrupt(id.as_str(), reason))?,
        None => Header::default(),
    };

    let mut card = Card::new(id.clone());
    let (question, answer) = split_body(&text[layout.body_start..]);
    card.question = question;
    card.answer = answer;

    card.title = header.get("title").and_then(|v| v.as_str()).map(String::from);
    if let Some(tags) = header.get("tags") {
        card.tags = parse_tags(tags).into_iter().collect();
    }

    if let Some(created) = header.get("created") {
        match parse_timestamp(created) {
            Ok(created) => card.created_at = created,
            Err(e) => tracing::warn!("Ignoring unparseable created date in {}: {}", id, e),
        }
    }

    if let Some(value) = header.get(LAST_REVIEWED_KEY) {
        card.last_reviewed_at = parse_timestamp(value)
            .map_err(|e| Error::corrupt(id.as_str(), format!("{}: {}", LAST_REVIEWED_KEY, e)))?;
    }

    if let Some(value) = header.get(INTERVAL_KEY) {
        let interval = parse_count(value)
            .map_err(|e| Error::corrupt(id.as_str(), format!("{}: {}", INTERVAL_KEY, e)))?
            .unwrap_or(0);
        if !(0..=MAX_INTERVAL_DAYS as i64).contains(&interval) {
            return Err(Error::corrupt(
                id.as_str(),
                format!("{} {} outside 0..={}", INTERVAL_KEY, interval, MAX_INTERVAL_DAYS),
            ));
        }
        card.interval_days = interval as u32;
    }

    if let Some(value) = header.get(DIFFICULTY_KEY) {
        let difficulty = parse_count(value)
            .map_err(|e| Error::corrupt(id.as_str(), format!("{}: {}", DIFFICULTY_KEY, e)))?
            .unwrap_or(0);
        card.difficulty = difficulty.clamp(0, MAX_GRADE as i64) as u8;
    }

    if card.last_reviewed_at.is_none() && card.interval_days > 0 {
        tracing::debug!(
            "Card {} has an interval but was never reviewed; treating as new",
            id
        );
        card.interval_days = 0;
    }

    Ok(card)
}

/// Header lines for the three scheduling fields of `card`
fn schedule_lines(card: &Card) -> [(&'static str, String); 3] {
    let last_reviewed = card
        .last_reviewed_at
        .map(|at| format_timestamp(at.with_timezone(&Utc)))
        .unwrap_or_else(|| "null".into());
    [
        (LAST_REVIEWED_KEY, last_reviewed),
        (INTERVAL_KEY, card.interval_days.to_string()),
        (DIFFICULTY_KEY, card.difficulty.to_string()),
    ]
}

/// Which scheduling key a top-level header line assigns, if any.
///
/// Plain, single-quoted and double-quoted spellings of the key all match.
fn assigned_key(line: &str) -> Option<usize> {
    [LAST_REVIEWED_KEY, INTERVAL_KEY, DIFFICULTY_KEY]
        .iter()
        .position(|key| {
            strip_quoted_key(line, '"', key)
                .or_else(|| strip_quoted_key(line, '\'', key))
                .or_else(|| line.strip_prefix(key))
                .is_some_and(|rest| rest.trim_start().starts_with(':'))
        })
}

fn strip_quoted_key<'a>(line: &'a str, quote: char, key: &str) -> Option<&'a str> {
    line.strip_prefix(quote)?
        .strip_prefix(key)?
        .strip_prefix(quote)
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t') || line.starts_with("- ")
}

/// Rewrite the scheduling fields of `text` to the values held by `card`.
///
/// Fails with `Corrupt` when the existing header is unterminated.
pub fn rewrite_schedule(text: &str, card: &Card) -> Result<String> {
    let layout = layout(text).map_err(|reason| Error::corrupt(card.id.as_str(), reason))?;
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let values = schedule_lines(card);

    let Some((start, end)) = layout.header else {
        let mut out = String::with_capacity(text.len() + 96);
        out.push_str(DELIMITER);
        out.push_str(newline);
        for (key, value) in &values {
            out.push_str(&format!("{}: {}{}", key, value, newline));
        }
        out.push_str(DELIMITER);
        out.push_str(newline);
        out.push_str(text);
        return Ok(out);
    };

    let mut out = String::with_capacity(text.len() + 96);
    out.push_str(&text[..start]);

    let mut written = [false; 3];
    let mut skipping = false;
    for (_, line) in lines_with_offsets(&text[start..end]) {
        if skipping && is_continuation(line) {
            continue;
        }
        skipping = false;
        match assigned_key(line) {
            Some(idx) => {
                let (key, value) = &values[idx];
                out.push_str(&format!("{}: {}{}", key, value, newline));
                written[idx] = true;
                skipping = true;
            }
            None => out.push_str(line),
        }
    }

    if !out.ends_with('\n') {
        out.push_str(newline);
    }
    for (idx, (key, value)) in values.iter().enumerate() {
        if !written[idx] {
            out.push_str(&format!("{}: {}{}", key, value, newline));
        }
    }

    out.push_str(&text[layout.closing..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "---\n\
title: Ownership\n\
tags:\n  - rust\n  - memory\n\
source: \"The Book, ch. 4\"\n\
last_reviewed: 2024-01-15\n\
review_interval: \"6\"\n\
difficulty: 9\n\
---\n\
What happens to `s1` after `let s2 = s1;`?\n\
\n\
---\n\
It is moved; using `s1` is a compile error.\n";

    fn id() -> CardId {
        CardId::new("rust/ownership.md")
    }

    #[test]
    fn test_parse_full_card() {
        let card = parse_card(&id(), SAMPLE).unwrap();
        assert_eq!(card.title.as_deref(), Some("Ownership"));
        assert!(card.tags.contains("rust") && card.tags.contains("memory"));
        assert_eq!(
            card.last_reviewed_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap().fixed_offset())
        );
        assert_eq!(card.interval_days, 6);
        assert_eq!(card.difficulty, 5); // clamped
        assert_eq!(card.question, "What happens to `s1` after `let s2 = s1;`?");
        assert_eq!(card.answer, "It is moved; using `s1` is a compile error.");
    }

    #[test]
    fn test_card_without_header_is_new() {
        let card = parse_card(&id(), "Capital of Peru?\n---\nLima\n").unwrap();
        assert!(card.is_new());
        assert_eq!(card.question, "Capital of Peru?");
        assert_eq!(card.answer, "Lima");
    }

    #[test]
    fn test_unclosed_header_is_corrupt() {
        let err = parse_card(&id(), "---\ntitle: broken\nno closing line\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_bad_yaml_is_corrupt() {
        let err = parse_card(&id(), "---\ntags: [unclosed\n---\nQ\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_bad_scheduling_values_are_corrupt() {
        for header in [
            "last_reviewed: someday",
            "review_interval: -3",
            "review_interval: 99999",
            "difficulty: hard",
        ] {
            let text = format!("---\n{}\n---\nQ\n", header);
            assert!(
                matches!(parse_card(&id(), &text), Err(Error::Corrupt { .. })),
                "{} should be corrupt",
                header
            );
        }
    }

    #[test]
    fn test_interval_without_review_is_normalised() {
        let card = parse_card(&id(), "---\nreview_interval: 4\n---\nQ\n").unwrap();
        assert_eq!(card.interval_days, 0);
    }

    #[test]
    fn test_rewrite_touches_only_schedule_lines() {
        let mut card = parse_card(&id(), SAMPLE).unwrap();
        card.last_reviewed_at = Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 15, 0).unwrap().fixed_offset());
        card.interval_days = 8;
        card.difficulty = 1;

        let rewritten = rewrite_schedule(SAMPLE, &card).unwrap();
        let expected = SAMPLE
            .replace("last_reviewed: 2024-01-15", "last_reviewed: 2024-02-01T08:15:00Z")
            .replace("review_interval: \"6\"", "review_interval: 8")
            .replace("difficulty: 9", "difficulty: 1");
        assert_eq!(rewritten, expected);

        let reparsed = parse_card(&id(), &rewritten).unwrap();
        assert_eq!(reparsed.interval_days, 8);
        assert_eq!(reparsed.difficulty, 1);
        assert_eq!(reparsed.last_reviewed_at, card.last_reviewed_at);
    }

    #[test]
    fn test_rewrite_appends_missing_keys() {
        let text = "---\ntitle: Peru\nunknown_key: {a: 1}\n---\nCapital?\n---\nLima\n";
        let mut card = parse_card(&id(), text).unwrap();
        card.interval_days = 2;
        card.difficulty = 1;
        card.last_reviewed_at = Some(Utc.with_ymd_and_hms(2024, 3, 3, 3, 3, 3).unwrap().fixed_offset());

        let rewritten = rewrite_schedule(text, &card).unwrap();
        assert_eq!(
            rewritten,
            "---\ntitle: Peru\nunknown_key: {a: 1}\n\
             last_reviewed: 2024-03-03T03:03:03Z\nreview_interval: 2\ndifficulty: 1\n\
             ---\nCapital?\n---\nLima\n"
        );
    }

    #[test]
    fn test_rewrite_prepends_header_when_missing() {
        let text = "Capital?\n---\nLima\n";
        let mut card = parse_card(&id(), text).unwrap();
        card.interval_days = 1;
        card.difficulty = 4;
        card.last_reviewed_at = Some(Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap().fixed_offset());

        let rewritten = rewrite_schedule(text, &card).unwrap();
        assert!(rewritten.ends_with(text));
        let reparsed = parse_card(&id(), &rewritten).unwrap();
        assert_eq!(reparsed.interval_days, 1);
        assert_eq!(reparsed.question, "Capital?");
    }

    #[test]
    fn test_rewrite_replaces_block_value_continuations() {
        let text = "---\nlast_reviewed:\n  2024-01-01\ntitle: T\n---\nQ\n";
        let mut card = parse_card(&id(), text).unwrap();
        card.interval_days = 3;
        let rewritten = rewrite_schedule(text, &card).unwrap();
        assert_eq!(
            rewritten,
            "---\nlast_reviewed: 2024-01-01T00:00:00Z\ntitle: T\nreview_interval: 3\ndifficulty: 0\n---\nQ\n"
        );
    }

    #[test]
    fn test_rewrite_replaces_quoted_keys() {
        let text = "---\n\"difficulty\": 2\ntitle: T\n'review_interval': 5\nlast_reviewed: 2024-01-01\n---\nQ\n---\nA\n";
        let mut card = parse_card(&id(), text).unwrap();
        assert_eq!(card.difficulty, 2);
        assert_eq!(card.interval_days, 5);
        card.interval_days = 6;
        card.difficulty = 1;

        let rewritten = rewrite_schedule(text, &card).unwrap();
        assert_eq!(
            rewritten,
            "---\ndifficulty: 1\ntitle: T\nreview_interval: 6\nlast_reviewed: 2024-01-01T00:00:00Z\n---\nQ\n---\nA\n"
        );
        let reparsed = parse_card(&id(), &rewritten).unwrap();
        assert_eq!(reparsed.difficulty, 1);
        assert_eq!(reparsed.interval_days, 6);
    }

    #[test]
    fn test_quoted_lookalike_keys_are_untouched() {
        assert_eq!(assigned_key("\"difficulty\": 2"), Some(2));
        assert_eq!(assigned_key("'last_reviewed': null"), Some(0));
        assert_eq!(assigned_key("\"difficulty_note\": x"), None);
        assert_eq!(assigned_key("\"difficulty': 2"), None);
    }

    #[test]
    fn test_rewrite_keeps_crlf() {
        let text = "---\r\ntitle: T\r\ndifficulty: 2\r\n---\r\nQ\r\n";
        let card = parse_card(&id(), text).unwrap();
        let rewritten = rewrite_schedule(text, &card).unwrap();
        assert!(rewritten.starts_with("---\r\ntitle: T\r\ndifficulty: 2\r\n"));
        assert!(!rewritten.replace("\r\n", "").contains('\r'));
        assert!(rewritten.ends_with("---\r\nQ\r\n"));
    }
}
