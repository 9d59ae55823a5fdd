//! Review session state machine.
//!
//! A session walks a shuffled queue of due cards. Each card moves through
//! `Question -> Answer -> AwaitingRating` and the session advances only
//! after the graded schedule is durable in the store:
//!
//! ```text
//! start ──► Question ──show_answer──► Answer ──grade──► AwaitingRating
//!              ▲                                            │ saved
//!              └──────────── cursor < len ◄─────────────────┤
//!                                          cursor == len ──► Completed
//! ```

use crate::{
    is_due, schedule, Card, CardId, CardStore, Clock, DeckId, Error, Grade, Result,
    SchedulerConfig, SessionPhase, SessionStats, Summary,
};
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use uuid::Uuid;

/// State of the one active session
#[derive(Clone, Debug)]
pub struct SessionState {
    session_id: Uuid,
    deck_id: DeckId,
    started_at: DateTime<Utc>,
    queue: Vec<CardId>,
    cursor: usize,
    grades: HashMap<CardId, Grade>,
    phase: SessionPhase,
    /// Latest known view of every queued card
    cards: HashMap<CardId, Card>,
    /// Queued cards that had never been reviewed when the session started
    new_cards: HashSet<CardId>,
}

impl SessionState {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn deck_id(&self) -> &DeckId {
        &self.deck_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn queue(&self) -> &[CardId] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn grades(&self) -> &HashMap<CardId, Grade> {
        &self.grades
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    fn average_grade(&self) -> f64 {
        if self.grades.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.grades.values().map(|g| g.value() as u32).sum();
        sum as f64 / self.grades.len() as f64
    }

    /// Move past the current card
    fn advance(&mut self) {
        self.cursor += 1;
        self.phase = if self.cursor >= self.queue.len() {
            SessionPhase::Completed
        } else {
            SessionPhase::Question
        };
    }
}

/// Drives review sessions over a [`CardStore`].
///
/// Clock, scheduler config and RNG type are injected; the engine keeps no
/// global state and never spawns threads.
pub struct SessionEngine<S, C, R = StdRng> {
    store: S,
    clock: C,
    config: SchedulerConfig,
    session: Option<SessionState>,
    rng: PhantomData<fn() -> R>,
}

impl<S: CardStore, C: Clock> SessionEngine<S, C> {
    /// Engine shuffling with the standard RNG
    pub fn new(store: S, clock: C, config: SchedulerConfig) -> Self {
        Self::with_rng(store, clock, config)
    }
}

impl<S: CardStore, C: Clock, R: Rng + SeedableRng> SessionEngine<S, C, R> {
    /// Engine shuffling with `R`, seeded from the clock at each `start`
    pub fn with_rng(store: S, clock: C, config: SchedulerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            session: None,
            rng: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The active session, if any
    pub fn state(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn active(&self) -> Result<&SessionState> {
        self.session.as_ref().ok_or(Error::NoSession)
    }

    /// Start a session over every due card below `deck`.
    ///
    /// Cards that are missing or corrupt are logged and left out.
    pub fn start(&mut self, deck: &DeckId) -> Result<&SessionState> {
        if self.session.is_some() {
            return Err(Error::AlreadyActive);
        }
        if deck.as_str().trim().is_empty() {
            return Err(Error::DeckNotFound(deck.to_string()));
        }

        let now = self.clock.now();
        let ids = self
            .store
            .list_cards_in_deck(deck, true)
            .map_err(|e| match e {
                Error::NotFound(_) => Error::DeckNotFound(deck.to_string()),
                other => other,
            })?;

        let mut seen = HashSet::new();
        let mut queue = Vec::new();
        let mut cards = HashMap::new();
        let mut new_cards = HashSet::new();
        let mut skipped = 0;

        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            let card = match self.store.load_card(&id) {
                Ok(card) => card,
                Err(e @ (Error::NotFound(_) | Error::Corrupt { .. })) => {
                    tracing::warn!("Skipping card {}: {}", id, e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !is_due(&card, now) {
                continue;
            }
            if card.is_new() {
                new_cards.insert(id.clone());
            }
            queue.push(id.clone());
            cards.insert(id, card);
        }

        // Listing order is unspecified; sort so the seed alone fixes the order
        queue.sort();
        let seed = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp()) as u64;
        let mut rng = R::seed_from_u64(seed);
        queue.shuffle(&mut rng);

        let phase = if queue.is_empty() {
            SessionPhase::Completed
        } else {
            SessionPhase::Question
        };

        tracing::info!(
            "Started session on {}: {} due ({} new), {} skipped",
            deck,
            queue.len(),
            new_cards.len(),
            skipped
        );

        Ok(&*self.session.insert(SessionState {
            session_id: Uuid::new_v4(),
            deck_id: deck.clone(),
            started_at: now,
            queue,
            cursor: 0,
            grades: HashMap::new(),
            phase,
            cards,
            new_cards,
        }))
    }

    /// The card under the cursor
    pub fn current_card(&self) -> Result<&Card> {
        let state = self.active()?;
        if state.is_completed() {
            return Err(Error::Completed);
        }
        let id = &state.queue[state.cursor];
        state
            .cards
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn show_answer(&mut self) -> Result<()> {
        let state = self.session.as_mut().ok_or(Error::NoSession)?;
        if state.phase != SessionPhase::Question {
            return Err(Error::WrongPhase {
                expected: "Question",
                actual: state.phase,
            });
        }
        state.phase = SessionPhase::Answer;
        Ok(())
    }

    /// Grade the current card, persist its new schedule, then advance.
    ///
    /// Grades outside 0..=5 are clamped. If the save fails the session is
    /// left exactly as it was and the same grade may be retried.
    pub fn grade(&mut self, grade: i64) -> Result<()> {
        let state = self.session.as_mut().ok_or(Error::NoSession)?;
        match state.phase {
            SessionPhase::Question | SessionPhase::Answer => {}
            SessionPhase::Completed => return Err(Error::Completed),
            SessionPhase::AwaitingRating => {
                return Err(Error::WrongPhase {
                    expected: "Question or Answer",
                    actual: state.phase,
                })
            }
        }

        let id = state.queue[state.cursor].clone();
        let card = state
            .cards
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let next = schedule(card, grade, &self.config);
        let mut updated = card.clone();
        updated.last_reviewed_at = Some(self.clock.now().trunc_subsecs(0).fixed_offset());
        updated.interval_days = next.interval_days;
        updated.difficulty = next.difficulty;

        let previous = state.phase;
        state.phase = SessionPhase::AwaitingRating;
        if let Err(e) = self.store.save_card_metadata(&updated) {
            state.phase = previous;
            tracing::warn!("Failed to save schedule for {}: {}", id, e);
            return Err(e);
        }

        tracing::debug!(
            "Graded {} with {}: next review in {} days",
            id,
            grade,
            next.interval_days
        );
        state.grades.insert(id.clone(), Grade::clamped(grade));
        state.cards.insert(id, updated);
        state.advance();
        Ok(())
    }

    /// Like [`grade`](Self::grade) but rejects grades outside 0..=5
    pub fn grade_strict(&mut self, grade: i64) -> Result<()> {
        self.active()?;
        if Grade::new(grade).is_none() {
            return Err(Error::InvalidGrade(grade));
        }
        self.grade(grade)
    }

    /// Move past the current card without grading or saving it
    pub fn skip(&mut self) -> Result<()> {
        let state = self.session.as_mut().ok_or(Error::NoSession)?;
        match state.phase {
            SessionPhase::Completed => return Err(Error::Completed),
            SessionPhase::AwaitingRating => {
                return Err(Error::WrongPhase {
                    expected: "Question or Answer",
                    actual: state.phase,
                })
            }
            SessionPhase::Question | SessionPhase::Answer => {}
        }
        tracing::debug!("Skipped {}", state.queue[state.cursor]);
        state.advance();
        Ok(())
    }

    pub fn stats(&self) -> Result<SessionStats> {
        let state = self.active()?;
        let total = state.queue.len();
        let completed = state.cursor;
        let progress_pct = if total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / total as f64
        };
        Ok(SessionStats {
            total,
            completed,
            remaining: total - completed,
            average_grade: state.average_grade(),
            progress_pct,
            started_at: state.started_at,
            elapsed: self.clock.now() - state.started_at,
        })
    }

    /// Close the session and report on it. A second call returns `NoSession`.
    pub fn end(&mut self) -> Result<Summary> {
        let state = self.session.take().ok_or(Error::NoSession)?;
        let ended_at = self.clock.now();
        let cards_reviewed = state.grades.len();
        let new_cards_count = state
            .grades
            .keys()
            .filter(|id| state.new_cards.contains(*id))
            .count();

        let summary = Summary {
            session_id: state.session_id,
            deck_id: state.deck_id.clone(),
            started_at: state.started_at,
            ended_at,
            duration_secs: (ended_at - state.started_at).num_seconds(),
            cards_reviewed,
            average_grade: state.average_grade(),
            new_cards_count,
            reviewed_cards_count: cards_reviewed - new_cards_count,
        };

        tracing::info!(
            "Ended session on {}: {} reviewed, average grade {:.2}",
            summary.deck_id,
            summary.cards_reviewed,
            summary.average_grade
        );
        Ok(summary)
    }
}
