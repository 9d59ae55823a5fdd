#![forbid(unsafe_code)]

//! Review-scheduling core for the Recall flashcard trainer.
//!
//! This crate provides:
//! - Domain types (cards, grades, session phases, summaries)
//! - Scheduling and due-date logic
//! - Card file parsing and atomic metadata updates
//! - The review session state machine
//! - Session summary log

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod scheduler;
pub mod due;
pub mod metadata;
pub mod card_file;
pub mod persistence;
pub mod store;
pub mod deck;
pub mod session;
pub mod session_log;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use config::Config;
pub use clock::{Clock, FixedClock, SystemClock};
pub use scheduler::{schedule, SchedulerConfig, Scheduled};
pub use due::{is_due, next_due};
pub use store::{CardStore, FsCardStore, MemoryCardStore};
pub use deck::{DeckNode, DeckTree};
pub use session::{SessionEngine, SessionState};
pub use session_log::{read_summaries, JsonlSummaryLog, SummarySink};
