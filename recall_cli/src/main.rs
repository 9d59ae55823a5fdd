use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use recall_core::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Spaced-repetition flashcard trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override decks directory
    #[arg(long, global = true)]
    decks_dir: Option<PathBuf>,

    /// Override session log file
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the due cards of a deck
    Review {
        /// Deck path relative to the decks directory ("." for all)
        deck: String,

        /// Grade every card with this value without prompting
        #[arg(long, allow_hyphen_values = true)]
        auto_grade: Option<i64>,

        /// Stop after this many cards
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List due cards without reviewing them
    Due {
        deck: String,
    },

    /// Show the deck tree with card and due counts
    Decks,

    /// Show recent session summaries
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    recall_core::logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let decks_dir = cli
        .decks_dir
        .unwrap_or_else(|| config.data.decks_dir.clone());
    let log_path = cli
        .log_path
        .unwrap_or_else(|| config.data.log_path.clone());
    tracing::debug!("Using decks {:?}, session log {:?}", decks_dir, log_path);

    match cli.command {
        Commands::Review {
            deck,
            auto_grade,
            limit,
        } => cmd_review(&decks_dir, &log_path, &deck, auto_grade, limit, &config),
        Commands::Due { deck } => cmd_due(&decks_dir, &deck),
        Commands::Decks => cmd_decks(&decks_dir),
        Commands::History { limit } => cmd_history(&log_path, limit),
    }
}

enum UserAction {
    Reveal,
    Grade(i64),
    Skip,
    Quit,
}

fn cmd_review(
    decks_dir: &Path,
    log_path: &Path,
    deck: &str,
    auto_grade: Option<i64>,
    limit: Option<usize>,
    config: &Config,
) -> Result<()> {
    let store = FsCardStore::new(decks_dir);
    let mut engine = SessionEngine::new(store, SystemClock, config.scheduler.clone());
    let due = engine.start(&DeckId::new(deck))?.queue().len();

    println!("Reviewing {} ({} due)", deck, due);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut handled = 0;

    'cards: while engine.state().is_some_and(|s| !s.is_completed()) {
        if limit.is_some_and(|l| handled >= l) {
            break;
        }

        let stats = engine.stats()?;
        let card = engine.current_card()?.clone();
        display_question(&card, &stats);

        loop {
            let action = match auto_grade {
                Some(g) => UserAction::Grade(g),
                None => prompt_action(&mut input, engine.state().map(SessionState::phase))?,
            };

            match action {
                UserAction::Reveal => {
                    engine.show_answer()?;
                    display_answer(&card);
                }
                UserAction::Grade(g) => {
                    let graded = if config.review.strict_grades {
                        engine.grade_strict(g)
                    } else {
                        engine.grade(g)
                    };
                    match graded {
                        Ok(()) => break,
                        // Nothing changed, so the same card can be graded again
                        Err(e) if auto_grade.is_none() => eprintln!("  ! {}", e),
                        Err(e) => return Err(e),
                    }
                }
                UserAction::Skip => {
                    engine.skip()?;
                    break;
                }
                UserAction::Quit => break 'cards,
            }
        }
        handled += 1;
    }

    let summary = engine.end()?;
    display_summary(&summary);

    let mut log = JsonlSummaryLog::new(log_path);
    log.append(&summary)?;
    Ok(())
}

fn cmd_due(decks_dir: &Path, deck: &str) -> Result<()> {
    let mut store = FsCardStore::new(decks_dir);
    let now = Utc::now();
    let ids = store.list_cards_in_deck(&DeckId::new(deck), true)?;
    let total = ids.len();

    let mut due = Vec::new();
    for id in ids {
        match store.load_card(&id) {
            Ok(card) if is_due(&card, now) => due.push(card),
            Ok(_) => {}
            Err(e) => eprintln!("  ! skipping {}: {}", id, e),
        }
    }
    due.sort_by(|a, b| {
        next_due(a, now)
            .cmp(&next_due(b, now))
            .then_with(|| a.id.cmp(&b.id))
    });

    for card in &due {
        let when = match card.last_reviewed_at {
            None => "new".to_string(),
            Some(_) => next_due(card, now)
                .with_timezone(&Local)
                .format("%Y-%m-%d")
                .to_string(),
        };
        println!("  {:<10}  {}", when, card.id);
    }
    println!("{} of {} cards due", due.len(), total);
    Ok(())
}

fn cmd_decks(decks_dir: &Path) -> Result<()> {
    let mut store = FsCardStore::new(decks_dir);
    let tree = store.deck_tree()?;
    let now = Utc::now();

    for (idx, node) in tree.iter() {
        let cards = tree.cards_recursive(idx);
        let due = cards
            .iter()
            .filter(|id| store.load_card(id).is_ok_and(|card| is_due(&card, now)))
            .count();
        println!(
            "{}{:<24} {:>4} cards {:>4} due",
            "  ".repeat(tree.depth(idx)),
            node.id,
            cards.len(),
            due
        );
    }
    Ok(())
}

fn cmd_history(log_path: &Path, limit: usize) -> Result<()> {
    let summaries = read_summaries(log_path)?;
    if summaries.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    let skip = summaries.len().saturating_sub(limit);
    for summary in summaries.iter().skip(skip) {
        println!(
            "{}  {:<20} {:>3} cards  avg {:.2}  ({} new, {} review)  {}s",
            summary.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            summary.deck_id,
            summary.cards_reviewed,
            summary.average_grade,
            summary.new_cards_count,
            summary.reviewed_cards_count,
            summary.duration().num_seconds()
        );
    }
    Ok(())
}

fn display_question(card: &Card, stats: &SessionStats) {
    println!();
    println!(
        "── Card {}/{} ─ {} ──",
        stats.completed + 1,
        stats.total,
        card.title.as_deref().unwrap_or(card.id.as_str())
    );
    println!();
    println!("{}", card.question);
    println!();
}

fn display_answer(card: &Card) {
    println!("─────────────────────────────────────────");
    println!("{}", card.answer);
    println!();
}

fn display_summary(summary: &Summary) {
    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│  SESSION COMPLETE");
    println!("╰─────────────────────────────────────────╯");
    println!("  Deck: {}", summary.deck_id);
    println!("  Cards reviewed: {}", summary.cards_reviewed);
    println!("  Average grade: {:.2}", summary.average_grade);
    println!(
        "  New: {}  Review: {}",
        summary.new_cards_count, summary.reviewed_cards_count
    );
    println!("  Duration: {}s", summary.duration().num_seconds());
}

/// Read one action; end of input quits the session
fn prompt_action(input: &mut impl BufRead, phase: Option<SessionPhase>) -> Result<UserAction> {
    let revealed = phase == Some(SessionPhase::Answer);
    loop {
        if revealed {
            print!("Grade 0-5 (0-2 forgot, 3 hard, 4 good, 5 easy), 's' skip, 'q' quit > ");
        } else {
            print!("Enter to show answer, 0-5 to grade, 's' skip, 'q' quit > ");
        }
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(UserAction::Quit);
        }

        let action = match line.trim().to_lowercase().as_str() {
            "" if !revealed => UserAction::Reveal,
            "" => continue,
            "s" => UserAction::Skip,
            "q" => UserAction::Quit,
            other => match other.parse::<i64>() {
                Ok(g) => UserAction::Grade(g),
                Err(_) => {
                    println!("  ? unrecognized input {:?}", other);
                    continue;
                }
            },
        };
        return Ok(action);
    }
}
