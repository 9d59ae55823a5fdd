//! Card storage.
//!
//! [`CardStore`] is the only way the session engine reaches durable card
//! metadata. [`FsCardStore`] serves a directory of markdown card files;
//! [`MemoryCardStore`] keeps everything in memory.

use crate::card_file::parse_card;
use crate::deck::DeckTree;
use crate::persistence::commit_metadata;
use crate::{Card, CardId, DeckId, Error, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Durable card metadata and deck enumeration
pub trait CardStore {
    /// Current persisted view of a card
    fn load_card(&mut self, id: &CardId) -> Result<Card>;

    /// Persist `last_reviewed_at`, `interval_days` and `difficulty` of `card`.
    ///
    /// Either all three are durable on `Ok`, or the old values remain.
    fn save_card_metadata(&mut self, card: &Card) -> Result<()>;

    /// Card ids under a deck, in no particular order
    fn list_cards_in_deck(&self, deck: &DeckId, recursive: bool) -> Result<Vec<CardId>>;

    /// Seed the store's cache directly. Test hook.
    fn cache_put(&mut self, card: Card);
}

/// Card file extension
pub const CARD_EXTENSION: &str = "md";

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

pub(crate) fn is_card_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CARD_EXTENSION)
}

/// `/`-joined path of `path` relative to `root`
pub(crate) fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".into()
    } else {
        parts.join("/")
    }
}

/// Join a relative id onto `root`, refusing anything that could escape it
fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    let safe = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    safe.then(|| root.join(rel))
}

struct CachedCard {
    card: Card,
    /// File contents the card was parsed from, absent for `cache_put` entries
    raw: Option<String>,
}

/// Directory-backed card store
pub struct FsCardStore {
    root: PathBuf,
    cache: HashMap<CardId, CachedCard>,
}

impl FsCardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Arena tree of every deck below the root
    pub fn deck_tree(&self) -> Result<DeckTree> {
        DeckTree::build(&self.root)
    }

    fn card_path(&self, id: &CardId) -> Result<PathBuf> {
        resolve(&self.root, id.as_str()).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn read_card_file(&self, id: &CardId, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(id.to_string()),
            _ => Error::Io(e),
        })?;
        String::from_utf8(bytes).map_err(|e| {
            Error::corrupt(
                id.as_str(),
                format!("not valid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
            )
        })
    }
}

impl CardStore for FsCardStore {
    fn load_card(&mut self, id: &CardId) -> Result<Card> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached.card.clone());
        }

        let path = self.card_path(id)?;
        let raw = self.read_card_file(id, &path)?;
        let card = parse_card(id, &raw)?;
        tracing::debug!("Loaded card {} from {:?}", id, path);

        self.cache.insert(
            id.clone(),
            CachedCard {
                card: card.clone(),
                raw: Some(raw),
            },
        );
        Ok(card)
    }

    fn save_card_metadata(&mut self, card: &Card) -> Result<()> {
        let path = self.card_path(&card.id)?;
        let current = self.read_card_file(&card.id, &path)?;

        if let Some(CachedCard { raw: Some(raw), .. }) = self.cache.get(&card.id) {
            if *raw != current {
                tracing::warn!("Card {} changed on disk since it was loaded", card.id);
                return Err(Error::Conflict(card.id.to_string()));
            }
        }

        let mut on_disk = parse_card(&card.id, &current)?;
        on_disk.last_reviewed_at = card.last_reviewed_at;
        on_disk.interval_days = card.interval_days;
        on_disk.difficulty = card.difficulty;

        let (saved, updated) = commit_metadata(&path, &current, &on_disk)?;

        self.cache.insert(
            card.id.clone(),
            CachedCard {
                card: saved,
                raw: Some(updated),
            },
        );
        Ok(())
    }

    fn list_cards_in_deck(&self, deck: &DeckId, recursive: bool) -> Result<Vec<CardId>> {
        let dir = if deck.is_root() {
            Some(self.root.clone())
        } else {
            resolve(&self.root, deck.as_str())
        };
        let dir = match dir {
            Some(dir) if dir.is_dir() => dir,
            _ => return Err(Error::DeckNotFound(deck.to_string())),
        };

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut ids = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()))
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_card_file(entry.path()) {
                ids.push(CardId::new(relative_id(&self.root, entry.path())));
            }
        }

        tracing::debug!("Deck {} lists {} cards", deck, ids.len());
        Ok(ids)
    }

    fn cache_put(&mut self, card: Card) {
        self.cache
            .insert(card.id.clone(), CachedCard { card, raw: None });
    }
}

/// In-memory card store for tests and scripted drivers.
///
/// Deck membership follows the card id's directory part.
#[derive(Default)]
pub struct MemoryCardStore {
    cards: HashMap<CardId, Card>,
    fail_saves: usize,
    saves: usize,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut store = Self::new();
        for card in cards {
            store.cards.insert(card.id.clone(), card);
        }
        store
    }

    /// Make the next `count` saves fail with an IO error
    pub fn fail_next_saves(&mut self, count: usize) {
        self.fail_saves = count;
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn get(&self, id: &CardId) -> Option<&Card> {
        self.cards.get(id)
    }
}

fn deck_of(id: &CardId) -> &str {
    id.as_str().rsplit_once('/').map_or("", |(deck, _)| deck)
}

impl CardStore for MemoryCardStore {
    fn load_card(&mut self, id: &CardId) -> Result<Card> {
        self.cards
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn save_card_metadata(&mut self, card: &Card) -> Result<()> {
        if self.fail_saves > 0 {
            self.fail_saves -= 1;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected save failure",
            )));
        }
        let stored = self
            .cards
            .get_mut(&card.id)
            .ok_or_else(|| Error::NotFound(card.id.to_string()))?;
        stored.last_reviewed_at = card.last_reviewed_at;
        stored.interval_days = card.interval_days;
        stored.difficulty = card.difficulty;
        self.saves += 1;
        Ok(())
    }

    fn list_cards_in_deck(&self, deck: &DeckId, recursive: bool) -> Result<Vec<CardId>> {
        let wanted = if deck.is_root() { "" } else { deck.as_str() };
        let ids: Vec<_> = self
            .cards
            .keys()
            .filter(|id| {
                let card_deck = deck_of(id);
                card_deck == wanted
                    || (recursive
                        && (wanted.is_empty() || card_deck.starts_with(&format!("{}/", wanted))))
            })
            .cloned()
            .collect();

        if ids.is_empty() && !deck.is_root() {
            return Err(Error::DeckNotFound(deck.to_string()));
        }
        Ok(ids)
    }

    fn cache_put(&mut self, card: Card) {
        self.cards.insert(card.id.clone(), card);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn sorted(mut ids: Vec<CardId>) -> Vec<String> {
        ids.sort();
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_list_cards_flat_and_recursive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "lang/a.md", "A");
        write(root, "lang/notes.txt", "not a card");
        write(root, "lang/es/b.md", "B");
        write(root, "lang/.hidden/c.md", "C");
        write(root, "other/d.md", "D");

        let store = FsCardStore::new(root);
        let flat = store.list_cards_in_deck(&"lang".into(), false).unwrap();
        assert_eq!(sorted(flat), vec!["lang/a.md"]);

        let deep = store.list_cards_in_deck(&"lang".into(), true).unwrap();
        assert_eq!(sorted(deep), vec!["lang/a.md", "lang/es/b.md"]);

        let all = store.list_cards_in_deck(&DeckId::root(), true).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_missing_deck() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsCardStore::new(temp_dir.path());
        let err = store.list_cards_in_deck(&"nope".into(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = store.list_cards_in_deck(&"../escape".into(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_load_missing_card_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FsCardStore::new(temp_dir.path());
        let err = store.load_card(&"ghost.md".into()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_read_your_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "d/card.md", "---\ntitle: T\nauthor: me\n---\nQ\n---\nA\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let id = CardId::new("d/card.md");
        let mut card = store.load_card(&id).unwrap();
        card.last_reviewed_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().fixed_offset());
        card.interval_days = 3;
        card.difficulty = 2;
        store.save_card_metadata(&card).unwrap();

        let again = store.load_card(&id).unwrap();
        assert_eq!(again.interval_days, 3);
        assert_eq!(again.last_reviewed_at, card.last_reviewed_at);

        // A fresh store reads the same values from disk
        let mut fresh = FsCardStore::new(temp_dir.path());
        let from_disk = fresh.load_card(&id).unwrap();
        assert_eq!(from_disk.interval_days, 3);
        assert_eq!(from_disk.difficulty, 2);
        assert_eq!(from_disk.title.as_deref(), Some("T"));

        let text = fs::read_to_string(temp_dir.path().join("d/card.md")).unwrap();
        assert!(text.contains("author: me"));
        assert!(text.ends_with("---\nQ\n---\nA\n"));
    }

    #[test]
    fn test_cached_and_fresh_loads_agree_after_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "card.md", "Q\n---\nA\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let id = CardId::new("card.md");
        let mut card = store.load_card(&id).unwrap();
        let reviewed = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::nanoseconds(987_654_321);
        card.last_reviewed_at = Some(reviewed.fixed_offset());
        card.interval_days = 1;
        store.save_card_metadata(&card).unwrap();

        let cached = store.load_card(&id).unwrap();
        let from_disk = FsCardStore::new(temp_dir.path()).load_card(&id).unwrap();
        assert_eq!(cached.last_reviewed_at, from_disk.last_reviewed_at);
        assert_eq!(
            cached.last_reviewed_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().fixed_offset())
        );
    }

    #[test]
    fn test_save_with_quoted_keys_stays_readable() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "card.md", "---\n\"difficulty\": 2\ntitle: T\n---\nQ\n---\nA\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let id = CardId::new("card.md");
        let mut card = store.load_card(&id).unwrap();
        card.last_reviewed_at = Some(Utc::now().fixed_offset());
        card.interval_days = 2;
        card.difficulty = 1;
        store.save_card_metadata(&card).unwrap();

        let text = fs::read_to_string(temp_dir.path().join("card.md")).unwrap();
        assert_eq!(text.matches("difficulty").count(), 1);

        let from_disk = FsCardStore::new(temp_dir.path()).load_card(&id).unwrap();
        assert_eq!(from_disk.difficulty, 1);
        assert_eq!(from_disk.interval_days, 2);
        assert_eq!(from_disk.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_non_utf8_card_is_corrupt() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("latin1.md"), b"Caf\xe9?\n---\nCoffee\n").unwrap();

        let mut store = FsCardStore::new(temp_dir.path());
        let err = store.load_card(&"latin1.md".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_save_only_writes_schedule_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "card.md", "---\ntitle: Original\n---\nQ\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let mut card = store.load_card(&"card.md".into()).unwrap();
        card.title = Some("Changed".into());
        card.question = "Different".into();
        card.interval_days = 1;
        card.last_reviewed_at = Some(Utc::now().fixed_offset());
        store.save_card_metadata(&card).unwrap();

        let text = fs::read_to_string(temp_dir.path().join("card.md")).unwrap();
        assert!(text.contains("title: Original"));
        assert!(text.contains("\nQ\n"));
        assert!(!text.contains("Changed") && !text.contains("Different"));
    }

    #[test]
    fn test_external_edit_is_conflict() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "card.md", "---\ntitle: T\n---\nQ\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let mut card = store.load_card(&"card.md".into()).unwrap();

        write(temp_dir.path(), "card.md", "---\ntitle: Edited elsewhere\n---\nQ\n");

        card.interval_days = 2;
        card.last_reviewed_at = Some(Utc::now().fixed_offset());
        let err = store.save_card_metadata(&card).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let text = fs::read_to_string(temp_dir.path().join("card.md")).unwrap();
        assert_eq!(text, "---\ntitle: Edited elsewhere\n---\nQ\n");
    }

    #[test]
    fn test_failed_save_keeps_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "card.md", "Q\n");

        let mut store = FsCardStore::new(temp_dir.path());
        let id = CardId::new("card.md");
        let mut card = store.load_card(&id).unwrap();

        fs::remove_file(temp_dir.path().join("card.md")).unwrap();
        card.interval_days = 5;
        card.last_reviewed_at = Some(Utc::now().fixed_offset());
        assert!(store.save_card_metadata(&card).is_err());

        assert_eq!(store.load_card(&id).unwrap().interval_days, 0);
    }

    #[test]
    fn test_cache_put_is_served_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FsCardStore::new(temp_dir.path());
        let mut card = Card::new("virtual.md");
        card.difficulty = 4;
        store.cache_put(card);

        assert_eq!(store.load_card(&"virtual.md".into()).unwrap().difficulty, 4);
    }

    #[test]
    fn test_memory_store_decks() {
        let store = MemoryCardStore::with_cards([
            Card::new("top.md"),
            Card::new("lang/a.md"),
            Card::new("lang/es/b.md"),
        ]);

        assert_eq!(sorted(store.list_cards_in_deck(&"lang".into(), false).unwrap()), vec!["lang/a.md"]);
        assert_eq!(store.list_cards_in_deck(&"lang".into(), true).unwrap().len(), 2);
        assert_eq!(store.list_cards_in_deck(&DeckId::root(), false).unwrap().len(), 1);
        assert_eq!(store.list_cards_in_deck(&DeckId::root(), true).unwrap().len(), 3);
        assert!(store.list_cards_in_deck(&"math".into(), true).is_err());
    }

    #[test]
    fn test_memory_store_injected_failure() {
        let mut store = MemoryCardStore::with_cards([Card::new("a.md")]);
        store.fail_next_saves(1);

        let mut card = store.load_card(&"a.md".into()).unwrap();
        card.interval_days = 1;
        assert_eq!(store.save_card_metadata(&card).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(store.get(&"a.md".into()).unwrap().interval_days, 0);

        store.save_card_metadata(&card).unwrap();
        assert_eq!(store.save_count(), 1);
    }
}
