//! Deck hierarchy as a flat arena.
//!
//! Decks are directories. Parent/child links are indices into one `Vec`, so
//! the tree has no back-pointers to keep alive.

use crate::store::{is_card_file, is_hidden, relative_id};
use crate::{CardId, DeckId, Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug)]
pub struct DeckNode {
    pub id: DeckId,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Cards directly inside this deck
    pub cards: Vec<CardId>,
}

/// Deck arena; index 0 is the root deck and indices follow pre-order
#[derive(Clone, Debug)]
pub struct DeckTree {
    nodes: Vec<DeckNode>,
}

impl DeckTree {
    /// Walk `root` and build the tree of decks below it
    pub fn build(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::DeckNotFound(root.display().to_string()));
        }

        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".into());
        let mut nodes = vec![DeckNode {
            id: DeckId::root(),
            name: root_name,
            parent: None,
            children: Vec::new(),
            cards: Vec::new(),
        }];
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        index.insert(root.to_path_buf(), 0);

        for entry in WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()))
        {
            let entry = entry.map_err(std::io::Error::from)?;
            let Some(parent) = entry.path().parent().and_then(|p| index.get(p)).copied() else {
                continue;
            };

            if entry.file_type().is_dir() {
                let idx = nodes.len();
                nodes.push(DeckNode {
                    id: DeckId::new(relative_id(root, entry.path())),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    parent: Some(parent),
                    children: Vec::new(),
                    cards: Vec::new(),
                });
                nodes[parent].children.push(idx);
                index.insert(entry.path().to_path_buf(), idx);
            } else if entry.file_type().is_file() && is_card_file(entry.path()) {
                nodes[parent]
                    .cards
                    .push(CardId::new(relative_id(root, entry.path())));
            }
        }

        tracing::debug!("Built deck tree with {} decks", nodes.len());
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&DeckNode> {
        self.nodes.get(idx)
    }

    pub fn find(&self, id: &DeckId) -> Option<usize> {
        if id.is_root() {
            return Some(0);
        }
        let wanted = id.as_str().trim_end_matches('/');
        self.nodes.iter().position(|n| n.id.as_str() == wanted)
    }

    /// Number of ancestors of `idx`
    pub fn depth(&self, idx: usize) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(idx).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent].parent;
        }
        depth
    }

    /// Cards in `idx` and every deck below it
    pub fn cards_recursive(&self, idx: usize) -> Vec<CardId> {
        let mut cards = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            cards.extend(node.cards.iter().cloned());
            stack.extend(node.children.iter().rev());
        }
        cards
    }

    /// Decks in pre-order with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DeckNode)> {
        self.nodes.iter().enumerate()
    }
}
