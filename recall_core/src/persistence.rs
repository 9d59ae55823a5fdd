//! Atomic commit of scheduling metadata into card files.
//!
//! The new file contents are produced in memory first; only then is a temp
//! file written, fsynced and renamed over the card. A failure at any step
//! leaves the original file untouched.

use crate::card_file::{parse_card, rewrite_schedule};
use crate::{Card, Error, Result};
use fs2::FileExt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Rewrite the scheduling fields of the card file at `path`.
///
/// `current` must be the file's present contents. The rewritten text is
/// parsed back before anything touches the disk; if it would not load as the
/// same schedule the file is left alone and `Corrupt` is returned.
///
/// Returns the card as it now reads from disk, with the new contents.
pub fn commit_metadata(path: &Path, current: &str, card: &Card) -> Result<(Card, String)> {
    let updated = rewrite_schedule(current, card)?;
    let saved = parse_card(&card.id, &updated)?;
    if !same_schedule(&saved, card) {
        return Err(Error::corrupt(
            card.id.as_str(),
            "rewritten header does not read back the new schedule",
        ));
    }

    write_atomic(path, updated.as_bytes())?;
    tracing::debug!("Committed schedule for {} to {:?}", card.id, path);
    Ok((saved, updated))
}

// Timestamps are stored in whole seconds
fn same_schedule(saved: &Card, card: &Card) -> bool {
    saved.interval_days == card.interval_days
        && saved.difficulty == card.difficulty
        && saved.last_reviewed_at.map(|at| at.timestamp())
            == card.last_reviewed_at.map(|at| at.timestamp())
}

/// Replace `path` with `contents` via temp file + rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "card path missing parent",
        ))
    })?;

    // Temp file in the same directory so the rename stays on one filesystem
    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        writer.write_all(contents)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
