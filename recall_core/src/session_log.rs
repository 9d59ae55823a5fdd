//! Append-only log of ended review sessions.
//!
//! Summaries are appended to a JSONL (JSON Lines) file under an exclusive
//! file lock; readers take a shared lock.

use crate::{Result, Summary};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Destination for finished session summaries
pub trait SummarySink {
    fn append(&mut self, summary: &Summary) -> Result<()>;
}

/// JSONL-based summary log with file locking
pub struct JsonlSummaryLog {
    path: PathBuf,
}

impl JsonlSummaryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl SummarySink for JsonlSummaryLog {
    fn append(&mut self, summary: &Summary) -> Result<()> {
        self.ensure_parent_dir()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let torn_tail = ends_without_newline(&mut file)?;

        let mut writer = std::io::BufWriter::new(&file);
        if torn_tail {
            writer.write_all(b"\n")?;
        }
        let line = serde_json::to_string(summary)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended session {} to {:?}", summary.session_id, self.path);
        Ok(())
    }
}

/// True when the last write stopped short of its line terminator
fn ends_without_newline(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Read every summary from a log file, oldest first
pub fn read_summaries(path: &Path) -> Result<Vec<Summary>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut summaries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Summary>(&line) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                tracing::warn!("Failed to parse summary at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} summaries from {:?}", summaries.len(), path);
    Ok(summaries)
}
