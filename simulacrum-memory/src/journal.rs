// Copyright 2026 Simulacrum Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only journal - the primary durability mechanism
//!
//! Every appended record is one JSONL line carrying a CRC32 checksum.
//! Full state is reconstructable by replaying the journal from empty;
//! there is no separate transaction log.
//!
//! Cross-process coordination follows a journal-watch pattern: writers
//! append, and a [`JournalWatcher`] holding a byte offset replays only the
//! entries it has not seen, deduplicating by content-addressed ID. No
//! whole-file locks on the hot path.

use std::io::{BufRead, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use simulacrum_core::{Learning, SimulacrumError, SimulacrumResult, Turn};

use crate::episodes::Episode;

/// A record appended to the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    Turn(Turn),
    Learning(Learning),
    Episode(Episode),
}

impl JournalRecord {
    /// Content-addressed ID used for replay deduplication
    pub fn record_id(&self) -> String {
        match self {
            JournalRecord::Turn(turn) => turn.id().0,
            JournalRecord::Learning(learning) => learning.id().0,
            JournalRecord::Episode(episode) => episode.id.clone(),
        }
    }
}

/// One journal line: checksum plus payload
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    crc: u32,
    record: JournalRecord,
}

fn checksum(record: &JournalRecord) -> SimulacrumResult<u32> {
    let payload = serde_json::to_vec(record)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    Ok(hasher.finalize())
}

/// Append-only journal file
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one record durably.
    ///
    /// A failed write risks silent data loss, so it surfaces as Capacity,
    /// the one fatal error class in this subsystem.
    pub fn append(&self, record: &JournalRecord) -> SimulacrumResult<()> {
        let entry = JournalEntry {
            crc: checksum(record)?,
            record: record.clone(),
        };
        let line = serde_json::to_string(&entry)?;

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()?;
            Ok(())
        };
        write().map_err(|e| {
            SimulacrumError::Capacity(format!("cannot append to journal: {e}"))
        })
    }

    /// Replay every valid record from the start.
    ///
    /// Corrupt lines (bad JSON, checksum mismatch) are logged and skipped;
    /// the rest of the journal remains usable.
    pub fn replay(&self) -> SimulacrumResult<Vec<JournalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_entry(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(line = line_no + 1, error = %e, "Skipping corrupt journal entry");
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, path = %self.path.display(), "Journal replay skipped corrupt entries");
        }
        Ok(records)
    }

    /// Current journal size in bytes (a watcher's catch-up position)
    pub fn size(&self) -> SimulacrumResult<u64> {
        if !self.path.exists() {
            return Ok(0);
        }
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

fn parse_entry(line: &str) -> SimulacrumResult<JournalRecord> {
    let entry: JournalEntry = serde_json::from_str(line)
        .map_err(|e| SimulacrumError::Consistency(format!("unparseable entry: {e}")))?;
    let expected = checksum(&entry.record)?;
    if entry.crc != expected {
        return Err(SimulacrumError::Consistency(format!(
            "checksum mismatch: stored {:#x}, computed {:#x}",
            entry.crc, expected
        )));
    }
    Ok(entry.record)
}

/// Lightweight reader that replays only entries appended since its last
/// poll. Safe to run in a different process from the writer.
#[derive(Debug)]
pub struct JournalWatcher {
    path: PathBuf,
    position: u64,
}

impl JournalWatcher {
    /// Watch from the beginning of the journal
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
        }
    }

    /// Watch from the current end (only future appends)
    pub fn from_end(journal: &Journal) -> SimulacrumResult<Self> {
        Ok(Self {
            path: journal.path().to_path_buf(),
            position: journal.size()?,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read entries appended since the last poll.
    ///
    /// Only complete lines advance the position, so a partially-written
    /// trailing line is picked up whole on the next poll.
    pub fn poll(&mut self) -> SimulacrumResult<Vec<JournalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut file = std::fs::File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len <= self.position {
            return Ok(Vec::new());
        }
        file.seek(SeekFrom::Start(self.position))?;

        let mut reader = std::io::BufReader::new(file);
        let mut records = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Incomplete trailing line: leave it for the next poll
                break;
            }
            self.position += read as u64;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_entry(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Watcher skipping corrupt journal entry"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulacrum_core::LearningCategory;

    fn journal(dir: &Path) -> Journal {
        Journal::new(dir.join("journal.jsonl"))
    }

    #[test]
    fn test_append_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal(dir.path());

        j.append(&JournalRecord::Turn(Turn::user("hello"))).unwrap();
        j.append(&JournalRecord::Learning(Learning::new(
            "uses tokio",
            LearningCategory::Fact,
        )))
        .unwrap();
        j.append(&JournalRecord::Episode(Episode::new(
            "tried a thing",
            crate::episodes::EpisodeOutcome::Failed,
        )))
        .unwrap();

        let records = j.replay().unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(&records[0], JournalRecord::Turn(t) if t.content == "hello"));
        assert!(matches!(&records[1], JournalRecord::Learning(l) if l.fact == "uses tokio"));
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal(dir.path());
        j.append(&JournalRecord::Turn(Turn::user("good one"))).unwrap();

        // Inject garbage and a checksum mismatch between valid entries
        let mut content = std::fs::read_to_string(j.path()).unwrap();
        content.push_str("this is not json\n");
        content.push_str(&format!(
            "{}\n",
            serde_json::json!({
                "crc": 12345,
                "record": {"kind": "turn", "content": "tampered", "turn_type": "user",
                           "timestamp": "2026-01-01T00:00:00Z", "parent_ids": [], "source": null,
                           "token_count": 1, "model": null, "confidence": null, "tags": []}
            })
        ));
        std::fs::write(j.path(), content).unwrap();
        j.append(&JournalRecord::Turn(Turn::user("also good"))).unwrap();

        let records = j.replay().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[1], JournalRecord::Turn(t) if t.content == "also good"));
    }

    #[test]
    fn test_watcher_sees_only_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal(dir.path());
        j.append(&JournalRecord::Turn(Turn::user("before"))).unwrap();

        let mut watcher = JournalWatcher::from_end(&j).unwrap();
        assert!(watcher.poll().unwrap().is_empty());

        j.append(&JournalRecord::Turn(Turn::user("after"))).unwrap();
        j.append(&JournalRecord::Turn(Turn::user("after two"))).unwrap();

        let records = watcher.poll().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], JournalRecord::Turn(t) if t.content == "after"));

        // Nothing new on the next poll
        assert!(watcher.poll().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_from_start_replays_everything() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal(dir.path());
        j.append(&JournalRecord::Turn(Turn::user("one"))).unwrap();
        j.append(&JournalRecord::Turn(Turn::user("two"))).unwrap();

        let mut watcher = JournalWatcher::new(j.path());
        assert_eq!(watcher.poll().unwrap().len(), 2);
    }

    #[test]
    fn test_record_ids_are_content_addressed() {
        let a = JournalRecord::Turn(Turn::user("same"));
        let b = JournalRecord::Turn(Turn::user("same"));
        assert_eq!(a.record_id(), b.record_id());
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal(dir.path());
        assert!(!j.exists());
        assert!(j.replay().unwrap().is_empty());
        assert_eq!(j.size().unwrap(), 0);
    }
}
