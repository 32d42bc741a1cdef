// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The append-only transaction journal.
//!
//! One JSON-encoded log entry per line.  An append is synced to disk before
//! success is acknowledged; this is the only blocking operation on the commit
//! path.  Replay takes the journal as ground truth and feeds entries straight
//! into the index structures, bypassing the transaction processor.

use std::fs::{
    File,
    OpenOptions,
};
use std::io::{
    BufRead,
    BufReader,
    Seek,
    SeekFrom,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

use serde_json;

use datalith_core::TxId;

use errors::{
    DbErrorKind,
    Result,
};
use types::LogEntry;

/// The journal's file name within a persisted store directory.
pub const JOURNAL_FILE: &'static str = "journal.jsonl";

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (creating if absent) the journal at `path` for appending.
    pub fn open<P>(path: P) -> Result<Journal> where P: AsRef<Path> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Journal {
            path: path,
            file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and sync before acknowledging.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| DbErrorKind::IoError(e.to_string()))?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.sync_data()?;
        trace!("journal: appended tx {} to {:?}", entry.tx, self.path);
        Ok(())
    }

    /// Discard every entry.  Compaction calls this after the snapshot is
    /// durably in place; a crash in between leaves the longer journal to be
    /// replayed over the stale snapshot.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_data()?;
        info!("journal: truncated {:?}", self.path);
        Ok(())
    }

    /// Read every entry with tx > `after` from the journal at `path`, in
    /// file order.  A missing journal is an empty one.
    pub fn replay<P>(path: P, after: TxId) -> Result<Vec<LogEntry>> where P: AsRef<Path> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(vec![]);
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = vec![];
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line)
                .map_err(|e| DbErrorKind::CorruptJournal(index + 1, e.to_string()))?;
            if entry.tx > after {
                entries.push(entry);
            }
        }
        debug!("journal: replayed {} entries (tx > {}) from {:?}", entries.len(), after, path);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use datalith_core::Datom;

    fn entry(tx: TxId) -> LogEntry {
        LogEntry {
            tx: tx,
            tx_instant: tx * 1000,
            datoms: vec![Datom::new(5, ":person/age", 30i64 + tx as i64, tx, true)],
        }
    }

    #[test]
    fn test_append_then_replay() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(JOURNAL_FILE);

        {
            let mut journal = Journal::open(&path).expect("opened");
            journal.append(&entry(1)).expect("appended 1");
            journal.append(&entry(2)).expect("appended 2");
        }

        let replayed = Journal::replay(&path, 0).expect("replayed");
        assert_eq!(replayed, vec![entry(1), entry(2)]);

        // Replay honors the tx floor.
        let tail = Journal::replay(&path, 1).expect("replayed tail");
        assert_eq!(tail, vec![entry(2)]);
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempdir().expect("tempdir");
        let replayed = Journal::replay(dir.path().join(JOURNAL_FILE), 0).expect("replayed");
        assert!(replayed.is_empty());
    }

    #[test]
    fn test_corrupt_line_is_reported_with_position() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(JOURNAL_FILE);

        {
            let mut journal = Journal::open(&path).expect("opened");
            journal.append(&entry(1)).expect("appended");
            let mut raw = OpenOptions::new().append(true).open(&path).expect("raw");
            raw.write_all(b"{\"txId\": oops\n").expect("wrote garbage");
        }

        let err = Journal::replay(&path, 0).expect_err("corrupt");
        match err.kind() {
            DbErrorKind::CorruptJournal(2, _) => {},
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_truncate_empties_journal() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(JOURNAL_FILE);

        let mut journal = Journal::open(&path).expect("opened");
        journal.append(&entry(1)).expect("appended");
        journal.truncate().expect("truncated");
        journal.append(&entry(2)).expect("appended after truncate");

        let replayed = Journal::replay(&path, 0).expect("replayed");
        assert_eq!(replayed, vec![entry(2)]);
    }
}
