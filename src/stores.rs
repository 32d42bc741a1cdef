// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Journal-backed stores.
//!
//! A `Store` is a `Conn` whose commits additionally append to an on-disk
//! journal, with snapshot and compaction support.  On open, state is rebuilt
//! from the snapshot (if any) plus the journal entries past its basis.
//!
//! A process is only permitted to have one open handle to each store
//! directory.  This manager exists to enforce that constraint: don't open
//! journals directly.

use std::collections::BTreeSet;
use std::fs;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::{
    Arc,
    RwLock,
};

use datalith_core::TxId;
use datalith_db::{
    Db,
    DbError,
    Journal,
    LogEntry,
    Op,
    Snapshot,
    TxReport,
    JOURNAL_FILE,
    SNAPSHOT_FILE,
};

use conn::Conn;
use errors::{
    DatalithError,
    Result,
};

lazy_static! {
    static ref MANAGER: RwLock<Stores> = RwLock::new(Stores::new());
}

/// The set of store directories open in this process.
pub struct Stores {
    open: BTreeSet<PathBuf>,
}

impl Stores {
    fn new() -> Stores {
        Stores {
            open: BTreeSet::new(),
        }
    }

    pub fn singleton() -> &'static RwLock<Stores> {
        &*MANAGER
    }

    /// True if a handle to the store at `path` is currently open.
    pub fn is_open<T>(path: T) -> bool where T: AsRef<Path> {
        match path.as_ref().canonicalize() {
            Ok(canonical) => Stores::singleton().read().unwrap().open.contains(&canonical),
            Err(_) => false,
        }
    }

    fn claim(&mut self, path: PathBuf) -> Result<()> {
        if !self.open.insert(path.clone()) {
            return Err(DatalithError::StoreAlreadyOpen(path.to_string_lossy().into_owned()));
        }
        Ok(())
    }

    fn release(&mut self, path: &Path) {
        self.open.remove(path);
    }
}

/// A persistent connection: an in-memory `Conn` whose commits are journaled
/// under a store directory.
pub struct Store {
    dir: PathBuf,
    conn: Conn,
    journal: Journal,
}

impl Store {
    /// Open the store at `path`, creating the directory if needed, and
    /// rebuild state from the snapshot plus the journal tail.
    pub fn open<T>(path: T) -> Result<Store> where T: AsRef<Path> {
        Store::open_with_seed(path, Db::empty())
    }

    /// Like `open`, with a seed snapshot contributing the schema and
    /// registered transaction functions (neither is persisted).
    pub fn open_with_seed<T>(path: T, seed: Db) -> Result<Store> where T: AsRef<Path> {
        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(DbError::from)?;
        let canonical = dir.canonicalize().map_err(DbError::from)?;

        Stores::singleton().write().unwrap().claim(canonical.clone())?;
        match Store::load(&dir, seed) {
            Ok((conn, journal)) => {
                info!("store: opened {:?} at basis {}", dir, conn.current().basis_tx);
                Ok(Store {
                    dir: canonical,
                    conn: conn,
                    journal: journal,
                })
            },
            Err(e) => {
                Stores::singleton().write().unwrap().release(&canonical);
                Err(e)
            },
        }
    }

    fn load(dir: &Path, seed: Db) -> Result<(Conn, Journal)> {
        let (mut db, mut log) = match Snapshot::read(dir.join(SNAPSHOT_FILE))? {
            Some(snapshot) => snapshot.into_db(&seed),
            None => (seed, vec![]),
        };

        let tail = Journal::replay(dir.join(JOURNAL_FILE), db.basis_tx)?;
        for entry in &tail {
            db.apply_log_entry(entry);
        }
        log.extend(tail);

        let journal = Journal::open(dir.join(JOURNAL_FILE))?;
        Ok((Conn::from_parts(db, log), journal))
    }

    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    pub fn current(&self) -> Arc<Db> {
        self.conn.current()
    }

    /// Commit a transaction: the journal line is appended and synced before
    /// the in-memory swap, so a failed append leaves the store at the
    /// pre-commit snapshot.
    pub fn transact(&mut self, ops: Vec<Op>) -> Result<TxReport> {
        let journal = &mut self.journal;
        self.conn.transact_with(ops, |entry| {
            journal.append(entry).map_err(DatalithError::from)
        })
    }

    /// Write a snapshot of the current state alongside the journal.
    pub fn snapshot(&self) -> Result<()> {
        let (db, log) = self.conn.db_and_log();
        Snapshot::of(&db, &log).write(self.dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }

    /// Compact: write a fresh snapshot, then truncate the journal.  A crash
    /// between the two steps leaves the longer journal to be replayed over
    /// the stale snapshot on the next open.
    pub fn compact(&mut self) -> Result<()> {
        self.snapshot()?;
        self.journal.truncate()?;
        Ok(())
    }

    /// The tx ids recorded in this store's log.
    pub fn all_tx_ids(&self) -> Vec<TxId> {
        self.conn.all_tx_ids()
    }

    /// A copy of the log; mostly useful to tests and debug dumps.
    pub fn log(&self) -> Vec<LogEntry> {
        self.conn.log()
    }

    /// Close the handle, releasing the directory for other opens.
    pub fn close(self) -> Result<()> {
        // Drop does the release.
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        Stores::singleton().write().unwrap().release(&self.dir);
    }
}
