// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Snapshots: a single JSON document capturing a store at a basis.
//!
//! The document carries the basis tx, the next entid, the current-fact list,
//! and the full transaction log.  Loading rebuilds the store by replaying the
//! embedded log (history is ground truth; the current-fact list is a
//! consistency cross-check).  The snapshot is written to a temp path and
//! renamed into place so a crash never leaves a half-written document.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json;

use datalith_core::{
    Datom,
    Entid,
    TxId,
};

use errors::{
    DbErrorKind,
    Result,
};
use types::{
    Db,
    LogEntry,
};

/// The snapshot's file name within a persisted store directory.
pub const SNAPSHOT_FILE: &'static str = "journal.snapshot.json";

#[derive(Clone,Debug,Deserialize,Eq,PartialEq,Serialize)]
pub struct Snapshot {
    #[serde(rename = "basisT")]
    pub basis_tx: TxId,
    #[serde(rename = "nextEntityId")]
    pub next_entity_id: Entid,
    #[serde(rename = "currentFacts")]
    pub current_facts: Vec<Datom>,
    #[serde(rename = "txLog")]
    pub tx_log: Vec<LogEntry>,
}

impl Snapshot {
    /// Capture `db` and its log.
    pub fn of(db: &Db, log: &[LogEntry]) -> Snapshot {
        Snapshot {
            basis_tx: db.basis_tx,
            next_entity_id: db.next_entity_id(),
            current_facts: db.current().iter().cloned().collect(),
            tx_log: log.to_vec(),
        }
    }

    /// Write to `path` atomically: temp file, sync, rename.
    pub fn write<P>(&self, path: P) -> Result<()> where P: AsRef<Path> {
        let path = path.as_ref();
        let temp = path.with_extension("tmp");
        let document = serde_json::to_string(self)
            .map_err(|e| DbErrorKind::IoError(e.to_string()))?;

        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(document.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, path)?;
        info!("snapshot: wrote basis {} ({} entries) to {:?}",
              self.basis_tx, self.tx_log.len(), path);
        Ok(())
    }

    /// Read the snapshot at `path`, if one exists.
    pub fn read<P>(path: P) -> Result<Option<Snapshot>> where P: AsRef<Path> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let document = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&document)
            .map_err(|e| DbErrorKind::CorruptSnapshot(e.to_string()))?;
        Ok(Some(snapshot))
    }

    /// Rebuild a store from this snapshot.  `seed` contributes the schema and
    /// registered transaction functions, which are not persisted.
    pub fn into_db(self, seed: &Db) -> (Db, Vec<LogEntry>) {
        let db = seed.from_log(self.tx_log.iter());
        if db.size() != self.current_facts.len() {
            warn!("snapshot: current view rebuilt from log has {} facts, document lists {}",
                  db.size(), self.current_facts.len());
        }
        (db, self.tx_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use datalith_core::TypedValue;
    use entities::Op;

    fn store_with_history() -> (Db, Vec<LogEntry>) {
        let mut log = Vec::new();
        let db = Db::empty();
        let (db, report) = db.transact(vec![
            Op::add(-1, ":person/name", "Alice"),
            Op::add(-1, ":person/age", 30i64),
        ]).expect("tx 1");
        log.push(LogEntry { tx: 1, tx_instant: report.tx_instant, datoms: report.datoms });
        let e = report.tempids[&-1];
        let (db, report) = db.transact(vec![
            Op::retract(e, ":person/age", 30i64),
            Op::add(e, ":person/age", 31i64),
        ]).expect("tx 2");
        log.push(LogEntry { tx: 2, tx_instant: report.tx_instant, datoms: report.datoms });
        (db, log)
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(SNAPSHOT_FILE);
        let (db, log) = store_with_history();

        Snapshot::of(&db, &log).write(&path).expect("written");
        let snapshot = Snapshot::read(&path).expect("read").expect("present");
        assert_eq!(snapshot, Snapshot::of(&db, &log));

        let (rebuilt, rebuilt_log) = snapshot.into_db(&Db::empty());
        assert_eq!(rebuilt_log, log);
        assert_eq!(rebuilt.basis_tx, db.basis_tx);
        assert_eq!(rebuilt.size(), db.size());
        assert_eq!(rebuilt.next_entity_id(), db.next_entity_id());
        let e = db.entities_with_attr(":person/name")[0];
        assert_eq!(rebuilt.get_one(e, ":person/age"), Some(TypedValue::Long(31)));
        // History survives the round trip.
        assert_eq!(rebuilt.history().datoms_for_entity_attr(e, ":person/age").len(), 3);
    }

    #[test]
    fn test_missing_snapshot_reads_none() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(Snapshot::read(dir.path().join(SNAPSHOT_FILE)).expect("read"), None);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(SNAPSHOT_FILE);
        fs::write(&path, b"{\"basisT\": 1").expect("wrote garbage");

        let err = Snapshot::read(&path).expect_err("corrupt");
        match err.kind() {
            DbErrorKind::CorruptSnapshot(_) => {},
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }
}
