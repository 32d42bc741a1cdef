// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

extern crate env_logger;
extern crate tempfile;

extern crate datalith;

use std::fs;

use tempfile::tempdir;

use datalith::{
    DatalithError,
    Datom,
    Op,
    Store,
    Stores,
    TypedValue,
};

fn seed_two_txes(store: &mut Store) -> datalith::Entid {
    let report = store.transact(vec![
        Op::add(-1, ":person/name", "Alice"),
        Op::add(-1, ":person/age", 30i64),
    ]).expect("tx 1");
    let e = report.tempids[&-1];
    store.transact(vec![
        Op::retract(e, ":person/age", 30i64),
        Op::add(e, ":person/age", 31i64),
    ]).expect("tx 2");
    e
}

/// Everything observable we care to compare across reopen cycles.
fn observe(store: &Store, e: datalith::Entid) -> (u64, i64, usize, Option<TypedValue>, Vec<Datom>) {
    let db = store.current();
    (db.basis_tx,
     db.entities_with_attr(":person/name").len() as i64,
     db.size(),
     db.get_one(e, ":person/age"),
     store.conn().attr_history(e, ":person/age"))
}

#[test]
fn test_reopen_replays_journal() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let before = {
        let mut store = Store::open(dir.path()).expect("opened");
        let e = seed_two_txes(&mut store);
        (e, observe(&store, e))
    };

    let store = Store::open(dir.path()).expect("reopened");
    assert_eq!(observe(&store, before.0), before.1);
    assert_eq!(store.all_tx_ids(), vec![1, 2]);

    // Entity allocation continues past replayed ids.
    let (_, fresh) = store.current().alloc_entity_id();
    assert!(fresh > before.0);
}

#[test]
fn test_snapshot_plus_tail_recovery() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let (e, before) = {
        let mut store = Store::open(dir.path()).expect("opened");
        let e = seed_two_txes(&mut store);
        store.snapshot().expect("snapshot");
        // A transaction after the snapshot lands only in the journal.
        store.transact(vec![
            Op::retract(e, ":person/name", "Alice"),
            Op::add(e, ":person/name", "Alice Liddell"),
        ]).expect("tx 3");
        (e, observe(&store, e))
    };

    let store = Store::open(dir.path()).expect("reopened");
    assert_eq!(observe(&store, e), before);
    assert_eq!(store.current().get_one(e, ":person/name"),
               Some(TypedValue::from("Alice Liddell")));
    assert_eq!(store.all_tx_ids(), vec![1, 2, 3]);
}

#[test]
fn test_compaction_preserves_observable_state() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let (e, before) = {
        let mut store = Store::open(dir.path()).expect("opened");
        let e = seed_two_txes(&mut store);
        store.compact().expect("compacted");
        (e, observe(&store, e))
    };

    // The journal is now empty; everything lives in the snapshot.
    let journal = fs::read_to_string(dir.path().join("journal.jsonl")).expect("journal");
    assert!(journal.is_empty());
    assert!(dir.path().join("journal.snapshot.json").exists());

    let mut store = Store::open(dir.path()).expect("reopened");
    assert_eq!(observe(&store, e), before);

    // And the store keeps working after compaction.
    store.transact(vec![
        Op::retract(e, ":person/age", 31i64),
        Op::add(e, ":person/age", 32i64),
    ]).expect("tx after compaction");
    assert_eq!(store.current().get_one(e, ":person/age"), Some(TypedValue::Long(32)));
}

#[test]
fn test_stale_snapshot_with_longer_journal() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let (e, before) = {
        let mut store = Store::open(dir.path()).expect("opened");
        let e = seed_two_txes(&mut store);
        // Snapshot at basis 2, then keep journaling: this is the crash window
        // between compaction's snapshot and its truncate.
        store.snapshot().expect("snapshot");
        store.transact(vec![
            Op::retract(e, ":person/age", 31i64),
            Op::add(e, ":person/age", 40i64),
        ]).expect("tx 3");
        (e, observe(&store, e))
    };

    let store = Store::open(dir.path()).expect("recovered");
    assert_eq!(observe(&store, e), before);
    assert_eq!(store.current().get_one(e, ":person/age"), Some(TypedValue::Long(40)));
}

#[test]
fn test_second_open_is_rejected() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let store = Store::open(dir.path()).expect("opened");
    assert!(Stores::is_open(dir.path()));

    match Store::open(dir.path()) {
        Err(DatalithError::StoreAlreadyOpen(_)) => {},
        Err(e) => panic!("unexpected error: {:?}", e),
        Ok(_) => panic!("second open should be rejected"),
    }

    store.close().expect("closed");
    assert!(!Stores::is_open(dir.path()));
    Store::open(dir.path()).expect("reopen after close");
}

#[test]
fn test_failed_transaction_is_not_journaled() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let mut store = Store::open(dir.path()).expect("opened");
    store.transact(vec![Op::add(-1, ":person/name", "Alice")]).expect("tx 1");
    store.transact(vec![Op::retract(99, ":person/name", "Ghost")]).expect_err("bad retract");

    drop(store);
    let store = Store::open(dir.path()).expect("reopened");
    assert_eq!(store.all_tx_ids(), vec![1]);
    assert_eq!(store.current().size(), 1);
}
