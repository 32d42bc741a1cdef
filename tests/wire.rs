// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Round trips of every value variant through the persisted wire formats.

extern crate env_logger;
extern crate tempfile;

extern crate datalith;

use std::fs;

use tempfile::tempdir;

use datalith::{
    Op,
    Store,
    TypedValue,
};

/// One value of every variant in the union.
fn menagerie() -> Vec<(&'static str, TypedValue)> {
    vec![
        (":sample/int", TypedValue::Long(-9_007_199_254_740_993)),
        (":sample/float", TypedValue::from(6.02214076e23)),
        (":sample/string", TypedValue::from("weird \"escapes\" \\ and \u{00e9}\u{4e16}")),
        (":sample/bool", TypedValue::Boolean(true)),
        (":sample/instant", TypedValue::Instant(1_530_000_000_123)),
        (":sample/ref", TypedValue::Ref(1)),
        (":sample/keyword", TypedValue::Keyword(":some/keyword".to_string())),
        (":sample/bytes", TypedValue::Bytes((0u8..255).collect())),
    ]
}

#[test]
fn test_every_variant_survives_journal_replay() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let e = {
        let mut store = Store::open(dir.path()).expect("opened");
        let ops = menagerie().into_iter()
            .map(|(attr, value)| Op::add(-1, attr, value))
            .collect();
        let report = store.transact(ops).expect("transacted");
        report.tempids[&-1]
    };

    let store = Store::open(dir.path()).expect("reopened");
    let db = store.current();
    for (attr, value) in menagerie() {
        assert_eq!(db.get_one(e, attr), Some(value), "attribute {} round trip", attr);
    }
}

#[test]
fn test_every_variant_survives_snapshot() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    let e = {
        let mut store = Store::open(dir.path()).expect("opened");
        let ops = menagerie().into_iter()
            .map(|(attr, value)| Op::add(-1, attr, value))
            .collect();
        let report = store.transact(ops).expect("transacted");
        store.compact().expect("compacted");
        report.tempids[&-1]
    };

    // All state now lives in the snapshot document.
    assert!(fs::read_to_string(dir.path().join("journal.jsonl")).expect("journal").is_empty());

    let store = Store::open(dir.path()).expect("reopened");
    let db = store.current();
    for (attr, value) in menagerie() {
        assert_eq!(db.get_one(e, attr), Some(value), "attribute {} round trip", attr);
    }
}

#[test]
fn test_journal_lines_carry_wire_tags() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    {
        let mut store = Store::open(dir.path()).expect("opened");
        let ops = menagerie().into_iter()
            .map(|(attr, value)| Op::add(-1, attr, value))
            .collect();
        store.transact(ops).expect("transacted");
    }

    let journal = fs::read_to_string(dir.path().join("journal.jsonl")).expect("journal");
    let lines: Vec<&str> = journal.lines().collect();
    assert_eq!(lines.len(), 1);

    let line = lines[0];
    assert!(line.contains("\"txId\":1"));
    assert!(line.contains("\"instant\":"));
    for tag in &["int", "float", "string", "bool", "instant", "ref", "keyword", "bytes"] {
        assert!(line.contains(&format!("\"t\":\"{}\"", tag)), "missing tag {}", tag);
    }
}

#[test]
fn test_retraction_is_journaled_with_added_false() {
    env_logger::try_init().ok();
    let dir = tempdir().expect("tempdir");

    {
        let mut store = Store::open(dir.path()).expect("opened");
        let report = store.transact(vec![Op::add(-1, ":sample/int", 7i64)]).expect("tx 1");
        let e = report.tempids[&-1];
        store.transact(vec![Op::retract(e, ":sample/int", 7i64)]).expect("tx 2");
    }

    let journal = fs::read_to_string(dir.path().join("journal.jsonl")).expect("journal");
    let lines: Vec<&str> = journal.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("true]]}"));
    assert!(lines[1].ends_with("false]]}"));

    // And replay leaves the retracted fact invisible but in history.
    let store = Store::open(dir.path()).expect("reopened");
    let db = store.current();
    assert_eq!(db.size(), 0);
    let history = store.conn().since(0);
    assert_eq!(history.len(), 2);
}
