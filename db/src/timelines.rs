// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Time travel over the transaction log.
//!
//! Every committed transaction appends a `LogEntry`; these functions derive
//! historical views from that log.  `as_of` replays the prefix of the log into
//! a fresh snapshot, `since` exposes the suffix, and the history functions
//! read the history indexes directly.

use datalith_core::{
    Datom,
    Entid,
    TxId,
};

use types::{
    Db,
    LogEntry,
};

/// A snapshot whose current view reflects exactly the transactions with
/// tx <= `tx_id`.  `as_of(0)` is the genesis store (schema and transaction
/// functions preserved).
pub fn as_of(db: &Db, log: &[LogEntry], tx_id: TxId) -> Db {
    db.from_log(log.iter().take_while(|entry| entry.tx <= tx_id))
}

/// Every datom recorded by transactions with tx > `tx_id`, in log order.
pub fn since(log: &[LogEntry], tx_id: TxId) -> Vec<Datom> {
    log.iter()
        .skip_while(|entry| entry.tx <= tx_id)
        .flat_map(|entry| entry.datoms.iter().cloned())
        .collect()
}

/// Every history datom about entity `e`, sorted by tx.
pub fn entity_history(db: &Db, e: Entid) -> Vec<Datom> {
    let mut datoms = db.history().datoms_for_entity(e);
    datoms.sort_by_key(|d| d.tx);
    datoms
}

/// `entity_history` narrowed to a single attribute.
pub fn attr_history(db: &Db, e: Entid, a: &str) -> Vec<Datom> {
    let mut datoms = db.history().datoms_for_entity_attr(e, a);
    datoms.sort_by_key(|d| d.tx);
    datoms
}

/// The log entry recorded for `tx_id`, if any.
pub fn tx_data<'a>(log: &'a [LogEntry], tx_id: TxId) -> Option<&'a LogEntry> {
    log.iter().find(|entry| entry.tx == tx_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    use datalith_core::TypedValue;
    use entities::Op;

    fn transact_logged(db: Db, log: &mut Vec<LogEntry>, ops: Vec<Op>) -> Db {
        let (next, report) = db.transact(ops).expect("transacted");
        log.push(LogEntry {
            tx: report.tx_id,
            tx_instant: report.tx_instant,
            datoms: report.datoms,
        });
        next
    }

    fn aged_store() -> (Db, Vec<LogEntry>) {
        let mut log = Vec::new();
        let db = Db::empty();
        let db = transact_logged(db, &mut log, vec![
            Op::add(5, ":person/name", "Alice"),
            Op::add(5, ":person/age", 30i64),
        ]);
        let db = transact_logged(db, &mut log, vec![
            Op::retract(5, ":person/age", 30i64),
            Op::add(5, ":person/age", 31i64),
        ]);
        (db, log)
    }

    #[test]
    fn test_as_of_replays_prefix() {
        let (db, log) = aged_store();

        assert_eq!(db.get_one(5, ":person/age"), Some(TypedValue::Long(31)));

        let at_one = as_of(&db, &log, 1);
        assert_eq!(at_one.basis_tx, 1);
        assert_eq!(at_one.get_one(5, ":person/age"), Some(TypedValue::Long(30)));

        let genesis = as_of(&db, &log, 0);
        assert_eq!(genesis.basis_tx, 0);
        assert_eq!(genesis.size(), 0);
    }

    #[test]
    fn test_as_of_beyond_basis_is_current() {
        let (db, log) = aged_store();
        let beyond = as_of(&db, &log, 99);
        assert_eq!(beyond.basis_tx, db.basis_tx);
        assert_eq!(beyond.get_one(5, ":person/age"), db.get_one(5, ":person/age"));
    }

    #[test]
    fn test_as_of_preserves_schema() {
        use datalith_core::ValueType;
        use schema::{
            AttributeBuilder,
            Schema,
        };

        let mut schema = Schema::new();
        schema.define(":person/age",
                      AttributeBuilder::new().value_type(ValueType::Long).build().unwrap());
        let db = Db::empty().with_schema(schema, true);

        let mut log = Vec::new();
        let db = transact_logged(db, &mut log, vec![Op::add(5, ":person/age", 30i64)]);

        let genesis = as_of(&db, &log, 0);
        assert!(genesis.schema().is_some());
        assert!(genesis.schema().map_or(false, |s| s.strict));
        // The rewound snapshot still validates.
        assert!(genesis.transact(vec![Op::add(5, ":person/shoe-size", 43i64)]).is_err());
    }

    #[test]
    fn test_since_exposes_suffix() {
        let (_, log) = aged_store();
        assert_eq!(since(&log, 0).len(), 4);

        let tail = since(&log, 1);
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|d| d.tx == 2));

        assert!(since(&log, 2).is_empty());
    }

    #[test]
    fn test_entity_and_attr_history() {
        let (db, _) = aged_store();

        let history = entity_history(&db, 5);
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].tx <= w[1].tx));

        let ages = attr_history(&db, 5, ":person/age");
        assert_eq!(ages.len(), 3);
        assert_eq!((ages[0].tx, ages[0].added), (1, true));
        assert!(ages[1..].iter().all(|d| d.tx == 2));
        // Tx 2 holds the retraction of 30 and the assertion of 31.
        assert!(ages[1..].iter().any(|d| !d.added && d.v == TypedValue::Long(30)));
        assert!(ages[1..].iter().any(|d| d.added && d.v == TypedValue::Long(31)));

        assert!(entity_history(&db, 99).is_empty());
    }

    #[test]
    fn test_tx_data() {
        let (_, log) = aged_store();
        assert_eq!(tx_data(&log, 1).map(|entry| entry.datoms.len()), Some(2));
        assert!(tx_data(&log, 3).is_none());
    }
}
