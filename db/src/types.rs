// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The immutable database snapshot and its supporting records.

use std::collections::BTreeMap;
use std::sync::Arc;

use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
    GENESIS_TX,
};

use entities::Op;
use errors::Result;
use indexes::{
    CurrentFacts,
    Indexes,
};
use schema::Schema;
use tx;
use tx_functions::{
    TransactionFunction,
    TxFnRegistry,
};
use watcher::TransactWatcher;

/// The first entid the store allocates.
pub const USER0: Entid = 1;

/// A monotonically increasing sequence of entids.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Partition {
    /// The first entid in the partition.
    pub start: Entid,
    /// The next entid to be allocated in the partition.
    index: Entid,
}

impl Partition {
    pub fn new(start: Entid, next: Entid) -> Partition {
        assert!(start <= next, "A partition represents a monotonic increasing sequence of entids.");
        Partition { start: start, index: next }
    }

    pub fn index(&self) -> Entid {
        self.index
    }

    pub fn allocate_entid(&mut self) -> Entid {
        let next = self.index;
        self.index += 1;
        next
    }

    /// Raise the next-to-allocate watermark; used when replay observes entids
    /// allocated by earlier incarnations of the store.
    pub fn raise_index(&mut self, next: Entid) {
        assert!(next >= self.start);
        if next > self.index {
            self.index = next;
        }
    }
}

/// One committed transaction as recorded in the log: its id, wall-clock
/// instant (milliseconds since the epoch), and every datom it produced.
#[derive(Clone,Debug,Deserialize,Eq,PartialEq,Serialize)]
pub struct LogEntry {
    #[serde(rename = "txId")]
    pub tx: TxId,
    #[serde(rename = "instant")]
    pub tx_instant: u64,
    pub datoms: Vec<Datom>,
}

/// A transaction report summarizes an applied transaction.
#[derive(Clone,Debug,Eq,PartialEq)]
pub struct TxReport {
    /// The transaction ID of the transaction.
    pub tx_id: TxId,

    /// The timestamp when the transaction was committed, in milliseconds
    /// after the Unix epoch according to the transactor's local clock.
    pub tx_instant: u64,

    /// Every datom the transaction produced, assertions and retractions both.
    pub datoms: Vec<Datom>,

    /// A map from temporary ID to allocated entid.
    pub tempids: BTreeMap<Entid, Entid>,
}

/// An immutable database snapshot.
///
/// A `Db` is never mutated in place: committing a transaction against one
/// yields a fresh `Db`, and the old value remains valid and observable.  The
/// current indexes hold visible facts only; the history indexes hold every
/// datom ever recorded.
#[derive(Clone,Debug)]
pub struct Db {
    /// The most recent committed transaction this snapshot reflects.
    pub basis_tx: TxId,

    /// The entid allocator.
    pub(crate) partition: Partition,

    pub(crate) current: Indexes,
    pub(crate) history: Indexes,
    pub(crate) current_facts: CurrentFacts,

    pub(crate) schema: Option<Schema>,
    pub(crate) tx_fns: Arc<TxFnRegistry>,
}

impl Db {
    /// A genesis store: no facts, no schema, the built-in transaction
    /// functions registered.
    pub fn empty() -> Db {
        Db {
            basis_tx: GENESIS_TX,
            partition: Partition::new(USER0, USER0),
            current: Indexes::new(),
            history: Indexes::new(),
            current_facts: CurrentFacts::default(),
            schema: None,
            tx_fns: TxFnRegistry::default_registry(),
        }
    }

    /// Attach a schema.  `strict` rejects assertions against attributes the
    /// schema does not know about.
    pub fn with_schema(mut self, mut schema: Schema, strict: bool) -> Db {
        schema.strict = strict;
        self.schema = Some(schema);
        self
    }

    /// Register a transaction function under `name`, shadowing any previous
    /// registration.
    pub fn with_tx_fn<S>(mut self, name: S, f: Arc<TransactionFunction>) -> Db
    where S: Into<String> {
        let mut fns = (*self.tx_fns).clone();
        fns.register(name, f);
        self.tx_fns = Arc::new(fns);
        self
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn tx_fns(&self) -> &TxFnRegistry {
        &self.tx_fns
    }

    /// Apply `ops` atomically, yielding the successor snapshot and a report.
    /// `self` is unchanged whether or not the transaction commits.
    pub fn transact(&self, ops: Vec<Op>) -> Result<(Db, TxReport)> {
        tx::transact(self, ops, None)
    }

    /// Like `transact`, with a caller-supplied wall-clock instant.
    pub fn transact_at(&self, ops: Vec<Op>, tx_instant: u64) -> Result<(Db, TxReport)> {
        tx::transact(self, ops, Some(tx_instant))
    }

    /// Like `transact`, reporting each produced datom to `watcher`, which may
    /// veto the commit from its `done` hook.
    pub fn transact_with_watcher(&self,
                                 ops: Vec<Op>,
                                 watcher: &mut TransactWatcher)
                                 -> Result<(Db, TxReport)> {
        tx::transact_watched(self, ops, None, watcher)
    }

    /// Allocate a fresh entid, yielding it alongside the successor snapshot.
    pub fn alloc_entity_id(&self) -> (Db, Entid) {
        let mut next = self.clone();
        let e = next.partition.allocate_entid();
        (next, e)
    }

    pub(crate) fn next_entity_id(&self) -> Entid {
        self.partition.index()
    }

    /// The number of currently visible datoms.
    pub fn size(&self) -> usize {
        self.current_facts.len()
    }

    /// The current indexes: visible facts only.
    pub fn current(&self) -> &Indexes {
        &self.current
    }

    /// The history indexes: every datom ever recorded.
    pub fn history(&self) -> &Indexes {
        &self.history
    }

    /// True if `(e, a, v)` is currently asserted.
    pub fn is_asserted(&self, e: Entid, a: &str, v: &TypedValue) -> bool {
        self.current_facts.contains_key(&(e, a.to_string(), v.clone()))
    }

    /// The newest visible value of `(e, a)`: the current datom with maximum tx.
    pub fn get_one(&self, e: Entid, a: &str) -> Option<TypedValue> {
        self.current
            .datoms_for_entity_attr(e, a)
            .into_iter()
            .max_by_key(|d| d.tx)
            .map(|d| d.v)
    }

    /// Every visible value of `(e, a)`.  Ordering across multiple values of a
    /// many-cardinality attribute is unspecified; callers wanting the newest
    /// value use `get_one`.
    pub fn get(&self, e: Entid, a: &str) -> Vec<TypedValue> {
        self.current
            .datoms_for_entity_attr(e, a)
            .into_iter()
            .map(|d| d.v)
            .collect()
    }

    /// Every visible attribute of `e` with its values, attribute-ordered.
    pub fn entity(&self, e: Entid) -> BTreeMap<Ident, Vec<TypedValue>> {
        let mut result: BTreeMap<Ident, Vec<TypedValue>> = BTreeMap::new();
        for datom in self.current.datoms_for_entity(e) {
            result.entry(datom.a).or_insert_with(Vec::new).push(datom.v);
        }
        result
    }

    pub fn datoms_with_attr(&self, a: &str) -> Vec<Datom> {
        self.current.datoms_for_attr(a)
    }

    /// The distinct entities carrying attribute `a`.
    pub fn entities_with_attr(&self, a: &str) -> Vec<Entid> {
        let mut entities: Vec<Entid> = self.current
            .datoms_for_attr(a)
            .into_iter()
            .map(|d| d.e)
            .collect();
        entities.sort();
        entities.dedup();
        entities
    }

    pub fn entities_with_attr_value(&self, a: &str, v: &TypedValue) -> Vec<Entid> {
        let mut entities: Vec<Entid> = self.current
            .datoms_for_attr_value(a, v)
            .into_iter()
            .map(|d| d.e)
            .collect();
        entities.sort();
        entities.dedup();
        entities
    }

    /// The unique entity carrying `a = v`, if any.  This is the lookup-ref
    /// resolution path; for unique attributes at most one entity matches.
    pub fn entity_with_attr_value(&self, a: &str, v: &TypedValue) -> Option<Entid> {
        self.current
            .datoms_for_attr_value(a, v)
            .into_iter()
            .map(|d| d.e)
            .next()
    }

    /// The distinct entities holding a reference to `e`.
    pub fn referencing_entities(&self, e: Entid) -> Vec<Entid> {
        let mut entities: Vec<Entid> = self.current
            .datoms_referencing(e)
            .into_iter()
            .map(|d| d.e)
            .collect();
        entities.sort();
        entities.dedup();
        entities
    }

    pub fn referencing_via_attr(&self, e: Entid, a: &str) -> Vec<Entid> {
        let mut entities: Vec<Entid> = self.current
            .datoms_referencing_via(e, a)
            .into_iter()
            .map(|d| d.e)
            .collect();
        entities.sort();
        entities.dedup();
        entities
    }

    /// Feed one replayed log entry straight into the indexes, bypassing the
    /// transaction processor: history is ground truth.  Within an entry
    /// retractions apply before assertions, matching the transaction
    /// processor's in-tx ordering rule.
    pub fn apply_log_entry(&mut self, entry: &LogEntry) {
        for datom in entry.datoms.iter().filter(|d| !d.added) {
            self.history.insert(datom);
            if let Some(prior) = self.current_facts.remove(&datom.fact()) {
                self.current.remove(&prior);
            }
            self.observe_entid(datom);
        }
        for datom in entry.datoms.iter().filter(|d| d.added) {
            self.history.insert(datom);
            if let Some(prior) = self.current_facts.remove(&datom.fact()) {
                self.current.remove(&prior);
            }
            self.current.insert(datom);
            self.current_facts.insert(datom.fact(), datom.clone());
            self.observe_entid(datom);
        }
        if entry.tx > self.basis_tx {
            self.basis_tx = entry.tx;
        }
    }

    fn observe_entid(&mut self, datom: &Datom) {
        if datom.e >= self.partition.start {
            self.partition.raise_index(datom.e + 1);
        }
        if let Some(target) = datom.v.as_ref_entid() {
            if target >= self.partition.start {
                self.partition.raise_index(target + 1);
            }
        }
    }

    /// Rebuild a snapshot from a complete log, preserving this snapshot's
    /// schema and registered transaction functions.
    pub fn from_log<'a, I>(&self, entries: I) -> Db where I: IntoIterator<Item = &'a LogEntry> {
        let mut db = Db::empty();
        db.schema = self.schema.clone();
        db.tx_fns = self.tx_fns.clone();
        for entry in entries {
            db.apply_log_entry(entry);
        }
        db
    }
}
