// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! A mutable, safe reference to the current store.
//!
//! `Conn` wraps an immutable `Db` snapshot plus the append-ordered transaction
//! log.  Writers are serialized by a transact guard; readers take the current
//! snapshot without blocking behind an in-flight transaction, and the commit
//! swap is atomic, so a reader sees either the pre- or post-commit store,
//! never a mix.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{
    Arc,
    Mutex,
    RwLock,
};

use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
};
use datalith_db::{
    timelines,
    Db,
    LogEntry,
    Op,
    TxReport,
};
use datalith_query::{
    execute,
    execute_for_aggregate,
    AggregateOutput,
    AggregateSpec,
    Query,
    QueryOutput,
    Variable,
};
use datalith_query_pull::{
    pull,
    PullPattern,
    PullResult,
};

use errors::Result;

struct ConnState {
    db: Arc<Db>,
    log: Vec<LogEntry>,
}

pub struct Conn {
    state: RwLock<ConnState>,
    /// Held for the whole of a transaction; at most one is in flight.
    transact_guard: Mutex<()>,
    /// Reconstructed `as_of` snapshots, keyed by basis.  The log is
    /// append-only, so a cached reconstruction never goes stale.
    as_of_cache: Mutex<HashMap<TxId, Arc<Db>>>,
}

impl Conn {
    /// Wrap a starting snapshot; its history becomes the log's provenance, so
    /// a fresh connection usually starts from `Db::empty()` (plus schema).
    pub fn connect(db: Db) -> Conn {
        Conn::from_parts(db, vec![])
    }

    pub(crate) fn from_parts(db: Db, log: Vec<LogEntry>) -> Conn {
        Conn {
            state: RwLock::new(ConnState {
                db: Arc::new(db),
                log: log,
            }),
            transact_guard: Mutex::new(()),
            as_of_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The current snapshot.  Cheap; safe to hold across queries.
    pub fn current(&self) -> Arc<Db> {
        self.state.read().unwrap().db.clone()
    }

    /// A copy of the transaction log.
    pub fn log(&self) -> Vec<LogEntry> {
        self.state.read().unwrap().log.clone()
    }

    pub(crate) fn db_and_log(&self) -> (Arc<Db>, Vec<LogEntry>) {
        let state = self.state.read().unwrap();
        (state.db.clone(), state.log.clone())
    }

    /// Apply a transaction to the current snapshot and swap in the successor.
    pub fn transact(&self, ops: Vec<Op>) -> Result<TxReport> {
        self.transact_with(ops, |_| Ok(()))
    }

    /// Like `transact`, invoking `persist` with the log entry before the
    /// in-memory swap.  If `persist` fails the swap never happens and readers
    /// keep seeing the pre-commit snapshot.
    pub(crate) fn transact_with<F>(&self, ops: Vec<Op>, persist: F) -> Result<TxReport>
    where F: FnOnce(&LogEntry) -> Result<()> {
        let _guard = self.transact_guard.lock().unwrap();

        let db = self.current();
        let (next, report) = db.transact(ops)?;

        let entry = LogEntry {
            tx: report.tx_id,
            tx_instant: report.tx_instant,
            datoms: report.datoms.clone(),
        };
        persist(&entry)?;

        {
            let mut state = self.state.write().unwrap();
            state.db = Arc::new(next);
            state.log.push(entry);
        }
        Ok(report)
    }

    /// The store as of transaction `tx`: exactly the datoms with tx id <= tx.
    /// Reconstructions are cached; the log is append-only so a cached
    /// snapshot for a given basis stays correct forever.
    pub fn as_of(&self, tx: TxId) -> Arc<Db> {
        let snapshot = {
            let state = self.state.read().unwrap();
            if tx >= state.db.basis_tx {
                return state.db.clone();
            }
            if let Some(cached) = self.as_of_cache.lock().unwrap().get(&tx) {
                return cached.clone();
            }
            Arc::new(timelines::as_of(&state.db, &state.log, tx))
        };
        self.as_of_cache.lock().unwrap().insert(tx, snapshot.clone());
        snapshot
    }

    /// Every datom recorded after transaction `tx`, in log order.
    pub fn since(&self, tx: TxId) -> Vec<Datom> {
        timelines::since(&self.state.read().unwrap().log, tx)
    }

    pub fn entity_history(&self, e: Entid) -> Vec<Datom> {
        timelines::entity_history(&self.current(), e)
    }

    pub fn attr_history(&self, e: Entid, a: &str) -> Vec<Datom> {
        timelines::attr_history(&self.current(), e, a)
    }

    pub fn tx_data(&self, tx: TxId) -> Option<LogEntry> {
        let state = self.state.read().unwrap();
        timelines::tx_data(&state.log, tx).cloned()
    }

    pub fn all_tx_ids(&self) -> Vec<TxId> {
        self.state.read().unwrap().log.iter().map(|entry| entry.tx).collect()
    }

    /// Run a query against the current snapshot.
    pub fn q(&self, query: &Query) -> QueryOutput {
        execute(query, &self.current())
    }

    /// Run an aggregate query against the current snapshot.
    pub fn q_aggregate(&self,
                       query: &Query,
                       group_by: &[Variable],
                       specs: &[AggregateSpec])
                       -> AggregateOutput {
        execute_for_aggregate(query, &self.current(), group_by, specs)
    }

    /// Pull a spec on an entity in the current snapshot.
    pub fn pull(&self, e: Entid, spec: &[PullPattern]) -> PullResult {
        pull(&self.current(), e, spec)
    }

    /// The current attribute-to-values view of an entity.
    pub fn entity(&self, e: Entid) -> BTreeMap<Ident, Vec<TypedValue>> {
        self.current().entity(e)
    }
}
