// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Datalith: an immutable, time-traveling, fact-based store.
//!
//! Facts are five-field datoms held in four sorted indexes with a dual
//! current/history view.  Transactions apply atomically against an immutable
//! snapshot; Datalog-style queries, hierarchical pulls, and point-in-time
//! reads all run against snapshots without locking.  A `Store` adds an
//! append-only journal with snapshot-plus-tail recovery.

extern crate failure;
#[macro_use] extern crate failure_derive;
#[macro_use] extern crate lazy_static;
#[macro_use] extern crate log;

extern crate datalith_core;
extern crate datalith_db;
extern crate datalith_query;
extern crate datalith_query_pull;

mod conn;
mod errors;
mod stores;

pub use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
    ValueType,
    DB_DOC,
    DB_IDENT,
    DB_TX_INSTANT,
    GENESIS_TX,
    NULL_ENTID,
};

pub use datalith_db::{
    Attribute,
    AttributeBuilder,
    Db,
    DbError,
    DbErrorKind,
    EntityRef,
    LogEntry,
    NullWatcher,
    Op,
    OpType,
    Schema,
    TransactionFunction,
    TransactWatcher,
    TxFnRegistry,
    TxReport,
    Unique,
    MAX_TX_FN_DEPTH,
};

pub use datalith_query::{
    aggregate,
    execute,
    execute_for_aggregate,
    execute_raw,
    pattern,
    var,
    AggregateFunction,
    AggregateOutput,
    AggregateSpec,
    AttributePlace,
    Binding,
    Bindings,
    Clause,
    CompareOp,
    EntityPlace,
    Expr,
    Pattern,
    PredicateExpr,
    PredTerm,
    Query,
    QueryOutput,
    Relation,
    RuleArg,
    RuleDef,
    ValuePlace,
    Variable,
};

pub use datalith_query_pull::{
    pull,
    pull_many,
    pull_one,
    PullPattern,
    PullResult,
    PullValue,
    MAX_PULL_DEPTH,
};

pub use conn::Conn;
pub use errors::{
    DatalithError,
    Result,
};
pub use stores::{
    Store,
    Stores,
};
