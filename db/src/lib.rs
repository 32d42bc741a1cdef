// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

extern crate chrono;
extern crate failure;
#[macro_use] extern crate failure_derive;
extern crate indexmap;
extern crate itertools;
#[macro_use] extern crate lazy_static;
#[macro_use] extern crate log;
extern crate serde;
#[macro_use] extern crate serde_derive;
extern crate serde_json;
extern crate tabwriter;

#[macro_use] extern crate datalith_core;

#[cfg(test)] extern crate tempfile;

pub mod debug;
pub mod entities;
pub mod errors;
mod indexes;
mod internal_types;
pub mod journal;
pub mod schema;
pub mod snapshot;
pub mod timelines;
mod tx;
pub mod tx_functions;
mod types;
pub mod watcher;

pub use entities::{
    EntityRef,
    Op,
    OpType,
};
pub use errors::{
    DbError,
    DbErrorKind,
    Result,
};
pub use indexes::{
    CurrentFacts,
    FactKey,
    Indexes,
};
pub use journal::{
    Journal,
    JOURNAL_FILE,
};
pub use schema::{
    Attribute,
    AttributeBuilder,
    Schema,
    Unique,
};
pub use snapshot::{
    Snapshot,
    SNAPSHOT_FILE,
};
pub use tx_functions::{
    TransactionFunction,
    TxFnRegistry,
    MAX_TX_FN_DEPTH,
};
pub use types::{
    Db,
    LogEntry,
    Partition,
    TxReport,
    USER0,
};
pub use watcher::{
    NullWatcher,
    TransactWatcher,
};
