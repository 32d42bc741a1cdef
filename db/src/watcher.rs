// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! A transaction watcher is notified of each datom a transaction produces,
//! then given a chance to veto the commit in `done`.  Watchers observe the
//! staged transaction before the snapshot swap, so a watcher error aborts the
//! transaction with the store unchanged.

use datalith_core::{
    Entid,
    TypedValue,
    TxId,
};

use entities::OpType;
use errors::Result;

pub trait TransactWatcher {
    /// Only called for asserts and retracts, after validation; the datom is
    /// definitely part of the commit unless `done` vetoes it.
    fn datom(&mut self, op: OpType, e: Entid, a: &str, v: &TypedValue);

    /// Only called when the transaction is otherwise committable.  Returning
    /// an error aborts the transaction.
    fn done(&mut self, t: TxId) -> Result<()>;
}

pub struct NullWatcher();

impl TransactWatcher for NullWatcher {
    fn datom(&mut self, _op: OpType, _e: Entid, _a: &str, _v: &TypedValue) {
    }

    fn done(&mut self, _t: TxId) -> Result<()> {
        Ok(())
    }
}
