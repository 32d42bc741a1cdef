// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

#![allow(dead_code)]

//! Low-level functions for testing.

use std::cmp::Ordering;
use std::io::Write;
use std::ops::Deref;

use itertools::Itertools;
use tabwriter::TabWriter;

use datalith_core::{
    Datom,
    TxId,
};

use types::{
    Db,
    LogEntry,
};

/// Represents a set of datoms (assertions) in the store.
///
/// To make comparison easier, we deterministically order.  The ordering is the
/// ascending tuple ordering determined by `(e, a, v, tx, added)`.
pub struct Datoms(pub Vec<Datom>);

fn datom_cmp(x: &Datom, y: &Datom) -> Ordering {
    (x.e, &x.a, &x.v, x.tx, x.added).cmp(&(y.e, &y.a, &y.v, y.tx, y.added))
}

impl Datoms {
    pub fn new(mut datoms: Vec<Datom>) -> Datoms {
        datoms[..].sort_unstable_by(datom_cmp);
        Datoms(datoms)
    }

    /// Format as a tab-and-newline aligned table suitable for debug printing:
    /// a header line, then one row per datom.
    pub fn dump(&self) -> String {
        let mut tw = TabWriter::new(Vec::new()).padding(2);
        write!(&mut tw, "e\ta\tv\ttx\tadded\n").unwrap();
        for datom in &self.0 {
            write!(&mut tw, "{}\t{}\t{:?}\t{}\t{}\n",
                   datom.e, datom.a, datom.v, datom.tx, datom.added).unwrap();
        }
        tw.flush().unwrap();
        String::from_utf8(tw.into_inner().unwrap()).unwrap()
    }
}

impl Deref for Datoms {
    type Target = [Datom];

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Represents an ordered sequence of transactions in the store.
pub struct Transactions(pub Vec<Datoms>);

impl Deref for Transactions {
    type Target = [Datoms];

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Return the set of currently visible datoms in the store, ordered by
/// (e, a, v, tx).
pub fn datoms(db: &Db) -> Datoms {
    Datoms::new(db.current().iter().cloned().collect())
}

/// Return the set of history datoms with transaction ID strictly greater than
/// the given `tx`, ordered by (e, a, v, tx).
pub fn datoms_after(db: &Db, tx: TxId) -> Datoms {
    Datoms::new(db.history().iter().filter(|d| d.tx > tx).cloned().collect())
}

/// Return the sequence of transactions in the log with transaction ID strictly
/// greater than the given `tx`, grouped by tx and ordered within each group.
pub fn transactions_after(log: &[LogEntry], tx: TxId) -> Transactions {
    let datoms = log.iter()
        .filter(|entry| entry.tx > tx)
        .flat_map(|entry| entry.datoms.iter().cloned());
    let grouped: Vec<Datoms> = datoms
        .group_by(|d| d.tx)
        .into_iter()
        .map(|(_tx, group)| Datoms::new(group.collect()))
        .collect();
    Transactions(grouped)
}
