// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The four ordered datom indexes and the current-fact map.
//!
//! Each index is a `BTreeMap` keyed by a permutation of the datom fields.
//! Every lookup is a bounded range scan: seek to a lower bound constructed
//! from the known prefix (sentinel minimums fill the rest) and stop as soon
//! as the prefix no longer matches.  Nothing here walks a whole index.
//!
//! The key includes the `added` flag because the history indexes may hold a
//! retraction and an assertion of the same `[e a v]` within one transaction.

use std::collections::Bound;
use std::collections::BTreeMap;
use std::collections::HashMap;

use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
};

type EavtKey = (Entid, Ident, TypedValue, TxId, bool);
type AevtKey = (Ident, Entid, TypedValue, TxId, bool);
type AvetKey = (Ident, TypedValue, Entid, TxId, bool);
type VaetKey = (TypedValue, Ident, Entid, TxId, bool);

/// The `(e, a, v)` triple a datom asserts or retracts.
pub type FactKey = (Entid, Ident, TypedValue);

/// Map each currently asserted `(e, a, v)` to its newest datom.  This is the
/// O(1) "is this fact asserted now?" path the transaction processor leans on.
pub type CurrentFacts = HashMap<FactKey, Datom>;

/// An aggregate of the four sorted indexes.
#[derive(Clone,Debug,Default)]
pub struct Indexes {
    /// entity → attribute → value → tx: "what about entity E?"
    eavt: BTreeMap<EavtKey, Datom>,
    /// attribute → entity → value → tx: "who has attribute A?"
    aevt: BTreeMap<AevtKey, Datom>,
    /// attribute → value → entity → tx: "who has A=V?"
    avet: BTreeMap<AvetKey, Datom>,
    /// value → attribute → entity → tx: "who references E?"; refs only.
    vaet: BTreeMap<VaetKey, Datom>,
}

fn min_ident() -> Ident {
    Ident::new()
}

impl Indexes {
    pub fn new() -> Indexes {
        Indexes::default()
    }

    /// The number of datoms held.  All four indexes agree except VAET, which
    /// holds only refs, so EAVT is authoritative.
    pub fn len(&self) -> usize {
        self.eavt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eavt.is_empty()
    }

    pub fn insert(&mut self, datom: &Datom) {
        self.eavt.insert((datom.e, datom.a.clone(), datom.v.clone(), datom.tx, datom.added),
                         datom.clone());
        self.aevt.insert((datom.a.clone(), datom.e, datom.v.clone(), datom.tx, datom.added),
                         datom.clone());
        self.avet.insert((datom.a.clone(), datom.v.clone(), datom.e, datom.tx, datom.added),
                         datom.clone());
        if datom.v.is_ref() {
            self.vaet.insert((datom.v.clone(), datom.a.clone(), datom.e, datom.tx, datom.added),
                             datom.clone());
        }
    }

    pub fn remove(&mut self, datom: &Datom) {
        self.eavt.remove(&(datom.e, datom.a.clone(), datom.v.clone(), datom.tx, datom.added));
        self.aevt.remove(&(datom.a.clone(), datom.e, datom.v.clone(), datom.tx, datom.added));
        self.avet.remove(&(datom.a.clone(), datom.v.clone(), datom.e, datom.tx, datom.added));
        if datom.v.is_ref() {
            self.vaet.remove(&(datom.v.clone(), datom.a.clone(), datom.e, datom.tx, datom.added));
        }
    }

    /// Every datom about entity `e`, in EAVT order.
    pub fn datoms_for_entity(&self, e: Entid) -> Vec<Datom> {
        let lower: EavtKey = (e, min_ident(), TypedValue::min_value(), 0, false);
        self.eavt
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == e)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Every datom about `(e, a)`, in value-then-tx order.
    pub fn datoms_for_entity_attr(&self, e: Entid, a: &str) -> Vec<Datom> {
        let lower: EavtKey = (e, a.to_string(), TypedValue::min_value(), 0, false);
        self.eavt
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == e && k.1 == a)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Every datom carrying attribute `a`, in entity order.
    pub fn datoms_for_attr(&self, a: &str) -> Vec<Datom> {
        let lower: AevtKey = (a.to_string(), ::std::i64::MIN, TypedValue::min_value(), 0, false);
        self.aevt
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == a)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Every datom carrying `a = v`, in entity order.
    pub fn datoms_for_attr_value(&self, a: &str, v: &TypedValue) -> Vec<Datom> {
        let lower: AvetKey = (a.to_string(), v.clone(), ::std::i64::MIN, 0, false);
        self.avet
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == a && &k.1 == v)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Every datom whose value is a reference to `e`.
    pub fn datoms_referencing(&self, e: Entid) -> Vec<Datom> {
        let target = TypedValue::Ref(e);
        let lower: VaetKey = (target.clone(), min_ident(), ::std::i64::MIN, 0, false);
        self.vaet
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == target)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Every datom referencing `e` through attribute `a`.
    pub fn datoms_referencing_via(&self, e: Entid, a: &str) -> Vec<Datom> {
        let target = TypedValue::Ref(e);
        let lower: VaetKey = (target.clone(), a.to_string(), ::std::i64::MIN, 0, false);
        self.vaet
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|&(k, _)| k.0 == target && k.1 == a)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// All datoms in EAVT order.  Reserved for replay, snapshots, and debug
    /// dumps; reads go through the bounded scans above.
    pub fn iter<'a>(&'a self) -> Box<Iterator<Item = &'a Datom> + 'a> {
        Box::new(self.eavt.values())
    }
}
