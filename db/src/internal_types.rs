// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Types that support the transaction processor while temp ids are being
//! resolved.

use std;

use indexmap::IndexMap;

use datalith_core::{
    Entid,
    Ident,
    TypedValue,
};

use entities::OpType;

/// A staged operation, parameterized over how its entity and value positions
/// are represented.  Entity positions start as `EntidOr<TempId>` and finish as
/// plain `Entid`s once resolution completes.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Term<E, V> {
    AddOrRetract(OpType, E, Ident, V),
    RetractEntity(E),
}

/// A temporary id: a negative entid scoped to a single transaction.
pub type TempId = Entid;

/// Map temp ids to the entids they resolved or were allocated to.  Insertion
/// order is first appearance in the transaction, which keeps allocation
/// deterministic.
pub type TempIdMap = IndexMap<TempId, Entid>;

pub type EntidOr<T> = std::result::Result<Entid, T>;
pub type TypedValueOr<T> = std::result::Result<TypedValue, T>;

/// A pair [a v] in the store, used to resolve lookup refs and upserts.
pub type AVPair = (Ident, TypedValue);

pub type TermWithTempIds = Term<EntidOr<TempId>, TypedValueOr<TempId>>;
pub type TermWithoutTempIds = Term<Entid, TypedValue>;
pub type Population = Vec<TermWithTempIds>;

impl TermWithTempIds {
    /// Collapse a term with no remaining temp ids.  Panics if any `Err`
    /// remains; callers only invoke this after resolution is complete.
    pub fn unwrap(self) -> TermWithoutTempIds {
        match self {
            Term::AddOrRetract(op, Ok(e), a, Ok(v)) => Term::AddOrRetract(op, e, a, v),
            Term::RetractEntity(Ok(e)) => Term::RetractEntity(e),
            _ => unreachable!("temp ids remain after resolution"),
        }
    }
}
