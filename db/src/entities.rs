// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The operations a transaction is made of, as submitted by callers.

use datalith_core::{
    Entid,
    Ident,
    TypedValue,
};

#[derive(Clone,Copy,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum OpType {
    Add,
    Retract,
}

/// A reference to an entity in an op: a concrete entid (negative entids are
/// temp ids scoped to the transaction), or a lookup ref naming an entity by a
/// unique attribute's value.
///
/// Nested lookup refs are not supported; resolving them would need the same
/// multi-phase treatment as temp ids and has never been worth the effort.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum EntityRef {
    Entid(Entid),
    LookupRef(Ident, TypedValue),
}

impl EntityRef {
    pub fn lookup<A, V>(a: A, v: V) -> EntityRef where A: Into<Ident>, V: Into<TypedValue> {
        EntityRef::LookupRef(a.into(), v.into())
    }
}

impl From<Entid> for EntityRef {
    fn from(e: Entid) -> EntityRef {
        EntityRef::Entid(e)
    }
}

/// One operation in a transaction.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Op {
    /// Assert `[e a v]`.
    Add(EntityRef, Ident, TypedValue),
    /// Retract `[e a v]`.
    Retract(EntityRef, Ident, TypedValue),
    /// Retract every fact about the referenced entity, every inbound
    /// reference to it, and (recursively) its components.
    RetractEntity(EntityRef),
    /// Invoke a registered transaction function; its result is spliced into
    /// the transaction in place of the call.
    Call(String, Vec<TypedValue>),
}

impl Op {
    pub fn add<E, A, V>(e: E, a: A, v: V) -> Op
    where E: Into<EntityRef>, A: Into<Ident>, V: Into<TypedValue> {
        Op::Add(e.into(), a.into(), v.into())
    }

    pub fn retract<E, A, V>(e: E, a: A, v: V) -> Op
    where E: Into<EntityRef>, A: Into<Ident>, V: Into<TypedValue> {
        Op::Retract(e.into(), a.into(), v.into())
    }

    pub fn retract_entity<E>(e: E) -> Op where E: Into<EntityRef> {
        Op::RetractEntity(e.into())
    }

    pub fn call<S>(name: S, args: Vec<TypedValue>) -> Op where S: Into<String> {
        Op::Call(name.into(), args)
    }
}
