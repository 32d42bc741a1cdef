// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Declarative tree retrieval rooted at an entity.
//!
//! A pull spec is an ordered list of patterns; the result is an ordered list
//! of `(attribute, value)` pairs.  Reference attributes expand recursively
//! through `Nested` and `Reverse` patterns.  A visited set threaded along
//! each path stops reference cycles (a revisited entity contributes only its
//! id), and a hard depth cap bounds work as a second defense.  Pulls never
//! error: missing attributes are simply absent from the result.

extern crate datalith_core;
extern crate datalith_db;

use std::collections::HashSet;

use datalith_core::{
    Entid,
    Ident,
    TypedValue,
};
use datalith_db::Db;

/// The recursion depth at which nested expansion stops and refs are returned
/// as bare ids.
pub const MAX_PULL_DEPTH: usize = 32;

/// One pattern in a pull spec.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum PullPattern {
    /// The attribute's current value or values.
    Attr(Ident),
    /// Every attribute the entity currently has.
    Wildcard,
    /// Recursively pull the sub-spec on each entity referenced through the
    /// attribute.
    Nested(Ident, Vec<PullPattern>),
    /// Recursively pull the sub-spec on each entity that references this one
    /// through the attribute.
    Reverse(Ident, Vec<PullPattern>),
    /// Like `Attr`, capped at the given number of results.
    Limited(Ident, usize),
    /// Like `Attr`, but an absent attribute yields the given default.
    WithDefault(Ident, TypedValue),
}

/// A pulled value.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum PullValue {
    Scalar(TypedValue),
    /// A recursively pulled entity.
    Entity(Vec<(Ident, PullValue)>),
    /// Values of a many-cardinality or multiply-expanded attribute.
    Many(Vec<PullValue>),
    /// The attribute was absent; this is the spec's default.
    Default(TypedValue),
}

/// An ordered list of `(attribute, value)` pairs.
pub type PullResult = Vec<(Ident, PullValue)>;

/// Pull `spec` on `e`.
pub fn pull(db: &Db, e: Entid, spec: &[PullPattern]) -> PullResult {
    let mut visited = HashSet::new();
    visited.insert(e);
    pull_spec(db, e, spec, &mut visited, 0)
}

/// Pull `spec` on each of `entities`, in order.
pub fn pull_many(db: &Db, entities: &[Entid], spec: &[PullPattern]) -> Vec<PullResult> {
    entities.iter().map(|&e| pull(db, e, spec)).collect()
}

/// The scalar shortcut: the newest visible value of `(e, attr)`.
pub fn pull_one(db: &Db, e: Entid, attr: &str) -> Option<TypedValue> {
    db.get_one(e, attr)
}

fn pull_spec(db: &Db,
             e: Entid,
             spec: &[PullPattern],
             visited: &mut HashSet<Entid>,
             depth: usize)
             -> PullResult {
    let mut result = PullResult::new();
    for pattern in spec {
        match *pattern {
            PullPattern::Attr(ref a) => {
                let values = db.get(e, a);
                if let Some(value) = plain_value(db, a, values) {
                    result.push((a.clone(), value));
                }
            },
            PullPattern::Wildcard => {
                for (a, values) in db.entity(e) {
                    if let Some(value) = plain_value(db, &a, values) {
                        result.push((a, value));
                    }
                }
            },
            PullPattern::Nested(ref a, ref sub) => {
                let values = db.get(e, a);
                if values.is_empty() {
                    continue;
                }
                let mut pulled: Vec<PullValue> = Vec::with_capacity(values.len());
                for v in values {
                    pulled.push(nested_value(db, v, sub, visited, depth));
                }
                result.push((a.clone(), one_or_many(db, a, pulled)));
            },
            PullPattern::Reverse(ref a, ref sub) => {
                let referencing = db.referencing_via_attr(e, a);
                if referencing.is_empty() {
                    continue;
                }
                let pulled: Vec<PullValue> = referencing.into_iter()
                    .map(|r| nested_value(db, TypedValue::Ref(r), sub, visited, depth))
                    .collect();
                result.push((a.clone(), PullValue::Many(pulled)));
            },
            PullPattern::Limited(ref a, limit) => {
                let mut values = db.get(e, a);
                values.truncate(limit);
                if let Some(value) = plain_value(db, a, values) {
                    result.push((a.clone(), value));
                }
            },
            PullPattern::WithDefault(ref a, ref default) => {
                let values = db.get(e, a);
                match plain_value(db, a, values) {
                    Some(value) => result.push((a.clone(), value)),
                    None => result.push((a.clone(), PullValue::Default(default.clone()))),
                }
            },
        }
    }
    result
}

/// Scalar for a cardinality-one attribute (or a single value), a sequence
/// otherwise; `None` when the attribute is absent.
fn plain_value(db: &Db, a: &str, values: Vec<TypedValue>) -> Option<PullValue> {
    if values.is_empty() {
        return None;
    }
    let scalar = values.len() == 1 || !is_multival(db, a);
    if scalar {
        values.into_iter().next().map(PullValue::Scalar)
    } else {
        Some(PullValue::Many(values.into_iter().map(PullValue::Scalar).collect()))
    }
}

fn one_or_many(db: &Db, a: &str, mut pulled: Vec<PullValue>) -> PullValue {
    if pulled.len() == 1 || !is_multival(db, a) {
        pulled.remove(0)
    } else {
        PullValue::Many(pulled)
    }
}

fn is_multival(db: &Db, a: &str) -> bool {
    db.schema().map_or(true, |schema| schema.is_multival(a))
}

/// Expand one value under a nested pattern.  Refs recurse unless the target
/// was already seen on this path or the depth cap is reached; then (and for
/// non-ref values) the value stands as a scalar.
fn nested_value(db: &Db,
                v: TypedValue,
                sub: &[PullPattern],
                visited: &mut HashSet<Entid>,
                depth: usize)
                -> PullValue {
    match v {
        TypedValue::Ref(target) => {
            if depth >= MAX_PULL_DEPTH || !visited.insert(target) {
                return PullValue::Scalar(TypedValue::Ref(target));
            }
            let entity = pull_spec(db, target, sub, visited, depth + 1);
            visited.remove(&target);
            PullValue::Entity(entity)
        },
        v => PullValue::Scalar(v),
    }
}
