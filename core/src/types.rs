// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Core types: entids, transaction ids, the typed value union, and datoms.

use std::fmt;

use ordered_float::OrderedFloat;

/// An entity id.
///
/// Positive entids are permanent and allocated by the store; negative entids are
/// temporary placeholders scoped to a single transaction.  Zero is the null
/// sentinel and never names an entity.
pub type Entid = i64;

/// The null entid sentinel.
pub const NULL_ENTID: Entid = 0;

/// A transaction id, monotonically increasing from `GENESIS_TX`.
pub type TxId = u64;

/// The basis of an empty store.  The first committed transaction is `GENESIS_TX + 1`.
pub const GENESIS_TX: TxId = 0;

/// An attribute identifier, by convention a namespaced keyword string like
/// `:person/name`.  Equality and ordering are string-lexicographic.
pub type Ident = String;

/// The attribute naming an entity's programmatic identity.
pub const DB_IDENT: &'static str = ":db/ident";

/// The attribute carrying an entity's documentation string.
pub const DB_DOC: &'static str = ":db/doc";

/// The attribute carrying a transaction's wall-clock instant.
pub const DB_TX_INSTANT: &'static str = ":db/txInstant";

/// The type of a value in the store.
///
/// The variant order here fixes the cross-type ordering of `TypedValue`; do not
/// reorder without revisiting every index.
#[derive(Clone,Copy,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum ValueType {
    Long,
    Double,
    String,
    Boolean,
    Instant,
    Ref,
    Keyword,
    Bytes,
}

impl ValueType {
    /// The wire tag for this type, as written to the journal.
    pub fn tag(&self) -> &'static str {
        match *self {
            ValueType::Long => "int",
            ValueType::Double => "float",
            ValueType::String => "string",
            ValueType::Boolean => "bool",
            ValueType::Instant => "instant",
            ValueType::Ref => "ref",
            ValueType::Keyword => "keyword",
            ValueType::Bytes => "bytes",
        }
    }

    /// The inverse of `tag`.
    pub fn from_tag(tag: &str) -> Option<ValueType> {
        match tag {
            "int" => Some(ValueType::Long),
            "float" => Some(ValueType::Double),
            "string" => Some(ValueType::String),
            "bool" => Some(ValueType::Boolean),
            "instant" => Some(ValueType::Instant),
            "ref" => Some(ValueType::Ref),
            "keyword" => Some(ValueType::Keyword),
            "bytes" => Some(ValueType::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A value in the store.
///
/// This is a closed tagged union; the derived `Ord` implements the universal
/// value order: first by variant in declaration order, then by the natural
/// order of the payload.  `Double` wraps `OrderedFloat` so that float equality
/// and ordering are total (NaN compares equal to itself and sorts last).
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum TypedValue {
    Long(i64),
    Double(OrderedFloat<f64>),
    String(String),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    Instant(u64),
    Ref(Entid),
    Keyword(String),
    Bytes(Vec<u8>),
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match *self {
            TypedValue::Long(_) => ValueType::Long,
            TypedValue::Double(_) => ValueType::Double,
            TypedValue::String(_) => ValueType::String,
            TypedValue::Boolean(_) => ValueType::Boolean,
            TypedValue::Instant(_) => ValueType::Instant,
            TypedValue::Ref(_) => ValueType::Ref,
            TypedValue::Keyword(_) => ValueType::Keyword,
            TypedValue::Bytes(_) => ValueType::Bytes,
        }
    }

    /// True if this value is an entity reference.
    pub fn is_ref(&self) -> bool {
        match *self {
            TypedValue::Ref(_) => true,
            _ => false,
        }
    }

    /// The referenced entid, if this value is a ref.
    pub fn as_ref_entid(&self) -> Option<Entid> {
        match *self {
            TypedValue::Ref(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match *self {
            TypedValue::Long(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match *self {
            TypedValue::Double(x) => Some(x.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            TypedValue::String(ref s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The least value in the universal order, used as a seek sentinel when
    /// constructing lower bounds for index range scans.
    pub fn min_value() -> TypedValue {
        TypedValue::Long(::std::i64::MIN)
    }

    pub fn typed_string<T>(s: T) -> TypedValue where T: Into<String> {
        TypedValue::String(s.into())
    }

    pub fn typed_keyword<T>(s: T) -> TypedValue where T: Into<String> {
        TypedValue::Keyword(s.into())
    }

    pub fn into_long(self) -> Option<i64> {
        match self {
            TypedValue::Long(x) => Some(x),
            _ => None,
        }
    }

    pub fn into_double(self) -> Option<f64> {
        match self {
            TypedValue::Double(x) => Some(x.into_inner()),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_boolean(self) -> Option<bool> {
        match self {
            TypedValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_instant(self) -> Option<u64> {
        match self {
            TypedValue::Instant(ms) => Some(ms),
            _ => None,
        }
    }

    pub fn into_entid(self) -> Option<Entid> {
        match self {
            TypedValue::Ref(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_keyword(self) -> Option<String> {
        match self {
            TypedValue::Keyword(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            TypedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> TypedValue {
        TypedValue::Long(v)
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> TypedValue {
        TypedValue::Double(OrderedFloat(v))
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> TypedValue {
        TypedValue::Boolean(v)
    }
}

impl<'a> From<&'a str> for TypedValue {
    fn from(v: &'a str) -> TypedValue {
        TypedValue::String(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> TypedValue {
        TypedValue::String(v)
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(v: Vec<u8>) -> TypedValue {
        TypedValue::Bytes(v)
    }
}

/// A single immutable fact: entity, attribute, value, transaction, and whether
/// the fact was asserted or retracted.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Datom {
    pub e: Entid,
    pub a: Ident,
    pub v: TypedValue,
    pub tx: TxId,
    pub added: bool,
}

impl Datom {
    pub fn new<A, V>(e: Entid, a: A, v: V, tx: TxId, added: bool) -> Datom
    where A: Into<Ident>, V: Into<TypedValue> {
        Datom {
            e: e,
            a: a.into(),
            v: v.into(),
            tx: tx,
            added: added,
        }
    }

    /// The `(e, a, v)` triple identifying the fact this datom asserts or retracts.
    pub fn fact(&self) -> (Entid, Ident, TypedValue) {
        (self.e, self.a.clone(), self.v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_order_is_variant_then_payload() {
        let vals = vec![
            TypedValue::Long(::std::i64::MIN),
            TypedValue::Long(-1),
            TypedValue::Long(10),
            TypedValue::Double(OrderedFloat(-0.5)),
            TypedValue::Double(OrderedFloat(99.0)),
            TypedValue::String("a".to_string()),
            TypedValue::String("b".to_string()),
            TypedValue::Boolean(false),
            TypedValue::Boolean(true),
            TypedValue::Instant(0),
            TypedValue::Instant(1000),
            TypedValue::Ref(1),
            TypedValue::Ref(2),
            TypedValue::Keyword(":a/b".to_string()),
            TypedValue::Bytes(vec![0u8]),
        ];
        let mut sorted = vals.clone();
        sorted.sort();
        assert_eq!(vals, sorted);
    }

    #[test]
    fn test_float_order_is_total() {
        let nan = TypedValue::Double(OrderedFloat(::std::f64::NAN));
        assert_eq!(nan, nan.clone());
        assert!(TypedValue::Double(OrderedFloat(1.0)) < nan);
    }

    #[test]
    fn test_min_value_is_least() {
        assert!(TypedValue::min_value() <= TypedValue::Long(::std::i64::MIN));
        assert!(TypedValue::min_value() < TypedValue::Boolean(false));
        assert!(TypedValue::min_value() < TypedValue::Ref(0));
    }

    #[test]
    fn test_into_consumers() {
        assert_eq!(TypedValue::Long(7).into_long(), Some(7));
        assert_eq!(TypedValue::Long(7).into_double(), None);
        assert_eq!(TypedValue::from("x").into_string(), Some("x".to_string()));
        assert_eq!(TypedValue::Boolean(true).into_boolean(), Some(true));
        assert_eq!(TypedValue::Instant(12).into_instant(), Some(12));
        assert_eq!(TypedValue::Ref(3).into_entid(), Some(3));
        assert_eq!(TypedValue::typed_keyword(":a/b").into_keyword(), Some(":a/b".to_string()));
        assert_eq!(TypedValue::from(vec![1u8, 2]).into_bytes(), Some(vec![1u8, 2]));
        // An entid is not a long.
        assert_eq!(TypedValue::Ref(3).into_long(), None);
    }

    #[test]
    fn test_value_type_tags_round_trip() {
        for vt in &[ValueType::Long, ValueType::Double, ValueType::String,
                    ValueType::Boolean, ValueType::Instant, ValueType::Ref,
                    ValueType::Keyword, ValueType::Bytes] {
            assert_eq!(ValueType::from_tag(vt.tag()), Some(*vt));
        }
        assert_eq!(ValueType::from_tag("uuid"), None);
    }
}
