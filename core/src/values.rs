// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The JSON wire form of values and datoms.
//!
//! A value is encoded as a tagged pair `{"t": tag, "v": payload}`; a datom as
//! the 5-element array `[e, a, value, tx, added]`.  These conversions are the
//! single source of truth for the journal and snapshot formats, so `Serialize`
//! and `Deserialize` for `TypedValue` and `Datom` are implemented on top of
//! them rather than derived.

use base64;
use ordered_float::OrderedFloat;
use serde::de;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use serde_json;
use serde_json::Value as JsonValue;

use types::{
    Datom,
    TypedValue,
    ValueType,
};

impl TypedValue {
    /// Encode as the tagged wire pair.
    pub fn to_json(&self) -> JsonValue {
        let payload = match *self {
            TypedValue::Long(x) => json!(x),
            TypedValue::Double(x) => json!(x.into_inner()),
            TypedValue::String(ref s) => json!(s),
            TypedValue::Boolean(b) => json!(b),
            TypedValue::Instant(ms) => json!(ms),
            TypedValue::Ref(e) => json!(e),
            TypedValue::Keyword(ref s) => json!(s),
            TypedValue::Bytes(ref b) => json!(base64::encode(b)),
        };
        json!({"t": self.value_type().tag(), "v": payload})
    }

    /// Decode the tagged wire pair.  Returns `None` on any malformed input;
    /// callers decide whether that is a corrupt journal or an ignorable line.
    pub fn from_json(value: &JsonValue) -> Option<TypedValue> {
        let obj = value.as_object()?;
        let tag = obj.get("t")?.as_str()?;
        let payload = obj.get("v")?;
        match ValueType::from_tag(tag)? {
            ValueType::Long => payload.as_i64().map(TypedValue::Long),
            ValueType::Double => payload.as_f64().map(|f| TypedValue::Double(OrderedFloat(f))),
            ValueType::String => payload.as_str().map(|s| TypedValue::String(s.to_string())),
            ValueType::Boolean => payload.as_bool().map(TypedValue::Boolean),
            ValueType::Instant => payload.as_u64().map(TypedValue::Instant),
            ValueType::Ref => payload.as_i64().map(TypedValue::Ref),
            ValueType::Keyword => payload.as_str().map(|s| TypedValue::Keyword(s.to_string())),
            ValueType::Bytes => {
                let encoded = payload.as_str()?;
                base64::decode(encoded).ok().map(TypedValue::Bytes)
            },
        }
    }
}

impl Datom {
    /// Encode as the 5-element wire array.
    pub fn to_json(&self) -> JsonValue {
        json!([self.e, self.a, self.v.to_json(), self.tx, self.added])
    }

    /// Decode the 5-element wire array.
    pub fn from_json(value: &JsonValue) -> Option<Datom> {
        let fields = value.as_array()?;
        if fields.len() != 5 {
            return None;
        }
        Some(Datom {
            e: fields[0].as_i64()?,
            a: fields[1].as_str()?.to_string(),
            v: TypedValue::from_json(&fields[2])?,
            tx: fields[3].as_u64()?,
            added: fields[4].as_bool()?,
        })
    }
}

impl Serialize for TypedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D>(deserializer: D) -> Result<TypedValue, D::Error> where D: Deserializer<'de> {
        let json = JsonValue::deserialize(deserializer)?;
        TypedValue::from_json(&json)
            .ok_or_else(|| de::Error::custom(format!("malformed typed value: {}", json)))
    }
}

impl Serialize for Datom {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datom {
    fn deserialize<D>(deserializer: D) -> Result<Datom, D::Error> where D: Deserializer<'de> {
        let json = JsonValue::deserialize(deserializer)?;
        Datom::from_json(&json)
            .ok_or_else(|| de::Error::custom(format!("malformed datom: {}", json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: TypedValue) {
        let encoded = v.to_json();
        assert_eq!(TypedValue::from_json(&encoded), Some(v));
    }

    #[test]
    fn test_value_round_trips() {
        round_trip(TypedValue::Long(-42));
        round_trip(TypedValue::Double(OrderedFloat(2.5)));
        round_trip(TypedValue::String("hello, world".to_string()));
        round_trip(TypedValue::Boolean(true));
        round_trip(TypedValue::Instant(1_530_000_000_000));
        round_trip(TypedValue::Ref(65536));
        round_trip(TypedValue::Keyword(":person/name".to_string()));
        round_trip(TypedValue::Bytes(vec![0, 1, 2, 254, 255]));
    }

    #[test]
    fn test_value_wire_shape() {
        let encoded = TypedValue::String("café \"quoted\"".to_string()).to_json();
        assert_eq!(encoded["t"], json!("string"));
        assert_eq!(encoded["v"], json!("café \"quoted\""));

        let encoded = TypedValue::Bytes(vec![255u8; 3]).to_json();
        assert_eq!(encoded["t"], json!("bytes"));
        assert_eq!(encoded["v"], json!("////"));
    }

    #[test]
    fn test_datom_round_trip() {
        let datom = Datom::new(17, ":person/name", "Alice", 3, true);
        assert_eq!(Datom::from_json(&datom.to_json()), Some(datom));

        let datom = Datom::new(17, ":person/age", 30i64, 4, false);
        assert_eq!(Datom::from_json(&datom.to_json()), Some(datom));
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert_eq!(TypedValue::from_json(&json!({"t": "int", "v": "nope"})), None);
        assert_eq!(TypedValue::from_json(&json!({"t": "uuid", "v": 1})), None);
        assert_eq!(TypedValue::from_json(&json!({"v": 1})), None);
        assert_eq!(TypedValue::from_json(&json!({"t": "bytes", "v": "!not base64!"})), None);
        assert_eq!(Datom::from_json(&json!([1, ":a/b", {"t": "int", "v": 2}, 1])), None);
    }

    #[test]
    fn test_serde_through_string() {
        let datom = Datom::new(1, ":db/doc", TypedValue::Keyword(":k".to_string()), 1, true);
        let text = serde_json::to_string(&datom).expect("serialized");
        let parsed: Datom = serde_json::from_str(&text).expect("deserialized");
        assert_eq!(parsed, datom);
    }
}
