// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Attribute metadata and the store schema.
//!
//! A store may carry no schema at all (permissive), a schema in non-strict
//! mode (only attributes the schema knows about are validated), or a schema in
//! strict mode (assertions against unknown attributes are rejected).

use std::collections::BTreeMap;

use datalith_core::{
    Ident,
    TypedValue,
    ValueType,
};

use errors::{
    DbErrorKind,
    Result,
};

/// The uniqueness constraint carried by an attribute, if any.
#[derive(Clone,Copy,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Unique {
    /// No two entities may carry the same value, and asserting an existing
    /// value is a conflict.
    Value,
    /// Like `Value`, but additionally enables upsert: a temp id asserting an
    /// existing value rebinds to the entity that carries it.
    Identity,
}

/// Flags associated with a single attribute.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Attribute {
    /// The type every asserted value must carry.
    pub value_type: ValueType,

    /// `true` means cardinality-many; `false` means cardinality-one.
    pub multival: bool,

    pub unique: Option<Unique>,

    /// Carried for compatibility with the wire schema; every attribute in this
    /// store is covered by the ordered indexes regardless.
    pub index: bool,

    /// A component attribute is a ref whose target is owned by the referencing
    /// entity: retracting the entity cascades through it.
    pub component: bool,

    pub doc: Option<String>,
}

impl Attribute {
    pub fn unique_identity(&self) -> bool {
        self.unique == Some(Unique::Identity)
    }
}

impl Default for Attribute {
    fn default() -> Attribute {
        Attribute {
            value_type: ValueType::String,
            multival: false,
            unique: None,
            index: false,
            component: false,
            doc: None,
        }
    }
}

/// Accumulates attribute flags before installation, validating on `build`.
#[derive(Clone,Debug,Default,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct AttributeBuilder {
    value_type: Option<ValueType>,
    multival: Option<bool>,
    unique: Option<Option<Unique>>,
    index: Option<bool>,
    component: Option<bool>,
    doc: Option<String>,
}

impl AttributeBuilder {
    pub fn new() -> AttributeBuilder {
        AttributeBuilder::default()
    }

    pub fn value_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn multival(&mut self, multival: bool) -> &mut Self {
        self.multival = Some(multival);
        self
    }

    pub fn unique(&mut self, unique: Unique) -> &mut Self {
        self.unique = Some(Some(unique));
        self
    }

    pub fn non_unique(&mut self) -> &mut Self {
        self.unique = Some(None);
        self
    }

    pub fn index(&mut self, index: bool) -> &mut Self {
        self.index = Some(index);
        self
    }

    pub fn component(&mut self, component: bool) -> &mut Self {
        self.component = Some(component);
        self
    }

    pub fn doc<T>(&mut self, doc: T) -> &mut Self where T: Into<String> {
        self.doc = Some(doc.into());
        self
    }

    /// True if this builder carries everything installation requires.
    pub fn is_valid_install_attribute(&self) -> bool {
        self.value_type.is_some()
    }

    pub fn build(&self) -> Result<Attribute> {
        let value_type = match self.value_type {
            Some(value_type) => value_type,
            None => bail!(DbErrorKind::SchemaViolation(
                "attribute installation requires a value type".to_string())),
        };
        let component = self.component.unwrap_or(false);
        if component && value_type != ValueType::Ref {
            bail!(DbErrorKind::SchemaViolation(format!(
                "component attributes must be of type ref, not {}", value_type)));
        }
        Ok(Attribute {
            value_type: value_type,
            multival: self.multival.unwrap_or(false),
            unique: self.unique.unwrap_or(None),
            index: self.index.unwrap_or(false),
            component: component,
            doc: self.doc.clone(),
        })
    }
}

/// Map attribute idents to `Attribute` instances, plus the strictness flag.
#[derive(Clone,Debug,Default,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Schema {
    pub attributes: BTreeMap<Ident, Attribute>,
    pub strict: bool,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn define<T>(&mut self, ident: T, attribute: Attribute) -> &mut Self where T: Into<Ident> {
        self.attributes.insert(ident.into(), attribute);
        self
    }

    pub fn attribute_for_ident(&self, ident: &str) -> Option<&Attribute> {
        self.attributes.get(ident)
    }

    pub fn is_component(&self, ident: &str) -> bool {
        self.attribute_for_ident(ident).map_or(false, |a| a.component)
    }

    pub fn is_multival(&self, ident: &str) -> bool {
        self.attribute_for_ident(ident).map_or(true, |a| a.multival)
    }

    pub fn unique_identity_attr(&self, ident: &str) -> bool {
        self.attribute_for_ident(ident).map_or(false, |a| a.unique_identity())
    }

    /// Validate one assertion against this schema.
    ///
    /// Unknown attributes are rejected in strict mode and passed through
    /// otherwise.  Known attributes must carry a value of the declared type.
    pub fn check_assertion(&self, ident: &str, value: &TypedValue) -> Result<()> {
        let attribute = match self.attribute_for_ident(ident) {
            Some(attribute) => attribute,
            None if self.strict => bail!(DbErrorKind::SchemaViolation(format!(
                "unknown attribute {} in strict mode", ident))),
            None => return Ok(()),
        };
        if value.value_type() != attribute.value_type {
            bail!(DbErrorKind::SchemaViolation(format!(
                "expected value of type {} for attribute {}, got {} ({:?})",
                attribute.value_type, ident, value.value_type(), value)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_value_type() {
        let err = AttributeBuilder::new().multival(true).build().expect_err("no value type");
        match err.kind() {
            DbErrorKind::SchemaViolation(_) => {},
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_component_must_be_ref() {
        let err = AttributeBuilder::new()
            .value_type(ValueType::String)
            .component(true)
            .build()
            .expect_err("component string");
        match err.kind() {
            DbErrorKind::SchemaViolation(_) => {},
            kind => panic!("unexpected error kind: {:?}", kind),
        }

        let attribute = AttributeBuilder::new()
            .value_type(ValueType::Ref)
            .component(true)
            .build()
            .expect("component ref");
        assert!(attribute.component);
    }

    #[test]
    fn test_strict_mode_rejects_unknown() {
        let mut schema = Schema::new();
        schema.define(":person/name",
                      AttributeBuilder::new().value_type(ValueType::String).build().unwrap());

        assert!(schema.check_assertion(":person/name", &TypedValue::from("Alice")).is_ok());
        // Unknown attributes pass in permissive mode.
        assert!(schema.check_assertion(":person/age", &TypedValue::Long(30)).is_ok());

        schema.strict = true;
        assert!(schema.check_assertion(":person/age", &TypedValue::Long(30)).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let mut schema = Schema::new();
        schema.define(":person/age",
                      AttributeBuilder::new().value_type(ValueType::Long).build().unwrap());
        let err = schema.check_assertion(":person/age", &TypedValue::from("thirty"))
            .expect_err("type mismatch");
        match err.kind() {
            DbErrorKind::SchemaViolation(msg) => assert!(msg.contains(":person/age")),
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }
}
