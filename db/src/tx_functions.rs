// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Named transaction functions.
//!
//! A transaction function is a side-effect-free callback that receives a
//! read-only view of the pre-transaction snapshot and its call arguments, and
//! returns a sub-transaction to splice in place of the call.  Functions may
//! call other functions by name; the processor bounds expansion depth.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use datalith_core::{
    Entid,
    TypedValue,
};

use entities::Op;
use errors::{
    DbErrorKind,
    Result,
};
use types::Db;

/// The maximum nesting depth of transaction function expansion.
pub const MAX_TX_FN_DEPTH: usize = 8;

pub trait TransactionFunction: Send + Sync {
    fn apply(&self, db: &Db, args: &[TypedValue]) -> Result<Vec<Op>>;
}

impl<F> TransactionFunction for F
where F: Fn(&Db, &[TypedValue]) -> Result<Vec<Op>> + Send + Sync {
    fn apply(&self, db: &Db, args: &[TypedValue]) -> Result<Vec<Op>> {
        self(db, args)
    }
}

/// Registry of named transaction functions.
#[derive(Clone)]
pub struct TxFnRegistry {
    fns: BTreeMap<String, Arc<TransactionFunction>>,
}

lazy_static! {
    static ref DEFAULT_REGISTRY: Arc<TxFnRegistry> = Arc::new(TxFnRegistry::with_builtins());
}

impl TxFnRegistry {
    pub fn new() -> TxFnRegistry {
        TxFnRegistry { fns: BTreeMap::new() }
    }

    /// A registry carrying the built-in `cas` and `inc` functions.
    pub fn with_builtins() -> TxFnRegistry {
        let mut registry = TxFnRegistry::new();
        registry.register("cas", Arc::new(cas));
        registry.register("inc", Arc::new(inc));
        registry
    }

    /// The shared default registry; every `Db::empty` starts from this.
    pub fn default_registry() -> Arc<TxFnRegistry> {
        DEFAULT_REGISTRY.clone()
    }

    pub fn register<S>(&mut self, name: S, f: Arc<TransactionFunction>) where S: Into<String> {
        self.fns.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TransactionFunction>> {
        self.fns.get(name)
    }

    pub fn names<'a>(&'a self) -> Box<Iterator<Item = &'a str> + 'a> {
        Box::new(self.fns.keys().map(|k| k.as_str()))
    }
}

impl fmt::Debug for TxFnRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.fns.keys()).finish()
    }
}

fn entity_arg(args: &[TypedValue], index: usize, name: &str) -> Result<Entid> {
    match args.get(index) {
        Some(&TypedValue::Ref(e)) => Ok(e),
        Some(&TypedValue::Long(e)) => Ok(e),
        other => bail!(DbErrorKind::Custom(format!(
            "{}: expected an entity in position {}, got {:?}", name, index, other))),
    }
}

fn attr_arg<'a>(args: &'a [TypedValue], index: usize, name: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(&TypedValue::Keyword(ref a)) => Ok(a.as_str()),
        Some(&TypedValue::String(ref a)) => Ok(a.as_str()),
        other => bail!(DbErrorKind::Custom(format!(
            "{}: expected an attribute in position {}, got {:?}", name, index, other))),
    }
}

/// `cas(e, a, old, new)`: compare-and-swap.  Succeeds only if `old` is the
/// newest visible value of `(e, a)`; retracts it and asserts `new`.
fn cas(db: &Db, args: &[TypedValue]) -> Result<Vec<Op>> {
    if args.len() != 4 {
        bail!(DbErrorKind::Custom(format!("cas: expected 4 arguments, got {}", args.len())));
    }
    let e = entity_arg(args, 0, "cas")?;
    let a = attr_arg(args, 1, "cas")?;
    let old = &args[2];
    let new = &args[3];

    match db.get_one(e, a) {
        Some(ref found) if found == old => {
            Ok(vec![Op::retract(e, a, old.clone()), Op::add(e, a, new.clone())])
        },
        Some(found) => bail!(DbErrorKind::Custom(format!(
            "cas: [{} {}] is {:?}, expected {:?}", e, a, found, old))),
        None => bail!(DbErrorKind::Custom(format!(
            "cas: [{} {}] has no current value", e, a))),
    }
}

/// `inc(e, a, delta)`: add `delta` to the newest visible integer value of
/// `(e, a)`.
fn inc(db: &Db, args: &[TypedValue]) -> Result<Vec<Op>> {
    if args.len() != 3 {
        bail!(DbErrorKind::Custom(format!("inc: expected 3 arguments, got {}", args.len())));
    }
    let e = entity_arg(args, 0, "inc")?;
    let a = attr_arg(args, 1, "inc")?;
    let delta = match args[2] {
        TypedValue::Long(delta) => delta,
        ref other => bail!(DbErrorKind::Custom(format!(
            "inc: expected an integer delta, got {:?}", other))),
    };

    match db.get_one(e, a) {
        Some(TypedValue::Long(current)) => {
            Ok(vec![Op::retract(e, a, TypedValue::Long(current)),
                    Op::add(e, a, TypedValue::Long(current + delta))])
        },
        Some(other) => bail!(DbErrorKind::Custom(format!(
            "inc: [{} {}] is non-integer {:?}", e, a, other))),
        None => bail!(DbErrorKind::Custom(format!(
            "inc: [{} {}] has no current value", e, a))),
    }
}
