// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The query AST and binding model.
//!
//! This crate consumes already-constructed queries; the literal syntax and its
//! parser live elsewhere.  A query is a `find` list of variables, a list of
//! `where` clauses, and optional rule definitions.  Execution folds clauses
//! over a relation of bindings; see the `executor` module.

#[macro_use] extern crate log;

extern crate datalith_core;
extern crate datalith_db;

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use datalith_core::{
    Entid,
    Ident,
    TypedValue,
};

pub mod aggregates;
pub mod executor;
pub mod predicates;
pub mod rules;

pub use aggregates::{
    aggregate,
    execute_for_aggregate,
    AggregateFunction,
    AggregateOutput,
    AggregateSpec,
};
pub use executor::{
    execute,
    execute_raw,
    QueryOutput,
};
pub use predicates::{
    CompareOp,
    Expr,
    PredicateExpr,
    PredTerm,
};
pub use rules::{
    RuleDef,
    RuleTables,
};

/// A query variable.  Cheap to clone; identity is the name.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Variable(pub Rc<String>);

impl Variable {
    pub fn from_name<T>(name: T) -> Variable where T: Into<String> {
        Variable(Rc::new(name.into()))
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Shorthand used throughout tests and callers.
pub fn var(name: &str) -> Variable {
    Variable::from_name(name)
}

/// What a variable is bound to.
///
/// Entity references are normalized on construction: binding a value place to
/// `TypedValue::Ref(e)` produces `Binding::Entid(e)`, so a variable bound in
/// entity position unifies with the same entity seen in value position.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Binding {
    Entid(Entid),
    Attr(Ident),
    Value(TypedValue),
}

impl Binding {
    pub fn from_value(v: TypedValue) -> Binding {
        match v {
            TypedValue::Ref(e) => Binding::Entid(e),
            v => Binding::Value(v),
        }
    }

    /// The `TypedValue` view of this binding, for predicates, aggregates, and
    /// result rows.
    pub fn to_value(&self) -> TypedValue {
        match *self {
            Binding::Entid(e) => TypedValue::Ref(e),
            Binding::Attr(ref a) => TypedValue::Keyword(a.clone()),
            Binding::Value(ref v) => v.clone(),
        }
    }

    pub fn as_entid(&self) -> Option<Entid> {
        match *self {
            Binding::Entid(e) => Some(e),
            _ => None,
        }
    }
}

/// A set of variable-to-value bindings.  Map equality is order-insensitive,
/// which is exactly the binding equality the executor relies on.
pub type Bindings = HashMap<Variable, Binding>;

/// A sequence of bindings; duplicates are allowed until `distinct` applies.
pub type Relation = Vec<Bindings>;

/// The entity place of a pattern.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum EntityPlace {
    Entid(Entid),
    Variable(Variable),
    Placeholder,
}

/// The attribute place of a pattern.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum AttributePlace {
    Ident(Ident),
    Variable(Variable),
    Placeholder,
}

/// The value place of a pattern.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum ValuePlace {
    Value(TypedValue),
    Variable(Variable),
    Placeholder,
}

/// A data pattern `[e a v]` matched against asserted datoms.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Pattern {
    pub e: EntityPlace,
    pub a: AttributePlace,
    pub v: ValuePlace,
}

impl Pattern {
    pub fn new(e: EntityPlace, a: AttributePlace, v: ValuePlace) -> Pattern {
        Pattern { e: e, a: a, v: v }
    }

    /// The number of concretely known places, used for join ordering.
    pub fn bound_places(&self) -> usize {
        let mut n = 0;
        if let EntityPlace::Entid(_) = self.e { n += 1; }
        if let AttributePlace::Ident(_) = self.a { n += 1; }
        if let ValuePlace::Value(_) = self.v { n += 1; }
        n
    }
}

/// An argument to a rule call: a variable to unify or a constant to require.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum RuleArg {
    Variable(Variable),
    Constant(TypedValue),
}

/// One clause of a `where` list.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Clause {
    Pattern(Pattern),
    Predicate(PredicateExpr),
    RuleCall(String, Vec<RuleArg>),
    And(Vec<Clause>),
    Or(Vec<Clause>),
    Not(Box<Clause>),
}

impl Clause {
    /// The variables this clause is guaranteed to bind in every row it emits.
    ///
    /// `Or` binds the intersection of its branches; `Not` and predicates bind
    /// nothing.  This drives the shared-schema projection that keeps `Or` a
    /// proper set union.
    pub fn bound_vars(&self) -> HashSet<Variable> {
        let mut vars = HashSet::new();
        self.accumulate_bound_vars(&mut vars);
        vars
    }

    fn accumulate_bound_vars(&self, vars: &mut HashSet<Variable>) {
        match *self {
            Clause::Pattern(ref pattern) => {
                if let EntityPlace::Variable(ref v) = pattern.e { vars.insert(v.clone()); }
                if let AttributePlace::Variable(ref v) = pattern.a { vars.insert(v.clone()); }
                if let ValuePlace::Variable(ref v) = pattern.v { vars.insert(v.clone()); }
            },
            Clause::Predicate(_) => {},
            Clause::RuleCall(_, ref args) => {
                for arg in args {
                    if let RuleArg::Variable(ref v) = *arg {
                        vars.insert(v.clone());
                    }
                }
            },
            Clause::And(ref clauses) => {
                for clause in clauses {
                    clause.accumulate_bound_vars(vars);
                }
            },
            Clause::Or(ref branches) => {
                let mut common: Option<HashSet<Variable>> = None;
                for branch in branches {
                    let branch_vars = branch.bound_vars();
                    common = Some(match common {
                        None => branch_vars,
                        Some(common) => common.intersection(&branch_vars).cloned().collect(),
                    });
                }
                if let Some(common) = common {
                    vars.extend(common);
                }
            },
            Clause::Not(_) => {},
        }
    }
}

/// A complete query.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct Query {
    pub find: Vec<Variable>,
    pub where_clauses: Vec<Clause>,
    pub rules: Vec<RuleDef>,
}

impl Query {
    pub fn new(find: Vec<Variable>, where_clauses: Vec<Clause>) -> Query {
        Query {
            find: find,
            where_clauses: where_clauses,
            rules: vec![],
        }
    }

    pub fn with_rules(mut self, rules: Vec<RuleDef>) -> Query {
        self.rules = rules;
        self
    }
}

/// Convenience constructor for a data pattern clause.
pub fn pattern(e: EntityPlace, a: AttributePlace, v: ValuePlace) -> Clause {
    Clause::Pattern(Pattern::new(e, a, v))
}
