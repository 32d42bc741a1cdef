// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Bottom-up evaluation of recursive rules.
//!
//! Rules with the same name and arity disjoin.  Evaluation is a semi-naive
//! fixpoint: each pass re-derives only the rules whose dependencies grew in
//! the previous pass, merges the projected rows into the rule's table, and
//! halts when no table grows.  The tables are finite (bounded by the store's
//! entity/attribute/value combinations), so the loop terminates even for
//! mutually recursive definitions.

use std::collections::HashMap;
use std::collections::HashSet;

use datalith_db::Db;

use executor::{
    execute_clauses,
    ExecutionContext,
};
use super::{
    Binding,
    Bindings,
    Clause,
    Variable,
};

/// One definition of a rule.  `name` plus `params.len()` identifies the
/// derived relation it contributes to.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct RuleDef {
    pub name: String,
    pub params: Vec<Variable>,
    pub body: Vec<Clause>,
}

impl RuleDef {
    pub fn new<S>(name: S, params: Vec<Variable>, body: Vec<Clause>) -> RuleDef
    where S: Into<String> {
        RuleDef {
            name: name.into(),
            params: params,
            body: body,
        }
    }

    pub fn key(&self) -> RuleKey {
        (self.name.clone(), self.params.len())
    }
}

/// A rule's identity: name and arity.
pub type RuleKey = (String, usize);

/// The derived relation for one rule, keyed on its canonical parameters.
pub type RuleTable = HashSet<Vec<Binding>>;

pub type RuleTables = HashMap<RuleKey, RuleTable>;

/// Evaluate every rule to fixpoint against `db`.
pub fn evaluate(db: &Db, rules: &[RuleDef]) -> RuleTables {
    let mut tables: RuleTables = HashMap::new();
    for def in rules {
        tables.entry(def.key()).or_insert_with(RuleTable::default);
    }
    if rules.is_empty() {
        return tables;
    }

    let mut grown: HashSet<RuleKey> = HashSet::new();
    let mut pass = 0;
    loop {
        pass += 1;
        let mut grown_now: HashSet<RuleKey> = HashSet::new();

        for def in rules {
            if pass > 1 && grown.is_disjoint(&called_rules(&def.body)) {
                continue;
            }

            let rows = {
                let context = ExecutionContext {
                    db: db,
                    tables: &tables,
                };
                let derived = execute_clauses(&context, vec![Bindings::new()], &def.body);
                let mut rows: Vec<Vec<Binding>> = vec![];
                for bindings in derived {
                    let row: Option<Vec<Binding>> = def.params
                        .iter()
                        .map(|param| bindings.get(param).cloned())
                        .collect();
                    // A body that leaves a parameter unbound derives nothing.
                    if let Some(row) = row {
                        rows.push(row);
                    }
                }
                rows
            };

            let table = tables.get_mut(&def.key()).expect("table was seeded for every rule");
            for row in rows {
                if table.insert(row) {
                    grown_now.insert(def.key());
                }
            }
        }

        debug!("rule pass {}: {} tables grew", pass, grown_now.len());
        if grown_now.is_empty() {
            break;
        }
        grown = grown_now;
    }
    tables
}

/// The rules a clause list calls, directly or inside composites.
fn called_rules(clauses: &[Clause]) -> HashSet<RuleKey> {
    let mut keys = HashSet::new();
    for clause in clauses {
        called_rules_into(clause, &mut keys);
    }
    keys
}

fn called_rules_into(clause: &Clause, keys: &mut HashSet<RuleKey>) {
    match *clause {
        Clause::RuleCall(ref name, ref args) => {
            keys.insert((name.clone(), args.len()));
        },
        Clause::And(ref clauses) | Clause::Or(ref clauses) => {
            for clause in clauses {
                called_rules_into(clause, keys);
            }
        },
        Clause::Not(ref inner) => called_rules_into(inner, keys),
        Clause::Pattern(_) | Clause::Predicate(_) => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use datalith_core::TypedValue;
    use datalith_db::{
        Db,
        Op,
    };

    use super::super::{
        pattern,
        var,
        AttributePlace,
        EntityPlace,
        RuleArg,
        ValuePlace,
    };

    fn parent_pattern(e: &str, v: &str) -> Clause {
        pattern(EntityPlace::Variable(var(e)),
                AttributePlace::Ident(":person/parent".to_string()),
                ValuePlace::Variable(var(v)))
    }

    fn ancestor_rules() -> Vec<RuleDef> {
        // ancestor(x, y) :- [x :person/parent y]
        // ancestor(x, y) :- [x :person/parent z], ancestor(z, y)
        vec![
            RuleDef::new("ancestor",
                         vec![var("x"), var("y")],
                         vec![parent_pattern("x", "y")]),
            RuleDef::new("ancestor",
                         vec![var("x"), var("y")],
                         vec![parent_pattern("x", "z"),
                              Clause::RuleCall("ancestor".to_string(),
                                               vec![RuleArg::Variable(var("z")),
                                                    RuleArg::Variable(var("y"))])]),
        ]
    }

    #[test]
    fn test_ancestor_fixpoint() {
        let db = Db::empty();
        let (db, report) = db.transact(vec![
            Op::add(-1, ":person/parent", TypedValue::Ref(-2)),
            Op::add(-2, ":person/parent", TypedValue::Ref(-3)),
        ]).expect("transacted");
        let a = report.tempids[&-1];
        let b = report.tempids[&-2];
        let c = report.tempids[&-3];

        let tables = evaluate(&db, &ancestor_rules());
        let table = &tables[&("ancestor".to_string(), 2)];

        let expected: RuleTable = vec![
            vec![Binding::Entid(a), Binding::Entid(b)],
            vec![Binding::Entid(b), Binding::Entid(c)],
            vec![Binding::Entid(a), Binding::Entid(c)],
        ].into_iter().collect();
        assert_eq!(*table, expected);
    }

    #[test]
    fn test_empty_rules() {
        let db = Db::empty();
        assert!(evaluate(&db, &[]).is_empty());
    }
}
