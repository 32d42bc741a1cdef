// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Clause-driven query execution.
//!
//! A query folds its clauses over a relation that starts as a single empty
//! binding.  Patterns scan the best index for their bound places and unify
//! candidates; predicates filter; `or`/`not` recurse with one input binding at
//! a time.  Malformed inputs yield empty results, never errors.

use std::collections::HashSet;

use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
};
use datalith_db::Db;

use rules;
use rules::{
    RuleTable,
    RuleTables,
};
use super::{
    AttributePlace,
    Binding,
    Bindings,
    Clause,
    EntityPlace,
    Pattern,
    Query,
    Relation,
    RuleArg,
    ValuePlace,
    Variable,
};

/// Query results: the projected columns and distinct rows.
#[derive(Clone,Debug,Eq,PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<Variable>,
    pub rows: Vec<Vec<Binding>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The single value of a one-column, at-most-one-row result.
    pub fn into_scalar(mut self) -> Option<Binding> {
        if self.rows.len() == 1 && self.columns.len() == 1 {
            self.rows.pop().and_then(|mut row| row.pop())
        } else {
            None
        }
    }

    /// The first column of every row.
    pub fn into_coll(self) -> Vec<Binding> {
        self.rows
            .into_iter()
            .filter_map(|mut row| {
                if row.is_empty() {
                    None
                } else {
                    Some(row.remove(0))
                }
            })
            .collect()
    }

    /// The single row of an at-most-one-row result.
    pub fn into_tuple(mut self) -> Option<Vec<Binding>> {
        if self.rows.len() == 1 {
            self.rows.pop()
        } else {
            None
        }
    }

    /// Rows as plain values (entities as refs, attributes as keywords).
    pub fn rows_as_values(&self) -> Vec<Vec<TypedValue>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|binding| binding.to_value()).collect())
            .collect()
    }
}

pub(crate) struct ExecutionContext<'a> {
    pub db: &'a Db,
    pub tables: &'a RuleTables,
}

/// Execute `query`, projecting onto its `find` variables and deduplicating.
pub fn execute(query: &Query, db: &Db) -> QueryOutput {
    let relation = execute_raw(query, db);
    project(&query.find, relation)
}

/// Execute `query` without projection or distinct: the full relation, one
/// binding set per derivation.  Aggregation starts from this.
pub fn execute_raw(query: &Query, db: &Db) -> Relation {
    let tables = rules::evaluate(db, &query.rules);
    let context = ExecutionContext {
        db: db,
        tables: &tables,
    };
    execute_clauses(&context, vec![Bindings::new()], &query.where_clauses)
}

/// Fold `clauses` over `relation`, reordering runs of adjacent patterns so the
/// most-bound execute first.
pub(crate) fn execute_clauses(context: &ExecutionContext,
                              relation: Relation,
                              clauses: &[Clause])
                              -> Relation {
    let mut relation = relation;
    for clause in order_clauses(clauses) {
        if relation.is_empty() {
            return relation;
        }
        relation = execute_clause(context, relation, clause);
    }
    relation
}

/// Sort each run of consecutive patterns by descending number of bound
/// places, ties in original order.  Non-pattern clauses hold their position:
/// a predicate stays after the patterns that bind its variables.
fn order_clauses<'a>(clauses: &'a [Clause]) -> Vec<&'a Clause> {
    let mut ordered: Vec<&'a Clause> = Vec::with_capacity(clauses.len());
    let mut run: Vec<(&'a Clause, usize)> = vec![];

    for clause in clauses {
        match *clause {
            Clause::Pattern(ref pattern) => run.push((clause, pattern.bound_places())),
            _ => {
                flush_run(&mut run, &mut ordered);
                ordered.push(clause);
            },
        }
    }
    flush_run(&mut run, &mut ordered);
    ordered
}

fn flush_run<'a>(run: &mut Vec<(&'a Clause, usize)>, ordered: &mut Vec<&'a Clause>) {
    run.sort_by(|a, b| b.1.cmp(&a.1));
    ordered.extend(run.drain(..).map(|(clause, _)| clause));
}

fn execute_clause(context: &ExecutionContext, relation: Relation, clause: &Clause) -> Relation {
    match *clause {
        Clause::Pattern(ref pattern) => execute_pattern(context, relation, pattern),
        Clause::Predicate(ref predicate) => {
            relation.into_iter().filter(|bindings| predicate.evaluate(bindings)).collect()
        },
        Clause::RuleCall(ref name, ref args) => execute_rule_call(context, relation, name, args),
        Clause::And(ref clauses) => execute_clauses(context, relation, clauses),
        Clause::Or(ref branches) => execute_or(context, relation, branches),
        Clause::Not(ref inner) => {
            relation.into_iter()
                .filter(|bindings| {
                    execute_clause(context, vec![bindings.clone()], inner).is_empty()
                })
                .collect()
        },
    }
}

/// A place resolved under a binding: concretely known, open, or bound to
/// something that can never match.
enum Place<T> {
    Known(T),
    Unknown,
    Conflict,
}

fn entity_place(bindings: &Bindings, place: &EntityPlace) -> Place<Entid> {
    match *place {
        EntityPlace::Entid(e) => Place::Known(e),
        EntityPlace::Variable(ref v) => {
            match bindings.get(v) {
                Some(&Binding::Entid(e)) => Place::Known(e),
                Some(_) => Place::Conflict,
                None => Place::Unknown,
            }
        },
        EntityPlace::Placeholder => Place::Unknown,
    }
}

fn attr_place(bindings: &Bindings, place: &AttributePlace) -> Place<Ident> {
    match *place {
        AttributePlace::Ident(ref a) => Place::Known(a.clone()),
        AttributePlace::Variable(ref v) => {
            match bindings.get(v) {
                Some(&Binding::Attr(ref a)) => Place::Known(a.clone()),
                Some(_) => Place::Conflict,
                None => Place::Unknown,
            }
        },
        AttributePlace::Placeholder => Place::Unknown,
    }
}

fn value_place(bindings: &Bindings, place: &ValuePlace) -> Place<TypedValue> {
    match *place {
        ValuePlace::Value(ref v) => Place::Known(v.clone()),
        ValuePlace::Variable(ref v) => {
            match bindings.get(v) {
                Some(binding) => Place::Known(binding.to_value()),
                None => Place::Unknown,
            }
        },
        ValuePlace::Placeholder => Place::Unknown,
    }
}

/// Match one pattern against the store for every input binding.
///
/// Index selection: EAVT when the entity is known; AVET when attribute and
/// value are; AEVT when only the attribute is; VAET when only the value is
/// and it is a ref.  The final arm walks the whole current index and should
/// not be reached by well-formed queries.
fn execute_pattern(context: &ExecutionContext, relation: Relation, pattern: &Pattern) -> Relation {
    let current = context.db.current();
    let mut out = Relation::new();

    for bindings in relation {
        let e = entity_place(&bindings, &pattern.e);
        let a = attr_place(&bindings, &pattern.a);
        let v = value_place(&bindings, &pattern.v);

        let candidates: Vec<Datom> = match (e, a, v) {
            (Place::Conflict, _, _) | (_, Place::Conflict, _) | (_, _, Place::Conflict) => {
                continue;
            },
            (Place::Known(e), Place::Known(ref a), _) => current.datoms_for_entity_attr(e, a),
            (Place::Known(e), _, _) => current.datoms_for_entity(e),
            (Place::Unknown, Place::Known(ref a), Place::Known(ref v)) => {
                current.datoms_for_attr_value(a, v)
            },
            (Place::Unknown, Place::Known(ref a), Place::Unknown) => current.datoms_for_attr(a),
            (Place::Unknown, Place::Unknown, Place::Known(TypedValue::Ref(target))) => {
                current.datoms_referencing(target)
            },
            _ => {
                debug!("pattern with no bound places; walking the current index");
                current.iter().cloned().collect()
            },
        };

        for datom in &candidates {
            if let Some(extended) = unify(&bindings, pattern, datom) {
                out.push(extended);
            }
        }
    }
    out
}

/// Unify a candidate datom against the pattern under `bindings`: concrete
/// places must agree, variables extend or must agree, placeholders always do.
fn unify(bindings: &Bindings, pattern: &Pattern, datom: &Datom) -> Option<Bindings> {
    let mut next = bindings.clone();

    match pattern.e {
        EntityPlace::Entid(e) => {
            if e != datom.e {
                return None;
            }
        },
        EntityPlace::Variable(ref var) => {
            extend(&mut next, var, Binding::Entid(datom.e))?;
        },
        EntityPlace::Placeholder => {},
    }

    match pattern.a {
        AttributePlace::Ident(ref a) => {
            if *a != datom.a {
                return None;
            }
        },
        AttributePlace::Variable(ref var) => {
            extend(&mut next, var, Binding::Attr(datom.a.clone()))?;
        },
        AttributePlace::Placeholder => {},
    }

    match pattern.v {
        ValuePlace::Value(ref v) => {
            if *v != datom.v {
                return None;
            }
        },
        ValuePlace::Variable(ref var) => {
            extend(&mut next, var, Binding::from_value(datom.v.clone()))?;
        },
        ValuePlace::Placeholder => {},
    }

    Some(next)
}

fn extend(bindings: &mut Bindings, var: &Variable, binding: Binding) -> Option<()> {
    match bindings.get(var) {
        Some(existing) => {
            if *existing == binding {
                Some(())
            } else {
                None
            }
        },
        None => {
            bindings.insert(var.clone(), binding);
            Some(())
        },
    }
}

/// Unify a rule call against the rule's derived table.
fn execute_rule_call(context: &ExecutionContext,
                     relation: Relation,
                     name: &str,
                     args: &[RuleArg])
                     -> Relation {
    let empty = RuleTable::default();
    let table = context.tables
        .get(&(name.to_string(), args.len()))
        .unwrap_or(&empty);

    let mut out = Relation::new();
    for bindings in relation {
        for row in table.iter() {
            if let Some(extended) = unify_rule_args(&bindings, args, row) {
                out.push(extended);
            }
        }
    }
    out
}

fn unify_rule_args(bindings: &Bindings, args: &[RuleArg], row: &[Binding]) -> Option<Bindings> {
    let mut next = bindings.clone();
    for (arg, cell) in args.iter().zip(row.iter()) {
        match *arg {
            RuleArg::Variable(ref var) => extend(&mut next, var, cell.clone())?,
            RuleArg::Constant(ref v) => {
                if Binding::from_value(v.clone()) != *cell {
                    return None;
                }
            },
        }
    }
    Some(next)
}

/// `Or` is a union over the shared schema: each branch's rows are projected to
/// the input binding's variables plus the variables every branch binds, then
/// deduplicated across branches.
fn execute_or(context: &ExecutionContext, relation: Relation, branches: &[Clause]) -> Relation {
    let mut common: Option<HashSet<Variable>> = None;
    for branch in branches {
        let branch_vars = branch.bound_vars();
        common = Some(match common {
            None => branch_vars,
            Some(common) => common.intersection(&branch_vars).cloned().collect(),
        });
    }
    let common = common.unwrap_or_default();

    let mut out = Relation::new();
    for bindings in relation {
        let keep: HashSet<Variable> = bindings.keys()
            .cloned()
            .chain(common.iter().cloned())
            .collect();
        let mut seen: HashSet<Vec<(Variable, Binding)>> = HashSet::new();

        for branch in branches {
            for result in execute_clause(context, vec![bindings.clone()], branch) {
                let projected: Bindings = result.into_iter()
                    .filter(|&(ref var, _)| keep.contains(var))
                    .collect();
                let mut key: Vec<(Variable, Binding)> =
                    projected.iter().map(|(var, binding)| (var.clone(), binding.clone())).collect();
                key.sort();
                if seen.insert(key) {
                    out.push(projected);
                }
            }
        }
    }
    out
}

/// Project onto the `find` variables and deduplicate.  Rows in which a find
/// variable is unbound are dropped rather than erroring.
fn project(find: &[Variable], relation: Relation) -> QueryOutput {
    let mut rows = Vec::new();
    let mut seen: HashSet<Vec<Binding>> = HashSet::new();

    for bindings in relation {
        let mut row = Vec::with_capacity(find.len());
        let mut complete = true;
        for var in find {
            match bindings.get(var) {
                Some(binding) => row.push(binding.clone()),
                None => {
                    complete = false;
                    break;
                },
            }
        }
        if complete && seen.insert(row.clone()) {
            rows.push(row);
        }
    }

    QueryOutput {
        columns: find.to_vec(),
        rows: rows,
    }
}
