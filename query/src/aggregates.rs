// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Aggregation over relations.
//!
//! Aggregates consume the unprojected relation (no distinct is applied).
//! `sum` stays integral until a float appears; `avg` is always float; `min`
//! and `max` use the universal value order and preserve the winning value's
//! type.  Unbound or non-numeric values are skipped by the numeric
//! aggregates, and an empty input yields null (`None`), never an error.

use std::collections::BTreeMap;

use datalith_core::{
    OrderedFloat,
    TypedValue,
};
use datalith_db::Db;

use executor::execute_raw;
use super::{
    Binding,
    Bindings,
    Query,
    Variable,
};

#[derive(Clone,Copy,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// One aggregate column: the function, the variable it consumes (`count` may
/// omit it to count bindings), and the output column name.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFunction,
    pub var: Option<Variable>,
    pub result_name: String,
}

impl AggregateSpec {
    pub fn count<S>(result_name: S) -> AggregateSpec where S: Into<String> {
        AggregateSpec {
            func: AggregateFunction::Count,
            var: None,
            result_name: result_name.into(),
        }
    }

    pub fn of<S>(func: AggregateFunction, var: Variable, result_name: S) -> AggregateSpec
    where S: Into<String> {
        AggregateSpec {
            func: func,
            var: Some(var),
            result_name: result_name.into(),
        }
    }
}

/// Aggregation results: group-by columns first, then one column per spec.
/// `None` cells are nulls (empty input, or a group value that was unbound).
#[derive(Clone,Debug,Eq,PartialEq)]
pub struct AggregateOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<TypedValue>>>,
}

/// Execute `query` and aggregate the resulting relation.
pub fn execute_for_aggregate(query: &Query,
                             db: &Db,
                             group_by: &[Variable],
                             specs: &[AggregateSpec])
                             -> AggregateOutput {
    let relation = execute_raw(query, db);
    aggregate(&relation, group_by, specs)
}

/// Aggregate a relation: one row if `group_by` is empty, else one row per
/// distinct tuple of group values, in group-key order.
pub fn aggregate(relation: &[Bindings],
                 group_by: &[Variable],
                 specs: &[AggregateSpec])
                 -> AggregateOutput {
    let mut columns: Vec<String> = group_by.iter().map(|v| v.name().to_string()).collect();
    columns.extend(specs.iter().map(|spec| spec.result_name.clone()));

    let mut rows = Vec::new();
    if group_by.is_empty() {
        let all: Vec<&Bindings> = relation.iter().collect();
        rows.push(specs.iter().map(|spec| apply_spec(spec, &all)).collect());
    } else {
        let mut groups: BTreeMap<Vec<Option<Binding>>, Vec<&Bindings>> = BTreeMap::new();
        for bindings in relation {
            let key: Vec<Option<Binding>> = group_by.iter()
                .map(|var| bindings.get(var).cloned())
                .collect();
            groups.entry(key).or_insert_with(Vec::new).push(bindings);
        }
        for (key, members) in groups {
            let mut row: Vec<Option<TypedValue>> = key.into_iter()
                .map(|binding| binding.map(|b| b.to_value()))
                .collect();
            row.extend(specs.iter().map(|spec| apply_spec(spec, &members)));
            rows.push(row);
        }
    }

    AggregateOutput {
        columns: columns,
        rows: rows,
    }
}

fn apply_spec(spec: &AggregateSpec, members: &[&Bindings]) -> Option<TypedValue> {
    match spec.func {
        AggregateFunction::Count => {
            let n = match spec.var {
                None => members.len(),
                Some(ref var) => members.iter().filter(|b| b.contains_key(var)).count(),
            };
            Some(TypedValue::Long(n as i64))
        },
        AggregateFunction::Sum => numeric_fold(spec, members).map(|fold| fold.into_sum()),
        AggregateFunction::Avg => {
            numeric_fold(spec, members)
                .map(|fold| TypedValue::Double(OrderedFloat(fold.float_total / fold.count as f64)))
        },
        AggregateFunction::Min => ordered_pick(spec, members, |best, v| v < best),
        AggregateFunction::Max => ordered_pick(spec, members, |best, v| v > best),
    }
}

struct NumericFold {
    int_total: i64,
    float_total: f64,
    saw_float: bool,
    count: usize,
}

impl NumericFold {
    fn into_sum(self) -> TypedValue {
        if self.saw_float {
            TypedValue::Double(OrderedFloat(self.float_total))
        } else {
            TypedValue::Long(self.int_total)
        }
    }
}

/// Fold the numeric values of the spec's variable; `None` if none appear.
fn numeric_fold(spec: &AggregateSpec, members: &[&Bindings]) -> Option<NumericFold> {
    let var = spec.var.as_ref()?;
    let mut fold = NumericFold {
        int_total: 0,
        float_total: 0.0,
        saw_float: false,
        count: 0,
    };
    for bindings in members {
        match bindings.get(var).map(|b| b.to_value()) {
            Some(TypedValue::Long(x)) => {
                fold.int_total = fold.int_total.wrapping_add(x);
                fold.float_total += x as f64;
                fold.count += 1;
            },
            Some(TypedValue::Instant(ms)) => {
                fold.int_total = fold.int_total.wrapping_add(ms as i64);
                fold.float_total += ms as f64;
                fold.count += 1;
            },
            Some(TypedValue::Double(x)) => {
                fold.float_total += x.into_inner();
                fold.saw_float = true;
                fold.count += 1;
            },
            _ => {},
        }
    }
    if fold.count == 0 {
        None
    } else {
        Some(fold)
    }
}

fn ordered_pick<F>(spec: &AggregateSpec, members: &[&Bindings], better: F) -> Option<TypedValue>
where F: Fn(&TypedValue, &TypedValue) -> bool {
    let var = spec.var.as_ref()?;
    let mut best: Option<TypedValue> = None;
    for bindings in members {
        if let Some(v) = bindings.get(var).map(|b| b.to_value()) {
            let replace = match best {
                None => true,
                Some(ref current) => better(current, &v),
            };
            if replace {
                best = Some(v);
            }
        }
    }
    best
}
