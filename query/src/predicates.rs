// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Predicate expressions over bindings.
//!
//! Predicates filter a relation; they never error.  An unbound variable, a
//! type mismatch, or division by zero makes the enclosing predicate false and
//! the binding is dropped.

use datalith_core::{
    OrderedFloat,
    TypedValue,
};

use super::{
    Bindings,
    Variable,
};

/// A leaf of an expression: a literal (entities as `Ref`) or a variable.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum PredTerm {
    Constant(TypedValue),
    Variable(Variable),
}

/// An arithmetic expression.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum Expr {
    Term(PredTerm),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn constant<V>(v: V) -> Expr where V: Into<TypedValue> {
        Expr::Term(PredTerm::Constant(v.into()))
    }

    pub fn variable(v: Variable) -> Expr {
        Expr::Term(PredTerm::Variable(v))
    }
}

#[derive(Clone,Copy,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean predicate over bindings.
#[derive(Clone,Debug,Eq,Hash,Ord,PartialOrd,PartialEq)]
pub enum PredicateExpr {
    Compare(CompareOp, Expr, Expr),
    StrContains(Expr, Expr),
    StrStartsWith(Expr, Expr),
    StrEndsWith(Expr, Expr),
    And(Vec<PredicateExpr>),
    Or(Vec<PredicateExpr>),
    Not(Box<PredicateExpr>),
}

impl PredicateExpr {
    /// Shorthand for `Compare(op, Variable(v), Constant(value))`, the common
    /// filter shape.
    pub fn compare_var<V>(op: CompareOp, v: Variable, value: V) -> PredicateExpr
    where V: Into<TypedValue> {
        PredicateExpr::Compare(op, Expr::variable(v), Expr::constant(value))
    }

    /// Evaluate under `bindings`; anything that cannot be evaluated is false.
    pub fn evaluate(&self, bindings: &Bindings) -> bool {
        match *self {
            PredicateExpr::Compare(op, ref left, ref right) => {
                match (eval_expr(left, bindings), eval_expr(right, bindings)) {
                    (Some(l), Some(r)) => compare(op, &l, &r),
                    _ => false,
                }
            },
            PredicateExpr::StrContains(ref left, ref right) => {
                str_pair(left, right, bindings).map_or(false, |(l, r)| l.contains(&r))
            },
            PredicateExpr::StrStartsWith(ref left, ref right) => {
                str_pair(left, right, bindings).map_or(false, |(l, r)| l.starts_with(&r))
            },
            PredicateExpr::StrEndsWith(ref left, ref right) => {
                str_pair(left, right, bindings).map_or(false, |(l, r)| l.ends_with(&r))
            },
            PredicateExpr::And(ref preds) => preds.iter().all(|p| p.evaluate(bindings)),
            PredicateExpr::Or(ref preds) => preds.iter().any(|p| p.evaluate(bindings)),
            PredicateExpr::Not(ref pred) => !pred.evaluate(bindings),
        }
    }
}

/// Evaluate an expression to a value; `None` means "no value" (unbound
/// variable, non-numeric operand, division by zero).
fn eval_expr(expr: &Expr, bindings: &Bindings) -> Option<TypedValue> {
    match *expr {
        Expr::Term(PredTerm::Constant(ref v)) => Some(v.clone()),
        Expr::Term(PredTerm::Variable(ref v)) => bindings.get(v).map(|b| b.to_value()),
        Expr::Add(ref l, ref r) => arith(l, r, bindings, |a, b| a.checked_add(b), |a, b| a + b),
        Expr::Sub(ref l, ref r) => arith(l, r, bindings, |a, b| a.checked_sub(b), |a, b| a - b),
        Expr::Mul(ref l, ref r) => arith(l, r, bindings, |a, b| a.checked_mul(b), |a, b| a * b),
        Expr::Div(ref l, ref r) => {
            let l = eval_expr(l, bindings)?;
            let r = eval_expr(r, bindings)?;
            match (as_long(&l), as_long(&r)) {
                (Some(a), Some(b)) => {
                    return a.checked_div(b).map(TypedValue::Long);
                },
                _ => {},
            }
            match (as_double(&l), as_double(&r)) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        None
                    } else {
                        Some(TypedValue::Double(OrderedFloat(a / b)))
                    }
                },
                _ => None,
            }
        },
    }
}

fn arith<FI, FF>(l: &Expr, r: &Expr, bindings: &Bindings, int_op: FI, float_op: FF)
                 -> Option<TypedValue>
where FI: Fn(i64, i64) -> Option<i64>, FF: Fn(f64, f64) -> f64 {
    let l = eval_expr(l, bindings)?;
    let r = eval_expr(r, bindings)?;
    if let (Some(a), Some(b)) = (as_long(&l), as_long(&r)) {
        return int_op(a, b).map(TypedValue::Long);
    }
    match (as_double(&l), as_double(&r)) {
        (Some(a), Some(b)) => Some(TypedValue::Double(OrderedFloat(float_op(a, b)))),
        _ => None,
    }
}

/// The integer view of a value: longs directly, instants as epoch millis.
fn as_long(v: &TypedValue) -> Option<i64> {
    match *v {
        TypedValue::Long(x) => Some(x),
        TypedValue::Instant(ms) => Some(ms as i64),
        _ => None,
    }
}

fn as_double(v: &TypedValue) -> Option<f64> {
    match *v {
        TypedValue::Long(x) => Some(x as f64),
        TypedValue::Instant(ms) => Some(ms as f64),
        TypedValue::Double(x) => Some(x.into_inner()),
        _ => None,
    }
}

fn str_pair(l: &Expr, r: &Expr, bindings: &Bindings) -> Option<(String, String)> {
    let l = eval_expr(l, bindings)?;
    let r = eval_expr(r, bindings)?;
    match (l, r) {
        (TypedValue::String(l), TypedValue::String(r)) => Some((l, r)),
        _ => None,
    }
}

/// Comparison: numeric operands promote (int/instant to int if both sides
/// allow, else to float); otherwise both sides must carry the same variant,
/// and mismatched types are simply false.
fn compare(op: CompareOp, l: &TypedValue, r: &TypedValue) -> bool {
    use std::cmp::Ordering;

    let ordering = if let (Some(a), Some(b)) = (as_long(l), as_long(r)) {
        a.cmp(&b)
    } else if let (Some(a), Some(b)) = (as_double(l), as_double(r)) {
        OrderedFloat(a).cmp(&OrderedFloat(b))
    } else if l.value_type() == r.value_type() {
        l.cmp(r)
    } else {
        return false;
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::Binding;

    fn bindings(pairs: Vec<(&str, TypedValue)>) -> Bindings {
        pairs.into_iter()
            .map(|(name, v)| (Variable::from_name(name), Binding::from_value(v)))
            .collect()
    }

    #[test]
    fn test_numeric_comparison_promotes() {
        let b = bindings(vec![("age", TypedValue::Long(30))]);
        assert!(PredicateExpr::compare_var(CompareOp::Gt, Variable::from_name("age"), 20i64)
                .evaluate(&b));
        // Mixed int and float promotes to float.
        assert!(PredicateExpr::compare_var(CompareOp::Lt, Variable::from_name("age"), 30.5f64)
                .evaluate(&b));
        assert!(!PredicateExpr::compare_var(CompareOp::Eq, Variable::from_name("age"), 29.5f64)
                .evaluate(&b));
    }

    #[test]
    fn test_unbound_variable_is_false() {
        let b = Bindings::new();
        assert!(!PredicateExpr::compare_var(CompareOp::Eq, Variable::from_name("age"), 30i64)
                .evaluate(&b));
        // ... even under negation of a comparison, the predicate containing
        // the unbound variable itself is false, so Not flips it.
        let inner = PredicateExpr::compare_var(CompareOp::Eq, Variable::from_name("age"), 30i64);
        assert!(PredicateExpr::Not(Box::new(inner)).evaluate(&b));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let b = bindings(vec![("x", TypedValue::from("thirty"))]);
        assert!(!PredicateExpr::compare_var(CompareOp::Eq, Variable::from_name("x"), 30i64)
                .evaluate(&b));
        assert!(!PredicateExpr::compare_var(CompareOp::Lt, Variable::from_name("x"), 30i64)
                .evaluate(&b));
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let b = bindings(vec![("name", TypedValue::from("carol"))]);
        assert!(PredicateExpr::compare_var(CompareOp::Gt, Variable::from_name("name"), "bob")
                .evaluate(&b));
        assert!(PredicateExpr::compare_var(CompareOp::Lt, Variable::from_name("name"), "dave")
                .evaluate(&b));
    }

    #[test]
    fn test_string_predicates() {
        let b = bindings(vec![("name", TypedValue::from("datalith"))]);
        let name = || Expr::variable(Variable::from_name("name"));
        assert!(PredicateExpr::StrContains(name(), Expr::constant("tali")).evaluate(&b));
        assert!(PredicateExpr::StrStartsWith(name(), Expr::constant("data")).evaluate(&b));
        assert!(PredicateExpr::StrEndsWith(name(), Expr::constant("lith")).evaluate(&b));
        assert!(!PredicateExpr::StrContains(name(), Expr::constant("xyz")).evaluate(&b));
        // Non-string operands are false, not errors.
        assert!(!PredicateExpr::StrContains(Expr::constant(1i64), Expr::constant("1")).evaluate(&b));
    }

    #[test]
    fn test_arithmetic() {
        let b = bindings(vec![("x", TypedValue::Long(10))]);
        let x = || Expr::variable(Variable::from_name("x"));

        let sum = Expr::Add(Box::new(x()), Box::new(Expr::constant(5i64)));
        assert!(PredicateExpr::Compare(CompareOp::Eq, sum, Expr::constant(15i64)).evaluate(&b));

        let mixed = Expr::Mul(Box::new(x()), Box::new(Expr::constant(0.5f64)));
        assert!(PredicateExpr::Compare(CompareOp::Eq, mixed, Expr::constant(5.0f64)).evaluate(&b));
    }

    #[test]
    fn test_division_by_zero_has_no_value() {
        let b = Bindings::new();
        let div = Expr::Div(Box::new(Expr::constant(10i64)), Box::new(Expr::constant(0i64)));
        assert!(!PredicateExpr::Compare(CompareOp::Eq, div.clone(), Expr::constant(0i64))
                .evaluate(&b));
        assert!(!PredicateExpr::Compare(CompareOp::Ne, div, Expr::constant(0i64))
                .evaluate(&b));

        let fdiv = Expr::Div(Box::new(Expr::constant(1.0f64)), Box::new(Expr::constant(0.0f64)));
        assert!(!PredicateExpr::Compare(CompareOp::Eq, fdiv.clone(), fdiv).evaluate(&b));
    }

    #[test]
    fn test_instant_promotes_like_int() {
        let b = bindings(vec![("seen", TypedValue::Instant(2_000))]);
        let seen = Variable::from_name("seen");
        assert!(PredicateExpr::compare_var(CompareOp::Gt, seen.clone(), 1_999i64).evaluate(&b));
        assert!(PredicateExpr::compare_var(CompareOp::Eq, seen.clone(), 2_000i64).evaluate(&b));
        assert!(PredicateExpr::compare_var(CompareOp::Lt, seen, 2_000.5f64).evaluate(&b));
    }

    #[test]
    fn test_entity_terms_compare_as_refs() {
        let b = bindings(vec![("e", TypedValue::Ref(7))]);
        assert!(PredicateExpr::compare_var(CompareOp::Eq,
                                           Variable::from_name("e"),
                                           TypedValue::Ref(7))
                .evaluate(&b));
        // A ref and a long are different types, not equal numbers.
        assert!(!PredicateExpr::compare_var(CompareOp::Eq,
                                            Variable::from_name("e"),
                                            7i64)
                .evaluate(&b));
    }

    #[test]
    fn test_boolean_connectives() {
        let b = bindings(vec![("age", TypedValue::Long(30))]);
        let age = Variable::from_name("age");
        let young = PredicateExpr::compare_var(CompareOp::Lt, age.clone(), 18i64);
        let adult = PredicateExpr::compare_var(CompareOp::Ge, age.clone(), 18i64);

        assert!(PredicateExpr::Or(vec![young.clone(), adult.clone()]).evaluate(&b));
        assert!(!PredicateExpr::And(vec![young.clone(), adult.clone()]).evaluate(&b));
        assert!(PredicateExpr::Not(Box::new(young)).evaluate(&b));
    }
}
