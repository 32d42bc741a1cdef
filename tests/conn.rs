// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

extern crate env_logger;

extern crate datalith;

use datalith::{
    pattern,
    var,
    AggregateFunction,
    AggregateSpec,
    AttributePlace,
    Conn,
    Db,
    EntityPlace,
    Op,
    PullPattern,
    PullValue,
    Query,
    TypedValue,
    ValuePlace,
};

fn seeded_conn() -> (Conn, datalith::Entid) {
    let conn = Conn::connect(Db::empty());
    let report = conn.transact(vec![
        Op::add(-1, ":person/name", "Alice"),
        Op::add(-1, ":person/age", 30i64),
        Op::add(-2, ":person/name", "Bob"),
        Op::add(-2, ":person/age", 40i64),
    ]).expect("tx 1");
    let alice = report.tempids[&-1];
    conn.transact(vec![
        Op::retract(alice, ":person/age", 30i64),
        Op::add(alice, ":person/age", 31i64),
    ]).expect("tx 2");
    (conn, alice)
}

#[test]
fn test_since_and_tx_data() {
    env_logger::try_init().ok();
    let (conn, _) = seeded_conn();

    assert_eq!(conn.all_tx_ids(), vec![1, 2]);

    let tail = conn.since(1);
    assert_eq!(tail.len(), 2);
    assert!(tail.iter().all(|d| d.tx == 2));
    assert!(conn.since(2).is_empty());

    let entry = conn.tx_data(1).expect("tx 1 recorded");
    assert_eq!(entry.tx, 1);
    assert_eq!(entry.datoms.len(), 4);
    assert!(entry.tx_instant > 0);
    assert!(conn.tx_data(9).is_none());
}

#[test]
fn test_entity_history_is_tx_ordered() {
    env_logger::try_init().ok();
    let (conn, alice) = seeded_conn();

    let history = conn.entity_history(alice);
    assert_eq!(history.len(), 4);
    assert!(history.windows(2).all(|w| w[0].tx <= w[1].tx));
}

#[test]
fn test_reads_after_commit_observe_it() {
    env_logger::try_init().ok();
    let (conn, alice) = seeded_conn();
    let before = conn.current();

    conn.transact(vec![Op::add(alice, ":person/nick", "ada")]).expect("tx 3");

    // The earlier snapshot is untouched; a fresh read sees the commit.
    assert_eq!(before.get_one(alice, ":person/nick"), None);
    assert_eq!(conn.current().get_one(alice, ":person/nick"),
               Some(TypedValue::from("ada")));
}

#[test]
fn test_aggregate_query() {
    env_logger::try_init().ok();
    let (conn, _) = seeded_conn();

    let query = Query::new(
        vec![var("age")],
        vec![pattern(EntityPlace::Variable(var("e")),
                     AttributePlace::Ident(":person/age".to_string()),
                     ValuePlace::Variable(var("age")))]);

    let output = conn.q_aggregate(
        &query,
        &[],
        &[AggregateSpec::count("n"),
          AggregateSpec::of(AggregateFunction::Sum, var("age"), "total"),
          AggregateSpec::of(AggregateFunction::Max, var("age"), "oldest")]);

    assert_eq!(output.columns, vec!["n", "total", "oldest"]);
    assert_eq!(output.rows, vec![vec![
        Some(TypedValue::Long(2)),
        Some(TypedValue::Long(71)),
        Some(TypedValue::Long(40)),
    ]]);
}

#[test]
fn test_pull_through_conn() {
    env_logger::try_init().ok();
    let (conn, alice) = seeded_conn();

    let result = conn.pull(alice, &[PullPattern::Attr(":person/name".to_string()),
                                    PullPattern::WithDefault(":person/role".to_string(),
                                                             TypedValue::from("staff"))]);
    assert_eq!(result, vec![
        (":person/name".to_string(), PullValue::Scalar(TypedValue::from("Alice"))),
        (":person/role".to_string(), PullValue::Default(TypedValue::from("staff"))),
    ]);

    let entity = conn.entity(alice);
    assert_eq!(entity[":person/name"], vec![TypedValue::from("Alice")]);
}

#[test]
fn test_empty_db_edge_cases() {
    env_logger::try_init().ok();
    let conn = Conn::connect(Db::empty());

    assert!(conn.all_tx_ids().is_empty());
    assert!(conn.since(0).is_empty());
    assert!(conn.entity_history(1).is_empty());
    assert!(conn.tx_data(0).is_none());
    assert_eq!(conn.as_of(0).size(), 0);

    let query = Query::new(
        vec![var("e")],
        vec![pattern(EntityPlace::Variable(var("e")),
                     AttributePlace::Ident(":person/name".to_string()),
                     ValuePlace::Placeholder)]);
    assert!(conn.q(&query).rows.is_empty());
}
