// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The transaction processor.
//!
//! Applying a transaction proceeds in phases, each reading only the
//! pre-transaction snapshot:
//!
//! 1. expand transaction function calls, to bounded depth;
//! 2. resolve lookup refs, and classify temp ids into upsert/allocation
//!    populations that evolve until every temp id is bound;
//! 3. expand `RetractEntity` into per-fact retractions, cascading through
//!    component refs with cycle protection;
//! 4. validate against the schema and validate every retraction;
//! 5. produce datoms and stage the successor snapshot.
//!
//! Within a transaction, retractions logically precede assertions: the emitted
//! datoms all carry the same tx id, and the index update applies retractions
//! first so that "retract old, add new" of a cardinality-one attribute
//! commits.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use chrono::Utc;

use datalith_core::{
    Datom,
    Entid,
    Ident,
    TypedValue,
    TxId,
    NULL_ENTID,
};

use entities::{
    EntityRef,
    Op,
    OpType,
};
use errors::{
    DbErrorKind,
    Result,
};
use indexes::FactKey;
use internal_types::{
    AVPair,
    Population,
    TempId,
    TempIdMap,
    Term,
    TermWithTempIds,
    TermWithoutTempIds,
    TypedValueOr,
};
use schema::Schema;
use types::{
    Db,
    LogEntry,
    Partition,
    TxReport,
};
use tx_functions::MAX_TX_FN_DEPTH;
use watcher::{
    NullWatcher,
    TransactWatcher,
};

/// Apply `ops` to `db`, yielding the successor snapshot and a report.
///
/// `db` is never touched: all staging happens against clones, so failure at
/// any phase leaves the caller's snapshot exactly as it was.
pub fn transact(db: &Db, ops: Vec<Op>, tx_instant: Option<u64>) -> Result<(Db, TxReport)> {
    transact_watched(db, ops, tx_instant, &mut NullWatcher())
}

/// Like `transact`, reporting each produced datom to `watcher` and letting it
/// veto the commit.
pub fn transact_watched(db: &Db,
                        ops: Vec<Op>,
                        tx_instant: Option<u64>,
                        watcher: &mut TransactWatcher)
                        -> Result<(Db, TxReport)> {
    let tx = db.basis_tx + 1;
    let tx_instant = tx_instant.unwrap_or_else(now_millis);

    let ops = expand_tx_fns(db, ops, MAX_TX_FN_DEPTH)?;

    let mut terms = Vec::with_capacity(ops.len());
    for op in ops {
        terms.push(term_for_op(db, op)?);
    }

    let mut partition = db.partition.clone();
    let (terms, tempids) = resolve_temp_ids(db, terms, &mut partition)?;
    let terms = expand_retract_entities(db, terms);
    let datoms = validate_and_produce(db, terms, tx)?;

    for datom in &datoms {
        let op = if datom.added { OpType::Add } else { OpType::Retract };
        watcher.datom(op, datom.e, &datom.a, &datom.v);
    }
    watcher.done(tx)?;

    let entry = LogEntry {
        tx: tx,
        tx_instant: tx_instant,
        datoms: datoms,
    };

    let mut next = db.clone();
    next.partition = partition;
    next.apply_log_entry(&entry);

    debug!("transacted tx {} ({} datoms)", tx, entry.datoms.len());

    let report = TxReport {
        tx_id: tx,
        tx_instant: tx_instant,
        datoms: entry.datoms,
        tempids: tempids.into_iter().collect::<BTreeMap<Entid, Entid>>(),
    };
    Ok((next, report))
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Replace every `Call` with the expansion of the named function, recursively,
/// failing on unknown names and on expansion deeper than `depth` levels.
fn expand_tx_fns(db: &Db, ops: Vec<Op>, depth: usize) -> Result<Vec<Op>> {
    let mut expanded = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Op::Call(name, args) => {
                if depth == 0 {
                    bail!(DbErrorKind::Custom(format!(
                        "expansion of transaction function {} exceeded depth {}",
                        name, MAX_TX_FN_DEPTH)));
                }
                let f = match db.tx_fns().get(&name) {
                    Some(f) => f.clone(),
                    None => bail!(DbErrorKind::Custom(format!(
                        "no transaction function named {}", name))),
                };
                let sub = f.apply(db, &args)?;
                expanded.extend(expand_tx_fns(db, sub, depth - 1)?);
            },
            op => expanded.push(op),
        }
    }
    Ok(expanded)
}

fn term_for_op(db: &Db, op: Op) -> Result<TermWithTempIds> {
    match op {
        Op::Add(e, a, v) => {
            Ok(Term::AddOrRetract(OpType::Add, entid_or_temp(db, e)?, a, value_or_temp(v)))
        },
        Op::Retract(e, a, v) => {
            Ok(Term::AddOrRetract(OpType::Retract, entid_or_temp(db, e)?, a, value_or_temp(v)))
        },
        Op::RetractEntity(e) => Ok(Term::RetractEntity(entid_or_temp(db, e)?)),
        Op::Call(name, _) => {
            // Calls were expanded before terms are built.
            bail!(DbErrorKind::Custom(format!("unexpanded transaction function {}", name)))
        },
    }
}

/// Classify an entity reference: lookup refs resolve immediately through AVET,
/// negative entids become pending temp ids.
fn entid_or_temp(db: &Db, r: EntityRef) -> Result<::std::result::Result<Entid, TempId>> {
    match r {
        EntityRef::Entid(NULL_ENTID) => {
            bail!(DbErrorKind::Custom("the null entid 0 cannot appear in a transaction".to_string()))
        },
        EntityRef::Entid(e) if e < 0 => Ok(Err(e)),
        EntityRef::Entid(e) => Ok(Ok(e)),
        EntityRef::LookupRef(a, v) => {
            match db.entity_with_attr_value(&a, &v) {
                Some(e) => Ok(Ok(e)),
                None => bail!(DbErrorKind::Custom(format!(
                    "no entity found for lookup ref [{} {:?}]", a, v))),
            }
        },
    }
}

fn value_or_temp(v: TypedValue) -> TypedValueOr<TempId> {
    match v {
        TypedValue::Ref(e) if e < 0 => Err(e),
        v => Ok(v),
    }
}

/// Population types classify terms by how their temp ids can be bound.
#[derive(Clone,Copy,Debug,Eq,PartialEq)]
enum PopulationType {
    /// [:add TEMPID a v] where a is unique-identity: may upsert to an
    /// existing entity carrying `a v`.
    UpsertsE,

    /// [:add TEMPID a OTHERID] where a is unique-identity: upsertable once
    /// the value temp id is bound.
    UpsertsEV,

    /// Terms that reference temp ids without upsert potential; their temp ids
    /// are allocated fresh entids if nothing else binds them.
    Allocations,

    /// Terms that do not reference temp IDs.
    Inert,
}

impl TermWithTempIds {
    fn population_type(&self, schema: Option<&Schema>) -> PopulationType {
        let is_upsert = |a: &Ident| schema.map_or(false, |s| s.unique_identity_attr(a));
        match *self {
            Term::AddOrRetract(ref op, Err(_), ref a, Err(_)) => {
                if *op == OpType::Add && is_upsert(a) {
                    PopulationType::UpsertsEV
                } else {
                    PopulationType::Allocations
                }
            },
            Term::AddOrRetract(ref op, Err(_), ref a, Ok(_)) => {
                if *op == OpType::Add && is_upsert(a) {
                    PopulationType::UpsertsE
                } else {
                    PopulationType::Allocations
                }
            },
            Term::AddOrRetract(_, Ok(_), _, Err(_)) => PopulationType::Allocations,
            Term::AddOrRetract(_, Ok(_), _, Ok(_)) => PopulationType::Inert,
            Term::RetractEntity(Err(_)) => PopulationType::Allocations,
            Term::RetractEntity(Ok(_)) => PopulationType::Inert,
        }
    }
}

#[derive(Clone,Debug,Default)]
struct Generation {
    upserts_e: Population,
    upserts_ev: Population,
    allocations: Population,
    upserted: Population,
    resolved: Population,
}

#[derive(Clone,Debug,Default)]
struct FinalPopulations {
    upserted: Vec<TermWithoutTempIds>,
    resolved: Vec<TermWithoutTempIds>,
    allocated: Vec<TermWithoutTempIds>,
}

impl Generation {
    /// Split terms into a generation of populations that need to evolve to
    /// have their temp IDs resolved or allocated, and a population of inert
    /// terms that do not reference temp IDs.
    fn from<I>(terms: I, schema: Option<&Schema>) -> (Generation, Population)
    where I: IntoIterator<Item = TermWithTempIds> {
        let mut generation = Generation::default();
        let mut inert = vec![];

        for term in terms.into_iter() {
            match term.population_type(schema) {
                PopulationType::UpsertsEV => generation.upserts_ev.push(term),
                PopulationType::UpsertsE => generation.upserts_e.push(term),
                PopulationType::Allocations => generation.allocations.push(term),
                PopulationType::Inert => inert.push(term),
            }
        }

        (generation, inert)
    }

    fn can_evolve(&self) -> bool {
        !self.upserts_e.is_empty() || !self.upserts_ev.is_empty()
    }

    /// Evolve this generation one step further by rewriting the existing
    /// populations using the given temp id bindings.
    fn evolve_one_step(self, temp_id_map: &TempIdMap) -> Generation {
        let mut next = Generation::default();
        next.upserted = self.upserted;
        next.resolved = self.resolved;

        for term in self.upserts_e {
            match term {
                Term::AddOrRetract(op, Err(t), a, v) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => next.upserted.push(Term::AddOrRetract(op, Ok(n), a, v)),
                        None => next.allocations.push(Term::AddOrRetract(op, Err(t), a, v)),
                    }
                },
                _ => unreachable!("upserts_e holds temp-e terms only"),
            }
        }

        for term in self.upserts_ev {
            match term {
                Term::AddOrRetract(op, Err(t1), a, Err(t2)) => {
                    match (temp_id_map.get(&t1), temp_id_map.get(&t2)) {
                        (Some(&n1), Some(&n2)) => {
                            next.resolved.push(Term::AddOrRetract(op, Ok(n1), a, Ok(TypedValue::Ref(n2))))
                        },
                        (None, Some(&n2)) => {
                            next.upserts_e.push(Term::AddOrRetract(op, Err(t1), a, Ok(TypedValue::Ref(n2))))
                        },
                        (Some(&n1), None) => {
                            next.allocations.push(Term::AddOrRetract(op, Ok(n1), a, Err(t2)))
                        },
                        (None, None) => {
                            next.allocations.push(Term::AddOrRetract(op, Err(t1), a, Err(t2)))
                        },
                    }
                },
                _ => unreachable!("upserts_ev holds temp-e temp-v terms only"),
            }
        }

        for term in self.allocations {
            match term {
                Term::AddOrRetract(op, Err(t1), a, Err(t2)) => {
                    match (temp_id_map.get(&t1), temp_id_map.get(&t2)) {
                        (Some(&n1), Some(&n2)) => {
                            next.resolved.push(Term::AddOrRetract(op, Ok(n1), a, Ok(TypedValue::Ref(n2))))
                        },
                        (None, Some(&n2)) => {
                            next.allocations.push(Term::AddOrRetract(op, Err(t1), a, Ok(TypedValue::Ref(n2))))
                        },
                        (Some(&n1), None) => {
                            next.allocations.push(Term::AddOrRetract(op, Ok(n1), a, Err(t2)))
                        },
                        (None, None) => {
                            next.allocations.push(Term::AddOrRetract(op, Err(t1), a, Err(t2)))
                        },
                    }
                },
                Term::AddOrRetract(op, Err(t), a, v) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => next.resolved.push(Term::AddOrRetract(op, Ok(n), a, v)),
                        None => next.allocations.push(Term::AddOrRetract(op, Err(t), a, v)),
                    }
                },
                Term::AddOrRetract(op, e, a, Err(t)) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => next.resolved.push(Term::AddOrRetract(op, e, a, Ok(TypedValue::Ref(n)))),
                        None => next.allocations.push(Term::AddOrRetract(op, e, a, Err(t))),
                    }
                },
                Term::RetractEntity(Err(t)) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => next.resolved.push(Term::RetractEntity(Ok(n))),
                        None => next.allocations.push(Term::RetractEntity(Err(t))),
                    }
                },
                term => next.resolved.push(term),
            }
        }

        next
    }

    /// Collect the `tempid -> [a v]` pairs eligible for upsert this round.
    fn temp_id_avs(&self) -> Vec<(TempId, AVPair)> {
        let mut temp_id_avs: Vec<(TempId, AVPair)> = vec![];
        for term in &self.upserts_e {
            match *term {
                Term::AddOrRetract(_, Err(t), ref a, Ok(ref v)) => {
                    temp_id_avs.push((t, (a.clone(), v.clone())));
                },
                _ => unreachable!("upserts_e holds temp-e terms only"),
            }
        }
        temp_id_avs
    }

    fn temp_ids_in_allocations(&self) -> BTreeSet<TempId> {
        assert!(self.upserts_e.is_empty(),
                "All upserts should have been upserted, resolved, or moved to the allocated population!");
        assert!(self.upserts_ev.is_empty(),
                "All upserts should have been upserted, resolved, or moved to the allocated population!");

        let mut temp_ids: BTreeSet<TempId> = BTreeSet::default();
        for term in self.allocations.iter() {
            match *term {
                Term::AddOrRetract(_, Err(t1), _, Err(t2)) => {
                    temp_ids.insert(t1);
                    temp_ids.insert(t2);
                },
                Term::AddOrRetract(_, Err(t), _, Ok(_)) => {
                    temp_ids.insert(t);
                },
                Term::AddOrRetract(_, Ok(_), _, Err(t)) => {
                    temp_ids.insert(t);
                },
                Term::RetractEntity(Err(t)) => {
                    temp_ids.insert(t);
                },
                _ => {},
            }
        }
        temp_ids
    }

    /// After allocating entids for the remaining temp ids, segment `self` into
    /// populations with no references to temp ids.
    fn into_final_populations(self, temp_id_map: &TempIdMap) -> FinalPopulations {
        assert!(self.upserts_e.is_empty());
        assert!(self.upserts_ev.is_empty());

        let mut populations = FinalPopulations::default();
        populations.upserted = self.upserted.into_iter().map(|term| term.unwrap()).collect();
        populations.resolved = self.resolved.into_iter().map(|term| term.unwrap()).collect();

        for term in self.allocations {
            let allocated = match term {
                Term::AddOrRetract(op, Err(t1), a, Err(t2)) => {
                    match (temp_id_map.get(&t1), temp_id_map.get(&t2)) {
                        (Some(&n1), Some(&n2)) => Term::AddOrRetract(op, n1, a, TypedValue::Ref(n2)),
                        _ => unreachable!("every temp id was allocated"),
                    }
                },
                Term::AddOrRetract(op, Err(t), a, Ok(v)) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => Term::AddOrRetract(op, n, a, v),
                        _ => unreachable!("every temp id was allocated"),
                    }
                },
                Term::AddOrRetract(op, Ok(e), a, Err(t)) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => Term::AddOrRetract(op, e, a, TypedValue::Ref(n)),
                        _ => unreachable!("every temp id was allocated"),
                    }
                },
                Term::RetractEntity(Err(t)) => {
                    match temp_id_map.get(&t) {
                        Some(&n) => Term::RetractEntity(n),
                        _ => unreachable!("every temp id was allocated"),
                    }
                },
                term => term.unwrap(),
            };
            populations.allocated.push(allocated);
        }

        populations
    }
}

/// Bind every temp id: unique-identity upserts rebind to existing entities,
/// everything else is allocated a fresh entid from `partition`.
fn resolve_temp_ids(db: &Db,
                    terms: Vec<TermWithTempIds>,
                    partition: &mut Partition)
                    -> Result<(Vec<TermWithoutTempIds>, TempIdMap)> {
    let (mut generation, inert) = Generation::from(terms, db.schema());
    let mut temp_id_map = TempIdMap::default();

    while generation.can_evolve() {
        for (temp_id, (a, v)) in generation.temp_id_avs() {
            if let Some(e) = db.entity_with_attr_value(&a, &v) {
                if let Some(&previous) = temp_id_map.get(&temp_id) {
                    if previous != e {
                        bail!(DbErrorKind::SchemaViolation(format!(
                            "conflicting upserts for temp id {}: {} and {}",
                            temp_id, previous, e)));
                    }
                }
                temp_id_map.insert(temp_id, e);
            }
        }
        generation = generation.evolve_one_step(&temp_id_map);
    }

    for temp_id in generation.temp_ids_in_allocations() {
        if !temp_id_map.contains_key(&temp_id) {
            temp_id_map.insert(temp_id, partition.allocate_entid());
        }
    }

    let populations = generation.into_final_populations(&temp_id_map);

    let mut resolved = Vec::new();
    resolved.extend(populations.upserted);
    resolved.extend(populations.resolved);
    resolved.extend(populations.allocated);
    resolved.extend(inert.into_iter().map(|term| term.unwrap()));
    Ok((resolved, temp_id_map))
}

/// Replace each `RetractEntity` with per-fact retractions gathered from the
/// pre-transaction current view: the entity's own datoms (EAVT), every inbound
/// reference (VAET), and recursively each component target.  A visited set
/// guards against reference cycles, and a seen set keeps the expansion from
/// emitting the same retraction twice.
fn expand_retract_entities(db: &Db, terms: Vec<TermWithoutTempIds>) -> Vec<TermWithoutTempIds> {
    let mut expanded = Vec::with_capacity(terms.len());
    for term in terms {
        match term {
            Term::RetractEntity(e) => {
                let mut visited: HashSet<Entid> = HashSet::new();
                let mut seen: HashSet<FactKey> = HashSet::new();
                retract_entity_into(db, e, &mut visited, &mut seen, &mut expanded);
            },
            term => expanded.push(term),
        }
    }
    expanded
}

fn retract_entity_into(db: &Db,
                       e: Entid,
                       visited: &mut HashSet<Entid>,
                       seen: &mut HashSet<FactKey>,
                       out: &mut Vec<TermWithoutTempIds>) {
    if !visited.insert(e) {
        return;
    }

    for datom in db.current().datoms_for_entity(e) {
        let component_target = datom.v.as_ref_entid().and_then(|target| {
            if db.schema().map_or(false, |s| s.is_component(&datom.a)) {
                Some(target)
            } else {
                None
            }
        });
        if seen.insert(datom.fact()) {
            out.push(Term::AddOrRetract(OpType::Retract, datom.e, datom.a, datom.v));
        }
        if let Some(target) = component_target {
            retract_entity_into(db, target, visited, seen, out);
        }
    }

    for datom in db.current().datoms_referencing(e) {
        if seen.insert(datom.fact()) {
            out.push(Term::AddOrRetract(OpType::Retract, datom.e, datom.a, datom.v));
        }
    }
}

/// Schema validation, retraction validation, and datom production.
///
/// The emitted vector lists retraction datoms before assertion datoms; both
/// carry the transaction's single tx id.
fn validate_and_produce(db: &Db, terms: Vec<TermWithoutTempIds>, tx: TxId) -> Result<Vec<Datom>> {
    let mut adds: Vec<FactKey> = Vec::new();
    let mut added: HashSet<FactKey> = HashSet::new();
    let mut retracts: Vec<FactKey> = Vec::new();

    for term in terms {
        match term {
            Term::AddOrRetract(OpType::Add, e, a, v) => {
                let key = (e, a, v);
                if added.insert(key.clone()) {
                    adds.push(key);
                }
            },
            Term::AddOrRetract(OpType::Retract, e, a, v) => {
                retracts.push((e, a, v));
            },
            Term::RetractEntity(_) => unreachable!("RetractEntity was expanded"),
        }
    }

    if let Some(schema) = db.schema() {
        validate_schema(db, schema, &adds, &retracts)?;
    }

    // Every retract must name a fact currently asserted before this
    // transaction, or asserted by this transaction; a second retract of the
    // same fact finds it consumed.
    let mut consumed: HashSet<FactKey> = HashSet::new();
    for key in &retracts {
        let exists = db.is_asserted(key.0, &key.1, &key.2) || added.contains(key);
        if !exists || !consumed.insert(key.clone()) {
            bail!(DbErrorKind::FactNotFound(key.0, key.1.clone(), key.2.clone()));
        }
    }

    let mut datoms = Vec::with_capacity(retracts.len() + adds.len());
    for (e, a, v) in retracts {
        datoms.push(Datom { e: e, a: a, v: v, tx: tx, added: false });
    }
    for (e, a, v) in adds {
        datoms.push(Datom { e: e, a: a, v: v, tx: tx, added: true });
    }
    Ok(datoms)
}

fn validate_schema(db: &Db,
                   schema: &Schema,
                   adds: &[FactKey],
                   retracts: &[FactKey])
                   -> Result<()> {
    let retract_set: HashSet<&FactKey> = retracts.iter().collect();

    for &(_, ref a, ref v) in adds {
        schema.check_assertion(a, v)?;
    }

    // Retractions of ref values are accepted without type checking; they may
    // be produced mechanically by entity retraction.
    for &(_, ref a, ref v) in retracts {
        if !v.is_ref() {
            schema.check_assertion(a, v)?;
        }
    }

    // Cardinality-one: at most one value may stand per (e, a) after this
    // transaction.
    let mut card_one: HashMap<(Entid, &Ident), &TypedValue> = HashMap::new();
    for &(e, ref a, ref v) in adds {
        let attribute = match schema.attribute_for_ident(a) {
            Some(attribute) => attribute,
            None => continue,
        };
        if attribute.multival {
            continue;
        }
        if let Some(&other) = card_one.get(&(e, a)) {
            if other != v {
                bail!(DbErrorKind::SchemaViolation(format!(
                    "cardinality conflict: two values asserted for [{} {}]: {:?} and {:?}",
                    e, a, other, v)));
            }
            continue;
        }
        card_one.insert((e, a), v);

        for datom in db.current().datoms_for_entity_attr(e, a) {
            if &datom.v != v && !retract_set.contains(&(e, a.clone(), datom.v.clone())) {
                bail!(DbErrorKind::SchemaViolation(format!(
                    "cardinality conflict: [{} {}] is {:?}, and {:?} was asserted without retracting it",
                    e, a, datom.v, v)));
            }
        }
    }

    // Uniqueness: no two distinct entities may carry the same value of a
    // unique attribute once this transaction commits.
    let mut unique_in_tx: HashMap<(&Ident, &TypedValue), Entid> = HashMap::new();
    for &(e, ref a, ref v) in adds {
        let attribute = match schema.attribute_for_ident(a) {
            Some(attribute) => attribute,
            None => continue,
        };
        if attribute.unique.is_none() {
            continue;
        }
        if let Some(&other) = unique_in_tx.get(&(a, v)) {
            if other != e {
                bail!(DbErrorKind::SchemaViolation(format!(
                    "uniqueness conflict: {:?} of {} asserted for both {} and {}",
                    v, a, other, e)));
            }
        }
        unique_in_tx.insert((a, v), e);

        if let Some(holder) = db.entity_with_attr_value(a, v) {
            if holder != e && !retract_set.contains(&(holder, a.clone(), v.clone())) {
                bail!(DbErrorKind::SchemaViolation(format!(
                    "uniqueness conflict: {:?} of {} is already carried by {}",
                    v, a, holder)));
            }
        }
    }

    Ok(())
}
