// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use arbor::event::Scope;
use arbor::model::{GraphConfig, NodeId, ObjectNode, Value};
use arbor::persist::{MemoryPersister, PersisterHelperFactory, PersisterListener, TypeConverter};
use arbor::Session;

// Benchmark identity (keep stable):
// - Group names in this file: `ops.set_property`, `ops.subtree`
// - Case IDs (the string after the `/`) must remain stable across refactors so results
//   stay comparable over time.

struct Case {
    name: &'static str,
    tables: usize,
    columns: usize,
}

const CASES: [Case; 3] = [
    Case {
        name: "small",
        tables: 4,
        columns: 4,
    },
    Case {
        name: "medium",
        tables: 32,
        columns: 12,
    },
    Case {
        name: "large",
        tables: 128,
        columns: 24,
    },
];

fn build_session(case: &Case) -> (Session, NodeId, Vec<NodeId>) {
    let config = GraphConfig::default();
    let mut session = Session::new(config.clone());
    let root = session.root();
    let db = session
        .append_child(root, ObjectNode::database("bench"))
        .expect("database");
    let mut tables = Vec::with_capacity(case.tables);
    for t in 0..case.tables {
        let table = session
            .append_child(db, ObjectNode::table(&config, Some(format!("t{t}").as_str())))
            .expect("table");
        for c in 0..case.columns {
            session
                .append_child(table, ObjectNode::column(&config, Some(format!("c{c}").as_str())))
                .expect("column");
        }
        tables.push(table);
    }
    (session, db, tables)
}

fn with_bridge(session: &mut Session) -> MemoryPersister {
    let persister = MemoryPersister::new();
    let factory =
        PersisterHelperFactory::with_defaults(TypeConverter::with_default_codecs()).expect("factory");
    let root = session.root();
    session
        .subscribe(
            root,
            Scope::Subtree,
            Box::new(PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe");
    persister
}

fn bench_set_property(c: &mut Criterion) {
    let mut group = c.benchmark_group("ops.set_property");
    group.throughput(Throughput::Elements(1));
    for case in &CASES {
        let (mut session, _db, tables) = build_session(case);
        let persister = with_bridge(&mut session);
        let target = tables[tables.len() / 2];
        let mut flip = false;
        group.bench_function(case.name, |b| {
            b.iter(|| {
                flip = !flip;
                let remarks = if flip { "hot" } else { "cold" };
                session
                    .set_property(black_box(target), "remarks", Value::from(remarks))
                    .expect("set remarks");
                persister.clear_calls();
            });
        });
    }
    group.finish();
}

fn bench_subtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("ops.subtree");
    for case in &CASES {
        group.throughput(Throughput::Elements(case.columns as u64 + 1));
        group.bench_function(case.name, |b| {
            b.iter_batched(
                || {
                    let (mut session, db, tables) = build_session(case);
                    with_bridge(&mut session);
                    (session, db, tables[0])
                },
                |(mut session, db, table)| {
                    session.remove_child(db, table).expect("remove table");
                    assert!(session.undo().expect("undo"));
                    black_box(session.graph().len())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_set_property, bench_subtree);
criterion_main!(benches);
