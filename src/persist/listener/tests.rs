// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::{fixture, rstest};

use crate::error::{GraphError, PersistError};
use crate::model::fixtures::SalesModel;
use crate::model::{
    properties_of, CustomValue, EnumValue, GraphConfig, Image, KeyRule, NodeId, NodeKind,
    Nullability, ObjectNode, PropertyDescriptor, PropertyType, Value,
};
use crate::persist::convert::{DataType, TypeConverter, WireValue};
use crate::persist::persister::{MemoryPersister, PersistCall, PersistOp};
use crate::session::Session;

#[fixture]
fn sales() -> SalesModel {
    SalesModel::new(GraphConfig::default())
}

fn removed_ids(persister: &MemoryPersister) -> Vec<NodeId> {
    persister
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            PersistOp::Remove { id } => Some(id),
            _ => None,
        })
        .collect()
}

fn property_ops(persister: &MemoryPersister) -> Vec<PersistOp> {
    persister
        .ops()
        .into_iter()
        .filter(|op| matches!(op, PersistOp::Property { .. }))
        .collect()
}

/// Some node of `kind` other than `avoid`.
fn other_node(session: &Session, kind: NodeKind, avoid: &[NodeId]) -> NodeId {
    let graph = session.graph();
    graph
        .subtree(graph.root())
        .into_iter()
        .find(|id| {
            !avoid.contains(id) && graph.get(*id).is_some_and(|node| node.kind() == kind)
        })
        .expect("candidate node")
}

/// A valid value for `descriptor` that differs from `current`.
fn distinct_value(
    session: &Session,
    node: NodeId,
    descriptor: &PropertyDescriptor,
    current: &Value,
    salt: u8,
) -> Value {
    match descriptor.ty {
        PropertyType::Bool => Value::Bool(!current.as_bool().unwrap_or(false)),
        PropertyType::Int => Value::Int(current.as_int().unwrap_or(0) + 1),
        PropertyType::Text => Value::text(format!("{}-{salt}", current.as_text().unwrap_or("v"))),
        PropertyType::Enum(kind) => {
            let candidates: Vec<EnumValue> = match kind {
                crate::model::EnumKind::Nullability => Nullability::ALL
                    .into_iter()
                    .map(EnumValue::Nullability)
                    .collect(),
                crate::model::EnumKind::KeyRule => {
                    KeyRule::ALL.into_iter().map(EnumValue::KeyRule).collect()
                }
            };
            candidates
                .into_iter()
                .map(Value::Enum)
                .find(|value| value != current)
                .expect("another variant")
        }
        PropertyType::Ref => {
            let kind = match descriptor.name {
                "pkTable" | "fkTable" => NodeKind::Table,
                _ => NodeKind::Column,
            };
            let mut avoid = vec![node];
            avoid.extend(current.as_ref_id());
            Value::Ref(other_node(session, kind, &avoid))
        }
        PropertyType::Image => {
            Value::Image(Image::filled(1, 1, [salt, 0, 0, 255]).expect("image"))
        }
        PropertyType::Custom(name) => Value::Custom(
            CustomValue::new(name).with_field("url", format!("jdbc:sales:{salt}")),
        ),
    }
}

#[rstest]
fn every_settable_property_round_trips_as_one_call(mut sales: SalesModel) {
    sales.relate("fk_orders_customers");
    let index = sales
        .session
        .append_child(sales.orders, ObjectNode::index("by_customer", false))
        .expect("index");
    sales
        .session
        .append_child(
            index,
            ObjectNode::index_column("customer_id", Some(sales.order_customer)),
        )
        .expect("index column");

    let converter = TypeConverter::with_default_codecs();
    let persister = sales.bridge(converter.clone());
    let graph = sales.session.graph();
    let nodes = graph.subtree(graph.root());

    let mut checked = 0;
    for (salt, node) in nodes.into_iter().enumerate() {
        let kind = sales.session.graph().node(node).expect("node").kind();
        for descriptor in properties_of(kind).iter().filter(|d| d.settable) {
            let before = sales
                .session
                .property(node, descriptor.name)
                .expect("read")
                .clone();
            let value = distinct_value(&sales.session, node, descriptor, &before, salt as u8);
            persister.clear_calls();
            sales
                .session
                .set_property(node, descriptor.name, value)
                .unwrap_or_else(|err| panic!("{kind}.{}: {err}", descriptor.name));
            let after = sales.session.property(node, descriptor.name).expect("read");

            let ops = property_ops(&persister);
            assert_eq!(ops.len(), 1, "{kind}.{}", descriptor.name);
            assert_eq!(
                ops[0],
                PersistOp::Property {
                    id: node,
                    name: descriptor.name.into(),
                    data_type: converter.data_type(descriptor.ty).expect("data type"),
                    old: converter.to_wire(&before).expect("old"),
                    new: converter.to_wire(after).expect("new"),
                },
                "{kind}.{}",
                descriptor.name
            );
            checked += 1;
        }
    }
    assert!(checked > 30, "only {checked} properties exercised");
}

#[rstest]
fn frame_reaches_the_persister_in_mutation_order(mut sales: SalesModel) {
    let persister = sales.bridge(TypeConverter::with_default_codecs());
    let session = &mut sales.session;

    session.begin("rename schema").expect("begin");
    session
        .set_property(sales.customers, "name", Value::from("clients"))
        .expect("rename customers");
    session
        .set_property(sales.order_customer, "remarks", Value::from("fk"))
        .expect("remarks");
    session
        .set_property(sales.orders, "name", Value::from("purchases"))
        .expect("rename orders");
    assert!(persister.calls().is_empty(), "nothing leaves before commit");
    session.commit().expect("commit");

    let calls = persister.calls();
    assert_eq!(calls.first(), Some(&PersistCall::Begin("rename schema".into())));
    assert_eq!(calls.last(), Some(&PersistCall::Commit));
    let touched: Vec<(NodeId, String)> = property_ops(&persister)
        .into_iter()
        .filter_map(|op| match op {
            PersistOp::Property { id, name, .. } => Some((id, name.to_string())),
            _ => None,
        })
        .collect();
    assert_eq!(
        touched,
        [
            (sales.customers, "name".to_owned()),
            (sales.order_customer, "remarks".to_owned()),
            (sales.orders, "name".to_owned()),
        ]
    );
    assert_eq!(calls.len(), 5);
}

#[rstest]
fn shared_column_is_removed_once_when_its_count_reaches_zero(mut sales: SalesModel) {
    let persister = sales.bridge(TypeConverter::with_default_codecs());
    let column = sales.order_customer;
    let count = |sales: &SalesModel| {
        sales
            .session
            .graph()
            .node(column)
            .map(ObjectNode::reference_count)
            .ok()
    };
    assert_eq!(count(&sales), Some(1));

    let first = sales.relate("fk_a");
    let second = sales.relate("fk_b");
    assert_eq!(count(&sales), Some(3));
    assert_eq!(
        persister.property(column, "referenceCount"),
        Some(WireValue::Int(3))
    );

    sales.session.remove_relationship(first).expect("remove first");
    sales.session.remove_relationship(second).expect("remove second");
    assert_eq!(count(&sales), Some(1));
    assert!(!removed_ids(&persister).contains(&column));

    sales.session.release_column(column).expect("release owner");
    assert_eq!(count(&sales), None);
    assert_eq!(removed_ids(&persister), [first, second, column]);
    assert_eq!(persister.ops().last(), Some(&PersistOp::Remove { id: column }));
    assert!(!persister.contains(column));
}

#[rstest]
fn table_with_exported_key_is_guarded_until_the_relationship_goes(mut sales: SalesModel) {
    let relationship = sales.relate("fk_orders_customers");
    let persister = sales.bridge(TypeConverter::with_default_codecs());

    let err = sales
        .session
        .remove_child(sales.db, sales.customers)
        .expect_err("dependent relationship");
    assert!(matches!(err, GraphError::ObjectDependent { node, .. } if node == sales.customers));
    assert!(sales.session.graph().contains(sales.customers));
    assert!(persister.calls().is_empty());

    sales
        .session
        .remove_relationship(relationship)
        .expect("remove relationship");
    assert!(sales
        .session
        .remove_child(sales.db, sales.customers)
        .expect("remove table"));
    assert_eq!(removed_ids(&persister), [relationship, sales.customers]);
}

#[test]
fn unsupported_type_produces_no_calls() {
    let mut session = Session::new(GraphConfig::default());
    let persister = MemoryPersister::new();
    let factory = crate::persist::PersisterHelperFactory::with_defaults(TypeConverter::new())
        .expect("factory");
    let root = session.root();
    session
        .subscribe(
            root,
            crate::event::Scope::Subtree,
            Box::new(super::PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe");
    persister.clear_calls();

    let err = session
        .append_child(root, ObjectNode::database("sales"))
        .expect_err("data-source has no codec");
    assert!(matches!(
        err,
        GraphError::Persist(PersistError::UnsupportedType { ref type_name }) if type_name == "data-source"
    ));
    assert!(persister.calls().is_empty());
    // The in-memory mutation stands; only the persisted copy is behind.
    assert_eq!(session.graph().children(root, None).expect("children").len(), 1);
}

#[test]
fn failed_conversion_poisons_the_whole_frame() {
    let mut session = Session::new(GraphConfig::default());
    let persister = MemoryPersister::new();
    let factory = crate::persist::PersisterHelperFactory::with_defaults(TypeConverter::new())
        .expect("factory");
    let root = session.root();
    session
        .subscribe(
            root,
            crate::event::Scope::Subtree,
            Box::new(super::PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe");
    persister.clear_calls();

    session.begin("import").expect("begin");
    session
        .set_property(root, "name", Value::from("model"))
        .expect("rename root");
    assert!(session
        .append_child(root, ObjectNode::database("sales"))
        .is_err());
    let err = session.commit().expect_err("poisoned");
    assert!(matches!(err, GraphError::IllegalState(_)));
    assert!(!session.in_transaction());
    assert!(persister.calls().is_empty());
}

#[rstest]
fn conflicting_write_is_reported_after_the_mutation(mut sales: SalesModel) {
    let persister = sales.bridge(TypeConverter::with_default_codecs());
    persister.simulate_external_write(sales.orders, "name", WireValue::String("invoices".into()));

    let err = sales
        .session
        .set_property(sales.orders, "name", Value::from("purchases"))
        .expect_err("conflict");
    assert!(matches!(err, GraphError::Persist(PersistError::Conflict { .. })));
    assert_eq!(
        sales.session.property(sales.orders, "name").expect("name"),
        &Value::from("purchases")
    );
    assert_eq!(persister.calls().last(), Some(&PersistCall::Rollback));
}

#[rstest]
fn rollback_sends_nothing(mut sales: SalesModel) {
    let persister = sales.bridge(TypeConverter::with_default_codecs());
    sales.session.begin("draft").expect("begin");
    sales
        .session
        .set_property(sales.orders, "remarks", Value::from("draft"))
        .expect("remarks");
    sales.session.rollback().expect("rollback");
    assert!(persister.calls().is_empty());

    sales
        .session
        .set_property(sales.orders, "remarks", Value::from("final"))
        .expect("remarks");
    let ops = property_ops(&persister);
    assert!(matches!(
        &ops[..],
        [PersistOp::Property { old: WireValue::String(old), .. }] if old.is_empty()
    ));
}

#[rstest]
fn snapshot_lists_objects_before_properties(mut sales: SalesModel) {
    sales.relate("fk_orders_customers");
    let persister = MemoryPersister::new();
    let factory =
        crate::persist::PersisterHelperFactory::with_defaults(TypeConverter::with_default_codecs())
            .expect("factory");
    let root = sales.session.root();
    sales
        .session
        .subscribe(
            root,
            crate::event::Scope::Subtree,
            Box::new(super::PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe");

    let calls = persister.calls();
    assert_eq!(calls.first(), Some(&PersistCall::Begin(super::SNAPSHOT_LABEL.into())));
    let ops = persister.ops();
    let first_property = ops
        .iter()
        .position(|op| matches!(op, PersistOp::Property { .. }))
        .expect("properties");
    assert_eq!(first_property, sales.session.graph().len());
    assert!(ops[first_property..]
        .iter()
        .all(|op| matches!(op, PersistOp::Property { .. })));
    assert!(ops.iter().any(|op| matches!(
        op,
        PersistOp::Property { id, name, new: WireValue::Int(2), .. }
            if *id == sales.order_customer && name == "referenceCount"
    )));
    assert!(ops.iter().any(|op| matches!(
        op,
        PersistOp::Property { data_type: DataType::Custom(name), .. } if name == "data-source"
    )));
}

#[rstest]
fn undo_is_persisted_like_any_change(mut sales: SalesModel) {
    let persister = sales.bridge(TypeConverter::with_default_codecs());
    sales
        .session
        .remove_child(sales.db, sales.orders)
        .expect("remove orders");
    persister.clear_calls();

    assert!(sales.session.undo().expect("undo"));
    let calls = persister.calls();
    assert_eq!(calls.first(), Some(&PersistCall::Begin("undo remove table".into())));
    let recreated = sales
        .session
        .graph()
        .children(sales.db, Some(NodeKind::Table))
        .expect("tables");
    assert_eq!(recreated.len(), 2);
    assert!(!recreated.contains(&sales.orders));
    assert!(recreated.iter().all(|id| persister.contains(*id)));
}

#[rstest]
fn bridge_below_the_root_removes_its_root_with_an_ancestor(mut sales: SalesModel) {
    let persister = MemoryPersister::new();
    let factory =
        crate::persist::PersisterHelperFactory::with_defaults(TypeConverter::with_default_codecs())
            .expect("factory");
    sales
        .session
        .subscribe(
            sales.orders,
            crate::event::Scope::Subtree,
            Box::new(super::PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe at orders");
    assert!(persister.contains(sales.orders));
    assert!(!persister.contains(sales.db));
    persister.clear_calls();

    let root = sales.session.root();
    assert!(sales
        .session
        .remove_child(root, sales.db)
        .expect("remove database"));

    assert_eq!(removed_ids(&persister), [sales.orders]);
    assert_eq!(
        persister.calls().first(),
        Some(&PersistCall::Begin("remove database".into()))
    );
    assert_eq!(persister.calls().last(), Some(&PersistCall::Commit));
    assert!(!persister.contains(sales.orders));
    assert!(!persister.contains(sales.order_customer));
    assert_eq!(persister.object_count(), 0);
}

#[rstest]
fn bridge_below_the_root_ignores_removals_outside_its_subtree(mut sales: SalesModel) {
    let persister = MemoryPersister::new();
    let factory =
        crate::persist::PersisterHelperFactory::with_defaults(TypeConverter::with_default_codecs())
            .expect("factory");
    sales
        .session
        .subscribe(
            sales.orders,
            crate::event::Scope::Subtree,
            Box::new(super::PersisterListener::new(persister.clone(), factory)),
        )
        .expect("subscribe at orders");
    persister.clear_calls();

    assert!(sales
        .session
        .remove_child(sales.db, sales.customers)
        .expect("remove customers"));
    assert!(persister.calls().is_empty());
    assert!(persister.contains(sales.orders));
}
