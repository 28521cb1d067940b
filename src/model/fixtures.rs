// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Graph, GraphConfig, NodeId, ObjectNode};
use crate::error::GraphError;
use crate::event::{ChangeEvent, Listener, Notification, Scope};
use crate::persist::{
    MemoryPersister, PersisterHelperFactory, PersisterListener, TypeConverter,
};
use crate::session::{ColumnPair, Session};

/// A small sales schema: `customers(id)` and `orders(customer_id)` in database `sales`.
pub(crate) struct SalesModel {
    pub session: Session,
    pub config: GraphConfig,
    pub db: NodeId,
    pub customers: NodeId,
    pub customer_id: NodeId,
    pub orders: NodeId,
    pub order_customer: NodeId,
}

impl SalesModel {
    pub fn new(config: GraphConfig) -> Self {
        let mut session = Session::new(config.clone());
        let root = session.root();
        let db = session
            .append_child(root, ObjectNode::database("sales"))
            .expect("database");
        let customers = session
            .append_child(db, ObjectNode::table(&config, Some("customers")))
            .expect("customers");
        let customer_id = session
            .append_child(customers, ObjectNode::column(&config, Some("id")))
            .expect("customers.id");
        let orders = session
            .append_child(db, ObjectNode::table(&config, Some("orders")))
            .expect("orders");
        let order_customer = session
            .append_child(orders, ObjectNode::column(&config, Some("customer_id")))
            .expect("orders.customer_id");
        Self {
            session,
            config,
            db,
            customers,
            customer_id,
            orders,
            order_customer,
        }
    }

    /// `orders.customer_id -> customers.id`.
    pub fn relate(&mut self, name: &str) -> NodeId {
        self.session
            .add_relationship(
                self.db,
                name,
                self.customers,
                self.orders,
                &[ColumnPair::new(self.customer_id, self.order_customer)],
            )
            .expect("relationship")
    }

    /// Subscribes a bridge to a fresh in-memory persister and forgets the snapshot calls.
    pub fn bridge(&mut self, converter: TypeConverter) -> MemoryPersister {
        let persister = MemoryPersister::new();
        let factory = PersisterHelperFactory::with_defaults(converter).expect("factory");
        let root = self.session.root();
        self.session
            .subscribe(
                root,
                Scope::Subtree,
                Box::new(PersisterListener::new(persister.clone(), factory)),
            )
            .expect("subscribe bridge");
        persister.clear_calls();
        persister
    }

    pub fn record(&mut self) -> Recorder {
        let recorder = Recorder::default();
        let root = self.session.root();
        self.session
            .subscribe(root, Scope::Subtree, Box::new(recorder.clone()))
            .expect("subscribe recorder");
        recorder
    }
}

/// Listener that keeps every notification it receives.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    seen: Rc<RefCell<Vec<Notification>>>,
}

impl Recorder {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.borrow().clone()
    }

    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.seen
            .borrow()
            .iter()
            .filter_map(|n| match n {
                Notification::Change(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }
}

impl Listener for Recorder {
    fn notify(&mut self, _graph: &Graph, notification: &Notification) -> Result<(), GraphError> {
        self.seen.borrow_mut().push(notification.clone());
        Ok(())
    }
}
