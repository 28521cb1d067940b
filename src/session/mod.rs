// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Mutation entry points for one object graph.
//!
//! A [`Session`] owns the graph, the event bus and the undo log. Every public mutator
//! validates first, applies the change, and then fires exactly the events that describe it.
//! Structural failures leave the graph untouched. Listener failures (for example a persister
//! conflict) are returned after the mutation has completed; the graph is not rolled back.

mod relationships;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{GraphError, PopulationError};
use crate::event::{Change, ChangeEvent, EventBus, Listener, ListenerId, Scope};
use crate::model::{
    descriptor, properties_of, Graph, GraphConfig, NodeId, NodeKind, ObjectNode,
    PropertyDescriptor, PropertyType, SessionId, Subtree, Value,
};
use crate::undo::{Entry, Replay, Step, UndoLog};

pub use relationships::ColumnPair;

/// External source of children for nodes created with [`ObjectNode::unpopulated`].
pub trait Populator {
    fn populate(&mut self, graph: &Graph, node: NodeId) -> Result<Vec<ObjectNode>, PopulationError>;
}

pub struct Session {
    id: SessionId,
    config: GraphConfig,
    graph: Graph,
    bus: EventBus,
    undo: UndoLog,
    populator: Option<Box<dyn Populator>>,
    deferred: Option<GraphError>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("nodes", &self.graph.len())
            .field("bus", &self.bus)
            .field("populator", &self.populator.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(config: GraphConfig) -> Self {
        Self::with_graph(config, Graph::new(ObjectNode::root()))
    }

    pub fn with_graph(config: GraphConfig, graph: Graph) -> Self {
        Self {
            id: SessionId::new(),
            config,
            graph,
            bus: EventBus::new(),
            undo: UndoLog::new(),
            populator: None,
            deferred: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    pub fn set_populator(&mut self, populator: Box<dyn Populator>) {
        self.populator = Some(populator);
    }

    pub fn subscribe(
        &mut self,
        root: NodeId,
        scope: Scope,
        listener: Box<dyn Listener>,
    ) -> Result<ListenerId, GraphError> {
        self.bus.subscribe(&self.graph, root, scope, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> Option<Box<dyn Listener>> {
        self.bus.unsubscribe(id)
    }

    pub fn in_transaction(&self) -> bool {
        self.bus.in_transaction()
    }

    /// Opens a transaction frame. Frames nest; listeners see only the outermost one.
    pub fn begin(&mut self, label: &str) -> Result<(), GraphError> {
        self.open_frame(label);
        self.settle(Ok(()))
    }

    pub fn commit(&mut self) -> Result<(), GraphError> {
        if !self.bus.in_transaction() {
            return Err(GraphError::IllegalState(
                "commit without a matching begin".to_owned(),
            ));
        }
        self.close_frame();
        self.settle(Ok(()))
    }

    /// Abandons the open frame: every change made since the outermost `begin` is reverted
    /// in memory without events, then listeners are told to drop what they staged.
    pub fn rollback(&mut self) -> Result<(), GraphError> {
        if !self.bus.in_transaction() {
            return Err(GraphError::IllegalState(
                "rollback outside a transaction".to_owned(),
            ));
        }
        self.abort_frame();
        self.settle(Ok(()))
    }

    /// Inserts `node` under `parent` at position `index` of the node's kind block.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        node: ObjectNode,
        index: usize,
    ) -> Result<NodeId, GraphError> {
        let result = self.add_child_inner(parent, node, index);
        self.settle(result)
    }

    /// Appends `node` at the end of its kind block under `parent`.
    pub fn append_child(&mut self, parent: NodeId, node: ObjectNode) -> Result<NodeId, GraphError> {
        let index = self.graph.children(parent, Some(node.kind()))?.len();
        self.add_child(parent, node, index)
    }

    /// Removes `child` and its subtree. Returns `Ok(false)` without touching anything when
    /// the child is a shared node; those go away when their reference count drops to zero.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<bool, GraphError> {
        let result = self.remove_child_inner(parent, child);
        self.settle(result)
    }

    /// Re-homes `child` under `new_parent`. The moved subtree is re-created with fresh
    /// identities (a removed identity is never reused); the new identity is returned.
    ///
    /// Listeners see the move as a removal of `child` followed by the addition of the copy,
    /// and `child` together with every id below it is unknown afterwards. Ids kept from
    /// before the move must be mapped through [`UndoLog::translate`] or looked up again.
    pub fn set_parent(
        &mut self,
        child: NodeId,
        new_parent: NodeId,
        index: usize,
    ) -> Result<NodeId, GraphError> {
        let result = self.set_parent_inner(child, new_parent, index);
        self.settle(result)
    }

    pub fn property(&self, node: NodeId, name: &str) -> Result<&Value, GraphError> {
        let node = self.graph.node(node)?;
        if descriptor(node.kind(), name).is_none() {
            return Err(GraphError::invalid_property(
                node.kind(),
                name,
                "no such property",
            ));
        }
        Ok(node.property(name))
    }

    pub fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let result = self.set_property_inner(node, name, value);
        self.settle(result)
    }

    /// Children of `node` in sibling order, optionally of one kind. An unpopulated node is
    /// populated first; on failure it stays exactly as it was.
    pub fn children(
        &mut self,
        node: NodeId,
        kind: Option<NodeKind>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let result = self
            .ensure_populated(node)
            .and_then(|()| self.graph.children(node, kind));
        self.settle(result)
    }

    pub fn dependencies(&self, node: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        self.graph.dependencies(node)
    }

    /// Nodes outside the subtree of `node` that must be dealt with before it can go.
    pub fn dependents(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.graph.node(node)?;
        Ok(self.graph.external_dependents(node))
    }

    /// Severs the edge from `node` to `dependency` (or to anything inside its subtree).
    /// Kinds that cannot outlive their endpoints are removed instead.
    pub fn remove_dependency(
        &mut self,
        node: NodeId,
        dependency: NodeId,
    ) -> Result<(), GraphError> {
        let result = self.remove_dependency_inner(node, dependency);
        self.settle(result)
    }

    /// Removes every dependent of `node` (deepest first), then `node` itself, in one frame.
    ///
    /// A shared node goes by releasing the reference its creator holds, so listeners see
    /// the count reach zero before the removal. It is refused when other references remain
    /// once its dependents are gone.
    pub fn remove_cascading(&mut self, node: NodeId) -> Result<(), GraphError> {
        let result = self.graph.node(node).map(ObjectNode::kind).and_then(|kind| {
            self.framed(&format!("remove {kind}"), |s| {
                s.sever_dependents(node)?;
                if !s.graph.contains(node) {
                    return Ok(());
                }
                if !kind.is_shared() {
                    return s.remove_subtree(node);
                }
                let held = s.graph.node(node)?.reference_count();
                if held != 1 {
                    return Err(GraphError::IllegalState(format!(
                        "{node} still holds {held} references after its dependents were removed"
                    )));
                }
                s.remove_reference(node)
            })
        });
        self.settle(result)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Reverts the most recent entry. Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, GraphError> {
        let result = self.replay(Replay::Undo);
        self.settle(result)
    }

    pub fn redo(&mut self) -> Result<bool, GraphError> {
        let result = self.replay(Replay::Redo);
        self.settle(result)
    }
}

include!("session_impl.rs");
