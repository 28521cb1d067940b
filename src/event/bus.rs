// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use smol_str::SmolStr;
use tracing::{debug, warn};

use super::{Change, ChangeEvent, Notification};
use crate::error::GraphError;
use crate::model::{Graph, NodeId};

/// Receiver of graph notifications.
///
/// Callbacks run synchronously on the mutating thread after the change has been applied
/// (or, for child removal, right before the subtree is unlinked). Listeners only get
/// read access to the graph.
pub trait Listener {
    /// Called once when the listener is subscribed at `root`.
    fn attached(&mut self, _graph: &Graph, _root: NodeId) -> Result<(), GraphError> {
        Ok(())
    }

    fn notify(&mut self, graph: &Graph, notification: &Notification) -> Result<(), GraphError>;
}

/// Which changes a subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only changes of the subscription root itself.
    Node,
    /// Changes of the root and of every node below it, including nodes added later.
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

struct Subscription {
    id: ListenerId,
    root: NodeId,
    scope: Scope,
    listener: Box<dyn Listener>,
}

impl Subscription {
    fn observes(&self, graph: &Graph, event: &ChangeEvent) -> bool {
        let in_scope = |node: NodeId| match self.scope {
            Scope::Node => node == self.root,
            Scope::Subtree => graph.is_ancestor_or_self(self.root, node),
        };
        if in_scope(event.node) {
            return true;
        }
        // A subscriber rooted inside a subtree that is going away is told about it.
        match event.change {
            Change::ChildRemoved { child, .. } => graph.is_ancestor_or_self(child, self.root),
            _ => false,
        }
    }
}

/// Subscription registry plus transaction framing for one graph.
///
/// Nested `begin`/`commit` pairs are flattened: listeners see one `Begin` for the outermost
/// `begin` and one `Commit` for the matching outermost `commit`.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_listener: u64,
    next_seq: u64,
    depth: usize,
    label: Option<SmolStr>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("next_seq", &self.next_seq)
            .field("depth", &self.depth)
            .field("label", &self.label)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        graph: &Graph,
        root: NodeId,
        scope: Scope,
        mut listener: Box<dyn Listener>,
    ) -> Result<ListenerId, GraphError> {
        graph.node(root)?;
        listener.attached(graph, root)?;
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.subscriptions.push(Subscription {
            id,
            root,
            scope,
            listener,
        });
        debug!(%id, %root, ?scope, "listener subscribed");
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> Option<Box<dyn Listener>> {
        let pos = self.subscriptions.iter().position(|s| s.id == id)?;
        Some(self.subscriptions.remove(pos).listener)
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drops subscriptions whose root is no longer part of `graph`.
    pub fn prune(&mut self, graph: &Graph) {
        self.subscriptions.retain(|s| {
            let alive = graph.contains(s.root);
            if !alive {
                debug!(id = %s.id, root = %s.root, "subscription root removed; dropping listener");
            }
            alive
        });
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub fn transaction_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn begin(&mut self, graph: &Graph, label: &str) -> Result<(), GraphError> {
        self.depth += 1;
        if self.depth > 1 {
            return Ok(());
        }
        let label = SmolStr::new(label);
        self.label = Some(label.clone());
        self.broadcast(graph, &Notification::Begin { label })
    }

    pub fn commit(&mut self, graph: &Graph) -> Result<(), GraphError> {
        if self.depth == 0 {
            return Err(GraphError::IllegalState(
                "commit without a matching begin".to_owned(),
            ));
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(());
        }
        self.label = None;
        self.broadcast(graph, &Notification::Commit)
    }

    /// Abandons the whole (flattened) transaction regardless of nesting depth.
    pub fn rollback(&mut self, graph: &Graph) -> Result<(), GraphError> {
        if self.depth == 0 {
            return Err(GraphError::IllegalState(
                "rollback outside a transaction".to_owned(),
            ));
        }
        self.depth = 0;
        self.label = None;
        self.broadcast(graph, &Notification::Rollback)
    }

    pub fn deliver(&mut self, graph: &Graph, event: &ChangeEvent) -> Result<(), GraphError> {
        let notification = Notification::Change(event.clone());
        let mut first_err = None;
        for sub in &mut self.subscriptions {
            if !sub.observes(graph, event) {
                continue;
            }
            if let Err(err) = sub.listener.notify(graph, &notification) {
                warn!(id = %sub.id, seq = event.seq, error = %err, "listener rejected change");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn broadcast(&mut self, graph: &Graph, notification: &Notification) -> Result<(), GraphError> {
        let mut first_err = None;
        for sub in &mut self.subscriptions {
            if let Err(err) = sub.listener.notify(graph, notification) {
                warn!(id = %sub.id, error = %err, "listener rejected transaction notification");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
