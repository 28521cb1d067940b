// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The bridge from change notifications to persist operations.
//!
//! Every tracked object moves through `Unpersisted -> Persisted -> Removed`. Operations are
//! staged and reach the persister as whole batches: one per top-level change, or one per
//! outermost transaction frame.

use std::collections::HashMap;
use std::fmt;

use smol_str::SmolStr;
use tracing::{debug, warn};

use super::helper::PersisterHelperFactory;
use super::persister::{Batch, PersistOp, Persister};
use crate::error::{GraphError, PersistError};
use crate::event::{Change, ChangeEvent, Listener, Notification};
use crate::model::{Graph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Unpersisted,
    Persisted,
    Removed,
}

/// Label of the batch sent when the bridge is attached.
pub const SNAPSHOT_LABEL: &str = "snapshot";

/// Full description of the subtree under `root`: every object in pre-order, then every
/// non-ignored property of every object with a null old value. Objects come first so that
/// references between members resolve on the receiving side.
pub fn snapshot(
    graph: &Graph,
    root: NodeId,
    factory: &PersisterHelperFactory,
) -> Result<Batch, PersistError> {
    let mut objects = Vec::new();
    let mut properties = Vec::new();
    for id in graph.subtree(root) {
        let Some(node) = graph.get(id) else {
            return Err(PersistError::UnknownObject(id));
        };
        for op in factory.helper(node.kind())?.object_payload(graph, id)? {
            match op {
                PersistOp::Object { .. } => objects.push(op),
                _ => properties.push(op),
            }
        }
    }
    objects.append(&mut properties);
    Ok(Batch::new(SNAPSHOT_LABEL, objects))
}

pub struct PersisterListener<P> {
    persister: P,
    factory: PersisterHelperFactory,
    // Root of the snapshot delivered on attach.
    root: Option<NodeId>,
    states: HashMap<NodeId, ObjectState>,
    // Previous states of everything marked since the last delivered batch.
    marks: Vec<(NodeId, Option<ObjectState>)>,
    staged: Vec<PersistOp>,
    frame: Option<SmolStr>,
    poisoned: Option<String>,
}

impl<P> fmt::Debug for PersisterListener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersisterListener")
            .field("tracked", &self.states.len())
            .field("staged", &self.staged.len())
            .field("frame", &self.frame)
            .field("poisoned", &self.poisoned.is_some())
            .finish()
    }
}

impl<P: Persister> PersisterListener<P> {
    pub fn new(persister: P, factory: PersisterHelperFactory) -> Self {
        Self {
            persister,
            factory,
            root: None,
            states: HashMap::new(),
            marks: Vec::new(),
            staged: Vec::new(),
            frame: None,
            poisoned: None,
        }
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    pub fn state(&self, id: NodeId) -> ObjectState {
        self.states
            .get(&id)
            .copied()
            .unwrap_or(ObjectState::Unpersisted)
    }

    fn mark(&mut self, id: NodeId, state: ObjectState) {
        let previous = self.states.insert(id, state);
        self.marks.push((id, previous));
    }

    fn restore_marks(&mut self) {
        while let Some((id, previous)) = self.marks.pop() {
            match previous {
                Some(state) => self.states.insert(id, state),
                None => self.states.remove(&id),
            };
        }
    }

    fn expect_persisted(&self, id: NodeId) -> Result<(), PersistError> {
        match self.state(id) {
            ObjectState::Persisted => Ok(()),
            _ => Err(PersistError::UnknownObject(id)),
        }
    }

    /// The persisted object that goes away with `child`: `child` itself, or the tracked root
    /// when `child` is one of its untracked ancestors.
    fn removed_object(&self, graph: &Graph, child: NodeId) -> Result<NodeId, PersistError> {
        if self.state(child) == ObjectState::Persisted {
            return Ok(child);
        }
        match self.root {
            Some(root)
                if self.state(root) == ObjectState::Persisted
                    && graph.is_ancestor_or_self(child, root) =>
            {
                Ok(root)
            }
            _ => Err(PersistError::UnknownObject(child)),
        }
    }

    fn stage(&mut self, graph: &Graph, event: &ChangeEvent) -> Result<(), PersistError> {
        match &event.change {
            Change::Property { name, old, new } => {
                self.expect_persisted(event.node)?;
                let Some(node) = graph.get(event.node) else {
                    return Err(PersistError::UnknownObject(event.node));
                };
                let helper = self.factory.helper(node.kind())?;
                if helper.is_ignored(name) {
                    return Ok(());
                }
                let converter = self.factory.converter();
                let op = PersistOp::Property {
                    id: event.node,
                    name: name.clone(),
                    data_type: helper.data_type(name)?,
                    old: converter.to_wire(old)?,
                    new: converter.to_wire(new)?,
                };
                self.staged.push(op);
            }
            Change::ChildAdded { child, .. } => {
                self.expect_persisted(event.node)?;
                let batch = snapshot(graph, *child, &self.factory)?;
                for id in graph.subtree(*child) {
                    self.mark(id, ObjectState::Persisted);
                }
                self.staged.extend(batch.ops);
            }
            Change::ChildRemoved { child, .. } => {
                let removed = self.removed_object(graph, *child)?;
                self.staged.push(PersistOp::Remove { id: removed });
                for id in graph.subtree(removed) {
                    self.mark(id, ObjectState::Removed);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self, label: &str) -> Result<(), PersistError> {
        if self.staged.is_empty() {
            self.marks.clear();
            return Ok(());
        }
        let batch = Batch::new(label, std::mem::take(&mut self.staged));
        match batch.deliver(&mut self.persister) {
            Ok(()) => {
                debug!(label, ops = batch.ops.len(), "batch persisted");
                self.marks.clear();
                Ok(())
            }
            Err(err) => {
                warn!(label, error = %err, "persister rejected batch");
                self.restore_marks();
                Err(err)
            }
        }
    }

    fn discard(&mut self) {
        self.staged.clear();
        self.restore_marks();
        self.poisoned = None;
    }

    fn on_change(&mut self, graph: &Graph, event: &ChangeEvent) -> Result<(), PersistError> {
        if self.frame.is_some() {
            if self.poisoned.is_some() {
                return Ok(());
            }
            return self.stage(graph, event).map_err(|err| {
                debug!(seq = event.seq, error = %err, "frame poisoned");
                self.poisoned = Some(err.to_string());
                err
            });
        }
        if let Err(err) = self.stage(graph, event) {
            self.discard();
            return Err(err);
        }
        self.flush(&change_label(graph, event))
    }
}

impl<P: Persister> Listener for PersisterListener<P> {
    fn attached(&mut self, graph: &Graph, root: NodeId) -> Result<(), GraphError> {
        let batch = snapshot(graph, root, &self.factory)?;
        batch.deliver(&mut self.persister)?;
        self.root = Some(root);
        for id in graph.subtree(root) {
            self.states.insert(id, ObjectState::Persisted);
        }
        debug!(%root, objects = self.states.len(), "snapshot persisted");
        Ok(())
    }

    fn notify(&mut self, graph: &Graph, notification: &Notification) -> Result<(), GraphError> {
        match notification {
            Notification::Begin { label } => {
                self.discard();
                self.frame = Some(label.clone());
                Ok(())
            }
            Notification::Change(event) => Ok(self.on_change(graph, event)?),
            Notification::Commit => {
                let label = self.frame.take().unwrap_or_default();
                if let Some(cause) = self.poisoned.take() {
                    self.discard();
                    return Err(GraphError::IllegalState(format!(
                        "transaction '{label}' was not persisted: {cause}"
                    )));
                }
                Ok(self.flush(&label)?)
            }
            Notification::Rollback => {
                self.frame = None;
                self.discard();
                Ok(())
            }
        }
    }
}

fn change_label(graph: &Graph, event: &ChangeEvent) -> String {
    let kind_of = |id: NodeId| {
        graph
            .get(id)
            .map(|node| node.kind().as_str())
            .unwrap_or("object")
    };
    match &event.change {
        Change::Property { name, .. } => format!("set {name}"),
        Change::ChildAdded { child, .. } => format!("add {}", kind_of(*child)),
        Change::ChildRemoved { child, .. } => format!("remove {}", kind_of(*child)),
    }
}

#[cfg(test)]
mod tests;
