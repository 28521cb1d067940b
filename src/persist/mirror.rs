// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::trace;

use super::convert::{DataType, TypeConverter, WireValue};
use super::persister::Persister;
use crate::error::{GraphError, PersistError};
use crate::model::{descriptor, Graph, NodeId, NodeKind, ObjectNode};

#[derive(Debug, Default)]
struct MirrorInner {
    graph: Option<Graph>,
    backup: Option<Option<Graph>>,
    created: HashSet<NodeId>,
}

/// Persister that rebuilds the persisted objects as a second in-process [`Graph`].
///
/// The first object persisted into an empty mirror becomes its root. Clones share the same
/// graph.
#[derive(Debug, Clone, Default)]
pub struct GraphMirror {
    inner: Rc<RefCell<MirrorInner>>,
    converter: TypeConverter,
}

impl GraphMirror {
    pub fn new(converter: TypeConverter) -> Self {
        Self {
            inner: Rc::default(),
            converter,
        }
    }

    /// Copy of the mirrored graph, if anything has been persisted yet.
    pub fn graph(&self) -> Option<Graph> {
        self.inner.borrow().graph.clone()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner
            .borrow()
            .graph
            .as_ref()
            .is_some_and(|graph| graph.contains(id))
    }
}

impl Persister for GraphMirror {
    fn begin(&mut self, _label: &str) -> Result<(), PersistError> {
        let mut inner = self.inner.borrow_mut();
        if inner.backup.is_some() {
            return Err(PersistError::Protocol("nested batch".to_owned()));
        }
        inner.backup = Some(inner.graph.clone());
        inner.created.clear();
        Ok(())
    }

    fn persist_object(
        &mut self,
        kind: NodeKind,
        id: NodeId,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<(), PersistError> {
        let mut inner = self.inner.borrow_mut();
        let node = ObjectNode::blank_with_id(kind, id);
        if inner.graph.is_none() {
            inner.graph = Some(Graph::new(node));
        } else if let Some(graph) = inner.graph.as_mut() {
            let Some(parent) = parent else {
                return Err(PersistError::Protocol(format!(
                    "{kind} {id} has no parent but the mirror already has a root"
                )));
            };
            if !graph.contains(parent) {
                return Err(PersistError::UnknownObject(parent));
            }
            graph.attach(parent, index, vec![node]).map_err(graph_error)?;
        }
        inner.created.insert(id);
        trace!(%kind, %id, "mirrored object");
        Ok(())
    }

    fn persist_property(
        &mut self,
        id: NodeId,
        name: &str,
        data_type: &DataType,
        old: &WireValue,
        new: &WireValue,
    ) -> Result<(), PersistError> {
        let mut inner = self.inner.borrow_mut();
        let fresh = inner.created.contains(&id);
        let Some(graph) = inner.graph.as_mut() else {
            return Err(PersistError::UnknownObject(id));
        };
        let Some(node) = graph.get(id) else {
            return Err(PersistError::UnknownObject(id));
        };
        if descriptor(node.kind(), name).is_none() {
            return Err(PersistError::Protocol(format!(
                "{} has no property '{name}'",
                node.kind()
            )));
        }
        let current = self.converter.to_wire(node.property(name))?;
        if !fresh && current != *old {
            return Err(PersistError::Conflict {
                id,
                property: name.into(),
                expected: old.to_string(),
                found: current.to_string(),
            });
        }
        let value = self
            .converter
            .from_wire(data_type, new, |target| graph.contains(target))?;
        graph.put_property(id, name, value).map_err(graph_error)?;
        Ok(())
    }

    fn remove_object(&mut self, id: NodeId) -> Result<(), PersistError> {
        let mut inner = self.inner.borrow_mut();
        let Some(graph) = inner.graph.as_mut() else {
            return Err(PersistError::UnknownObject(id));
        };
        graph.detach(id).map_err(graph_error)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistError> {
        let mut inner = self.inner.borrow_mut();
        inner.backup = None;
        inner.created.clear();
        Ok(())
    }

    fn rollback(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(graph) = inner.backup.take() {
            inner.graph = graph;
        }
        inner.created.clear();
    }
}

fn graph_error(err: GraphError) -> PersistError {
    match err {
        GraphError::UnknownObject(id) => PersistError::UnknownObject(id),
        GraphError::Persist(err) => err,
        other => PersistError::Protocol(other.to_string()),
    }
}
