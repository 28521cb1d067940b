// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Relationships and the reference counts of the columns they share.
//!
//! A column starts with one reference held by whoever created it. Each column mapping adds
//! one reference to its foreign-key column for as long as the mapping exists. The column is
//! unlinked from its table exactly when the count goes from 1 to 0.

use tracing::debug;

use super::Session;
use crate::error::GraphError;
use crate::event::Change;
use crate::model::{NodeId, NodeKind, ObjectNode, Value, REFERENCE_COUNT};

/// One primary-key column and the foreign-key column that refers to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPair {
    pub pk_column: NodeId,
    pub fk_column: NodeId,
}

impl ColumnPair {
    pub fn new(pk_column: NodeId, fk_column: NodeId) -> Self {
        Self {
            pk_column,
            fk_column,
        }
    }
}

impl Session {
    /// Creates a relationship from `pk_table` to `fk_table` under `database` with one
    /// column mapping per pair, in a single frame. Every foreign-key column gains a
    /// reference.
    pub fn add_relationship(
        &mut self,
        database: NodeId,
        name: &str,
        pk_table: NodeId,
        fk_table: NodeId,
        pairs: &[ColumnPair],
    ) -> Result<NodeId, GraphError> {
        let result = self.add_relationship_inner(database, name, pk_table, fk_table, pairs);
        self.settle(result)
    }

    /// Removes a relationship with its mappings and releases the references they held.
    pub fn remove_relationship(&mut self, relationship: NodeId) -> Result<(), GraphError> {
        let result = self
            .expect_kind(relationship, NodeKind::Relationship)
            .and_then(|()| self.remove_subtree(relationship));
        self.settle(result)
    }

    /// Drops the reference held by the creator of `column`.
    pub fn release_column(&mut self, column: NodeId) -> Result<(), GraphError> {
        let result = self.release_column_inner(column);
        self.settle(result)
    }

    fn add_relationship_inner(
        &mut self,
        database: NodeId,
        name: &str,
        pk_table: NodeId,
        fk_table: NodeId,
        pairs: &[ColumnPair],
    ) -> Result<NodeId, GraphError> {
        self.expect_kind(database, NodeKind::Database)?;
        self.expect_kind(pk_table, NodeKind::Table)?;
        self.expect_kind(fk_table, NodeKind::Table)?;
        for pair in pairs {
            self.expect_column_of(pair.pk_column, pk_table)?;
            self.expect_column_of(pair.fk_column, fk_table)?;
        }
        let index = self
            .graph
            .children(database, Some(NodeKind::Relationship))?
            .len();
        self.framed(&format!("add relationship {name}"), |s| {
            let relationship = s.add_child_inner(
                database,
                ObjectNode::relationship(name, pk_table, fk_table),
                index,
            )?;
            for (i, pair) in pairs.iter().enumerate() {
                s.add_child_inner(
                    relationship,
                    ObjectNode::column_mapping(pair.pk_column, pair.fk_column),
                    i,
                )?;
            }
            Ok(relationship)
        })
    }

    fn release_column_inner(&mut self, column: NodeId) -> Result<(), GraphError> {
        self.expect_kind(column, NodeKind::Column)?;
        if self.graph.node(column)?.reference_count() != 1 {
            return self.remove_reference(column);
        }
        let dependents = self.graph.external_dependents(column);
        if !dependents.is_empty() {
            return Err(GraphError::ObjectDependent {
                node: column,
                dependents,
            });
        }
        self.framed("release column", |s| s.remove_reference(column))
    }

    pub(crate) fn add_reference(&mut self, column: NodeId) -> Result<(), GraphError> {
        let (old, new) = self.graph.node_mut(column)?.add_reference()?;
        debug!(%column, old, new, "reference added");
        self.emit(column, reference_count_change(old, new));
        Ok(())
    }

    /// Releases one reference; at zero the column is unlinked from its table. Callers check
    /// beforehand that nothing else depends on a column about to go.
    pub(crate) fn remove_reference(&mut self, column: NodeId) -> Result<(), GraphError> {
        let (old, new) = self.graph.node_mut(column)?.remove_reference()?;
        debug!(%column, old, new, "reference released");
        self.emit(column, reference_count_change(old, new));
        if new == 0 {
            self.detach_node(column)?;
        }
        Ok(())
    }

    fn expect_kind(&self, id: NodeId, kind: NodeKind) -> Result<(), GraphError> {
        let found = self.graph.node(id)?.kind();
        if found != kind {
            return Err(GraphError::structural(format!(
                "expected a {kind}, {id} is a {found}"
            )));
        }
        Ok(())
    }

    fn expect_column_of(&self, column: NodeId, table: NodeId) -> Result<(), GraphError> {
        self.expect_kind(column, NodeKind::Column)?;
        if self.graph.node(column)?.parent() != Some(table) {
            return Err(GraphError::structural(format!(
                "column {column} does not belong to table {table}"
            )));
        }
        Ok(())
    }
}

fn reference_count_change(old: u32, new: u32) -> Change {
    Change::Property {
        name: REFERENCE_COUNT.into(),
        old: Value::Int(i64::from(old)),
        new: Value::Int(i64::from(new)),
    }
}
