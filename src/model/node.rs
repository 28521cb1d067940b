// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use smol_str::SmolStr;

use super::config::GraphConfig;
use super::ids::NodeId;
use super::kind::NodeKind;
use super::property::{descriptor, properties_of, PropertyType};
use super::value::{EnumKind, EnumValue, KeyRule, Nullability, Value};
use crate::error::GraphError;

pub const REFERENCE_COUNT: &str = "referenceCount";

/// One entity of the object graph.
///
/// Parent, children and references are identities resolved through the owning
/// [`Graph`](super::Graph); a node never holds another node directly.
///
/// An identity lasts only as long as the node stays where it is. Moving a node
/// (`Session::set_parent`) or re-creating it through undo or redo gives the node and every
/// descendant a fresh [`NodeId`]; callers holding an old id map it forward with
/// `UndoLog::translate` or use the id `set_parent` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNode {
    id: NodeId,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    properties: BTreeMap<SmolStr, Value>,
    populated: bool,
}

impl ObjectNode {
    /// A node of `kind` with every declared property at its zero value (null for nullable
    /// properties). Shared kinds start with one reference.
    pub fn blank(kind: NodeKind) -> Self {
        Self::blank_with_id(kind, NodeId::new())
    }

    pub(crate) fn blank_with_id(kind: NodeKind, id: NodeId) -> Self {
        let properties = properties_of(kind)
            .iter()
            .map(|d| (SmolStr::new_static(d.name), zero_value(d.ty, d.nullable)))
            .collect();
        let mut node = Self {
            id,
            kind,
            parent: None,
            children: Vec::new(),
            properties,
            populated: true,
        };
        if kind.is_shared() {
            node.put(REFERENCE_COUNT, Value::Int(1));
        }
        node
    }

    pub fn root() -> Self {
        Self::blank(NodeKind::Root).with_name("root")
    }

    pub fn database(name: &str) -> Self {
        Self::blank(NodeKind::Database)
            .with_name(name)
            .with_unchecked("physicalName", name.into())
    }

    pub fn table(config: &GraphConfig, name: Option<&str>) -> Self {
        let name = name.unwrap_or(&config.default_table_name);
        Self::blank(NodeKind::Table)
            .with_name(name)
            .with_unchecked("physicalName", name.into())
            .with_unchecked("objectType", "TABLE".into())
    }

    /// A column carrying the session defaults; its reference count starts at one, held by
    /// whoever created it.
    pub fn column(config: &GraphConfig, name: Option<&str>) -> Self {
        let name = name.unwrap_or(&config.default_column_name);
        let default_value = config
            .default_value
            .as_deref()
            .map(Value::from)
            .unwrap_or_default();
        Self::blank(NodeKind::Column)
            .with_name(name)
            .with_unchecked("physicalName", name.into())
            .with_unchecked("type", Value::Int(config.default_column_type))
            .with_unchecked("precision", Value::Int(config.default_precision))
            .with_unchecked("scale", Value::Int(config.default_scale))
            .with_unchecked(
                "nullable",
                EnumValue::Nullability(config.default_nullability()).into(),
            )
            .with_unchecked("autoIncrement", Value::Bool(config.default_auto_increment))
            .with_unchecked("remarks", config.default_remarks.as_str().into())
            .with_unchecked("defaultValue", default_value)
    }

    pub fn index(name: &str, unique: bool) -> Self {
        Self::blank(NodeKind::Index)
            .with_name(name)
            .with_unchecked("physicalName", name.into())
            .with_unchecked("unique", Value::Bool(unique))
    }

    pub fn index_column(name: &str, column: Option<NodeId>) -> Self {
        Self::blank(NodeKind::IndexColumn)
            .with_name(name)
            .with_unchecked("column", column.map(Value::Ref).unwrap_or_default())
            .with_unchecked("ascending", Value::Bool(true))
    }

    pub fn relationship(name: &str, pk_table: NodeId, fk_table: NodeId) -> Self {
        Self::blank(NodeKind::Relationship)
            .with_name(name)
            .with_unchecked("physicalName", name.into())
            .with_unchecked("pkTable", Value::Ref(pk_table))
            .with_unchecked("fkTable", Value::Ref(fk_table))
            .with_unchecked("updateRule", EnumValue::KeyRule(KeyRule::NoAction).into())
            .with_unchecked("deleteRule", EnumValue::KeyRule(KeyRule::NoAction).into())
    }

    pub fn column_mapping(pk_column: NodeId, fk_column: NodeId) -> Self {
        Self::blank(NodeKind::ColumnMapping)
            .with_name("mapping")
            .with_unchecked("pkColumn", Value::Ref(pk_column))
            .with_unchecked("fkColumn", Value::Ref(fk_column))
    }

    /// Builder-style property assignment, validated against the kind's property table.
    pub fn with(mut self, name: &str, value: Value) -> Result<Self, GraphError> {
        let descriptor = descriptor(self.kind, name).ok_or_else(|| {
            GraphError::invalid_property(self.kind, name, "no such property")
        })?;
        if !descriptor.settable {
            return Err(GraphError::invalid_property(self.kind, name, "read-only"));
        }
        if !descriptor.accepts(&value) {
            return Err(GraphError::invalid_property(
                self.kind,
                name,
                format!("does not accept a {} value", value.type_name()),
            ));
        }
        self.put(descriptor.name, value);
        Ok(self)
    }

    /// Marks the node as backed by an external source that fills in its children on first
    /// traversal.
    pub fn unpopulated(mut self) -> Self {
        self.populated = false;
        self
    }

    fn with_name(self, name: &str) -> Self {
        self.with_unchecked("name", name.into())
    }

    fn with_unchecked(mut self, name: &'static str, value: Value) -> Self {
        self.put(name, value);
        self
    }

    /// Stable until the node is moved or re-created.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn name(&self) -> &str {
        self.property("name").as_text().unwrap_or_default()
    }

    /// Current value of `name`; undeclared names read as null.
    pub fn property(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.properties.get(name).unwrap_or(&NULL)
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        properties_of(self.kind)
            .iter()
            .map(|d| (d.name, self.property(d.name)))
    }

    /// Identities referenced by this node's reference-typed properties.
    pub fn references(&self) -> impl Iterator<Item = (&'static str, NodeId)> + '_ {
        properties_of(self.kind)
            .iter()
            .filter(|d| d.ty == PropertyType::Ref)
            .filter_map(|d| self.property(d.name).as_ref_id().map(|id| (d.name, id)))
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn reference_count(&self) -> u32 {
        self.property(REFERENCE_COUNT)
            .as_int()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }

    /// Increments the reference count of a shared node, returning `(old, new)`.
    pub(crate) fn add_reference(&mut self) -> Result<(u32, u32), GraphError> {
        if !self.kind.is_shared() {
            return Err(GraphError::IllegalState(format!(
                "{} {} is not reference counted",
                self.kind, self.id
            )));
        }
        let old = self.reference_count();
        let new = old + 1;
        self.put(REFERENCE_COUNT, Value::Int(i64::from(new)));
        Ok((old, new))
    }

    /// Decrements the reference count, returning `(old, new)`. Underflow is a programming
    /// error.
    pub(crate) fn remove_reference(&mut self) -> Result<(u32, u32), GraphError> {
        let old = self.reference_count();
        if old == 0 {
            return Err(GraphError::IllegalState(format!(
                "reference count of {} {} is already 0",
                self.kind, self.id
            )));
        }
        let new = old - 1;
        self.put(REFERENCE_COUNT, Value::Int(i64::from(new)));
        Ok((old, new))
    }

    pub(crate) fn put(&mut self, name: &str, value: Value) -> Value {
        match self.properties.get_mut(name) {
            Some(slot) => std::mem::replace(slot, value),
            None => {
                self.properties.insert(SmolStr::new(name), value);
                Value::Null
            }
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }

    pub(crate) fn set_populated(&mut self, populated: bool) {
        self.populated = populated;
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }
}

fn zero_value(ty: PropertyType, nullable: bool) -> Value {
    if nullable {
        return Value::Null;
    }
    match ty {
        PropertyType::Bool => Value::Bool(false),
        PropertyType::Int => Value::Int(0),
        PropertyType::Text => Value::text(""),
        PropertyType::Enum(EnumKind::Nullability) => {
            EnumValue::Nullability(Nullability::Unknown).into()
        }
        PropertyType::Enum(EnumKind::KeyRule) => EnumValue::KeyRule(KeyRule::NoAction).into(),
        PropertyType::Ref | PropertyType::Image | PropertyType::Custom(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectNode;
    use crate::error::GraphError;
    use crate::model::{GraphConfig, NodeKind, Value};

    #[test]
    fn column_takes_session_defaults() {
        let config = GraphConfig {
            default_precision: 7,
            ..GraphConfig::default()
        };
        let column = ObjectNode::column(&config, None);
        assert_eq!(column.name(), "New_Column");
        assert_eq!(column.property("precision"), &Value::Int(7));
        assert_eq!(column.reference_count(), 1);
    }

    #[test]
    fn with_rejects_wrong_type_and_read_only() {
        let config = GraphConfig::default();
        let err = ObjectNode::column(&config, None)
            .with("precision", Value::from("ten"))
            .expect_err("wrong type");
        assert!(matches!(err, GraphError::InvalidProperty { .. }));

        let err = ObjectNode::column(&config, None)
            .with("referenceCount", Value::Int(5))
            .expect_err("read-only");
        assert!(matches!(err, GraphError::InvalidProperty { .. }));
    }

    #[test]
    fn reference_count_underflow_is_illegal_state() {
        let mut column = ObjectNode::column(&GraphConfig::default(), Some("id"));
        assert_eq!(column.remove_reference().expect("1 -> 0"), (1, 0));
        let err = column.remove_reference().expect_err("underflow");
        assert!(matches!(err, GraphError::IllegalState(_)));
        assert_eq!(column.reference_count(), 0);
    }

    #[test]
    fn only_shared_kinds_are_reference_counted() {
        let mut table = ObjectNode::blank(NodeKind::Table);
        assert!(matches!(
            table.add_reference(),
            Err(GraphError::IllegalState(_))
        ));
    }
}
