// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Explicit per-kind property tables.
//!
//! Each node kind declares its properties up front (name, declared type, whether null is
//! allowed, whether callers may set it). Mutators, the persister helpers and the tests all
//! walk these tables instead of discovering properties at runtime.

use super::kind::NodeKind;
use super::value::{EnumKind, Value};

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Bool,
    Int,
    Text,
    Enum(EnumKind),
    Ref,
    Image,
    /// A structured value whose wire form comes from a converter codec.
    Custom(&'static str),
}

impl PropertyType {
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Text, Value::Text(_))
            | (Self::Ref, Value::Ref(_))
            | (Self::Image, Value::Image(_)) => true,
            (Self::Enum(kind), Value::Enum(value)) => value.kind() == kind,
            (Self::Custom(name), Value::Custom(value)) => value.type_name() == name,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub ty: PropertyType,
    pub nullable: bool,
    pub settable: bool,
}

impl PropertyDescriptor {
    const fn new(name: &'static str, ty: PropertyType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            settable: true,
        }
    }

    const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable;
        }
        self.ty.accepts(value)
    }
}

const NAME: PropertyDescriptor = PropertyDescriptor::new("name", PropertyType::Text);
const PHYSICAL_NAME: PropertyDescriptor =
    PropertyDescriptor::new("physicalName", PropertyType::Text);

const ROOT: &[PropertyDescriptor] = &[NAME];

const DATABASE: &[PropertyDescriptor] = &[
    NAME,
    PHYSICAL_NAME,
    PropertyDescriptor::new("dataSource", PropertyType::Custom("data-source")).nullable(),
    PropertyDescriptor::new("logo", PropertyType::Image).nullable(),
];

const TABLE: &[PropertyDescriptor] = &[
    NAME,
    PHYSICAL_NAME,
    PropertyDescriptor::new("remarks", PropertyType::Text),
    PropertyDescriptor::new("objectType", PropertyType::Text),
    PropertyDescriptor::new("icon", PropertyType::Image).nullable(),
];

const COLUMN: &[PropertyDescriptor] = &[
    NAME,
    PHYSICAL_NAME,
    PropertyDescriptor::new("type", PropertyType::Int),
    PropertyDescriptor::new("sourceDataTypeName", PropertyType::Text).nullable(),
    PropertyDescriptor::new("precision", PropertyType::Int),
    PropertyDescriptor::new("scale", PropertyType::Int),
    PropertyDescriptor::new("nullable", PropertyType::Enum(EnumKind::Nullability)),
    PropertyDescriptor::new("remarks", PropertyType::Text),
    PropertyDescriptor::new("defaultValue", PropertyType::Text).nullable(),
    PropertyDescriptor::new("autoIncrement", PropertyType::Bool),
    PropertyDescriptor::new("autoIncrementSequenceName", PropertyType::Text).nullable(),
    PropertyDescriptor::new("sourceColumn", PropertyType::Ref).nullable(),
    PropertyDescriptor::new("referenceCount", PropertyType::Int).read_only(),
];

const INDEX: &[PropertyDescriptor] = &[
    NAME,
    PHYSICAL_NAME,
    PropertyDescriptor::new("unique", PropertyType::Bool),
    PropertyDescriptor::new("clustered", PropertyType::Bool),
    PropertyDescriptor::new("qualifier", PropertyType::Text).nullable(),
];

const INDEX_COLUMN: &[PropertyDescriptor] = &[
    NAME,
    PropertyDescriptor::new("column", PropertyType::Ref).nullable(),
    PropertyDescriptor::new("ascending", PropertyType::Bool),
];

const RELATIONSHIP: &[PropertyDescriptor] = &[
    NAME,
    PHYSICAL_NAME,
    PropertyDescriptor::new("pkTable", PropertyType::Ref).nullable(),
    PropertyDescriptor::new("fkTable", PropertyType::Ref).nullable(),
    PropertyDescriptor::new("updateRule", PropertyType::Enum(EnumKind::KeyRule)),
    PropertyDescriptor::new("deleteRule", PropertyType::Enum(EnumKind::KeyRule)),
    PropertyDescriptor::new("identifying", PropertyType::Bool),
];

const COLUMN_MAPPING: &[PropertyDescriptor] = &[
    NAME,
    PropertyDescriptor::new("pkColumn", PropertyType::Ref).read_only(),
    PropertyDescriptor::new("fkColumn", PropertyType::Ref).read_only(),
];

/// The property table of `kind`, in declaration order.
pub fn properties_of(kind: NodeKind) -> &'static [PropertyDescriptor] {
    match kind {
        NodeKind::Root => ROOT,
        NodeKind::Database => DATABASE,
        NodeKind::Table => TABLE,
        NodeKind::Column => COLUMN,
        NodeKind::Index => INDEX,
        NodeKind::IndexColumn => INDEX_COLUMN,
        NodeKind::Relationship => RELATIONSHIP,
        NodeKind::ColumnMapping => COLUMN_MAPPING,
    }
}

pub fn descriptor(kind: NodeKind, name: &str) -> Option<&'static PropertyDescriptor> {
    properties_of(kind).iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::{descriptor, properties_of, PropertyType};
    use crate::model::{NodeId, NodeKind, Value};

    #[test]
    fn every_kind_declares_name() {
        for kind in NodeKind::ALL {
            assert!(descriptor(kind, "name").is_some(), "{kind} lacks name");
        }
    }

    #[test]
    fn property_names_are_unique_per_kind() {
        for kind in NodeKind::ALL {
            let props = properties_of(kind);
            for (i, a) in props.iter().enumerate() {
                assert!(
                    props[i + 1..].iter().all(|b| b.name != a.name),
                    "{kind} declares {} twice",
                    a.name
                );
            }
        }
    }

    #[test]
    fn nullability_follows_descriptor() {
        let source = descriptor(NodeKind::Column, "sourceColumn").expect("descriptor");
        assert!(source.accepts(&Value::Null));
        assert!(source.accepts(&Value::Ref(NodeId::new())));
        assert!(!source.accepts(&Value::Int(1)));

        let name = descriptor(NodeKind::Column, "name").expect("descriptor");
        assert!(!name.accepts(&Value::Null));
        assert_eq!(name.ty, PropertyType::Text);
    }
}
