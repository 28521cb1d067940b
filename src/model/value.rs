// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

use super::ids::NodeId;
use super::image::Image;

/// In-memory value of a node property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(SmolStr),
    Enum(EnumValue),
    /// Non-owning reference to another node of the same graph.
    Ref(NodeId),
    Image(Image),
    Custom(CustomValue),
}

impl Value {
    pub fn text(value: impl Into<SmolStr>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Name of the in-memory type, used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Enum(value) => value.kind().as_str(),
            Self::Ref(_) => "ref",
            Self::Image(_) => "image",
            Self::Custom(value) => value.type_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Self::Ref(value)
    }
}

impl From<EnumValue> for Value {
    fn from(value: EnumValue) -> Self {
        Self::Enum(value)
    }
}

impl From<Image> for Value {
    fn from(value: Image) -> Self {
        Self::Image(value)
    }
}

/// Which enumeration an [`EnumValue`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    Nullability,
    KeyRule,
}

impl EnumKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nullability => "nullability",
            Self::KeyRule => "key-rule",
        }
    }

    pub fn parse_variant(self, raw: &str) -> Result<EnumValue, ParseEnumError> {
        let value = match self {
            Self::Nullability => raw.parse().map(EnumValue::Nullability).ok(),
            Self::KeyRule => raw.parse().map(EnumValue::KeyRule).ok(),
        };
        value.ok_or_else(|| ParseEnumError {
            kind: self,
            value: raw.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumValue {
    Nullability(Nullability),
    KeyRule(KeyRule),
}

impl EnumValue {
    pub fn kind(self) -> EnumKind {
        match self {
            Self::Nullability(_) => EnumKind::Nullability,
            Self::KeyRule(_) => EnumKind::KeyRule,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nullability(value) => value.as_str(),
            Self::KeyRule(value) => value.as_str(),
        }
    }
}

/// Column nullability as reported by a database driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

impl Nullability {
    pub const ALL: [Nullability; 3] = [Self::NoNulls, Self::Nullable, Self::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoNulls => "no-nulls",
            Self::Nullable => "nullable",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for Nullability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or(())
    }
}

/// Referential action of a relationship on update/delete of the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRule {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
    SetDefault,
}

impl KeyRule {
    pub const ALL: [KeyRule; 5] = [
        Self::Cascade,
        Self::Restrict,
        Self::SetNull,
        Self::NoAction,
        Self::SetDefault,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::Restrict => "restrict",
            Self::SetNull => "set-null",
            Self::NoAction => "no-action",
            Self::SetDefault => "set-default",
        }
    }
}

impl FromStr for KeyRule {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    kind: EnumKind,
    value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} value '{}'", self.kind.as_str(), self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// A structured value owned by some external subsystem (for example a data source
/// descriptor). Its wire form is decided by a codec registered on the type converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomValue {
    type_name: SmolStr,
    fields: BTreeMap<SmolStr, SmolStr>,
}

impl CustomValue {
    pub fn new(type_name: impl Into<SmolStr>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(SmolStr::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<SmolStr, SmolStr> {
        &self.fields
    }

    pub fn from_fields(type_name: impl Into<SmolStr>, fields: BTreeMap<SmolStr, SmolStr>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EnumKind, EnumValue, KeyRule, Nullability};

    #[test]
    fn enum_variants_parse_by_kind() {
        for value in Nullability::ALL {
            let parsed = EnumKind::Nullability
                .parse_variant(value.as_str())
                .expect("parse");
            assert_eq!(parsed, EnumValue::Nullability(value));
        }
        for value in KeyRule::ALL {
            let parsed = EnumKind::KeyRule.parse_variant(value.as_str()).expect("parse");
            assert_eq!(parsed, EnumValue::KeyRule(value));
        }
    }

    #[test]
    fn enum_parse_rejects_variant_of_other_kind() {
        let err = EnumKind::KeyRule
            .parse_variant("nullable")
            .expect_err("must reject");
        assert_eq!(err.to_string(), "invalid key-rule value 'nullable'");
    }
}
