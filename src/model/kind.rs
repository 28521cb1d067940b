// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The concrete type of a node in the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum NodeKind {
    Root,
    Database,
    Table,
    Column,
    Index,
    IndexColumn,
    Relationship,
    ColumnMapping,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        Self::Root,
        Self::Database,
        Self::Table,
        Self::Column,
        Self::Index,
        Self::IndexColumn,
        Self::Relationship,
        Self::ColumnMapping,
    ];

    /// Child kinds this kind accepts, in sibling block order.
    pub fn allowed_child_kinds(self) -> &'static [NodeKind] {
        match self {
            Self::Root => &[Self::Database],
            Self::Database => &[Self::Table, Self::Relationship],
            Self::Table => &[Self::Column, Self::Index],
            Self::Index => &[Self::IndexColumn],
            Self::Relationship => &[Self::ColumnMapping],
            Self::Column | Self::IndexColumn | Self::ColumnMapping => &[],
        }
    }

    pub fn allows_child(self, child: NodeKind) -> bool {
        self.allowed_child_kinds().contains(&child)
    }

    pub fn allows_children(self) -> bool {
        !self.allowed_child_kinds().is_empty()
    }

    /// Shared nodes are reference counted and are never removed directly by their parent.
    pub fn is_shared(self) -> bool {
        matches!(self, Self::Column)
    }

    /// Kinds that cannot outlive the nodes they reference; severing one of their
    /// dependencies removes the node itself.
    pub fn removed_with_dependency(self) -> bool {
        matches!(self, Self::Relationship | Self::ColumnMapping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Database => "database",
            Self::Table => "table",
            Self::Column => "column",
            Self::Index => "index",
            Self::IndexColumn => "index-column",
            Self::Relationship => "relationship",
            Self::ColumnMapping => "column-mapping",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NodeKind> for &'static str {
    fn from(kind: NodeKind) -> Self {
        kind.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNodeKindError {
    value: String,
}

impl fmt::Display for ParseNodeKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node kind '{}'", self.value)
    }
}

impl std::error::Error for ParseNodeKindError {}

impl FromStr for NodeKind {
    type Err = ParseNodeKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseNodeKindError { value: s.to_owned() })
    }
}

impl TryFrom<String> for NodeKind {
    type Error = ParseNodeKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
