// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core object model.
//!
//! A graph is an arena of typed nodes (databases, tables, columns, relationships, ...)
//! forming one ownership tree, plus non-owning references between nodes.

pub mod config;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod graph;
pub mod ids;
pub mod image;
pub mod kind;
pub mod node;
pub mod property;
pub mod value;

pub use config::GraphConfig;
pub use graph::{Graph, Subtree};
pub use ids::{Id, IdError, NodeId, SessionId};
pub use image::{Image, ImageError};
pub use kind::{NodeKind, ParseNodeKindError};
pub use node::{ObjectNode, REFERENCE_COUNT};
pub use property::{descriptor, properties_of, PropertyDescriptor, PropertyType};
pub use value::{CustomValue, EnumKind, EnumValue, KeyRule, Nullability, ParseEnumError, Value};
