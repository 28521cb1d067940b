// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Error taxonomy shared by the graph, the event bus and the persister bridge.

use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::model::{NodeId, NodeKind};

/// Failures raised by graph mutators and traversal.
///
/// Structural and reference-count errors leave the graph exactly as it was before the call.
/// A `Persist` error is raised after the in-memory mutation has been applied; the graph is
/// not rolled back and may have diverged from the persisted copy.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    #[error("cannot remove {node}: {} dependent object(s) still reference it", .dependents.len())]
    ObjectDependent {
        node: NodeId,
        dependents: Vec<NodeId>,
    },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("population of {node} failed: {source}")]
    Population {
        node: NodeId,
        #[source]
        source: PopulationError,
    },

    #[error("unknown object {0}")]
    UnknownObject(NodeId),

    #[error("invalid property {kind}.{name}: {reason}")]
    InvalidProperty {
        kind: NodeKind,
        name: SmolStr,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Failure reported by a lazy populator. The node being populated is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PopulationError {
    pub reason: String,
}

impl PopulationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failures of the converter, the bridge and persister backends. None of these are retried
/// by the core.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("unsupported type '{type_name}'")]
    UnsupportedType { type_name: SmolStr },

    #[error("persistence conflict on {id}.{property}: expected {expected}, found {found}")]
    Conflict {
        id: NodeId,
        property: SmolStr,
        expected: String,
        found: String,
    },

    #[error("unknown object {0}")]
    UnknownObject(NodeId),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cannot decode {data_type} wire value: {reason}")]
    Decode { data_type: SmolStr, reason: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error at {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    pub fn unsupported(type_name: impl Into<SmolStr>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}

impl GraphError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::StructuralViolation(message.into())
    }

    pub(crate) fn invalid_property(
        kind: NodeKind,
        name: impl Into<SmolStr>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidProperty {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }
}
