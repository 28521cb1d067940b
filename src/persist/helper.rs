// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Per-kind knowledge the persister bridge needs: which properties to skip, how each
//! property is typed on the wire, and how to describe an existing object as persist
//! operations.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;
use smol_str::SmolStr;
use tracing::debug;

use super::convert::{DataType, TypeConverter, WireValue};
use super::persister::PersistOp;
use crate::error::{GraphError, PersistError};
use crate::model::{descriptor, properties_of, Graph, NodeId, NodeKind};

pub trait PersisterHelper {
    fn kind(&self) -> NodeKind;

    /// Properties that are never forwarded to a persister.
    fn is_ignored(&self, property: &str) -> bool;

    fn data_type(&self, property: &str) -> Result<DataType, PersistError>;

    /// The object itself followed by every non-ignored property, with `old` set to null.
    fn object_payload(&self, graph: &Graph, id: NodeId) -> Result<Vec<PersistOp>, PersistError>;
}

/// Helper driven entirely by the property tables of [`properties_of`].
#[derive(Debug, Clone)]
pub struct RegistryHelper {
    kind: NodeKind,
    ignored: SmallVec<[SmolStr; 2]>,
    converter: TypeConverter,
}

impl RegistryHelper {
    pub fn new(kind: NodeKind, ignored: &[&str], converter: TypeConverter) -> Self {
        Self {
            kind,
            ignored: ignored.iter().map(|name| SmolStr::new(name)).collect(),
            converter,
        }
    }
}

impl PersisterHelper for RegistryHelper {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn is_ignored(&self, property: &str) -> bool {
        self.ignored.iter().any(|name| name == property)
    }

    fn data_type(&self, property: &str) -> Result<DataType, PersistError> {
        let Some(descriptor) = descriptor(self.kind, property) else {
            return Err(PersistError::Protocol(format!(
                "{} has no property '{property}'",
                self.kind
            )));
        };
        self.converter.data_type(descriptor.ty)
    }

    fn object_payload(&self, graph: &Graph, id: NodeId) -> Result<Vec<PersistOp>, PersistError> {
        let Some(node) = graph.get(id) else {
            return Err(PersistError::UnknownObject(id));
        };
        let parent = node.parent();
        let index = parent
            .and_then(|parent| graph.index_of(parent, id))
            .unwrap_or(0);
        let mut ops = vec![PersistOp::Object {
            kind: node.kind(),
            id,
            parent,
            index,
        }];
        for descriptor in properties_of(self.kind) {
            if self.is_ignored(descriptor.name) {
                continue;
            }
            ops.push(PersistOp::Property {
                id,
                name: SmolStr::new_static(descriptor.name),
                data_type: self.converter.data_type(descriptor.ty)?,
                old: WireValue::Null,
                new: self.converter.to_wire(node.property(descriptor.name))?,
            });
        }
        Ok(ops)
    }
}

/// Validated set of helpers, one per node kind.
pub struct PersisterHelperFactory {
    helpers: BTreeMap<NodeKind, Box<dyn PersisterHelper>>,
    converter: TypeConverter,
}

impl fmt::Debug for PersisterHelperFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersisterHelperFactory")
            .field("kinds", &self.helpers.keys().collect::<Vec<_>>())
            .field("converter", &self.converter)
            .finish()
    }
}

impl PersisterHelperFactory {
    pub fn builder(converter: TypeConverter) -> PersisterHelperFactoryBuilder {
        PersisterHelperFactoryBuilder {
            helpers: BTreeMap::new(),
            pending: Vec::new(),
            converter,
        }
    }

    /// Every kind registered with nothing ignored.
    pub fn with_defaults(converter: TypeConverter) -> Result<Self, GraphError> {
        Self::builder(converter).register_defaults().build()
    }

    pub fn helper(&self, kind: NodeKind) -> Result<&dyn PersisterHelper, PersistError> {
        match self.helpers.get(&kind) {
            Some(helper) => Ok(&**helper),
            None => Err(PersistError::Protocol(format!("no persister helper for {kind}"))),
        }
    }

    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }
}

pub struct PersisterHelperFactoryBuilder {
    helpers: BTreeMap<NodeKind, Box<dyn PersisterHelper>>,
    pending: Vec<(NodeKind, SmallVec<[SmolStr; 2]>)>,
    converter: TypeConverter,
}

impl PersisterHelperFactoryBuilder {
    /// Registers a table-driven helper for `kind` that skips `ignored`.
    pub fn register(mut self, kind: NodeKind, ignored: &[&str]) -> Self {
        self.pending.push((kind, ignored.iter().map(|name| SmolStr::new(name)).collect()));
        self
    }

    pub fn register_helper(mut self, helper: Box<dyn PersisterHelper>) -> Self {
        self.helpers.insert(helper.kind(), helper);
        self
    }

    /// Registers every kind with nothing ignored. Reference counts are persisted too, so a
    /// graph rebuilt from the persisted calls keeps its shared columns alive for as long as
    /// the live graph does.
    pub fn register_defaults(mut self) -> Self {
        for kind in NodeKind::ALL {
            self = self.register(kind, &[]);
        }
        self
    }

    /// Checks that every kind has a helper and every ignored name is a declared property of
    /// its kind. Later registrations replace earlier ones; explicit helpers win.
    pub fn build(self) -> Result<PersisterHelperFactory, GraphError> {
        let Self {
            helpers: explicit,
            pending,
            converter,
        } = self;
        let mut helpers: BTreeMap<NodeKind, Box<dyn PersisterHelper>> = BTreeMap::new();
        for (kind, ignored) in pending {
            if let Some(unknown) = ignored.iter().find(|name| descriptor(kind, name).is_none()) {
                return Err(GraphError::Configuration(format!(
                    "{kind} has no property '{unknown}' to ignore"
                )));
            }
            let names: Vec<&str> = ignored.iter().map(SmolStr::as_str).collect();
            let helper = RegistryHelper::new(kind, &names, converter.clone());
            helpers.insert(kind, Box::new(helper));
        }
        helpers.extend(explicit);
        let missing: Vec<&str> = NodeKind::ALL
            .into_iter()
            .filter(|kind| !helpers.contains_key(kind))
            .map(NodeKind::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::Configuration(format!(
                "no persister helper for {}",
                missing.join(", ")
            )));
        }
        debug!(kinds = helpers.len(), "persister helpers ready");
        Ok(PersisterHelperFactory {
            helpers,
            converter,
        })
    }
}
