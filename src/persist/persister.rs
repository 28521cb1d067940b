// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::convert::{DataType, WireValue};
use crate::error::PersistError;
use crate::model::{NodeId, NodeKind};

/// Sink that durably records or forwards graph mutations.
///
/// Only the three operations are required. Batch framing is optional: a persister that has
/// no notion of transactions can ignore `begin`/`commit`/`rollback`.
pub trait Persister {
    fn begin(&mut self, _label: &str) -> Result<(), PersistError> {
        Ok(())
    }

    fn persist_object(
        &mut self,
        kind: NodeKind,
        id: NodeId,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<(), PersistError>;

    fn persist_property(
        &mut self,
        id: NodeId,
        name: &str,
        data_type: &DataType,
        old: &WireValue,
        new: &WireValue,
    ) -> Result<(), PersistError>;

    fn remove_object(&mut self, id: NodeId) -> Result<(), PersistError>;

    fn commit(&mut self) -> Result<(), PersistError> {
        Ok(())
    }

    /// Called when a batch could not be delivered completely.
    fn rollback(&mut self) {}
}

/// One persist operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum PersistOp {
    Object {
        kind: NodeKind,
        id: NodeId,
        parent: Option<NodeId>,
        index: usize,
    },
    Property {
        id: NodeId,
        name: SmolStr,
        data_type: DataType,
        old: WireValue,
        new: WireValue,
    },
    Remove {
        id: NodeId,
    },
}

impl PersistOp {
    pub fn apply_to(&self, persister: &mut dyn Persister) -> Result<(), PersistError> {
        match self {
            Self::Object {
                kind,
                id,
                parent,
                index,
            } => persister.persist_object(*kind, *id, *parent, *index),
            Self::Property {
                id,
                name,
                data_type,
                old,
                new,
            } => persister.persist_property(*id, name, data_type, old, new),
            Self::Remove { id } => persister.remove_object(*id),
        }
    }
}

/// Operations that reach a persister together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub label: SmolStr,
    pub ops: Vec<PersistOp>,
}

impl Batch {
    pub fn new(label: impl Into<SmolStr>, ops: Vec<PersistOp>) -> Self {
        Self {
            label: label.into(),
            ops,
        }
    }

    /// Sends `begin`, every operation, then `commit`. On the first failure the persister is
    /// told to roll back and the error is returned.
    pub fn deliver(&self, persister: &mut dyn Persister) -> Result<(), PersistError> {
        persister.begin(&self.label)?;
        let result = self
            .ops
            .iter()
            .try_for_each(|op| op.apply_to(persister))
            .and_then(|()| persister.commit());
        if result.is_err() {
            persister.rollback();
        }
        result
    }
}

/// Everything a [`MemoryPersister`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCall {
    Begin(SmolStr),
    Op(PersistOp),
    Commit,
    Rollback,
}

impl PersistCall {
    pub fn op(&self) -> Option<&PersistOp> {
        match self {
            Self::Op(op) => Some(op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MirrorState {
    objects: HashMap<NodeId, Option<NodeId>>,
    properties: HashMap<(NodeId, SmolStr), WireValue>,
}

impl MirrorState {
    fn remove_subtree(&mut self, id: NodeId) {
        let mut doomed = HashSet::from([id]);
        loop {
            let before = doomed.len();
            for (child, parent) in &self.objects {
                if parent.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(*child);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        self.objects.retain(|object, _| !doomed.contains(object));
        self.properties.retain(|(object, _), _| !doomed.contains(object));
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    calls: Vec<PersistCall>,
    committed: MirrorState,
    working: Option<MirrorState>,
    created: HashSet<NodeId>,
}

impl MemoryInner {
    fn state(&mut self) -> &mut MirrorState {
        match &mut self.working {
            Some(state) => state,
            None => &mut self.committed,
        }
    }
}

/// In-process persister: records every call and mirrors the persisted property values.
///
/// Clones share state, so a test can hand one clone to the bridge and inspect another. A
/// property write whose old value disagrees with the mirror is a conflict, except for
/// objects created earlier in the same batch.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersister {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PersistCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn ops(&self) -> Vec<PersistOp> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(PersistCall::op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.borrow().committed.objects.contains_key(&id)
    }

    pub fn object_count(&self) -> usize {
        self.inner.borrow().committed.objects.len()
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<WireValue> {
        self.inner
            .borrow()
            .committed
            .properties
            .get(&(id, SmolStr::new(name)))
            .cloned()
    }

    /// Overwrites a mirrored value as if another writer had changed it.
    pub fn simulate_external_write(&self, id: NodeId, name: &str, value: WireValue) {
        self.inner
            .borrow_mut()
            .committed
            .properties
            .insert((id, SmolStr::new(name)), value);
    }

    fn record(&self, call: PersistCall) {
        self.inner.borrow_mut().calls.push(call);
    }
}

impl Persister for MemoryPersister {
    fn begin(&mut self, label: &str) -> Result<(), PersistError> {
        self.record(PersistCall::Begin(SmolStr::new(label)));
        let mut inner = self.inner.borrow_mut();
        if inner.working.is_some() {
            return Err(PersistError::Protocol("nested batch".to_owned()));
        }
        inner.working = Some(inner.committed.clone());
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
        self.record(PersistCall::Op(PersistOp::Object {
            kind,
            id,
            parent,
            index,
        }));
        let mut inner = self.inner.borrow_mut();
        let state = inner.state();
        if state.objects.contains_key(&id) {
            return Err(PersistError::Protocol(format!("object {id} persisted twice")));
        }
        state.objects.insert(id, parent);
        inner.created.insert(id);
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
        self.record(PersistCall::Op(PersistOp::Property {
            id,
            name: SmolStr::new(name),
            data_type: data_type.clone(),
            old: old.clone(),
            new: new.clone(),
        }));
        let mut inner = self.inner.borrow_mut();
        let fresh = inner.created.contains(&id);
        let state = inner.state();
        if !state.objects.contains_key(&id) {
            return Err(PersistError::UnknownObject(id));
        }
        let key = (id, SmolStr::new(name));
        let current = state.properties.get(&key).cloned().unwrap_or(WireValue::Null);
        if !fresh && current != *old {
            return Err(PersistError::Conflict {
                id,
                property: key.1,
                expected: old.to_string(),
                found: current.to_string(),
            });
        }
        state.properties.insert(key, new.clone());
        Ok(())
    }

    fn remove_object(&mut self, id: NodeId) -> Result<(), PersistError> {
        self.record(PersistCall::Op(PersistOp::Remove { id }));
        let mut inner = self.inner.borrow_mut();
        let state = inner.state();
        if !state.objects.contains_key(&id) {
            return Err(PersistError::UnknownObject(id));
        }
        state.remove_subtree(id);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistError> {
        self.record(PersistCall::Commit);
        let mut inner = self.inner.borrow_mut();
        let Some(working) = inner.working.take() else {
            return Err(PersistError::Protocol("commit without begin".to_owned()));
        };
        inner.committed = working;
        inner.created.clear();
        Ok(())
    }

    fn rollback(&mut self) {
        self.record(PersistCall::Rollback);
        let mut inner = self.inner.borrow_mut();
        inner.working = None;
        inner.created.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, MemoryPersister, PersistCall, PersistOp, Persister};
    use crate::error::PersistError;
    use crate::model::{NodeId, NodeKind};
    use crate::persist::convert::{DataType, WireValue};

    fn object(id: NodeId, parent: Option<NodeId>) -> PersistOp {
        PersistOp::Object {
            kind: NodeKind::Table,
            id,
            parent,
            index: 0,
        }
    }

    fn rename(id: NodeId, old: &str, new: &str) -> PersistOp {
        PersistOp::Property {
            id,
            name: "name".into(),
            data_type: DataType::String,
            old: WireValue::String(old.into()),
            new: WireValue::String(new.into()),
        }
    }

    #[test]
    fn stale_old_value_is_a_conflict_and_nothing_is_committed() {
        let mut persister = MemoryPersister::new();
        let id = NodeId::new();
        Batch::new("create", vec![object(id, None), rename(id, "", "orders")])
            .deliver(&mut persister)
            .expect("create");

        persister.simulate_external_write(id, "name", WireValue::String("sales".into()));
        let err = Batch::new("rename", vec![rename(id, "orders", "invoices")])
            .deliver(&mut persister)
            .expect_err("conflict");
        assert!(matches!(err, PersistError::Conflict { .. }));
        assert_eq!(
            persister.property(id, "name"),
            Some(WireValue::String("sales".into()))
        );
        assert_eq!(persister.calls().last(), Some(&PersistCall::Rollback));
    }

    #[test]
    fn removing_an_object_drops_its_descendants() {
        let mut persister = MemoryPersister::new();
        let (table, column) = (NodeId::new(), NodeId::new());
        Batch::new(
            "create",
            vec![object(table, None), object(column, Some(table))],
        )
        .deliver(&mut persister)
        .expect("create");
        assert_eq!(persister.object_count(), 2);

        Batch::new("remove", vec![PersistOp::Remove { id: table }])
            .deliver(&mut persister)
            .expect("remove");
        assert_eq!(persister.object_count(), 0);
        assert!(!persister.contains(column));
    }

    #[test]
    fn property_for_unknown_object_is_rejected() {
        let mut persister = MemoryPersister::new();
        persister.begin("orphan").expect("begin");
        let err = persister
            .persist_property(
                NodeId::new(),
                "name",
                &DataType::String,
                &WireValue::Null,
                &WireValue::Null,
            )
            .expect_err("unknown");
        assert!(matches!(err, PersistError::UnknownObject(_)));
    }

    #[test]
    fn ops_serialize_with_kebab_case_tags() {
        let id = NodeId::new();
        let json = serde_json::to_value(PersistOp::Remove { id }).expect("json");
        assert_eq!(json["op"], "remove");
        assert_eq!(json["id"], id.to_string());
    }
}
