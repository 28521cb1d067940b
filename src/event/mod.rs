// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Change events and their delivery.
//!
//! Every mutation of a graph produces one [`ChangeEvent`]. Events are delivered
//! synchronously, in mutation order, on the mutating thread; compound mutations are framed
//! by `Begin`/`Commit` notifications.

pub mod bus;

use smol_str::SmolStr;

use crate::model::{NodeId, Value};

pub use bus::{EventBus, Listener, ListenerId, Scope};

/// What happened to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Property {
        name: SmolStr,
        old: Value,
        new: Value,
    },
    /// `child` was linked under the event's node at absolute sibling position `index`.
    ChildAdded { child: NodeId, index: usize },
    /// `child` is about to be unlinked from sibling position `index`. Delivered while the
    /// child's subtree is still present in the graph.
    ChildRemoved { child: NodeId, index: usize },
}

/// Immutable record of one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Monotonic per session.
    pub seq: u64,
    pub node: NodeId,
    pub change: Change,
}

impl ChangeEvent {
    pub fn property_name(&self) -> Option<&str> {
        match &self.change {
            Change::Property { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// The event that undoes this one, with a new sequence number.
    pub fn inverse(&self, seq: u64) -> ChangeEvent {
        let change = match &self.change {
            Change::Property { name, old, new } => Change::Property {
                name: name.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Change::ChildAdded { child, index } => Change::ChildRemoved {
                child: *child,
                index: *index,
            },
            Change::ChildRemoved { child, index } => Change::ChildAdded {
                child: *child,
                index: *index,
            },
        };
        ChangeEvent {
            seq,
            node: self.node,
            change,
        }
    }
}

/// What listeners receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Begin { label: SmolStr },
    Change(ChangeEvent),
    Commit,
    Rollback,
}
