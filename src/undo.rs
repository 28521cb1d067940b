// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Inverse-command log.
//!
//! The session feeds every change event into the log. Changes inside one transaction frame
//! form one [`Entry`]; a change outside any frame forms an entry of its own. The open entry
//! also serves as the in-memory journal used to revert a frame on rollback.

use std::collections::{HashMap, HashSet};

use smol_str::SmolStr;
use tracing::debug;

use crate::event::{Change, ChangeEvent};
use crate::model::{Graph, NodeId, Subtree, Value};

/// One recorded change, carrying what is needed to apply its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Property {
        node: NodeId,
        name: SmolStr,
        old: Value,
        new: Value,
    },
    /// Subtree as it was right after being linked.
    Added {
        parent: NodeId,
        index: usize,
        subtree: Subtree,
    },
    /// Subtree as it was right before being unlinked.
    Removed {
        parent: NodeId,
        index: usize,
        subtree: Subtree,
    },
    /// A node was marked populated by its lazy populator.
    Populated { node: NodeId },
}

impl Step {
    fn from_event(graph: &Graph, event: &ChangeEvent) -> Option<Self> {
        match &event.change {
            Change::Property { name, old, new } => Some(Self::Property {
                node: event.node,
                name: name.clone(),
                old: old.clone(),
                new: new.clone(),
            }),
            Change::ChildAdded { child, index } => Some(Self::Added {
                parent: event.node,
                index: *index,
                subtree: graph.snapshot(*child).ok()?,
            }),
            Change::ChildRemoved { child, index } => Some(Self::Removed {
                parent: event.node,
                index: *index,
                subtree: graph.snapshot(*child).ok()?,
            }),
        }
    }

    /// Every identity the step would look up when replayed.
    fn mentioned(&self, ids: &mut HashSet<NodeId>) {
        match self {
            Self::Property { node, old, new, .. } => {
                ids.insert(*node);
                ids.extend(old.as_ref_id());
                ids.extend(new.as_ref_id());
            }
            Self::Added { parent, subtree, .. } | Self::Removed { parent, subtree, .. } => {
                ids.insert(*parent);
                for node in subtree.nodes() {
                    ids.insert(node.id());
                    ids.extend(node.references().map(|(_, target)| target));
                }
            }
            Self::Populated { node } => {
                ids.insert(*node);
            }
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Property { name, .. } => format!("set {name}"),
            Self::Added { subtree, .. } => match subtree.root() {
                Some(node) => format!("add {}", node.kind()),
                None => "add".to_owned(),
            },
            Self::Removed { subtree, .. } => match subtree.root() {
                Some(node) => format!("remove {}", node.kind()),
                None => "remove".to_owned(),
            },
            Self::Populated { .. } => "populate".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded {
    step: Step,
    internal: bool,
}

/// The changes of one transaction frame (or one lone change), in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    label: SmolStr,
    steps: Vec<Recorded>,
}

impl Entry {
    fn new(label: &str) -> Self {
        Self {
            label: SmolStr::new(label),
            steps: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn steps(&self) -> impl DoubleEndedIterator<Item = &Step> + '_ {
        self.steps.iter().map(|r| &r.step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn strip_internal(&mut self) {
        self.steps.retain(|r| !r.internal);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Undo,
    Redo,
}

impl Replay {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

#[derive(Debug, Default)]
pub struct UndoLog {
    done: Vec<Entry>,
    undone: Vec<Entry>,
    pending: Option<Entry>,
    internal_depth: usize,
    replaying: Option<(Replay, SmolStr)>,
    remap: HashMap<NodeId, NodeId>,
    staged: HashMap<NodeId, NodeId>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.done.last().map(Entry::label)
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.undone.last().map(Entry::label)
    }

    /// Current identity of a node that may have been re-created by undo or redo.
    pub fn translate(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.staged.get(&id).or_else(|| self.remap.get(&id)) {
            id = *next;
        }
        id
    }

    /// Records re-created identities. During a replay they only become permanent when the
    /// replay succeeds.
    pub(crate) fn remap(&mut self, pairs: impl IntoIterator<Item = (NodeId, NodeId)>) {
        if self.replaying.is_some() {
            self.staged.extend(pairs);
        } else {
            self.remap.extend(pairs);
        }
    }

    /// Starts the entry of an outermost frame.
    pub(crate) fn open(&mut self, label: &str) {
        self.pending = Some(Entry::new(label));
    }

    pub(crate) fn record_event(&mut self, graph: &Graph, event: &ChangeEvent) {
        if let Some(step) = Step::from_event(graph, event) {
            self.record(step);
        }
    }

    pub(crate) fn record(&mut self, step: Step) {
        let internal = self.internal_depth > 0;
        if let Some(entry) = &mut self.pending {
            entry.steps.push(Recorded { step, internal });
            return;
        }
        if !internal {
            let mut entry = Entry::new(&step.label());
            entry.steps.push(Recorded { step, internal });
            self.push(entry);
        }
    }

    /// Steps recorded until the matching `leave_internal` are kept for rollback only.
    pub(crate) fn enter_internal(&mut self) {
        self.internal_depth += 1;
    }

    pub(crate) fn leave_internal(&mut self) {
        self.internal_depth = self.internal_depth.saturating_sub(1);
    }

    /// Ends the entry of an outermost frame.
    pub(crate) fn close(&mut self) {
        let Some(mut entry) = self.pending.take() else {
            return;
        };
        entry.strip_internal();
        if !entry.is_empty() {
            self.push(entry);
        }
    }

    /// Drops the open entry and hands it back so its steps can be reverted.
    pub(crate) fn abandon(&mut self) -> Option<Entry> {
        self.internal_depth = 0;
        self.pending.take()
    }

    pub(crate) fn take(&mut self, replay: Replay) -> Option<Entry> {
        match replay {
            Replay::Undo => self.done.pop(),
            Replay::Redo => self.undone.pop(),
        }
    }

    pub(crate) fn put_back(&mut self, replay: Replay, entry: Entry) {
        match replay {
            Replay::Undo => self.done.push(entry),
            Replay::Redo => self.undone.push(entry),
        }
    }

    pub(crate) fn start_replay(&mut self, replay: Replay, label: &str) {
        self.replaying = Some((replay, SmolStr::new(label)));
    }

    pub(crate) fn finish_replay(&mut self, succeeded: bool) {
        self.replaying = None;
        let staged = std::mem::take(&mut self.staged);
        if succeeded {
            self.remap.extend(staged);
        }
    }

    pub fn remap_len(&self) -> usize {
        self.remap.len()
    }

    /// Drops remap links that no remaining entry can reach.
    fn prune_remap(&mut self) {
        if self.done.is_empty() && self.undone.is_empty() {
            self.remap.clear();
            return;
        }
        let mut mentioned = HashSet::new();
        for entry in self.done.iter().chain(&self.undone) {
            for step in entry.steps() {
                step.mentioned(&mut mentioned);
            }
        }
        let mut live = HashSet::new();
        for mut id in mentioned {
            while let Some(next) = self.remap.get(&id) {
                if !live.insert(id) {
                    break;
                }
                id = *next;
            }
        }
        let before = self.remap.len();
        self.remap.retain(|id, _| live.contains(id));
        if self.remap.len() < before {
            debug!(dropped = before - self.remap.len(), kept = self.remap.len(), "remap pruned");
        }
    }

    fn push(&mut self, mut entry: Entry) {
        match &self.replaying {
            None => {
                self.done.push(entry);
                if !self.undone.is_empty() {
                    self.undone.clear();
                    self.prune_remap();
                }
            }
            Some((Replay::Undo, label)) => {
                entry.label = label.clone();
                self.undone.push(entry);
            }
            Some((Replay::Redo, label)) => {
                entry.label = label.clone();
                self.done.push(entry);
            }
        }
    }
}
