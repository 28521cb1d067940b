// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeSet, HashMap};

use super::ids::NodeId;
use super::kind::NodeKind;
use super::node::ObjectNode;
use super::value::Value;
use crate::error::GraphError;

/// Arena of nodes keyed by identity.
///
/// The arena is the only owner of nodes. Ownership edges (parent/children) form a strict
/// tree under `root`; reference-typed properties form dependency edges, indexed in reverse
/// so removal checks do not scan the whole graph.
#[derive(Debug, Clone)]
pub struct Graph {
    root: NodeId,
    nodes: HashMap<NodeId, ObjectNode>,
    dependents: HashMap<NodeId, BTreeSet<NodeId>>,
}

/// Detached copy of a subtree, root first, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    nodes: Vec<ObjectNode>,
}

impl Subtree {
    pub fn root(&self) -> Option<&ObjectNode> {
        self.nodes.first()
    }

    pub fn nodes(&self) -> &[ObjectNode] {
        &self.nodes
    }

    pub(crate) fn into_nodes(self) -> Vec<ObjectNode> {
        self.nodes
    }

    /// Rewrites every identity of the subtree to a fresh one, including parent/child links
    /// and references between members. Returns the `(old, new)` pairs.
    pub(crate) fn reidentify(&mut self) -> Vec<(NodeId, NodeId)> {
        let remap: HashMap<NodeId, NodeId> = self
            .nodes
            .iter()
            .map(|node| (node.id(), NodeId::new()))
            .collect();
        let translate = |id: NodeId| remap.get(&id).copied().unwrap_or(id);

        for node in &mut self.nodes {
            node.set_id(translate(node.id()));
            let parent = node.parent().map(translate);
            node.set_parent(parent);
            for child in node.children_mut() {
                *child = translate(*child);
            }
            let refs: Vec<(&'static str, NodeId)> = node.references().collect();
            for (name, target) in refs {
                node.put(name, Value::Ref(translate(target)));
            }
        }

        remap.into_iter().collect()
    }
}

impl Graph {
    pub fn new(root: ObjectNode) -> Self {
        let root_id = root.id();
        let mut graph = Self {
            root: root_id,
            nodes: HashMap::new(),
            dependents: HashMap::new(),
        };
        graph.index_references(&root);
        graph.nodes.insert(root_id, root);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ObjectNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&ObjectNode, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownObject(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut ObjectNode, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownObject(id))
    }

    /// Children of `id` without triggering population, optionally filtered by kind.
    pub fn children(&self, id: NodeId, kind: Option<NodeKind>) -> Result<Vec<NodeId>, GraphError> {
        let node = self.node(id)?;
        Ok(node
            .children()
            .iter()
            .copied()
            .filter(|child| match kind {
                Some(kind) => self.get(*child).is_some_and(|c| c.kind() == kind),
                None => true,
            })
            .collect())
    }

    /// Absolute sibling position at which the block of `child_kind` starts under `parent`.
    pub fn child_position_offset(
        &self,
        parent: NodeId,
        child_kind: NodeKind,
    ) -> Result<usize, GraphError> {
        let node = self.node(parent)?;
        let allowed = node.kind().allowed_child_kinds();
        let Some(block) = allowed.iter().position(|k| *k == child_kind) else {
            return Err(GraphError::structural(format!(
                "{} does not allow {child_kind} children",
                node.kind()
            )));
        };
        let earlier = &allowed[..block];
        Ok(node
            .children()
            .iter()
            .filter(|c| self.get(**c).is_some_and(|c| earlier.contains(&c.kind())))
            .count())
    }

    /// Position of `child` among its parent's children.
    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.get(parent)?.children().iter().position(|c| *c == child)
    }

    /// Pre-order identities of the subtree rooted at `id` (including `id`).
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children().iter().rev().copied());
        }
        out
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(ObjectNode::parent);
        }
        false
    }

    /// Nodes outside this node's ownership subtree that it references.
    pub fn dependencies(&self, id: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let node = self.node(id)?;
        Ok(node
            .references()
            .map(|(_, target)| target)
            .filter(|target| !self.is_ancestor_or_self(id, *target))
            .collect())
    }

    /// Nodes that reference `id` directly.
    pub fn referrers(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.dependents.get(&id).cloned().unwrap_or_default()
    }

    /// Nodes outside the subtree of `id` that reference any node inside it, in discovery
    /// order (subtree pre-order, then referrer identity).
    pub fn external_dependents(&self, id: NodeId) -> Vec<NodeId> {
        let members: BTreeSet<NodeId> = self.subtree(id).into_iter().collect();
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for member in self.subtree(id) {
            for referrer in self.referrers(member) {
                if !members.contains(&referrer) && seen.insert(referrer) {
                    out.push(referrer);
                }
            }
        }
        out
    }

    /// Checks that a node of `kind` may be inserted at block-relative `index` under
    /// `parent`, returning the absolute sibling position.
    pub(crate) fn insertion_point(
        &self,
        parent: NodeId,
        kind: NodeKind,
        index: usize,
    ) -> Result<usize, GraphError> {
        let offset = self.child_position_offset(parent, kind)?;
        let block_len = self.children(parent, Some(kind))?.len();
        if index > block_len {
            return Err(GraphError::structural(format!(
                "index {index} is past the end of the {kind} block ({block_len} children)"
            )));
        }
        Ok(offset + index)
    }

    /// Moves `nodes` (pre-order, first element is the subtree root) into the arena and links
    /// the root under `parent` at absolute `position`.
    pub(crate) fn attach(
        &mut self,
        parent: NodeId,
        position: usize,
        nodes: Vec<ObjectNode>,
    ) -> Result<NodeId, GraphError> {
        let Some(root) = nodes.first() else {
            return Err(GraphError::structural("cannot attach an empty subtree"));
        };
        let root_id = root.id();
        let root_kind = root.kind();
        if let Some(clash) = nodes.iter().find(|n| self.contains(n.id())) {
            return Err(GraphError::structural(format!(
                "object {} is already part of the graph",
                clash.id()
            )));
        }
        let parent_node = self.node_mut(parent)?;
        if !parent_node.kind().allows_child(root_kind) {
            return Err(GraphError::structural(format!(
                "{} does not allow {root_kind} children",
                parent_node.kind()
            )));
        }
        if position > parent_node.children().len() {
            return Err(GraphError::structural(format!(
                "position {position} is out of bounds under {parent}"
            )));
        }
        parent_node.children_mut().insert(position, root_id);

        for mut node in nodes {
            if node.id() == root_id {
                node.set_parent(Some(parent));
            }
            self.index_references(&node);
            self.nodes.insert(node.id(), node);
        }
        Ok(root_id)
    }

    /// Unlinks the subtree rooted at `id` and removes it from the arena.
    pub(crate) fn detach(&mut self, id: NodeId) -> Result<Subtree, GraphError> {
        if id == self.root {
            return Err(GraphError::structural("the root cannot be removed"));
        }
        let parent = self.node(id)?.parent();
        let order = self.subtree(id);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children_mut().retain(|c| *c != id);
        }

        let mut nodes = Vec::with_capacity(order.len());
        for member in order {
            if let Some(mut node) = self.nodes.remove(&member) {
                self.unindex_references(&node);
                if member == id {
                    node.set_parent(None);
                }
                nodes.push(node);
            }
        }
        Ok(Subtree { nodes })
    }

    pub fn snapshot(&self, id: NodeId) -> Result<Subtree, GraphError> {
        self.node(id)?;
        let nodes = self
            .subtree(id)
            .into_iter()
            .filter_map(|member| self.get(member).cloned())
            .collect();
        Ok(Subtree { nodes })
    }

    /// Stores `value` under `name`, keeping the reverse reference index current. Returns the
    /// previous value. Validation is the caller's job.
    pub(crate) fn put_property(
        &mut self,
        id: NodeId,
        name: &str,
        value: Value,
    ) -> Result<Value, GraphError> {
        let new_target = value.as_ref_id();
        let old = self.node_mut(id)?.put(name, value);
        if let Some(target) = old.as_ref_id() {
            let still_referenced = self
                .get(id)
                .is_some_and(|n| n.references().any(|(_, t)| t == target));
            if !still_referenced {
                self.remove_dependent(target, id);
            }
        }
        if let Some(target) = new_target {
            self.dependents.entry(target).or_default().insert(id);
        }
        Ok(old)
    }

    pub(crate) fn set_populated(&mut self, id: NodeId, populated: bool) -> Result<(), GraphError> {
        self.node_mut(id)?.set_populated(populated);
        Ok(())
    }

    fn index_references(&mut self, node: &ObjectNode) {
        for (_, target) in node.references() {
            self.dependents.entry(target).or_default().insert(node.id());
        }
    }

    fn unindex_references(&mut self, node: &ObjectNode) {
        for (_, target) in node.references() {
            self.remove_dependent(target, node.id());
        }
    }

    fn remove_dependent(&mut self, target: NodeId, referrer: NodeId) {
        if let Some(set) = self.dependents.get_mut(&target) {
            set.remove(&referrer);
            if set.is_empty() {
                self.dependents.remove(&target);
            }
        }
    }
}
