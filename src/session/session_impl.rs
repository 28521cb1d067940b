// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Frame handling, event dispatch and the structural primitives behind the public mutators.
/// Keeps `session::mod` focused on the public surface.
impl Session {
    /// Finishes a public call: listener errors collected while it ran are reported after the
    /// mutation, unless the call itself already failed.
    fn settle<T>(&mut self, result: Result<T, GraphError>) -> Result<T, GraphError> {
        let deferred = self.deferred.take();
        if !self.bus.in_transaction() {
            self.bus.prune(&self.graph);
        }
        let value = result?;
        match deferred {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    fn defer(&mut self, err: GraphError) {
        self.deferred.get_or_insert(err);
    }

    fn emit(&mut self, node: NodeId, change: Change) {
        let event = ChangeEvent {
            seq: self.bus.next_seq(),
            node,
            change,
        };
        self.undo.record_event(&self.graph, &event);
        if let Err(err) = self.bus.deliver(&self.graph, &event) {
            self.defer(err);
        }
    }

    fn open_frame(&mut self, label: &str) {
        if !self.bus.in_transaction() {
            self.undo.open(label);
        }
        if let Err(err) = self.bus.begin(&self.graph, label) {
            self.defer(err);
        }
    }

    fn close_frame(&mut self) {
        if let Err(err) = self.bus.commit(&self.graph) {
            self.defer(err);
        }
        if !self.bus.in_transaction() {
            self.undo.close();
        }
    }

    fn abort_frame(&mut self) {
        if let Some(entry) = self.undo.abandon() {
            self.revert_silently(&entry);
        }
        if let Err(err) = self.bus.rollback(&self.graph) {
            self.defer(err);
        }
    }

    /// Runs `apply` inside a frame. When the frame is the outermost one a failure reverts
    /// everything `apply` did; inside a caller's frame the caller decides.
    fn framed<T>(
        &mut self,
        label: &str,
        apply: impl FnOnce(&mut Self) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let outermost = !self.bus.in_transaction();
        self.open_frame(label);
        match apply(self) {
            Ok(value) => {
                self.close_frame();
                Ok(value)
            }
            Err(err) if outermost => {
                warn!(label, error = %err, "operation failed; reverting its frame");
                self.abort_frame();
                Err(err)
            }
            Err(err) => {
                self.close_frame();
                Err(err)
            }
        }
    }

    fn revert_silently(&mut self, entry: &Entry) {
        for step in entry.steps().rev() {
            let reverted = match step {
                Step::Property { node, name, old, .. } => self
                    .graph
                    .put_property(*node, name, old.clone())
                    .map(drop),
                Step::Added { subtree, .. } => match subtree.root() {
                    Some(root) => self.graph.detach(root.id()).map(drop),
                    None => Ok(()),
                },
                Step::Removed {
                    parent,
                    index,
                    subtree,
                } => self
                    .graph
                    .attach(*parent, *index, subtree.nodes().to_vec())
                    .map(drop),
                Step::Populated { node } => self.graph.set_populated(*node, false),
            };
            if let Err(err) = reverted {
                warn!(error = %err, "could not revert step during rollback");
            }
        }
        debug!(label = entry.label(), steps = entry.len(), "frame reverted");
    }

    /// Checks that `node` can be linked under `parent`. `batch` holds identities that will be
    /// attached earlier in the same operation.
    fn check_new_node(
        &self,
        parent: NodeId,
        node: &ObjectNode,
        batch: &BTreeSet<NodeId>,
    ) -> Result<(), GraphError> {
        let kind = node.kind();
        let parent_kind = self.graph.node(parent)?.kind();
        if !parent_kind.allows_child(kind) {
            return Err(GraphError::structural(format!(
                "{parent_kind} does not allow {kind} children"
            )));
        }
        if self.graph.contains(node.id()) || batch.contains(&node.id()) {
            return Err(GraphError::structural(format!(
                "object {} is already part of the graph",
                node.id()
            )));
        }
        if !node.children().is_empty() {
            return Err(GraphError::structural(format!(
                "{kind} {} must be added without children",
                node.id()
            )));
        }
        for d in properties_of(kind) {
            if d.ty == PropertyType::Ref && !d.nullable && node.property(d.name).is_null() {
                return Err(GraphError::invalid_property(
                    kind,
                    d.name,
                    "required reference is not set",
                ));
            }
        }
        for (name, target) in node.references() {
            if batch.contains(&target) {
                continue;
            }
            let target_kind = self.graph.node(target)?.kind();
            if kind == NodeKind::ColumnMapping && target_kind != NodeKind::Column {
                return Err(GraphError::invalid_property(
                    kind,
                    name,
                    format!("must reference a column, not a {target_kind}"),
                ));
            }
        }
        Ok(())
    }

    fn add_child_inner(
        &mut self,
        parent: NodeId,
        node: ObjectNode,
        index: usize,
    ) -> Result<NodeId, GraphError> {
        self.check_new_node(parent, &node, &BTreeSet::new())?;
        let kind = node.kind();
        let position = self.graph.insertion_point(parent, kind, index)?;
        match fk_column(&node) {
            Some(column) => self.framed(&format!("add {kind}"), |s| {
                let id = s.attach_nodes(parent, position, vec![node])?;
                s.add_reference(column)?;
                Ok(id)
            }),
            None => self.attach_nodes(parent, position, vec![node]),
        }
    }

    fn attach_nodes(
        &mut self,
        parent: NodeId,
        position: usize,
        nodes: Vec<ObjectNode>,
    ) -> Result<NodeId, GraphError> {
        let child = self.graph.attach(parent, position, nodes)?;
        debug!(%parent, %child, position, "child added");
        self.emit(parent, Change::ChildAdded {
            child,
            index: position,
        });
        Ok(child)
    }

    /// Fires `ChildRemoved` while the subtree is still reachable, then unlinks it.
    fn detach_node(&mut self, child: NodeId) -> Result<Subtree, GraphError> {
        let parent = self
            .graph
            .node(child)?
            .parent()
            .ok_or_else(|| GraphError::structural("the root cannot be removed"))?;
        let index = self.graph.index_of(parent, child).ok_or_else(|| {
            GraphError::IllegalState(format!("{child} is not linked under its parent {parent}"))
        })?;
        self.emit(parent, Change::ChildRemoved { child, index });
        let removed = self.graph.detach(child)?;
        debug!(%parent, %child, index, nodes = removed.nodes().len(), "child removed");
        Ok(removed)
    }

    fn remove_child_inner(&mut self, parent: NodeId, child: NodeId) -> Result<bool, GraphError> {
        let node = self.graph.node(child)?;
        if node.parent() != Some(parent) {
            return Err(GraphError::structural(format!(
                "{child} is not a child of {parent}"
            )));
        }
        if node.kind().is_shared() {
            debug!(%child, refs = node.reference_count(), "shared node is not removed directly");
            return Ok(false);
        }
        self.remove_subtree(child)?;
        Ok(true)
    }

    /// Removes `target` and its subtree, then releases the column references held by the
    /// mappings that went with it.
    fn remove_subtree(&mut self, target: NodeId) -> Result<(), GraphError> {
        let kind = self.graph.node(target)?.kind();
        let dependents = self.graph.external_dependents(target);
        if !dependents.is_empty() {
            return Err(GraphError::ObjectDependent {
                node: target,
                dependents,
            });
        }
        let releases = self.plan_releases(target)?;
        if releases.is_empty() {
            return self.detach_node(target).map(drop);
        }
        self.framed(&format!("remove {kind}"), |s| {
            s.detach_node(target)?;
            for column in releases {
                s.remove_reference(column)?;
            }
            Ok(())
        })
    }

    /// Foreign-key columns outside `target` referenced by mappings inside it, one entry per
    /// mapping. Fails up front when a release would underflow or would drop a column that
    /// something else still depends on.
    fn plan_releases(&self, target: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let order = self.graph.subtree(target);
        let members: BTreeSet<NodeId> = order.iter().copied().collect();
        let releases: Vec<NodeId> = order
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .filter_map(fk_column)
            .filter(|column| !members.contains(column))
            .collect();

        let mut counted: BTreeMap<NodeId, u32> = BTreeMap::new();
        for column in &releases {
            *counted.entry(*column).or_default() += 1;
        }
        for (column, released) in counted {
            let held = self.graph.node(column)?.reference_count();
            if released > held {
                return Err(GraphError::IllegalState(format!(
                    "releasing {released} reference(s) of {column} but only {held} are held"
                )));
            }
            if released == held {
                let blocking: Vec<NodeId> = self
                    .graph
                    .external_dependents(column)
                    .into_iter()
                    .filter(|d| !members.contains(d))
                    .collect();
                if !blocking.is_empty() {
                    return Err(GraphError::ObjectDependent {
                        node: column,
                        dependents: blocking,
                    });
                }
            }
        }
        Ok(releases)
    }

    fn set_parent_inner(
        &mut self,
        child: NodeId,
        new_parent: NodeId,
        index: usize,
    ) -> Result<NodeId, GraphError> {
        let node = self.graph.node(child)?;
        let kind = node.kind();
        if node.parent().is_none() {
            return Err(GraphError::structural("the root cannot be moved"));
        }
        if self.graph.is_ancestor_or_self(child, new_parent) {
            return Err(GraphError::structural(format!(
                "cannot move {child} below itself"
            )));
        }
        let parent_kind = self.graph.node(new_parent)?.kind();
        if !parent_kind.allows_child(kind) {
            return Err(GraphError::structural(format!(
                "{parent_kind} does not allow {kind} children"
            )));
        }
        let mut moved = self.graph.snapshot(child)?;
        self.framed(&format!("move {kind}"), |s| {
            s.remove_subtree(child)?;
            let pairs = moved.reidentify();
            let position = s.graph.insertion_point(new_parent, kind, index)?;
            let nodes = moved.into_nodes();
            let held: Vec<NodeId> = nodes
                .iter()
                .filter_map(fk_column)
                .filter(|column| !pairs.iter().any(|(_, fresh)| fresh == column))
                .collect();
            let id = s.attach_nodes(new_parent, position, nodes)?;
            for column in held {
                s.add_reference(column)?;
            }
            s.undo.remap(pairs);
            Ok(id)
        })
    }

    fn validate_property(
        &self,
        node: NodeId,
        name: &str,
        value: &Value,
    ) -> Result<&'static PropertyDescriptor, GraphError> {
        let kind = self.graph.node(node)?.kind();
        let d = descriptor(kind, name)
            .ok_or_else(|| GraphError::invalid_property(kind, name, "no such property"))?;
        if !d.settable {
            return Err(GraphError::invalid_property(kind, name, "read-only"));
        }
        if !d.accepts(value) {
            return Err(GraphError::invalid_property(
                kind,
                name,
                format!("does not accept a {} value", value.type_name()),
            ));
        }
        if let Some(target) = value.as_ref_id() {
            self.graph.node(target)?;
        }
        Ok(d)
    }

    fn set_property_inner(
        &mut self,
        node: NodeId,
        name: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        self.validate_property(node, name, &value)?;
        let current = self.graph.node(node)?;
        if *current.property(name) == value {
            debug!(%node, name, "property unchanged; no event");
            return Ok(());
        }
        let clears_source_type = current.kind() == NodeKind::Column
            && name == "type"
            && self.config.magic_enabled
            && !current.property("sourceDataTypeName").is_null();
        if clears_source_type {
            return self.framed("set type", |s| {
                s.write_property(node, "type", value)?;
                s.write_property(node, "sourceDataTypeName", Value::Null)?;
                Ok(())
            });
        }
        self.write_property(node, name, value).map(drop)
    }

    /// Stores an already validated value and fires its event. Equal values are suppressed.
    fn write_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<bool, GraphError> {
        if *self.graph.node(node)?.property(name) == value {
            return Ok(false);
        }
        let old = self.graph.put_property(node, name, value.clone())?;
        debug!(%node, name, "property set");
        self.emit(node, Change::Property {
            name: SmolStr::new(name),
            old,
            new: value,
        });
        Ok(true)
    }

    fn remove_dependency_inner(
        &mut self,
        node: NodeId,
        dependency: NodeId,
    ) -> Result<(), GraphError> {
        let kind = self.graph.node(node)?.kind();
        self.graph.node(dependency)?;
        let names = self.referencing_properties(node, dependency);
        if names.is_empty() {
            return Err(GraphError::structural(format!(
                "{node} does not depend on {dependency}"
            )));
        }
        if kind.removed_with_dependency() {
            return self.remove_subtree(node);
        }
        self.clear_references(node, &names)
    }

    /// Reference properties of `node` pointing into the subtree of `dependency`.
    fn referencing_properties(&self, node: NodeId, dependency: NodeId) -> Vec<&'static str> {
        let Some(node) = self.graph.get(node) else {
            return Vec::new();
        };
        node.references()
            .filter(|(_, target)| self.graph.is_ancestor_or_self(dependency, *target))
            .map(|(name, _)| name)
            .collect()
    }

    fn clear_references(&mut self, node: NodeId, names: &[&'static str]) -> Result<(), GraphError> {
        let kind = self.graph.node(node)?.kind();
        for name in names {
            if !descriptor(kind, name).is_some_and(|d| d.nullable) {
                return Err(GraphError::invalid_property(
                    kind,
                    *name,
                    "required reference cannot be cleared",
                ));
            }
        }
        match names {
            [] => Ok(()),
            [name] => self.write_property(node, name, Value::Null).map(drop),
            _ => self.framed(&format!("clear {kind} references"), |s| {
                for name in names {
                    s.write_property(node, name, Value::Null)?;
                }
                Ok(())
            }),
        }
    }

    /// Severs every edge into the subtree of `target`, removing dependents that cannot
    /// outlive it after their own dependents.
    fn sever_dependents(&mut self, target: NodeId) -> Result<(), GraphError> {
        while let Some(dependent) = self.graph.external_dependents(target).first().copied() {
            if self.graph.node(dependent)?.kind().removed_with_dependency() {
                self.sever_dependents(dependent)?;
                self.remove_subtree(dependent)?;
                continue;
            }
            let names = self.referencing_properties(dependent, target);
            if names.is_empty() {
                return Err(GraphError::IllegalState(format!(
                    "dependency index lists {dependent} for {target} but no property refers to it"
                )));
            }
            self.clear_references(dependent, &names)?;
        }
        Ok(())
    }

    fn ensure_populated(&mut self, node: NodeId) -> Result<(), GraphError> {
        let target = self.graph.node(node)?;
        if target.is_populated() {
            return Ok(());
        }
        let name = target.name().to_owned();
        let Some(populator) = self.populator.as_mut() else {
            return Err(GraphError::Population {
                node,
                source: PopulationError::new("no populator installed"),
            });
        };
        let children = populator
            .populate(&self.graph, node)
            .map_err(|source| GraphError::Population { node, source })?;

        let mut batch = BTreeSet::new();
        for child in &children {
            self.check_new_node(node, child, &batch)
                .map_err(|err| GraphError::Population {
                    node,
                    source: PopulationError::new(err.to_string()),
                })?;
            batch.insert(child.id());
        }
        debug!(%node, children = children.len(), "populating");
        self.framed(&format!("populate {name}"), |s| {
            s.undo.enter_internal();
            let result = s.attach_population(node, children);
            s.undo.leave_internal();
            result
        })
    }

    fn attach_population(
        &mut self,
        node: NodeId,
        children: Vec<ObjectNode>,
    ) -> Result<(), GraphError> {
        self.graph.set_populated(node, true)?;
        self.undo.record(Step::Populated { node });
        for child in children {
            let index = self.graph.children(node, Some(child.kind()))?.len();
            self.add_child_inner(node, child, index)?;
        }
        Ok(())
    }

    fn replay(&mut self, replay: Replay) -> Result<bool, GraphError> {
        if self.bus.in_transaction() {
            return Err(GraphError::IllegalState(format!(
                "cannot {} inside a transaction",
                replay.verb()
            )));
        }
        let Some(entry) = self.undo.take(replay) else {
            return Ok(false);
        };
        let label = format!("{} {}", replay.verb(), entry.label());
        self.undo.start_replay(replay, entry.label());
        let result = self.framed(&label, |s| s.revert(&entry));
        self.undo.finish_replay(result.is_ok());
        match result {
            Ok(()) => {
                debug!(label, "replayed");
                Ok(true)
            }
            Err(err) => {
                self.undo.put_back(replay, entry);
                Err(err)
            }
        }
    }

    /// Applies the inverse of every step of `entry`, newest first, through the event path.
    fn revert(&mut self, entry: &Entry) -> Result<(), GraphError> {
        for step in entry.steps().rev() {
            match step {
                Step::Property { node, name, old, .. } => {
                    let node = self.undo.translate(*node);
                    let value = self.translate_value(old)?;
                    self.write_property(node, name, value)?;
                }
                Step::Added { subtree, .. } => {
                    let Some(root) = subtree.root() else {
                        continue;
                    };
                    let child = self.undo.translate(root.id());
                    let dependents = self.graph.external_dependents(child);
                    if !dependents.is_empty() {
                        return Err(GraphError::ObjectDependent {
                            node: child,
                            dependents,
                        });
                    }
                    self.detach_node(child)?;
                }
                Step::Removed {
                    parent,
                    index,
                    subtree,
                } => {
                    let parent = self.undo.translate(*parent);
                    self.recreate(parent, *index, subtree.clone())?;
                }
                Step::Populated { .. } => {}
            }
        }
        Ok(())
    }

    fn translate_value(&self, value: &Value) -> Result<Value, GraphError> {
        match value.as_ref_id() {
            Some(target) => {
                let current = self.undo.translate(target);
                self.graph.node(current)?;
                Ok(Value::Ref(current))
            }
            None => Ok(value.clone()),
        }
    }

    /// Re-links a removed subtree under fresh identities.
    fn recreate(
        &mut self,
        parent: NodeId,
        position: usize,
        mut subtree: Subtree,
    ) -> Result<NodeId, GraphError> {
        let pairs = subtree.reidentify();
        let mut nodes = subtree.into_nodes();
        let fresh: BTreeSet<NodeId> = nodes.iter().map(ObjectNode::id).collect();
        for node in &mut nodes {
            let refs: Vec<(&'static str, NodeId)> = node.references().collect();
            for (name, target) in refs {
                if fresh.contains(&target) {
                    continue;
                }
                let current = self.undo.translate(target);
                self.graph.node(current)?;
                if current != target {
                    node.put(name, Value::Ref(current));
                }
            }
        }
        let id = self.attach_nodes(parent, position, nodes)?;
        self.undo.remap(pairs);
        Ok(id)
    }
}

/// The foreign-key column a mapping holds a reference on.
fn fk_column(node: &ObjectNode) -> Option<NodeId> {
    if node.kind() != NodeKind::ColumnMapping {
        return None;
    }
    node.property("fkColumn").as_ref_id()
}
