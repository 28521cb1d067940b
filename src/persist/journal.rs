// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Append-only JSON-lines journal of committed batches.
//!
//! Each line is one [`Batch`]. A batch is only written once it commits, so a journal never
//! contains a partial transaction.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use super::convert::{DataType, TypeConverter, WireValue};
use super::helper::PersisterHelperFactory;
use super::listener::snapshot;
use super::mirror::GraphMirror;
use super::persister::{Batch, PersistOp, Persister};
use crate::error::PersistError;
use crate::model::{Graph, NodeId, NodeKind};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// Flushes each batch to the operating system.
    #[default]
    BestEffort,

    /// Also asks the operating system to put each batch on stable storage. Exact guarantees
    /// are platform/filesystem-dependent.
    Durable,
}

#[derive(Debug)]
pub struct JournalPersister {
    path: PathBuf,
    file: fs::File,
    durability: WriteDurability,
    pending: Option<Batch>,
}

impl JournalPersister {
    /// Opens `path` for appending, creating it when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file,
            durability: WriteDurability::default(),
            pending: None,
        })
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn push(&mut self, op: PersistOp) -> Result<(), PersistError> {
        let Some(batch) = self.pending.as_mut() else {
            return Err(PersistError::Protocol(
                "journal operation outside a batch".to_owned(),
            ));
        };
        batch.ops.push(op);
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persister for JournalPersister {
    fn begin(&mut self, label: &str) -> Result<(), PersistError> {
        if self.pending.is_some() {
            return Err(PersistError::Protocol("nested batch".to_owned()));
        }
        self.pending = Some(Batch::new(label, Vec::new()));
        Ok(())
    }

    fn persist_object(
        &mut self,
        kind: NodeKind,
        id: NodeId,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<(), PersistError> {
        self.push(PersistOp::Object {
            kind,
            id,
            parent,
            index,
        })
    }

    fn persist_property(
        &mut self,
        id: NodeId,
        name: &str,
        data_type: &DataType,
        old: &WireValue,
        new: &WireValue,
    ) -> Result<(), PersistError> {
        self.push(PersistOp::Property {
            id,
            name: name.into(),
            data_type: data_type.clone(),
            old: old.clone(),
            new: new.clone(),
        })
    }

    fn remove_object(&mut self, id: NodeId) -> Result<(), PersistError> {
        self.push(PersistOp::Remove { id })
    }

    fn commit(&mut self) -> Result<(), PersistError> {
        let Some(batch) = self.pending.take() else {
            return Err(PersistError::Protocol("commit without begin".to_owned()));
        };
        let mut line = serde_json::to_string(&batch).map_err(|source| PersistError::Json {
            path: self.path.clone(),
            source,
        })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|source| self.io_error(source))?;
        let synced = match self.durability {
            WriteDurability::BestEffort => self.file.flush(),
            WriteDurability::Durable => self.file.sync_data(),
        };
        synced.map_err(|source| self.io_error(source))?;
        debug!(label = %batch.label, ops = batch.ops.len(), "batch journaled");
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending = None;
    }
}

/// Every batch of the journal at `path`, in commit order.
pub fn read_batches(path: &Path) -> Result<Vec<Batch>, PersistError> {
    let raw = fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| PersistError::Json {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Rebuilds the journaled graph by applying every batch to a fresh mirror.
pub fn replay(path: &Path, converter: &TypeConverter) -> Result<Graph, PersistError> {
    let mut mirror = GraphMirror::new(converter.clone());
    let batches = read_batches(path)?;
    for batch in &batches {
        batch.deliver(&mut mirror)?;
    }
    info!(path = %path.display(), batches = batches.len(), "journal replayed");
    mirror
        .graph()
        .ok_or_else(|| PersistError::Protocol(format!("{} holds no objects", path.display())))
}

/// Replaces the journal at `path` with a single snapshot batch of `graph`. The new file is
/// written next to the old one and renamed into place.
pub fn compact(
    path: &Path,
    graph: &Graph,
    factory: &PersisterHelperFactory,
    durability: WriteDurability,
) -> Result<(), PersistError> {
    let batch = snapshot(graph, graph.root(), factory)?;
    let mut line = serde_json::to_string(&batch).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    line.push('\n');
    write_atomic(path, line.as_bytes(), durability)?;
    info!(path = %path.display(), ops = batch.ops.len(), "journal compacted");
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8], durability: WriteDurability) -> Result<(), PersistError> {
    let io_error = |path: &Path, source: io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let Some(file_name) = path.file_name() else {
        return Err(io_error(
            path,
            io::Error::new(io::ErrorKind::Other, "path has no file name"),
        ));
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_path = parent.join(format!(
        ".arbor.tmp.{}.{}",
        file_name.to_string_lossy(),
        nanos
    ));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|source| io_error(&tmp_path, source))?;
    file.write_all(contents)
        .map_err(|source| io_error(&tmp_path, source))?;
    if durability == WriteDurability::Durable {
        file.sync_all()
            .map_err(|source| io_error(&tmp_path, source))?;
    }
    drop(file);

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(path, source));
    }

    if durability == WriteDurability::Durable {
        #[cfg(unix)]
        {
            let dir = fs::File::open(parent).map_err(|source| io_error(parent, source))?;
            dir.sync_all().map_err(|source| io_error(parent, source))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{compact, read_batches, replay, JournalPersister, WriteDurability};
    use crate::error::PersistError;
    use crate::model::{Graph, NodeId, NodeKind, ObjectNode};
    use crate::persist::convert::{DataType, TypeConverter, WireValue};
    use crate::persist::helper::PersisterHelperFactory;
    use crate::persist::persister::{Batch, PersistOp, Persister};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("arbor-journal-{name}-{nanos}"));
        fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn only_committed_batches_reach_the_file() {
        let dir = temp_dir("commit");
        let path = dir.join("model.jsonl");
        let mut journal = JournalPersister::open(&path).expect("open");
        let root = NodeId::new();

        Batch::new(
            "snapshot",
            vec![PersistOp::Object {
                kind: NodeKind::Root,
                id: root,
                parent: None,
                index: 0,
            }],
        )
        .deliver(&mut journal)
        .expect("snapshot");

        journal.begin("abandoned").expect("begin");
        journal.remove_object(root).expect("staged");
        journal.rollback();

        let batches = read_batches(&path).expect("read");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].label, "snapshot");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn operations_outside_a_batch_are_refused() {
        let dir = temp_dir("protocol");
        let mut journal = JournalPersister::open(dir.join("model.jsonl")).expect("open");
        let err = journal
            .persist_property(
                NodeId::new(),
                "name",
                &DataType::String,
                &WireValue::Null,
                &WireValue::Null,
            )
            .expect_err("no batch");
        assert!(matches!(err, PersistError::Protocol(_)));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn compaction_replays_to_the_same_tree() {
        let dir = temp_dir("compact");
        let path = dir.join("model.jsonl");
        let mut graph = Graph::new(ObjectNode::root());
        let db = ObjectNode::database("sales");
        let db_id = db.id();
        graph.attach(graph.root(), 0, vec![db]).expect("attach");

        let converter = TypeConverter::with_default_codecs();
        let factory = PersisterHelperFactory::with_defaults(converter.clone()).expect("factory");
        compact(&path, &graph, &factory, WriteDurability::Durable).expect("compact");

        let replayed = replay(&path, &converter).expect("replay");
        assert_eq!(replayed.root(), graph.root());
        assert_eq!(replayed.node(db_id).expect("db").name(), "sales");
        assert_eq!(read_batches(&path).expect("read").len(), 1);
        let _ = fs::remove_dir_all(dir);
    }
}
