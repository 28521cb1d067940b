// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Arbor: a typed object graph of database schema objects with change events,
//! reference-counted shared columns, undo/redo and pluggable persisters.
//!
//! A [`Session`] owns one [`Graph`] and is the only way to mutate it. Every mutation fires a
//! [`ChangeEvent`](event::ChangeEvent); a [`PersisterListener`](persist::PersisterListener)
//! subscribed to the session turns those events into batches of persist operations.

pub mod error;
pub mod event;
pub mod model;
pub mod persist;
pub mod session;
pub mod undo;

pub use error::{GraphError, PersistError, PopulationError};
pub use model::{Graph, GraphConfig, NodeId, NodeKind, ObjectNode, Value};
pub use session::{ColumnPair, Populator, Session};

#[cfg(test)]
mod tests {
    use super::{GraphConfig, NodeKind, Session};

    #[test]
    fn fresh_session_has_only_a_root() {
        let session = Session::new(GraphConfig::default());
        assert_eq!(session.graph().len(), 1);
        let root = session.graph().node(session.root()).expect("root");
        assert_eq!(root.kind(), NodeKind::Root);
        assert!(!session.can_undo());
    }
}
