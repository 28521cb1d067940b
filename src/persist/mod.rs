// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence: value conversion, per-kind helpers, the change-to-persist bridge and the
//! bundled persister backends.

pub mod convert;
pub mod helper;
pub mod journal;
pub mod listener;
pub mod mirror;
pub mod persister;

pub use convert::{CustomCodec, DataType, JsonCodec, ParseDataTypeError, TypeConverter, WireValue};
pub use helper::{PersisterHelper, PersisterHelperFactory, PersisterHelperFactoryBuilder, RegistryHelper};
pub use journal::{JournalPersister, WriteDurability};
pub use listener::{snapshot, ObjectState, PersisterListener, SNAPSHOT_LABEL};
pub use mirror::GraphMirror;
pub use persister::{Batch, MemoryPersister, PersistCall, PersistOp, Persister};
