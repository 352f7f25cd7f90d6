// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::persistent_state::{PersistentState, PersistentStateError, Result, StateData};

use ::redb::{Database, ReadableTable, TableDefinition, TableError, TableHandle};
use std::{fs, path::Path};
use tracing::{debug, instrument};

/// Persistent state stored in a redb database file.
///
/// Every bucket maps onto one table of string keys and byte values.
pub struct RedbPersistentState {
    db: Database,
}

fn table(bucket: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(bucket)
}

impl RedbPersistentState {
    /// Open database at path, creating it and its parent directory if missing.
    ///
    /// # Errors
    ///
    /// - Return [`PersistentStateError::CreateDir`] if parent directory cannot
    ///   be created.
    /// - Return [`PersistentStateError::Database`] if database cannot be
    ///   opened, e.g., because another process holds its lock.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistentStateError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        debug!("open state database {:?}", path.display());
        let db = Database::create(path)?;
        Ok(Self { db })
    }

    /// Open throwaway database held in memory.
    ///
    /// # Errors
    ///
    /// - Return [`PersistentStateError::Database`] if database cannot be
    ///   created.
    pub fn new_temporary() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(::redb::backends::InMemoryBackend::new())?;
        Ok(Self { db })
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(table(bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        Ok(table.get(key)?.map(|value| value.value().to_vec()))
    }

    fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(table(bucket))?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(table(bucket))?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(table(bucket))?;
        txn.commit()?;
        Ok(())
    }

    fn for_each(
        &self,
        bucket: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(table(bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        for entry in table.iter()? {
            let (key, value) = entry?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    fn data(&self) -> Result<StateData> {
        let txn = self.db.begin_read()?;
        let mut data = StateData::new();
        for handle in txn.list_tables()? {
            let bucket = handle.name().to_owned();
            let table = txn.open_table(table(&bucket))?;
            let entries = data.entry(bucket.clone()).or_default();
            for entry in table.iter()? {
                let (key, value) = entry?;
                entries.insert(key.value().to_owned(), value.value().to_vec());
            }
        }
        Ok(data)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
