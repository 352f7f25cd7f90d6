// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persistent state shared between runs.
//!
//! Apply remembers two things between runs, each in its own bucket:
//!
//! - [`ENTRY_STATE_BUCKET`]: the [`EntryState`] last written to every
//!   destination path, keyed by absolute path.
//! - [`SCRIPT_STATE_BUCKET`]: a [`ScriptState`] record for every run-once
//!   script that ran, keyed by target path and content hash.
//!
//! Values are JSON documents. Buckets are created on first write, and only
//! ever shrink through explicit deletes.
//!
//! [`EntryState`]: crate::entry_state::EntryState

mod debug;
mod mock;
mod redb;

pub use debug::DebugPersistentState;
pub use mock::MockPersistentState;
pub use self::redb::RedbPersistentState;

use crate::path::{AbsPath, RelPath};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket of last written entry states.
pub const ENTRY_STATE_BUCKET: &str = "entryState";

/// Bucket of run-once script records.
pub const SCRIPT_STATE_BUCKET: &str = "scriptState";

/// Full export of a persistent state, bucket to key to value.
pub type StateData = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Bucketed key/value store.
pub trait PersistentState: Send + Sync {
    /// Value stored under key, if any.
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store value under key, creating the bucket if needed.
    fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Remove key. Missing keys and buckets are not an error.
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Remove bucket with everything in it.
    fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Visit every key/value pair in bucket in key order.
    fn for_each(
        &self,
        bucket: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<()>,
    ) -> Result<()>;

    /// Export every bucket.
    fn data(&self) -> Result<StateData>;

    /// Flush and release underlying resources.
    fn close(&self) -> Result<()>;
}

/// Record of a run-once script execution.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptState {
    /// Target path of the script.
    pub name: RelPath,
    pub run_at: DateTime<Utc>,
}

/// Key of a run-once script record.
pub fn script_state_key(target_abs_path: &AbsPath, contents_sha256: &[u8]) -> String {
    format!("{target_abs_path}:{}", HEXLOWER.encode(contents_sha256))
}

/// Key of a run-once script record written by earlier releases.
///
/// Earlier releases keyed records by content hash alone.
pub fn legacy_script_state_key(contents_sha256: &[u8]) -> String {
    HEXLOWER.encode(contents_sha256)
}

/// Decode JSON value stored under key.
///
/// # Errors
///
/// - Return [`PersistentStateError::Format`] if value is not valid JSON.
pub fn get_json<T: DeserializeOwned>(
    state: &dyn PersistentState,
    bucket: &str,
    key: &str,
) -> Result<Option<T>> {
    state
        .get(bucket, key)?
        .map(|value| serde_json::from_slice(&value))
        .transpose()
        .map_err(PersistentStateError::from)
}

/// Encode value as JSON and store it under key.
///
/// # Errors
///
/// - Return [`PersistentStateError::Format`] if value cannot be encoded.
pub fn set_json<T: Serialize>(
    state: &dyn PersistentState,
    bucket: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_vec(value)?;
    state.set(bucket, key, &value)
}

/// Copy every bucket of one persistent state into another.
pub fn copy_to(from: &dyn PersistentState, to: &dyn PersistentState) -> Result<()> {
    for (bucket, entries) in from.data()? {
        for (key, value) in entries {
            to.set(&bucket, &key, &value)?;
        }
    }
    Ok(())
}

/// Persistent state error types.
#[derive(Debug, thiserror::Error)]
pub enum PersistentStateError {
    /// Underlying database failed.
    #[error(transparent)]
    Database(#[from] ::redb::Error),

    /// Stored value is not what we expected.
    #[error(transparent)]
    Format(#[from] serde_json::Error),

    #[error("failed to create state directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

macro_rules! from_redb_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for PersistentStateError {
                fn from(error: $error) -> Self {
                    Self::Database(error.into())
                }
            }
        )*
    };
}

from_redb_error!(
    ::redb::DatabaseError,
    ::redb::TransactionError,
    ::redb::TableError,
    ::redb::StorageError,
    ::redb::CommitError,
);

/// Friendly result alias :3
pub type Result<T, E = PersistentStateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry_state::EntryState, lazy::sha256};
    use pretty_assertions::assert_eq;

    #[test]
    fn json_helpers() -> anyhow::Result<()> {
        let state = MockPersistentState::new();
        let entry = EntryState::file(0o644, &sha256(b"X"));
        set_json(&state, ENTRY_STATE_BUCKET, "/home/user/.file", &entry)?;

        let result: Option<EntryState> = get_json(&state, ENTRY_STATE_BUCKET, "/home/user/.file")?;
        assert_eq!(result, Some(entry));

        let missing: Option<EntryState> = get_json(&state, ENTRY_STATE_BUCKET, "/nope")?;
        assert_eq!(missing, None);

        state.set(ENTRY_STATE_BUCKET, "/bad", b"not json")?;
        let bad: Result<Option<EntryState>> = get_json(&state, ENTRY_STATE_BUCKET, "/bad");
        assert!(matches!(bad, Err(PersistentStateError::Format(_))));

        Ok(())
    }

    #[test]
    fn script_state_keys() -> anyhow::Result<()> {
        let path = AbsPath::new("/home/user/install.sh")?;
        let digest = sha256(b"");
        assert_eq!(
            script_state_key(&path, &digest),
            "/home/user/install.sh:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            legacy_script_state_key(&digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        Ok(())
    }

    #[test]
    fn script_state_json_layout() -> anyhow::Result<()> {
        let record: ScriptState = serde_json::from_str(
            r#"{"name":"install.sh","runAt":"2024-01-02T03:04:05Z"}"#,
        )?;
        assert_eq!(record.name, RelPath::new("install.sh"));
        assert_eq!(record.run_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");

        Ok(())
    }

    #[test]
    fn copy_between_states() -> anyhow::Result<()> {
        let from = MockPersistentState::new();
        from.set(ENTRY_STATE_BUCKET, "a", b"1")?;
        from.set(SCRIPT_STATE_BUCKET, "b", b"2")?;

        let to = MockPersistentState::new();
        copy_to(&from, &to)?;
        assert_eq!(to.data()?, from.data()?);

        Ok(())
    }
}
