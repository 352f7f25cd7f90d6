// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::persistent_state::{PersistentState, Result, StateData};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persistent state that lives in memory only.
///
/// Used for tests and for dry runs, which work on a throwaway copy of the
/// real state so that nothing they record survives.
#[derive(Debug, Default)]
pub struct MockPersistentState {
    buckets: Mutex<StateData>,
}

impl MockPersistentState {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self) -> MutexGuard<'_, StateData> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistentState for MockPersistentState {
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .buckets()
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<()> {
        self.buckets()
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        if let Some(entries) = self.buckets().get_mut(bucket) {
            entries.remove(key);
        }
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets().remove(bucket);
        Ok(())
    }

    fn for_each(
        &self,
        bucket: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<()>,
    ) -> Result<()> {
        // INVARIANT: Release lock before visiting so visitors may write back.
        let entries = self.buckets().get(bucket).cloned().unwrap_or_default();
        for (key, value) in &entries {
            visit(key, value)?;
        }
        Ok(())
    }

    fn data(&self) -> Result<StateData> {
        Ok(self.buckets().clone())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn buckets_are_independent() -> anyhow::Result<()> {
        let state = MockPersistentState::new();
        state.set("a", "key", b"1")?;
        state.set("b", "key", b"2")?;
        assert_eq!(state.get("a", "key")?, Some(b"1".to_vec()));
        assert_eq!(state.get("b", "key")?, Some(b"2".to_vec()));

        state.delete("a", "key")?;
        state.delete("missing", "key")?;
        assert_eq!(state.get("a", "key")?, None);

        state.delete_bucket("b")?;
        assert_eq!(state.get("b", "key")?, None);

        Ok(())
    }

    #[test]
    fn for_each_visits_in_key_order() -> anyhow::Result<()> {
        let state = MockPersistentState::new();
        state.set("bucket", "b", b"2")?;
        state.set("bucket", "a", b"1")?;

        let mut seen = Vec::new();
        state.for_each("bucket", &mut |key, value| {
            seen.push((key.to_owned(), value.to_vec()));
            Ok(())
        })?;
        assert_eq!(
            seen,
            vec![("a".to_owned(), b"1".to_vec()), ("b".to_owned(), b"2".to_vec())]
        );

        Ok(())
    }
}
