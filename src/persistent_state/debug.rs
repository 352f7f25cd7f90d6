// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::persistent_state::{PersistentState, Result, StateData};

use tracing::debug;

/// Persistent state that logs every operation before passing it on.
#[derive(Debug)]
pub struct DebugPersistentState<P> {
    inner: P,
}

impl<P: PersistentState> DebugPersistentState<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: PersistentState> PersistentState for DebugPersistentState<P> {
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self.inner.get(bucket, key);
        match &result {
            Ok(value) => debug!(
                bucket,
                key,
                value = %value.as_deref().map(String::from_utf8_lossy).unwrap_or_default(),
                "get"
            ),
            Err(error) => debug!(bucket, key, %error, "get failed"),
        }
        result
    }

    fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<()> {
        debug!(bucket, key, value = %String::from_utf8_lossy(value), "set");
        self.inner.set(bucket, key, value)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        debug!(bucket, key, "delete");
        self.inner.delete(bucket, key)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        debug!(bucket, "delete bucket");
        self.inner.delete_bucket(bucket)
    }

    fn for_each(
        &self,
        bucket: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<()>,
    ) -> Result<()> {
        debug!(bucket, "for each");
        self.inner.for_each(bucket, visit)
    }

    fn data(&self) -> Result<StateData> {
        debug!("export");
        self.inner.data()
    }

    fn close(&self) -> Result<()> {
        debug!("close");
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_state::MockPersistentState;
    use pretty_assertions::assert_eq;

    #[test]
    fn operations_pass_through() -> anyhow::Result<()> {
        let state = DebugPersistentState::new(MockPersistentState::new());
        assert_eq!(state.get("bucket", "key")?, None);

        state.set("bucket", "key", b"value")?;
        state.set("bucket", "other", b"\xff")?;
        assert_eq!(state.get("bucket", "key")?, Some(b"value".to_vec()));

        let mut seen = Vec::new();
        state.for_each("bucket", &mut |key, value| {
            seen.push((key.to_owned(), value.to_vec()));
            Ok(())
        })?;
        assert_eq!(
            seen,
            vec![
                ("key".to_owned(), b"value".to_vec()),
                ("other".to_owned(), b"\xff".to_vec()),
            ]
        );

        state.delete("bucket", "key")?;
        assert_eq!(state.get("bucket", "key")?, None);
        assert_eq!(state.data()?.get("bucket").map(|entries| entries.len()), Some(1));

        state.delete_bucket("bucket")?;
        assert!(state.data()?.get("bucket").is_none());
        state.close()?;

        Ok(())
    }
}
