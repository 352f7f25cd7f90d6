// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Comparable, persistable fingerprint of a single entry.
//!
//! An [`EntryState`] records the type, permissions, and content hash of what
//! a path looked like, or should look like. Apply compares fingerprints rather
//! than raw contents, and persists the fingerprint of every path it changes so
//! the next run can tell whether the user touched the path in between.

use data_encoding::HEXLOWER;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of entry a fingerprint describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStateType {
    Dir,
    File,
    Symlink,
    Remove,
    Script,
}

/// Fingerprint of an entry.
///
/// Only the type, mode, and content hash are persisted. The contents
/// themselves and the overwrite hint exist for pre-apply hooks that want to
/// render diffs or decide whether to prompt.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EntryState {
    #[serde(rename = "type")]
    pub entry_type: EntryStateType,

    /// Permission bits, zero when meaningless.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub mode: u32,

    #[serde(
        rename = "contentsSHA256",
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_hex",
        deserialize_with = "deserialize_hex"
    )]
    pub contents_sha256: Vec<u8>,

    #[serde(skip)]
    contents: Option<Vec<u8>>,

    #[serde(skip)]
    overwrite: bool,
}

impl EntryState {
    fn new(entry_type: EntryStateType, mode: u32, contents_sha256: &[u8]) -> Self {
        Self {
            entry_type,
            mode,
            contents_sha256: contents_sha256.to_vec(),
            contents: None,
            overwrite: false,
        }
    }

    pub fn dir(perm: u32) -> Self {
        Self::new(EntryStateType::Dir, perm, &[])
    }

    pub fn file(perm: u32, contents_sha256: &[u8]) -> Self {
        Self::new(EntryStateType::File, perm, contents_sha256)
    }

    pub fn symlink(linkname_sha256: &[u8]) -> Self {
        Self::new(EntryStateType::Symlink, 0, linkname_sha256)
    }

    pub fn remove() -> Self {
        Self::new(EntryStateType::Remove, 0, &[])
    }

    pub fn script(contents_sha256: &[u8]) -> Self {
        Self::new(EntryStateType::Script, 0, contents_sha256)
    }

    /// Attach contents for diff rendering.
    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// Mark entry as one that always overwrites the target without asking.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Contents, if known.
    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Same type, same permissions, same content hash.
    ///
    /// Permissions are not compared on Windows, where they are not reliable.
    pub fn equal(&self, other: &EntryState) -> bool {
        if self.entry_type != other.entry_type {
            return false;
        }

        if !cfg!(windows) && self.mode != other.mode {
            return false;
        }

        self.contents_sha256 == other.contents_sha256
    }

    /// Like [`EntryState::equal`], but a missing state counts as a removal.
    pub fn equivalent(this: Option<&EntryState>, other: Option<&EntryState>) -> bool {
        match (this, other) {
            (None, None) => true,
            (None, Some(state)) | (Some(state), None) => {
                state.entry_type == EntryStateType::Remove
            }
            (Some(this), Some(other)) => this.equal(other),
        }
    }
}

impl PartialEq for EntryState {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

fn is_zero(mode: &u32) -> bool {
    *mode == 0
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&HEXLOWER.encode(bytes))
}

fn deserialize_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let hex = String::deserialize(deserializer)?;
    HEXLOWER
        .decode(hex.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::sha256;
    use pretty_assertions::assert_eq;

    #[test]
    fn equivalent_treats_missing_as_remove() {
        let remove = EntryState::remove();
        let dir = EntryState::dir(0o755);
        let file = EntryState::file(0o644, &sha256(b"X"));
        let symlink = EntryState::symlink(&sha256(b"target"));

        assert!(EntryState::equivalent(None, None));
        assert!(EntryState::equivalent(None, Some(&remove)));
        assert!(EntryState::equivalent(Some(&remove), None));
        for state in [&dir, &file, &symlink] {
            assert!(!EntryState::equivalent(None, Some(state)));
            assert!(!EntryState::equivalent(Some(state), None));
            assert!(EntryState::equivalent(Some(state), Some(state)));
        }
    }

    #[test]
    fn equal_ignores_contents_and_overwrite() {
        let left = EntryState::file(0o644, &sha256(b"X")).with_contents("X");
        let right = EntryState::file(0o644, &sha256(b"X")).with_overwrite(true);
        assert!(left.equal(&right));

        let other_content = EntryState::file(0o644, &sha256(b"Y"));
        assert!(!left.equal(&other_content));

        let other_type = EntryState::script(&sha256(b"X"));
        assert!(!left.equal(&other_type));
    }

    #[cfg(unix)]
    #[test]
    fn equal_compares_permissions() {
        let left = EntryState::file(0o644, &sha256(b"X"));
        let right = EntryState::file(0o600, &sha256(b"X"));
        assert!(!left.equal(&right));
    }

    #[test]
    fn serializes_as_json() -> anyhow::Result<()> {
        let state = EntryState::file(0o644, &sha256(b"")).with_contents("");
        let json = serde_json::to_string(&state)?;
        assert_eq!(
            json,
            r#"{"type":"file","mode":420,"contentsSHA256":"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"}"#
        );

        let result: EntryState = serde_json::from_str(&json)?;
        assert_eq!(result, state);
        assert_eq!(result.contents(), None);

        let remove = serde_json::to_string(&EntryState::remove())?;
        assert_eq!(remove, r#"{"type":"remove"}"#);

        Ok(())
    }
}
