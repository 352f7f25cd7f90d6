// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filter selecting which kinds of entries to operate on.

use crate::{
    attr::FileType,
    source::SourceStateEntry,
    target::TargetStateEntry,
};

use bitflags::bitflags;
use std::str::FromStr;

bitflags! {
    /// Set of entry kinds.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EntryTypeSet: u16 {
        const DIRS = 1 << 0;
        const FILES = 1 << 1;
        const REMOVE = 1 << 2;
        const SCRIPTS = 1 << 3;
        const SYMLINKS = 1 << 4;
        const ENCRYPTED = 1 << 5;
        const TEMPLATES = 1 << 6;
    }
}

impl Default for EntryTypeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl EntryTypeSet {
    /// Build set from include and exclude names.
    ///
    /// An empty include list means everything.
    ///
    /// # Errors
    ///
    /// - Return [`UnknownEntryType`] for names that are not entry kinds.
    pub fn from_lists(
        include: impl IntoIterator<Item = impl AsRef<str>>,
        exclude: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, UnknownEntryType> {
        let mut include = include.into_iter().peekable();
        let mut set = if include.peek().is_none() {
            Self::all()
        } else {
            Self::empty()
        };

        for name in include {
            set |= name.as_ref().parse()?;
        }
        for name in exclude {
            set -= name.as_ref().parse()?;
        }

        Ok(set)
    }

    /// Source entry passes the source-level filters.
    ///
    /// Encrypted and template files are rejected here so they are never
    /// decrypted or rendered when excluded.
    pub fn includes_source(&self, entry: &SourceStateEntry) -> bool {
        match entry {
            SourceStateEntry::File { attr, .. } => {
                (!attr.encrypted || self.contains(Self::ENCRYPTED))
                    && (!attr.template || self.contains(Self::TEMPLATES))
            }
            _ => true,
        }
    }

    /// Target entry kind is in the set.
    pub fn includes_target(&self, entry: &TargetStateEntry) -> bool {
        match entry {
            TargetStateEntry::Dir { .. } | TargetStateEntry::RenameDir { .. } => {
                self.contains(Self::DIRS)
            }
            TargetStateEntry::File { .. } => self.contains(Self::FILES),
            TargetStateEntry::Remove => self.contains(Self::REMOVE),
            TargetStateEntry::Script { .. } => self.contains(Self::SCRIPTS),
            TargetStateEntry::Symlink { .. } => self.contains(Self::SYMLINKS),
        }
    }

    /// Set of the kind of target a source file type produces.
    pub fn for_file_type(file_type: FileType) -> Self {
        match file_type {
            FileType::Create | FileType::File | FileType::Modify => Self::FILES,
            FileType::Script => Self::SCRIPTS,
            FileType::Symlink => Self::SYMLINKS,
        }
    }
}

impl FromStr for EntryTypeSet {
    type Err = UnknownEntryType;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim() {
            "all" => Ok(Self::all()),
            "none" => Ok(Self::empty()),
            "dirs" => Ok(Self::DIRS),
            "files" => Ok(Self::FILES),
            "remove" => Ok(Self::REMOVE),
            "scripts" => Ok(Self::SCRIPTS),
            "symlinks" => Ok(Self::SYMLINKS),
            "encrypted" => Ok(Self::ENCRYPTED),
            "templates" => Ok(Self::TEMPLATES),
            unknown => Err(UnknownEntryType(unknown.to_owned())),
        }
    }
}

/// Name does not describe an entry kind.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not an entry type")]
pub struct UnknownEntryType(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn from_lists() -> anyhow::Result<()> {
        let empty: [&str; 0] = [];
        assert_eq!(EntryTypeSet::from_lists(empty, empty)?, EntryTypeSet::all());
        assert_eq!(
            EntryTypeSet::from_lists(empty, ["scripts", "encrypted"])?,
            EntryTypeSet::all() - EntryTypeSet::SCRIPTS - EntryTypeSet::ENCRYPTED
        );
        assert_eq!(
            EntryTypeSet::from_lists(["files", "dirs"], empty)?,
            EntryTypeSet::FILES | EntryTypeSet::DIRS
        );
        assert_eq!(
            EntryTypeSet::from_lists(["blah"], empty),
            Err(UnknownEntryType("blah".into()))
        );

        Ok(())
    }
}
