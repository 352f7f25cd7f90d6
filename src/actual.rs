// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Actual state of destination paths.

use crate::{
    entry_state::EntryState,
    error::{Error, IoResultExt, Result},
    lazy::{LazyContents, LazyLinkname},
    path::AbsPath,
    system::{is_not_found, normalize_linkname, FileKind, System},
};

use std::sync::Arc;

/// What a destination path currently holds.
///
/// File contents and symlink targets are only read from the system when
/// somebody asks for them.
#[derive(Debug)]
pub enum ActualStateEntry {
    Absent {
        path: AbsPath,
    },
    Dir {
        path: AbsPath,
        perm: u32,
    },
    File {
        path: AbsPath,
        perm: u32,
        contents: Arc<LazyContents>,
    },
    Symlink {
        path: AbsPath,
        linkname: Arc<LazyLinkname>,
    },
}

impl ActualStateEntry {
    /// Read actual state of path without following symlinks.
    ///
    /// # Errors
    ///
    /// - Return [`Error::UnsupportedFileType`] for devices, sockets, and
    ///   fifos.
    /// - Return [`Error::System`] if path cannot be inspected.
    pub fn read(system: &Arc<dyn System>, path: &AbsPath) -> Result<Self> {
        let info = match system.lstat(path) {
            Ok(info) => info,
            Err(error) if is_not_found(&error) => {
                return Ok(Self::Absent { path: path.clone() })
            }
            Err(source) => {
                return Err(Error::System {
                    op: "lstat",
                    path: path.clone(),
                    source,
                })
            }
        };

        let entry = match info.kind {
            FileKind::Dir => Self::Dir {
                path: path.clone(),
                perm: info.perm,
            },
            FileKind::File => {
                let (system, read_path) = (Arc::clone(system), path.clone());
                Self::File {
                    path: path.clone(),
                    perm: info.perm,
                    contents: Arc::new(LazyContents::from_fn(move || {
                        system.read_file(&read_path).with_path("read", &read_path)
                    })),
                }
            }
            FileKind::Symlink => {
                let (system, read_path) = (Arc::clone(system), path.clone());
                Self::Symlink {
                    path: path.clone(),
                    linkname: Arc::new(LazyLinkname::from_fn(move || {
                        system
                            .readlink(&read_path)
                            .map(|linkname| normalize_linkname(&linkname))
                            .with_path("readlink", &read_path)
                    })),
                }
            }
            FileKind::Other => return Err(Error::UnsupportedFileType { path: path.clone() }),
        };

        Ok(entry)
    }

    pub fn path(&self) -> &AbsPath {
        match self {
            Self::Absent { path }
            | Self::Dir { path, .. }
            | Self::File { path, .. }
            | Self::Symlink { path, .. } => path,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent { .. })
    }

    /// Fingerprint of what the path holds.
    ///
    /// An absent path fingerprints as a removal.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if contents or linkname cannot be read.
    pub fn entry_state(&self) -> Result<EntryState> {
        let state = match self {
            Self::Absent { .. } => EntryState::remove(),
            Self::Dir { perm, .. } => EntryState::dir(*perm),
            Self::File { perm, contents, .. } => {
                EntryState::file(*perm, &contents.sha256()?).with_contents(contents.contents()?)
            }
            Self::Symlink { linkname, .. } => {
                EntryState::symlink(&linkname.sha256()?).with_contents(linkname.linkname()?)
            }
        };

        Ok(state)
    }

    /// Remove whatever the path holds.
    ///
    /// # Errors
    ///
    /// - Return [`Error::System`] if removal fails.
    pub fn remove(&self, system: &dyn System) -> Result<()> {
        if self.is_absent() {
            return Ok(());
        }

        system.remove_all(self.path()).with_path("remove", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry_state::EntryStateType, lazy::sha256, system::RealSystem};
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn read_every_kind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = AbsPath::new(dir.path())?;
        fs::write(dir.path().join("file"), "X")?;
        fs::create_dir(dir.path().join("dir"))?;

        let system: Arc<dyn System> = Arc::new(RealSystem::default());

        let absent = ActualStateEntry::read(&system, &root.join_name("missing"))?;
        assert!(absent.is_absent());
        assert_eq!(absent.entry_state()?.entry_type, EntryStateType::Remove);

        let file = ActualStateEntry::read(&system, &root.join_name("file"))?;
        let state = file.entry_state()?;
        assert_eq!(state.entry_type, EntryStateType::File);
        assert_eq!(state.contents_sha256, sha256(b"X").to_vec());
        assert_eq!(state.contents(), Some(b"X".as_slice()));

        let dir_entry = ActualStateEntry::read(&system, &root.join_name("dir"))?;
        assert_eq!(dir_entry.entry_state()?.entry_type, EntryStateType::Dir);

        dir_entry.remove(system.as_ref())?;
        assert!(!dir.path().join("dir").exists());
        absent.remove(system.as_ref())?;

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn read_symlink_lazily() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = AbsPath::new(dir.path())?;
        std::os::unix::fs::symlink("target", dir.path().join("link"))?;

        let system: Arc<dyn System> = Arc::new(RealSystem::default());
        let entry = ActualStateEntry::read(&system, &root.join_name("link"))?;
        let ActualStateEntry::Symlink { linkname, .. } = &entry else {
            anyhow::bail!("expected symlink, got {entry:?}");
        };
        assert!(!linkname.is_evaluated());
        assert_eq!(linkname.linkname()?, "target");
        assert_eq!(entry.entry_state()?.contents_sha256, sha256(b"target").to_vec());

        Ok(())
    }
}
