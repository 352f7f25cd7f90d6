// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target state of destination paths.
//!
//! A [`TargetStateEntry`] is what a single destination path should look like
//! once applied. Applying compares it against the [`ActualStateEntry`] of the
//! same path and performs the smallest mutation that makes the two agree.
//!
//! Permissions stored in target entries already have the umask cleared.

use crate::{
    actual::ActualStateEntry,
    entry_state::EntryState,
    error::{Error, IoResultExt, Result},
    lazy::{LazyContents, LazyLinkname},
    path::{AbsPath, RelPath},
    persistent_state::{
        get_json, legacy_script_state_key, script_state_key, set_json, PersistentState,
        ScriptState, ENTRY_STATE_BUCKET, SCRIPT_STATE_BUCKET,
    },
    system::{normalize_linkname, System},
};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Desired state of a destination path.
#[derive(Debug)]
pub enum TargetStateEntry {
    Dir {
        perm: u32,
    },
    File {
        contents: Arc<LazyContents>,

        /// Keep the file even when contents are blank.
        empty: bool,
        perm: u32,

        /// Target always replaces whatever is there, e.g., modify filters.
        overwrite: bool,
    },
    Remove,

    /// Rename sibling directory `old` to `new`, keeping its subtree.
    RenameDir {
        old: String,
        new: String,
    },
    Script {
        contents: Arc<LazyContents>,
        name: RelPath,
        once: bool,
    },
    Symlink {
        linkname: Arc<LazyLinkname>,
    },
}

impl TargetStateEntry {
    /// Fingerprint of the target.
    ///
    /// Renames have no fingerprint of their own.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if contents fail to evaluate.
    pub fn entry_state(&self) -> Result<Option<EntryState>> {
        let state = match self {
            Self::Dir { perm } => EntryState::dir(*perm),
            Self::File {
                contents,
                empty,
                perm,
                overwrite,
            } => {
                let data = contents.contents()?;
                if !empty && is_blank(data) {
                    EntryState::remove()
                } else {
                    EntryState::file(*perm, &contents.sha256()?)
                        .with_contents(data)
                        .with_overwrite(*overwrite)
                }
            }
            Self::Remove => EntryState::remove(),
            Self::RenameDir { .. } => return Ok(None),
            Self::Script { contents, .. } => {
                EntryState::script(&contents.sha256()?).with_contents(contents.contents()?)
            }
            Self::Symlink { linkname } => {
                let target = linkname.linkname()?;
                if target.is_empty() {
                    EntryState::remove()
                } else {
                    EntryState::symlink(&linkname.sha256()?).with_contents(target)
                }
            }
        };

        Ok(Some(state))
    }

    /// Force evaluation of lazy contents.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if contents fail to evaluate.
    pub fn evaluate(&self) -> Result<()> {
        match self {
            Self::File { contents, .. } | Self::Script { contents, .. } => {
                contents.sha256()?;
            }
            Self::Symlink { linkname } => {
                linkname.sha256()?;
            }
            Self::Dir { .. } | Self::Remove | Self::RenameDir { .. } => {}
        }
        Ok(())
    }

    /// Check whether apply can be skipped without looking at the actual state.
    ///
    /// Only run-once scripts ever skip, when a record of their current
    /// contents exists. Records written by earlier releases under the old key
    /// layout are migrated on sight instead of running the script again.
    ///
    /// # Errors
    ///
    /// - Return [`Error::PersistentState`] if records cannot be read or
    ///   written.
    pub fn skip_apply(
        &self,
        persistent_state: &dyn PersistentState,
        target_abs_path: &AbsPath,
    ) -> Result<bool> {
        let Self::Script {
            contents,
            once: true,
            name,
        } = self
        else {
            return Ok(false);
        };

        let digest = contents.sha256()?;
        let key = script_state_key(target_abs_path, &digest);
        if persistent_state.get(SCRIPT_STATE_BUCKET, &key)?.is_some() {
            debug!("{name} already ran");
            return Ok(true);
        }

        let legacy_key = legacy_script_state_key(&digest);
        let Some(record) = get_json::<ScriptState>(persistent_state, SCRIPT_STATE_BUCKET, &legacy_key)?
        else {
            return Ok(false);
        };

        info!("migrate script state of {name}");
        set_json(persistent_state, SCRIPT_STATE_BUCKET, &key, &record)?;
        set_json(
            persistent_state,
            ENTRY_STATE_BUCKET,
            target_abs_path.as_str(),
            &EntryState::script(&digest),
        )?;
        Ok(true)
    }

    /// Make actual state match the target.
    ///
    /// Returns whether anything was changed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::System`] if a mutation fails.
    /// - Return [`Error::Script`] if a script fails.
    /// - Return [`Error::Cached`] if contents fail to evaluate.
    pub fn apply(
        &self,
        system: &dyn System,
        persistent_state: &dyn PersistentState,
        actual: &ActualStateEntry,
    ) -> Result<bool> {
        let path = actual.path();
        match self {
            Self::Dir { perm } => {
                if let ActualStateEntry::Dir {
                    perm: actual_perm, ..
                } = actual
                {
                    if cfg!(windows) || actual_perm == perm {
                        return Ok(false);
                    }
                    system.chmod(path, *perm).with_path("chmod", path)?;
                    return Ok(true);
                }

                actual.remove(system)?;
                system.mkdir(path, *perm).with_path("mkdir", path)?;
                Ok(true)
            }
            Self::File {
                contents,
                empty,
                perm,
                ..
            } => {
                let data = contents.contents()?;
                if !empty && is_blank(data) {
                    if actual.is_absent() {
                        return Ok(false);
                    }
                    actual.remove(system)?;
                    return Ok(true);
                }

                if let ActualStateEntry::File {
                    perm: actual_perm,
                    contents: actual_contents,
                    ..
                } = actual
                {
                    // Compare hashes, last written states never store full contents.
                    if actual_contents.sha256()? == contents.sha256()? {
                        if cfg!(windows) || actual_perm == perm {
                            return Ok(false);
                        }
                        system.chmod(path, *perm).with_path("chmod", path)?;
                        return Ok(true);
                    }
                } else {
                    actual.remove(system)?;
                }

                system.write_file(path, data, *perm).with_path("write", path)?;
                Ok(true)
            }
            Self::Remove => {
                if actual.is_absent() {
                    return Ok(false);
                }
                actual.remove(system)?;
                Ok(true)
            }
            Self::RenameDir { old, new } => {
                let dir = path.dir();
                let (old, new) = (dir.join_name(old), dir.join_name(new));
                system.rename(&old, &new).with_path("rename", &old)?;
                Ok(true)
            }
            Self::Script { contents, name, .. } => {
                if self.skip_apply(persistent_state, path)? {
                    return Ok(false);
                }

                let data = contents.contents()?;
                let run_at = Utc::now();
                if !is_blank(data) {
                    info!("run script {name}");
                    system
                        .run_script(name, &path.dir(), data)
                        .map_err(|source| Error::Script {
                            name: name.clone(),
                            source,
                        })?;
                }

                let record = ScriptState {
                    name: name.clone(),
                    run_at,
                };
                let key = script_state_key(path, &contents.sha256()?);
                set_json(persistent_state, SCRIPT_STATE_BUCKET, &key, &record)?;
                Ok(true)
            }
            Self::Symlink { linkname } => {
                let target = linkname.linkname()?;
                if target.is_empty() {
                    if actual.is_absent() {
                        return Ok(false);
                    }
                    actual.remove(system)?;
                    return Ok(true);
                }

                if let ActualStateEntry::Symlink {
                    linkname: actual_linkname,
                    ..
                } = actual
                {
                    if normalize_linkname(actual_linkname.linkname()?) == normalize_linkname(target)
                    {
                        return Ok(false);
                    }
                }

                actual.remove(system)?;
                system
                    .write_symlink(target, path)
                    .with_path("symlink", path)?;
                Ok(true)
            }
        }
    }
}

/// Contents consist of whitespace only.
pub(crate) fn is_blank(contents: &[u8]) -> bool {
    contents.iter().all(u8::is_ascii_whitespace)
}
