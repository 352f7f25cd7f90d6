// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{SourceState, SourceStateEntry};
use crate::{
    actual::ActualStateEntry,
    attr::{DirAttr, FileAttr, FileType},
    entry_state::EntryState,
    error::{Error, InconsistentState, IoResultExt, Result},
    lazy::LazyContents,
    path::{AbsPath, NotInDir, RelPath, SourceRelPath},
    persistent_state::{set_json, PersistentState, ENTRY_STATE_BUCKET},
    system::{mkdir_all, System},
    target::TargetStateEntry,
};

use std::{collections::BTreeMap, io, sync::Arc};
use tracing::{debug, info, instrument};

/// Options of [`SourceState::add`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AddOptions {
    /// Add directories as exact.
    pub exact: bool,

    /// Add files as templates.
    pub template: bool,

    /// Encrypt file contents.
    pub encrypt: bool,

    /// Add files as create-only.
    pub create: bool,
}

// Pending change to one source path.
#[derive(Debug)]
struct Update {
    /// Destination path that asked for the change.
    origin: String,
    order: i8,
    entry: TargetStateEntry,
}

#[derive(Debug, Default)]
struct Plan {
    updates: BTreeMap<RelPath, Update>,

    /// Source directory of every directory target added or renamed.
    dirs: BTreeMap<RelPath, SourceRelPath>,
}

impl Plan {
    fn push(&mut self, path: RelPath, update: Update) -> Result<()> {
        let Some(existing) = self.updates.get(&path) else {
            self.updates.insert(path, update);
            return Ok(());
        };

        let agree = existing.order == update.order
            && EntryState::equivalent(
                existing.entry.entry_state()?.as_ref(),
                update.entry.entry_state()?.as_ref(),
            );
        if agree {
            return Ok(());
        }

        let mut origins = vec![existing.origin.clone(), update.origin];
        origins.sort();
        Err(InconsistentState {
            path: path.to_string(),
            origins,
        }
        .into())
    }

    // Source directory that holds target directory once the plan is done.
    fn source_dir(&self, state: &SourceState, target_dir: &RelPath) -> SourceRelPath {
        if target_dir.is_empty() {
            return SourceRelPath::new_dir("");
        }

        if let Some(dir) = self.dirs.get(target_dir) {
            return dir.clone();
        }

        let parent = self.source_dir(state, &target_dir.dir());
        match state.get(target_dir) {
            Some(SourceStateEntry::Dir {
                source_rel_path, ..
            }) => SourceRelPath::new_dir(parent.rel_path().join_name(source_rel_path.rel_path().base())),
            _ => {
                let attr = DirAttr {
                    target_name: target_dir.base().to_owned(),
                    ..Default::default()
                };
                SourceRelPath::new_dir(parent.rel_path().join_name(&attr.source_name()))
            }
        }
    }
}

fn is_private(perm: u32) -> bool {
    !cfg!(windows) && perm & 0o077 == 0
}

impl SourceState {
    /// Import destination paths into the source directory.
    ///
    /// Unmanaged parent directories are imported along with each path. The
    /// state of every imported path is recorded as last written, so a
    /// following apply has nothing to do. Returns number of source paths
    /// changed.
    ///
    /// Source state is not re-read, call [`SourceState::read`] to see the
    /// result.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotInDir`] if a path is not below the destination.
    /// - Return [`Error::System`] if a path does not exist.
    /// - Return [`Error::InconsistentState`] if two paths disagree about one
    ///   source path.
    /// - Return [`Error::Encrypt`] if encryption fails.
    #[instrument(skip(self, dest_system, persistent_state, dest_paths), level = "debug")]
    pub fn add(
        &self,
        dest_system: &Arc<dyn System>,
        persistent_state: &dyn PersistentState,
        dest_paths: &[AbsPath],
        options: &AddOptions,
    ) -> Result<usize> {
        let dest_dir = &self.options.dest_dir;
        let umask = self.options.umask;

        // Target path to destination path, and whether it was asked for.
        let mut targets: BTreeMap<RelPath, (AbsPath, bool)> = BTreeMap::new();
        for dest_path in dest_paths {
            let target_rel_path = dest_path.trim_dir_prefix(dest_dir)?;
            if target_rel_path.is_empty() {
                return Err(NotInDir {
                    path: dest_path.clone(),
                    dir: dest_dir.clone(),
                }
                .into());
            }

            for ancestor in target_rel_path.ancestors() {
                if !self.entries.contains_key(&ancestor) {
                    let ancestor_abs_path = dest_dir.join(&ancestor);
                    targets.entry(ancestor).or_insert((ancestor_abs_path, false));
                }
            }
            targets.insert(target_rel_path, (dest_path.clone(), true));
        }

        let mut plan = Plan::default();
        let mut added = Vec::new();
        for (target_rel_path, (dest_path, explicit)) in &targets {
            let ignored = self.ignore.matches(target_rel_path)
                || target_rel_path
                    .ancestors()
                    .iter()
                    .any(|ancestor| self.ignore.matches(ancestor));
            if ignored {
                info!("skip ignored {target_rel_path}");
                continue;
            }

            let actual = ActualStateEntry::read(dest_system, dest_path)?;
            let parent = plan.source_dir(self, &target_rel_path.dir());
            let target_name = target_rel_path.base().to_owned();

            let (source_rel_path, entry) = match &actual {
                ActualStateEntry::Absent { .. } => {
                    return Err(Error::System {
                        op: "add",
                        path: dest_path.clone(),
                        source: io::Error::from(io::ErrorKind::NotFound),
                    })
                }
                ActualStateEntry::Dir { perm, .. } => {
                    let attr = DirAttr {
                        target_name,
                        exact: options.exact && *explicit,
                        private: is_private(*perm),
                    };
                    let source_rel_path =
                        SourceRelPath::new_dir(parent.rel_path().join_name(&attr.source_name()));
                    let entry = TargetStateEntry::Dir {
                        perm: 0o777 & !umask,
                    };
                    (source_rel_path, entry)
                }
                ActualStateEntry::File { perm, contents, .. } => {
                    let data = contents.contents()?;
                    let attr = FileAttr {
                        target_name,
                        file_type: if options.create {
                            FileType::Create
                        } else {
                            FileType::File
                        },
                        empty: !options.create && data.is_empty(),
                        encrypted: options.encrypt,
                        executable: !cfg!(windows) && perm & 0o111 != 0,
                        private: is_private(*perm),
                        template: options.template,
                        ..Default::default()
                    };

                    let data = if options.encrypt {
                        self.encryption
                            .encrypt(data)
                            .map_err(|source| Error::Encrypt {
                                path: dest_path.clone(),
                                source,
                            })?
                    } else {
                        data.to_vec()
                    };

                    let name = attr.source_name(self.encrypted_suffix());
                    let source_rel_path = SourceRelPath::new_file(parent.rel_path().join_name(&name));
                    (source_rel_path, source_file(data, umask))
                }
                ActualStateEntry::Symlink { linkname, .. } => {
                    let attr = FileAttr {
                        target_name,
                        file_type: FileType::Symlink,
                        template: options.template,
                        ..Default::default()
                    };
                    let data = format!("{}\n", linkname.linkname()?).into_bytes();
                    let name = attr.source_name(self.encrypted_suffix());
                    let source_rel_path = SourceRelPath::new_file(parent.rel_path().join_name(&name));
                    (source_rel_path, source_file(data, umask))
                }
            };

            let origin = dest_path.to_string();
            let old = self
                .entries
                .get(target_rel_path)
                .and_then(SourceStateEntry::source_rel_path)
                .map(|old| parent.rel_path().join_name(old.rel_path().base()));

            match old {
                Some(old) if old != *source_rel_path.rel_path() => {
                    let was_dir = matches!(
                        self.entries.get(target_rel_path),
                        Some(SourceStateEntry::Dir { .. })
                    );
                    if was_dir && source_rel_path.is_dir() {
                        debug!("rename {old} to {source_rel_path}");
                        plan.push(
                            source_rel_path.rel_path().clone(),
                            Update {
                                origin,
                                order: -1,
                                entry: TargetStateEntry::RenameDir {
                                    old: old.base().to_owned(),
                                    new: source_rel_path.rel_path().base().to_owned(),
                                },
                            },
                        )?;
                    } else {
                        debug!("replace {old} with {source_rel_path}");
                        plan.push(
                            old,
                            Update {
                                origin: origin.clone(),
                                order: 0,
                                entry: TargetStateEntry::Remove,
                            },
                        )?;
                        plan.push(
                            source_rel_path.rel_path().clone(),
                            Update {
                                origin,
                                order: 0,
                                entry,
                            },
                        )?;
                    }
                }
                _ => plan.push(
                    source_rel_path.rel_path().clone(),
                    Update {
                        origin,
                        order: 0,
                        entry,
                    },
                )?,
            }

            if source_rel_path.is_dir() {
                plan.dirs.insert(target_rel_path.clone(), source_rel_path);
            }
            added.push((dest_path.clone(), actual));
        }

        let source_dir = &self.options.source_dir;
        mkdir_all(self.system.as_ref(), source_dir, 0o777 & !umask).with_path("mkdir", source_dir)?;

        let mut updates = plan.updates.into_iter().collect::<Vec<_>>();
        updates.sort_by(|(left_path, left), (right_path, right)| {
            (left.order, left_path).cmp(&(right.order, right_path))
        });

        let mut changed = 0;
        for (path, update) in updates {
            let abs_path = source_dir.join(&path);
            let actual = ActualStateEntry::read(&self.system, &abs_path)?;
            if update.entry.apply(self.system.as_ref(), persistent_state, &actual)? {
                debug!("update source path {path}");
                changed += 1;
            }
        }

        for (dest_path, actual) in added {
            set_json(
                persistent_state,
                ENTRY_STATE_BUCKET,
                dest_path.as_str(),
                &actual.entry_state()?,
            )?;
        }

        info!("changed {changed} source paths");
        Ok(changed)
    }
}

fn source_file(data: Vec<u8>, umask: u32) -> TargetStateEntry {
    TargetStateEntry::File {
        contents: Arc::new(LazyContents::new(data)),
        empty: true,
        perm: 0o666 & !umask,
        overwrite: false,
    }
}
