// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    attr::{DirAttr, FileAttr, FileType},
    error::{Error, IoResultExt, Result},
    lazy::{LazyContents, LazyLinkname},
    path::{AbsPath, RelPath, SourceRelPath},
    system::{is_not_found, normalize_linkname, System},
    target::{is_blank, TargetStateEntry},
    template::Templater,
};

use std::sync::{Arc, OnceLock};

type TargetCell = OnceLock<Result<Arc<TargetStateEntry>, Arc<Error>>>;

/// Entry of the source state.
#[derive(Debug)]
pub enum SourceStateEntry {
    Dir {
        attr: DirAttr,
        source_rel_path: SourceRelPath,
    },
    File {
        attr: FileAttr,
        source_rel_path: SourceRelPath,

        /// Source contents, decrypted but not rendered.
        contents: Arc<LazyContents>,
        target: TargetCell,
    },

    /// Target that must not exist.
    Remove {
        target_rel_path: RelPath,

        /// Source path that asked for the removal.
        origin: String,
    },

    /// Source directory that must be renamed to match new attributes.
    RenameDir {
        old: SourceRelPath,
        new: SourceRelPath,
    },
}

/// Everything needed to turn a source entry into a target entry.
pub(crate) struct TargetEnv<'a> {
    pub system: &'a Arc<dyn System>,
    pub templater: &'a Arc<Templater>,
    pub target_rel_path: &'a RelPath,
    pub dest_abs_path: AbsPath,
    pub umask: u32,
}

impl SourceStateEntry {
    pub(crate) fn new_file(
        attr: FileAttr,
        source_rel_path: SourceRelPath,
        contents: Arc<LazyContents>,
    ) -> Self {
        Self::File {
            attr,
            source_rel_path,
            contents,
            target: OnceLock::new(),
        }
    }

    /// Source path of entry, if it has one.
    pub fn source_rel_path(&self) -> Option<&SourceRelPath> {
        match self {
            Self::Dir {
                source_rel_path, ..
            }
            | Self::File {
                source_rel_path, ..
            } => Some(source_rel_path),
            Self::RenameDir { new, .. } => Some(new),
            Self::Remove { .. } => None,
        }
    }

    /// Where entry came from, for error reports.
    pub fn origin(&self) -> String {
        match self {
            Self::Remove { origin, .. } => origin.clone(),
            _ => self
                .source_rel_path()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// Apply order, scripts may ask to run before or after everything else.
    pub fn order(&self) -> i8 {
        match self {
            Self::File { attr, .. } if attr.file_type == FileType::Script => attr.order,
            _ => 0,
        }
    }

    /// Compute target entry, memoized for files.
    pub(crate) fn target_state_entry(&self, env: &TargetEnv<'_>) -> Result<Arc<TargetStateEntry>> {
        let entry = match self {
            Self::Dir { attr, .. } => TargetStateEntry::Dir {
                perm: attr.perm() & !env.umask,
            },
            Self::File {
                attr,
                source_rel_path,
                contents,
                target,
            } => {
                return target
                    .get_or_init(|| {
                        file_target(attr, source_rel_path, contents, env)
                            .map(Arc::new)
                            .map_err(Arc::new)
                    })
                    .clone()
                    .map_err(Error::Cached)
            }
            Self::Remove { .. } => TargetStateEntry::Remove,
            Self::RenameDir { old, new } => TargetStateEntry::RenameDir {
                old: old.rel_path().base().to_owned(),
                new: new.rel_path().base().to_owned(),
            },
        };

        Ok(Arc::new(entry))
    }
}

fn file_target(
    attr: &FileAttr,
    source_rel_path: &SourceRelPath,
    contents: &Arc<LazyContents>,
    env: &TargetEnv<'_>,
) -> Result<TargetStateEntry> {
    let perm = attr.perm() & !env.umask;
    let render = renderer(attr, source_rel_path, contents, env.templater);

    let entry = match attr.file_type {
        FileType::File => TargetStateEntry::File {
            contents: Arc::new(LazyContents::from_fn(render)),
            empty: attr.empty,
            perm,
            overwrite: false,
        },
        FileType::Create => {
            let (contents, exists) = match env.system.read_file(&env.dest_abs_path) {
                Ok(current) => (LazyContents::new(current), true),
                Err(error) if is_not_found(&error) => (LazyContents::from_fn(render), false),
                Err(error) => return Err(error).with_path("read", &env.dest_abs_path),
            };
            TargetStateEntry::File {
                contents: Arc::new(contents),
                empty: attr.empty || exists,
                perm,
                overwrite: false,
            }
        }
        FileType::Modify => {
            let system = Arc::clone(env.system);
            let dest_abs_path = env.dest_abs_path.clone();
            let name = env.target_rel_path.clone();
            TargetStateEntry::File {
                contents: Arc::new(LazyContents::from_fn(move || {
                    let current = match system.read_file(&dest_abs_path) {
                        Ok(current) => current,
                        Err(error) if is_not_found(&error) => Vec::new(),
                        Err(error) => return Err(error).with_path("read", &dest_abs_path),
                    };

                    let modifier = render()?;
                    if is_blank(&modifier) {
                        return Ok(current);
                    }

                    system
                        .run_idempotent_command(&name, &modifier, &current)
                        .map_err(|source| Error::Modify { name, source })
                })),
                empty: attr.empty,
                perm,
                overwrite: true,
            }
        }
        FileType::Script => TargetStateEntry::Script {
            contents: Arc::new(LazyContents::from_fn(render)),
            name: env.target_rel_path.clone(),
            once: attr.once,
        },
        // Blank linkname applies as a removal.
        FileType::Symlink => TargetStateEntry::Symlink {
            linkname: Arc::new(LazyLinkname::from_fn(move || {
                let data = render()?;
                let linkname = String::from_utf8_lossy(&data);
                let linkname = linkname.trim().lines().next().unwrap_or_default();
                Ok(normalize_linkname(linkname.trim()))
            })),
        },
    };

    Ok(entry)
}

// Source contents rendered as a template when asked to.
fn renderer(
    attr: &FileAttr,
    source_rel_path: &SourceRelPath,
    contents: &Arc<LazyContents>,
    templater: &Arc<Templater>,
) -> impl FnOnce() -> Result<Vec<u8>> + Send + 'static {
    let template = attr.template;
    let name = source_rel_path.to_string();
    let contents = Arc::clone(contents);
    let templater = Arc::clone(templater);

    move || {
        let data = contents.contents()?;
        if template {
            templater.render(&name, data)
        } else {
            Ok(data.to_vec())
        }
    }
}
