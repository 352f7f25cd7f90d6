// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{SourceState, SourceStateEntry, CONTROL_PREFIX};
use crate::{
    attr::{DirAttr, FileAttr, FileType, TEMPLATE_SUFFIX},
    error::{DuplicateTarget, DuplicateTargets, Error, IoResultExt, Result},
    lazy::LazyContents,
    path::{AbsPath, RelPath, SourceRelPath},
    pattern::{parse_line, rooted, PatternSet},
    system::{is_not_found, FileInfo, FileKind},
    template::DataFormat,
};

use semver::Version;
use std::{collections::BTreeMap, io, sync::Arc};
use tracing::{debug, info, instrument, warn};

const DATA_DIR: &str = ".dotwrightdata";
const DATA_PREFIX: &str = ".dotwrightdata.";
const TEMPLATES_DIR: &str = ".dotwrighttemplates";
const VERSION_FILE: &str = ".dotwrightversion";
const IGNORE_FILE: &str = ".dotwrightignore";
const REMOVE_FILE: &str = ".dotwrightremove";
const SCRIPTS_DIR: &str = ".dotwrightscripts";

/// Accumulated state of a single read.
#[derive(Default)]
struct Walk {
    /// Every candidate entry of every target path.
    candidates: BTreeMap<RelPath, Vec<SourceStateEntry>>,

    /// Remove patterns paired with the remove file they came from.
    removes: Vec<(String, PatternSet)>,
}

impl Walk {
    fn push(&mut self, target_rel_path: RelPath, entry: SourceStateEntry) {
        self.candidates
            .entry(target_rel_path)
            .or_default()
            .push(entry);
    }
}

fn is_data(name: &str) -> bool {
    name == DATA_DIR || name.starts_with(DATA_PREFIX)
}

// Ignore and remove files may carry a redundant template suffix.
fn pattern_file(name: &str) -> Option<&str> {
    let name = name.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(name);
    matches!(name, IGNORE_FILE | REMOVE_FILE).then_some(name)
}

// Control files of a directory are handled in this order.
fn control_rank(name: &str) -> u8 {
    match name {
        TEMPLATES_DIR => 0,
        VERSION_FILE => 1,
        name => match pattern_file(name) {
            Some(IGNORE_FILE) => 2,
            Some(_) => 3,
            None if name == SCRIPTS_DIR => 4,
            None => 5,
        },
    }
}

impl SourceState {
    /// Read source directory into entries.
    ///
    /// A missing source directory reads as an empty source state. Any
    /// previously read entries are replaced.
    ///
    /// # Errors
    ///
    /// - Return [`Error::DuplicateTargets`] listing every target claimed by
    ///   more than one entry.
    /// - Return [`Error::TooOld`] if a version file demands a newer release.
    /// - Return [`Error::UnsupportedFileType`] for special files.
    /// - Return [`Error::Data`], [`Error::Pattern`], [`Error::Version`], or
    ///   [`Error::Template`] for malformed control files.
    #[instrument(skip(self), level = "debug")]
    pub fn read(&mut self) -> Result<()> {
        self.entries.clear();
        self.ignore = PatternSet::new();
        self.min_version = None;

        let source_dir = self.options.source_dir.clone();
        match self.system.stat(&source_dir) {
            Ok(info) if info.is_dir() => {}
            Ok(_) => {
                return Err(Error::System {
                    op: "read directory",
                    path: source_dir,
                    source: io::Error::other("not a directory"),
                })
            }
            Err(error) if is_not_found(&error) => {
                warn!("source directory {source_dir} does not exist");
                return Ok(());
            }
            Err(source) => {
                return Err(Error::System {
                    op: "stat",
                    path: source_dir,
                    source,
                })
            }
        }

        self.read_data(&RelPath::default())?;

        let mut walk = Walk::default();
        self.walk_dir(&SourceRelPath::new_dir(""), &RelPath::default(), &mut walk)?;
        self.expand_removes(&mut walk)?;
        self.expand_exact_dirs(&mut walk)?;
        walk.candidates.retain(|path, _| !self.ignore.matches(path));
        self.entries = unique_entries(walk.candidates)?;

        info!("read {} source state entries", self.entries.len());
        Ok(())
    }

    fn walk_dir(&mut self, dir: &SourceRelPath, target_dir: &RelPath, walk: &mut Walk) -> Result<()> {
        let abs_path = self.options.source_dir.join(dir.rel_path());
        let infos = self
            .system
            .read_dir(&abs_path)
            .with_path("read directory", &abs_path)?;

        let mut control = Vec::new();
        let mut ordinary = Vec::new();
        for info in infos {
            if info.name.starts_with(CONTROL_PREFIX) {
                control.push(info);
            } else if info.name.starts_with('.') {
                debug!("skip {}", dir.rel_path().join_name(&info.name));
            } else {
                ordinary.push(info);
            }
        }

        control.sort_by_key(|info| control_rank(&info.name));
        for info in control {
            self.read_control(dir, target_dir, &info, walk)?;
        }

        for info in ordinary {
            self.read_entry(dir, target_dir, &info, walk)?;
        }

        Ok(())
    }

    fn read_control(
        &mut self,
        dir: &SourceRelPath,
        target_dir: &RelPath,
        info: &FileInfo,
        walk: &mut Walk,
    ) -> Result<()> {
        let source_rel_path = dir.rel_path().join_name(&info.name);
        let abs_path = self.options.source_dir.join(&source_rel_path);

        match info.name.as_str() {
            // Merged before the walk.
            name if is_data(name) => {}
            TEMPLATES_DIR => self.read_templates(&abs_path, &RelPath::default())?,
            VERSION_FILE => {
                let contents = self.system.read_file(&abs_path).with_path("read", &abs_path)?;
                let version = Version::parse(String::from_utf8_lossy(&contents).trim())
                    .map_err(|source| Error::Version {
                        path: abs_path.clone(),
                        source,
                    })?;

                if version > self.options.version {
                    return Err(Error::TooOld {
                        need: version,
                        have: self.options.version.clone(),
                    });
                }

                if self.min_version.as_ref().is_none_or(|current| version > *current) {
                    self.min_version = Some(version);
                }
            }
            SCRIPTS_DIR => {
                if !matches!(self.follow(&abs_path, info)?, FileKind::Dir) {
                    return Err(Error::UnsupportedFileType { path: abs_path });
                }
                let scripts_dir = SourceRelPath::new_dir(source_rel_path);
                self.read_scripts(&scripts_dir, &target_dir.join_name(SCRIPTS_DIR), walk)?;
            }
            name if pattern_file(name) == Some(IGNORE_FILE) => {
                for (pattern, include) in self.read_patterns(&abs_path, &source_rel_path, target_dir)? {
                    self.ignore
                        .add(&pattern, include)
                        .map_err(|source| Error::Pattern {
                            path: abs_path.clone(),
                            pattern,
                            source,
                        })?;
                }
            }
            name if pattern_file(name) == Some(REMOVE_FILE) => {
                let mut set = PatternSet::new();
                for (pattern, include) in self.read_patterns(&abs_path, &source_rel_path, target_dir)? {
                    set.add(&pattern, include).map_err(|source| Error::Pattern {
                        path: abs_path.clone(),
                        pattern,
                        source,
                    })?;
                }
                walk.removes.push((source_rel_path.to_string(), set));
            }
            _ => debug!("skip unknown control file {source_rel_path}"),
        }

        Ok(())
    }

    // Merge every data file of the tree, so templates anywhere see all data.
    fn read_data(&self, dir: &RelPath) -> Result<()> {
        let abs_dir = self.options.source_dir.join(dir);
        let infos = self
            .system
            .read_dir(&abs_dir)
            .with_path("read directory", &abs_dir)?;

        for info in infos {
            let name = info.name.as_str();
            if name.starts_with('.') && !is_data(name) {
                continue;
            }

            let source_rel_path = dir.join_name(name);
            let abs_path = abs_dir.join_name(name);
            match (name, self.follow(&abs_path, &info)?) {
                (DATA_DIR, FileKind::Dir) => self.read_data_dir(&abs_path, &source_rel_path)?,
                (name, FileKind::File) if name.starts_with(DATA_PREFIX) => {
                    self.merge_data_file(&abs_path, &source_rel_path, &name[DATA_PREFIX.len()..])?
                }
                (name, FileKind::Dir) if !name.starts_with('.') => self.read_data(&source_rel_path)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn read_data_dir(&self, abs_dir: &AbsPath, source_rel_dir: &RelPath) -> Result<()> {
        let infos = self
            .system
            .read_dir(abs_dir)
            .with_path("read directory", abs_dir)?;

        for info in infos {
            let abs_path = abs_dir.join_name(&info.name);
            let source_rel_path = source_rel_dir.join_name(&info.name);
            if info.name.starts_with(CONTROL_PREFIX) {
                return Err(Error::NotAllowed {
                    path: abs_path,
                    dir: DATA_DIR,
                });
            }
            if info.name.starts_with('.') {
                continue;
            }

            match self.follow(&abs_path, &info)? {
                FileKind::Dir => self.read_data_dir(&abs_path, &source_rel_path)?,
                FileKind::File => {
                    let extension = info.name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
                    self.merge_data_file(&abs_path, &source_rel_path, extension)?;
                }
                FileKind::Symlink | FileKind::Other => {
                    return Err(Error::UnsupportedFileType { path: abs_path })
                }
            }
        }

        Ok(())
    }

    fn merge_data_file(&self, abs_path: &AbsPath, source_rel_path: &RelPath, extension: &str) -> Result<()> {
        let Some(format) = DataFormat::from_extension(extension) else {
            warn!("skip data file {source_rel_path} of unknown format");
            return Ok(());
        };

        let contents = self.system.read_file(abs_path).with_path("read", abs_path)?;
        let data = format.parse(&contents).map_err(|source| Error::Data {
            path: abs_path.clone(),
            source,
        })?;
        debug!("merge template data from {source_rel_path}");
        self.templater.merge_data(data);
        Ok(())
    }

    // Scripts directory holds scripts only, targets below it are never created.
    fn read_scripts(&self, dir: &SourceRelPath, target_dir: &RelPath, walk: &mut Walk) -> Result<()> {
        let abs_dir = self.options.source_dir.join(dir.rel_path());
        let infos = self
            .system
            .read_dir(&abs_dir)
            .with_path("read directory", &abs_dir)?;

        for info in infos {
            let source_rel_path = dir.rel_path().join_name(&info.name);
            let abs_path = self.options.source_dir.join(&source_rel_path);
            if info.name.starts_with(CONTROL_PREFIX) {
                return Err(Error::NotAllowed {
                    path: abs_path,
                    dir: SCRIPTS_DIR,
                });
            }
            if info.name.starts_with('.') {
                debug!("skip {source_rel_path}");
                continue;
            }

            match self.follow(&abs_path, &info)? {
                FileKind::Dir => {
                    let attr = DirAttr::parse(&info.name);
                    self.read_scripts(
                        &SourceRelPath::new_dir(source_rel_path),
                        &target_dir.join_name(&attr.target_name),
                        walk,
                    )?;
                }
                FileKind::File => {
                    let attr = FileAttr::parse(&info.name, self.encrypted_suffix());
                    if attr.file_type != FileType::Script {
                        return Err(Error::NotAScript { path: abs_path });
                    }

                    let target_rel_path = target_dir.join_name(&attr.target_name);
                    if self.ignore.matches(&target_rel_path) {
                        debug!("ignore {target_rel_path}");
                        continue;
                    }

                    let contents = self.source_contents(abs_path, attr.encrypted);
                    walk.push(
                        target_rel_path,
                        SourceStateEntry::new_file(attr, SourceRelPath::new_file(source_rel_path), contents),
                    );
                }
                FileKind::Symlink | FileKind::Other => {
                    return Err(Error::UnsupportedFileType { path: abs_path })
                }
            }
        }

        Ok(())
    }

    // Render pattern file and root each pattern at the target directory.
    fn read_patterns(
        &self,
        abs_path: &AbsPath,
        source_rel_path: &RelPath,
        target_dir: &RelPath,
    ) -> Result<Vec<(String, bool)>> {
        let contents = self.system.read_file(abs_path).with_path("read", abs_path)?;
        let rendered = self.templater.render(source_rel_path.as_str(), &contents)?;

        Ok(String::from_utf8_lossy(&rendered)
            .lines()
            .filter_map(parse_line)
            .map(|(pattern, include)| (rooted(target_dir, pattern), include))
            .collect())
    }

    // Register every file below the templates directory as a named partial.
    fn read_templates(&self, abs_dir: &AbsPath, prefix: &RelPath) -> Result<()> {
        let infos = self
            .system
            .read_dir(abs_dir)
            .with_path("read directory", abs_dir)?;

        for info in infos {
            let abs_path = abs_dir.join_name(&info.name);
            let name = prefix.join_name(&info.name);
            match self.follow(&abs_path, &info)? {
                FileKind::Dir => self.read_templates(&abs_path, &name)?,
                FileKind::File => {
                    let contents = self.system.read_file(&abs_path).with_path("read", &abs_path)?;
                    debug!("register template {name}");
                    self.templater.add_template(name.as_str(), &contents)?;
                }
                FileKind::Symlink | FileKind::Other => {
                    return Err(Error::UnsupportedFileType { path: abs_path })
                }
            }
        }

        Ok(())
    }

    fn read_entry(
        &mut self,
        dir: &SourceRelPath,
        target_dir: &RelPath,
        info: &FileInfo,
        walk: &mut Walk,
    ) -> Result<()> {
        let source_rel_path = dir.rel_path().join_name(&info.name);
        let abs_path = self.options.source_dir.join(&source_rel_path);

        match self.follow(&abs_path, info)? {
            FileKind::Dir => {
                let attr = DirAttr::parse(&info.name);
                let target_rel_path = target_dir.join_name(&attr.target_name);
                if self.ignore.matches(&target_rel_path) {
                    debug!("ignore {target_rel_path} and everything below it");
                    return Ok(());
                }

                let source_rel_path = SourceRelPath::new_dir(source_rel_path);
                walk.push(
                    target_rel_path.clone(),
                    SourceStateEntry::Dir {
                        attr,
                        source_rel_path: source_rel_path.clone(),
                    },
                );
                self.walk_dir(&source_rel_path, &target_rel_path, walk)
            }
            FileKind::File => {
                let attr = FileAttr::parse(&info.name, self.encrypted_suffix());
                let target_rel_path = target_dir.join_name(&attr.target_name);
                if self.ignore.matches(&target_rel_path) {
                    debug!("ignore {target_rel_path}");
                    return Ok(());
                }

                let contents = self.source_contents(abs_path, attr.encrypted);
                walk.push(
                    target_rel_path,
                    SourceStateEntry::new_file(attr, SourceRelPath::new_file(source_rel_path), contents),
                );
                Ok(())
            }
            FileKind::Symlink | FileKind::Other => Err(Error::UnsupportedFileType { path: abs_path }),
        }
    }

    // Kind of path, following symlinks.
    fn follow(&self, abs_path: &AbsPath, info: &FileInfo) -> Result<FileKind> {
        if info.is_symlink() {
            return Ok(self.system.stat(abs_path).with_path("stat", abs_path)?.kind);
        }
        Ok(info.kind)
    }

    fn source_contents(&self, abs_path: AbsPath, encrypted: bool) -> Arc<LazyContents> {
        let system = Arc::clone(&self.system);
        let encryption = Arc::clone(&self.encryption);

        Arc::new(LazyContents::from_fn(move || {
            let contents = system.read_file(&abs_path).with_path("read", &abs_path)?;
            if !encrypted {
                return Ok(contents);
            }

            encryption
                .decrypt(&contents)
                .map_err(|source| Error::Decrypt {
                    path: abs_path,
                    source,
                })
        }))
    }

    // Turn remove patterns into removals of matching destination paths.
    fn expand_removes(&self, walk: &mut Walk) -> Result<()> {
        let dest_dir = &self.options.dest_dir;
        for (origin, set) in std::mem::take(&mut walk.removes) {
            let matches = set
                .glob(self.system.as_ref(), dest_dir)
                .with_path("glob", dest_dir)?;

            for target_rel_path in matches {
                if self.ignore.matches(&target_rel_path) {
                    continue;
                }

                let already_removed = walk.candidates.get(&target_rel_path).is_some_and(|entries| {
                    entries
                        .iter()
                        .any(|entry| matches!(entry, SourceStateEntry::Remove { .. }))
                });
                if already_removed {
                    continue;
                }

                walk.push(
                    target_rel_path.clone(),
                    SourceStateEntry::Remove {
                        target_rel_path,
                        origin: origin.clone(),
                    },
                );
            }
        }

        Ok(())
    }

    // Remove destination children of exact directories the source lacks.
    fn expand_exact_dirs(&self, walk: &mut Walk) -> Result<()> {
        let exact_dirs = walk
            .candidates
            .iter()
            .flat_map(|(path, entries)| entries.iter().map(move |entry| (path, entry)))
            .filter_map(|(path, entry)| match entry {
                SourceStateEntry::Dir { attr, .. } if attr.exact => {
                    Some((path.clone(), entry.origin()))
                }
                _ => None,
            })
            .collect::<Vec<_>>();

        for (target_dir, origin) in exact_dirs {
            let abs_path = self.options.dest_dir.join(&target_dir);
            let children = match self.system.lstat(&abs_path) {
                Ok(info) if info.is_dir() => self
                    .system
                    .read_dir(&abs_path)
                    .with_path("read directory", &abs_path)?,
                Ok(_) => continue,
                Err(error) if is_not_found(&error) => continue,
                Err(source) => {
                    return Err(Error::System {
                        op: "lstat",
                        path: abs_path,
                        source,
                    })
                }
            };

            for child in children {
                let target_rel_path = target_dir.join_name(&child.name);
                if walk.candidates.contains_key(&target_rel_path)
                    || self.ignore.matches(&target_rel_path)
                {
                    continue;
                }

                debug!("remove {target_rel_path} from exact directory {target_dir}");
                walk.push(
                    target_rel_path.clone(),
                    SourceStateEntry::Remove {
                        target_rel_path,
                        origin: origin.clone(),
                    },
                );
            }
        }

        Ok(())
    }
}

// Reduce candidates to one entry per target, reporting every duplicate.
fn unique_entries(
    candidates: BTreeMap<RelPath, Vec<SourceStateEntry>>,
) -> Result<BTreeMap<RelPath, SourceStateEntry>> {
    let mut entries = BTreeMap::new();
    let mut duplicates = Vec::new();

    for (target_rel_path, mut candidates) in candidates {
        if candidates.len() == 1 {
            if let Some(entry) = candidates.pop() {
                entries.insert(target_rel_path, entry);
            }
            continue;
        }

        let mut source_rel_paths = candidates
            .iter()
            .map(SourceStateEntry::origin)
            .collect::<Vec<_>>();
        source_rel_paths.sort();
        duplicates.push(DuplicateTarget {
            target_rel_path,
            source_rel_paths,
        });
    }

    if !duplicates.is_empty() {
        return Err(DuplicateTargets(duplicates).into());
    }

    Ok(entries)
}
