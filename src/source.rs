// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source state management.
//!
//! The source state is the decoded form of the source directory: one
//! [`SourceStateEntry`] per target path, built by [`SourceState::read`]. Every
//! name in the source directory encodes attributes of the target it manages,
//! see [`attr`](crate::attr) for the grammar.
//!
//! # Control Files
//!
//! Names starting with [`CONTROL_PREFIX`] configure reading rather than
//! produce targets:
//!
//! - `.dotwrightdata.{json,toml,yaml}`: template data, deep merged.
//! - `.dotwrighttemplates/`: named partials for `include`.
//! - `.dotwrightversion`: minimum tool version the source state needs.
//! - `.dotwrightignore`: glob patterns of targets to leave alone.
//! - `.dotwrightremove`: glob patterns of targets to delete.
//!
//! Control files of a directory are processed before its other entries, in
//! the order listed above. Every other name starting with `.` is skipped.
//!
//! # Apply
//!
//! [`SourceState::apply`] reconciles one target path, and
//! [`SourceState::apply_all`] reconciles every target in apply order: scripts
//! marked `before_` first, then regular entries, then scripts marked
//! `after_`, each group in lexical order of target path.
//!
//! # Add
//!
//! [`SourceState::add`] goes the other way, importing destination paths into
//! the source directory.

mod add;
mod apply;
mod entry;
mod read;

pub use add::AddOptions;
pub use apply::{ApplyOptions, PreApply, PreApplyHook};
pub use entry::SourceStateEntry;

use crate::{
    encryption::Encryption,
    error::{Error, Result},
    path::{AbsPath, RelPath},
    pattern::PatternSet,
    system::System,
    target::TargetStateEntry,
    template::Templater,
};

use entry::TargetEnv;
use semver::Version;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, sync::Arc};

/// Prefix of every control file name.
pub const CONTROL_PREFIX: &str = ".dotwright";

/// Options of a source state.
#[derive(Clone, Debug)]
pub struct SourceStateOptions {
    pub source_dir: AbsPath,
    pub dest_dir: AbsPath,

    /// Permission bits cleared from every target.
    pub umask: u32,

    /// Version of the running tool, checked against version files.
    pub version: Version,
}

impl SourceStateOptions {
    pub fn new(source_dir: AbsPath, dest_dir: AbsPath) -> Self {
        Self {
            source_dir,
            dest_dir,
            umask: 0o022,
            version: Version::parse(env!("CARGO_PKG_VERSION"))
                .unwrap_or_else(|_| Version::new(0, 0, 0)),
        }
    }

    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }
}

/// Decoded source directory.
pub struct SourceState {
    system: Arc<dyn System>,
    encryption: Arc<dyn Encryption>,
    templater: Arc<Templater>,
    options: SourceStateOptions,
    entries: BTreeMap<RelPath, SourceStateEntry>,
    ignore: PatternSet,
    min_version: Option<Version>,
}

impl SourceState {
    /// Construct empty source state.
    ///
    /// Templates see `data` merged over built-in data under the `dotwright`
    /// key: `sourceDir`, `destDir`, and `version`.
    pub fn new(
        system: Arc<dyn System>,
        encryption: Arc<dyn Encryption>,
        options: SourceStateOptions,
        data: Map<String, Value>,
    ) -> Self {
        let builtin = json!({
            "dotwright": {
                "sourceDir": options.source_dir.as_str(),
                "destDir": options.dest_dir.as_str(),
                "version": options.version.to_string(),
            }
        });
        let templater = match builtin {
            Value::Object(builtin) => Templater::new(builtin),
            _ => Templater::default(),
        };
        templater.merge_data(data);

        Self {
            system,
            encryption,
            templater: Arc::new(templater),
            options,
            entries: BTreeMap::new(),
            ignore: PatternSet::new(),
            min_version: None,
        }
    }

    pub fn source_dir(&self) -> &AbsPath {
        &self.options.source_dir
    }

    pub fn dest_dir(&self) -> &AbsPath {
        &self.options.dest_dir
    }

    pub fn templater(&self) -> &Templater {
        &self.templater
    }

    /// Current template data.
    pub fn template_data(&self) -> Map<String, Value> {
        self.templater.data()
    }

    /// Highest version demanded by version files.
    pub fn min_version(&self) -> Option<&Version> {
        self.min_version.as_ref()
    }

    /// Entry managing target path.
    pub fn get(&self, target_rel_path: &RelPath) -> Option<&SourceStateEntry> {
        self.entries.get(target_rel_path)
    }

    /// Every entry keyed by target path, in lexical order.
    pub fn entries(&self) -> impl Iterator<Item = (&RelPath, &SourceStateEntry)> {
        self.entries.iter()
    }

    /// Target path is matched by ignore patterns.
    pub fn ignored(&self, target_rel_path: &RelPath) -> bool {
        self.ignore.matches(target_rel_path)
    }

    /// Every target path in apply order.
    pub fn target_rel_paths(&self) -> Vec<RelPath> {
        let mut paths = self
            .entries
            .iter()
            .map(|(path, entry)| (entry.order(), path.clone()))
            .collect::<Vec<_>>();
        paths.sort();
        paths.into_iter().map(|(_, path)| path).collect()
    }

    /// Compute target entry of target path.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotManaged`] if path has no entry.
    /// - Return [`Error::System`] if the destination cannot be read.
    ///
    pub fn target_state_entry(&self, target_rel_path: &RelPath) -> Result<Arc<TargetStateEntry>> {
        let entry = self
            .get(target_rel_path)
            .ok_or_else(|| Error::NotManaged(target_rel_path.clone()))?;
        entry.target_state_entry(&self.target_env(&self.system, target_rel_path))
    }

    fn target_env<'a>(
        &'a self,
        system: &'a Arc<dyn System>,
        target_rel_path: &'a RelPath,
    ) -> TargetEnv<'a> {
        TargetEnv {
            system,
            templater: &self.templater,
            target_rel_path,
            dest_abs_path: self.options.dest_dir.join(target_rel_path),
            umask: self.options.umask,
        }
    }

    fn encrypted_suffix(&self) -> &str {
        self.encryption.encrypted_suffix()
    }
}
