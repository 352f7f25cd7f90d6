// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use dotwright::{
    encryption::{Encryption, NoEncryption},
    path::AbsPath,
    persistent_state::{copy_to, MockPersistentState, RedbPersistentState},
    source::{ApplyOptions, SourceState, SourceStateOptions},
    system::{DryRunSystem, RealSystem, System},
};

use anyhow::Result;
use semver::Version;
use serde_json::Map;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;

/// Source directory, destination directory, and state database in one
/// throwaway place.
pub(crate) struct Sandbox {
    _dir: TempDir,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub system: Arc<dyn System>,
    pub persistent: RedbPersistentState,
}

impl Sandbox {
    pub(crate) fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        let dest = dir.path().join("home");
        fs::create_dir_all(&source)?;
        fs::create_dir_all(&dest)?;

        Ok(Self {
            _dir: dir,
            source,
            dest,
            system: Arc::new(RealSystem::default()),
            persistent: RedbPersistentState::new_temporary()?,
        })
    }

    fn write(root: &Path, path: &str, contents: &str) -> Result<()> {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub(crate) fn source(&self, path: &str, contents: &str) -> Result<()> {
        Self::write(&self.source, path, contents)
    }

    pub(crate) fn dest(&self, path: &str, contents: &str) -> Result<()> {
        Self::write(&self.dest, path, contents)
    }

    pub(crate) fn read_dest(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.dest.join(path))?)
    }

    pub(crate) fn dest_abs(&self, path: &str) -> Result<AbsPath> {
        Ok(AbsPath::new(self.dest.join(path))?)
    }

    pub(crate) fn state_with(&self, encryption: Arc<dyn Encryption>) -> Result<SourceState> {
        let options = SourceStateOptions::new(AbsPath::new(&self.source)?, AbsPath::new(&self.dest)?)
            .with_version(Version::new(1, 0, 0));
        Ok(SourceState::new(
            Arc::clone(&self.system),
            encryption,
            options,
            Map::new(),
        ))
    }

    /// Freshly read source state.
    pub(crate) fn read(&self) -> Result<SourceState> {
        let mut state = self.state_with(Arc::new(NoEncryption::default()))?;
        state.read()?;
        Ok(state)
    }

    /// Apply everything, returning number of targets changed.
    pub(crate) fn apply(&self) -> Result<usize> {
        let state = self.read()?;
        Ok(state.apply_all(&self.system, &self.persistent, &mut ApplyOptions::default())?)
    }

    /// Apply everything without touching anything, returning whether
    /// anything would have changed.
    pub(crate) fn would_change(&self) -> Result<bool> {
        let dry_run = Arc::new(DryRunSystem::new(Arc::clone(&self.system)));
        let system: Arc<dyn System> = dry_run.clone();
        let persistent = MockPersistentState::new();
        copy_to(&self.persistent, &persistent)?;

        let state = self.read()?;
        state.apply_all(&system, &persistent, &mut ApplyOptions::default())?;
        Ok(dry_run.modified())
    }
}
