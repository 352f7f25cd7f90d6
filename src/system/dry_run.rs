// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    path::{AbsPath, RelPath},
    system::{FileInfo, System},
};

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

/// System that reads through, but only pretends to write.
///
/// Remembers whether any mutation was attempted, which is exactly what a
/// dry run or an idempotence check wants to know.
#[derive(Debug)]
pub struct DryRunSystem<S> {
    inner: S,
    modified: AtomicBool,
}

impl<S: System> DryRunSystem<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            modified: AtomicBool::new(false),
        }
    }

    /// A mutation was attempted.
    pub fn modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    fn set_modified(&self) -> io::Result<()> {
        self.modified.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl<S: System> System for DryRunSystem<S> {
    fn chmod(&self, _: &AbsPath, _: u32) -> io::Result<()> {
        self.set_modified()
    }

    fn mkdir(&self, _: &AbsPath, _: u32) -> io::Result<()> {
        self.set_modified()
    }

    fn remove_all(&self, _: &AbsPath) -> io::Result<()> {
        self.set_modified()
    }

    fn rename(&self, _: &AbsPath, _: &AbsPath) -> io::Result<()> {
        self.set_modified()
    }

    fn stat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        self.inner.lstat(path)
    }

    fn read_dir(&self, path: &AbsPath) -> io::Result<Vec<FileInfo>> {
        self.inner.read_dir(path)
    }

    fn read_file(&self, path: &AbsPath) -> io::Result<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn readlink(&self, path: &AbsPath) -> io::Result<String> {
        self.inner.readlink(path)
    }

    fn write_file(&self, _: &AbsPath, _: &[u8], _: u32) -> io::Result<()> {
        self.set_modified()
    }

    fn write_symlink(&self, _: &str, _: &AbsPath) -> io::Result<()> {
        self.set_modified()
    }

    fn run_script(&self, _: &RelPath, _: &AbsPath, _: &[u8]) -> io::Result<()> {
        self.set_modified()
    }

    fn run_idempotent_command(
        &self,
        name: &RelPath,
        script: &[u8],
        stdin: &[u8],
    ) -> io::Result<Vec<u8>> {
        self.inner.run_idempotent_command(name, script, stdin)
    }
}
