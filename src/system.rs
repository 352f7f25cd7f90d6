// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system operation boundary.
//!
//! The source state never touches a file system directly. Everything it reads
//! or mutates goes through the [`System`] trait, which lets callers stack
//! adapters on top of the [`RealSystem`]:
//!
//! - [`DryRunSystem`] pretends every mutation succeeded and remembers that
//!   one was attempted.
//! - [`DebugSystem`] logs every operation.
//! - [`ErrorOnWriteSystem`] rejects every mutation, useful for operations
//!   that must only ever read.
//!
//! # Scripts and Filters
//!
//! Running a script or a modify filter also goes through the boundary. The
//! system receives the script body, places it somewhere executable, and picks
//! an interpreter for it. Idempotent commands are treated as reads, so dry
//! runs still execute modify filters to learn what they would produce.

mod debug;
mod dry_run;
mod error_on_write;
mod real;

pub use debug::DebugSystem;
pub use dry_run::DryRunSystem;
pub use error_on_write::ErrorOnWriteSystem;
pub use real::{ExecutableCache, Interpreter, RealSystem};

use crate::path::{AbsPath, RelPath};

use std::{io, sync::Arc};

/// Kind of file system object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Dir,
    Symlink,

    /// Devices, sockets, fifos, and anything else unmanageable.
    Other,
}

/// Metadata about one file system object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Last component of the path the info was read from.
    pub name: String,
    pub kind: FileKind,

    /// Permission bits only, no file type bits.
    pub perm: u32,
    pub len: u64,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// File system operations.
///
/// Paths are always absolute. Permission bits are plain Unix permission bits
/// and may be ignored on platforms without them.
pub trait System: Send + Sync {
    /// Change permissions of path.
    fn chmod(&self, path: &AbsPath, perm: u32) -> io::Result<()>;

    /// Create a single directory.
    fn mkdir(&self, path: &AbsPath, perm: u32) -> io::Result<()>;

    /// Remove path and everything below it. Absent paths are not an error.
    fn remove_all(&self, path: &AbsPath) -> io::Result<()>;

    fn rename(&self, old: &AbsPath, new: &AbsPath) -> io::Result<()>;

    /// Metadata of path, following symlinks.
    fn stat(&self, path: &AbsPath) -> io::Result<FileInfo>;

    /// Metadata of path, without following symlinks.
    fn lstat(&self, path: &AbsPath) -> io::Result<FileInfo>;

    /// Metadata of every directory entry, sorted by name.
    fn read_dir(&self, path: &AbsPath) -> io::Result<Vec<FileInfo>>;

    fn read_file(&self, path: &AbsPath) -> io::Result<Vec<u8>>;

    fn readlink(&self, path: &AbsPath) -> io::Result<String>;

    /// Replace contents of path.
    fn write_file(&self, path: &AbsPath, data: &[u8], perm: u32) -> io::Result<()>;

    /// Create symlink at path pointing to linkname.
    fn write_symlink(&self, linkname: &str, path: &AbsPath) -> io::Result<()>;

    /// Run script body with working directory `dir`.
    fn run_script(&self, name: &RelPath, dir: &AbsPath, script: &[u8]) -> io::Result<()>;

    /// Run side-effect free filter over `stdin`, returning its output.
    fn run_idempotent_command(
        &self,
        name: &RelPath,
        script: &[u8],
        stdin: &[u8],
    ) -> io::Result<Vec<u8>>;
}

impl<S: System + ?Sized> System for Arc<S> {
    fn chmod(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        (**self).chmod(path, perm)
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        (**self).mkdir(path, perm)
    }

    fn remove_all(&self, path: &AbsPath) -> io::Result<()> {
        (**self).remove_all(path)
    }

    fn rename(&self, old: &AbsPath, new: &AbsPath) -> io::Result<()> {
        (**self).rename(old, new)
    }

    fn stat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        (**self).stat(path)
    }

    fn lstat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        (**self).lstat(path)
    }

    fn read_dir(&self, path: &AbsPath) -> io::Result<Vec<FileInfo>> {
        (**self).read_dir(path)
    }

    fn read_file(&self, path: &AbsPath) -> io::Result<Vec<u8>> {
        (**self).read_file(path)
    }

    fn readlink(&self, path: &AbsPath) -> io::Result<String> {
        (**self).readlink(path)
    }

    fn write_file(&self, path: &AbsPath, data: &[u8], perm: u32) -> io::Result<()> {
        (**self).write_file(path, data, perm)
    }

    fn write_symlink(&self, linkname: &str, path: &AbsPath) -> io::Result<()> {
        (**self).write_symlink(linkname, path)
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, script: &[u8]) -> io::Result<()> {
        (**self).run_script(name, dir, script)
    }

    fn run_idempotent_command(
        &self,
        name: &RelPath,
        script: &[u8],
        stdin: &[u8],
    ) -> io::Result<Vec<u8>> {
        (**self).run_idempotent_command(name, script, stdin)
    }
}

/// Create directory and every missing parent.
///
/// Existing directories are left untouched.
pub fn mkdir_all(system: &dyn System, path: &AbsPath, perm: u32) -> io::Result<()> {
    match system.stat(path) {
        Ok(info) if info.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{path}: not a directory"),
            ))
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }

    let parent = path.dir();
    if &parent != path {
        mkdir_all(system, &parent, perm)?;
    }

    match system.mkdir(path, perm) {
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        result => result,
    }
}

/// Normalize symlink target for comparison.
pub fn normalize_linkname(linkname: &str) -> String {
    if cfg!(windows) {
        linkname.replace('\\', "/")
    } else {
        linkname.to_owned()
    }
}

pub(crate) fn is_not_found(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
}
