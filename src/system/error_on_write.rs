// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    path::{AbsPath, RelPath},
    system::{FileInfo, System},
};

use std::io;

/// System that refuses every mutation.
#[derive(Debug)]
pub struct ErrorOnWriteSystem<S> {
    inner: S,
}

impl<S: System> ErrorOnWriteSystem<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn refuse(op: &str, path: &AbsPath) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{op} {path}: system is read-only"),
    )
}

impl<S: System> System for ErrorOnWriteSystem<S> {
    fn chmod(&self, path: &AbsPath, _: u32) -> io::Result<()> {
        Err(refuse("chmod", path))
    }

    fn mkdir(&self, path: &AbsPath, _: u32) -> io::Result<()> {
        Err(refuse("mkdir", path))
    }

    fn remove_all(&self, path: &AbsPath) -> io::Result<()> {
        Err(refuse("remove", path))
    }

    fn rename(&self, old: &AbsPath, _: &AbsPath) -> io::Result<()> {
        Err(refuse("rename", old))
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

    fn write_file(&self, path: &AbsPath, _: &[u8], _: u32) -> io::Result<()> {
        Err(refuse("write", path))
    }

    fn write_symlink(&self, _: &str, path: &AbsPath) -> io::Result<()> {
        Err(refuse("symlink", path))
    }

    fn run_script(&self, _: &RelPath, dir: &AbsPath, _: &[u8]) -> io::Result<()> {
        Err(refuse("run script in", dir))
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::system::RealSystem;
    use tempfile::tempdir;

    #[test]
    fn mutations_fail() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let root = AbsPath::new(dir.path())?;
        let system = ErrorOnWriteSystem::new(RealSystem::default());

        let error = system
            .write_file(&root.join_name("file"), b"", 0o644)
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
        assert!(system.lstat(&root)?.is_dir());

        Ok(())
    }
}
