// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    path::{AbsPath, RelPath},
    system::{FileInfo, System},
};

use std::io;
use tracing::debug;

/// System that logs every operation before passing it on.
#[derive(Debug)]
pub struct DebugSystem<S> {
    inner: S,
}

impl<S: System> DebugSystem<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn log<T>(op: &str, path: &AbsPath, result: io::Result<T>) -> io::Result<T> {
    match &result {
        Ok(_) => debug!(op, %path, "ok"),
        Err(error) => debug!(op, %path, %error, "failed"),
    }
    result
}

impl<S: System> System for DebugSystem<S> {
    fn chmod(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        log("chmod", path, self.inner.chmod(path, perm))
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        log("mkdir", path, self.inner.mkdir(path, perm))
    }

    fn remove_all(&self, path: &AbsPath) -> io::Result<()> {
        log("remove_all", path, self.inner.remove_all(path))
    }

    fn rename(&self, old: &AbsPath, new: &AbsPath) -> io::Result<()> {
        debug!(%new, "rename target");
        log("rename", old, self.inner.rename(old, new))
    }

    fn stat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        log("stat", path, self.inner.stat(path))
    }

    fn lstat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        log("lstat", path, self.inner.lstat(path))
    }

    fn read_dir(&self, path: &AbsPath) -> io::Result<Vec<FileInfo>> {
        log("read_dir", path, self.inner.read_dir(path))
    }

    fn read_file(&self, path: &AbsPath) -> io::Result<Vec<u8>> {
        log("read_file", path, self.inner.read_file(path))
    }

    fn readlink(&self, path: &AbsPath) -> io::Result<String> {
        log("readlink", path, self.inner.readlink(path))
    }

    fn write_file(&self, path: &AbsPath, data: &[u8], perm: u32) -> io::Result<()> {
        debug!(len = data.len(), perm = %format_args!("{perm:o}"), "write_file contents");
        log("write_file", path, self.inner.write_file(path, data, perm))
    }

    fn write_symlink(&self, linkname: &str, path: &AbsPath) -> io::Result<()> {
        debug!(linkname, "write_symlink target");
        log("write_symlink", path, self.inner.write_symlink(linkname, path))
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, script: &[u8]) -> io::Result<()> {
        debug!(%name, "run_script");
        log("run_script", dir, self.inner.run_script(name, dir, script))
    }

    fn run_idempotent_command(
        &self,
        name: &RelPath,
        script: &[u8],
        stdin: &[u8],
    ) -> io::Result<Vec<u8>> {
        let result = self.inner.run_idempotent_command(name, script, stdin);
        match &result {
            Ok(output) => debug!(%name, len = output.len(), "run_idempotent_command ok"),
            Err(error) => debug!(%name, %error, "run_idempotent_command failed"),
        }
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::system::RealSystem;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn operations_pass_through() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let root = AbsPath::new(dir.path())?;
        let system = DebugSystem::new(RealSystem::default());

        let sub = root.join_name("sub");
        system.mkdir(&sub, 0o700)?;
        assert_eq!(system.stat(&sub)?.perm, 0o700);

        let file = sub.join_name("file");
        system.write_file(&file, b"data", 0o600)?;
        assert_eq!(system.read_file(&file)?, b"data");
        assert_eq!(system.lstat(&file)?.len, 4);

        system.write_symlink("file", &sub.join_name("link"))?;
        assert_eq!(system.readlink(&sub.join_name("link"))?, "file");

        let names = system
            .read_dir(&sub)?
            .into_iter()
            .map(|info| info.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["file", "link"]);

        let output = system.run_idempotent_command(
            &RelPath::new("upper.sh"),
            b"#!/bin/sh\ntr a-z A-Z\n",
            b"quiet",
        )?;
        assert_eq!(output, b"QUIET");

        system.remove_all(&sub)?;
        let error = system.stat(&sub).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);

        Ok(())
    }
}
