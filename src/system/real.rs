// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! System backed by the host file system.

use crate::{
    path::{AbsPath, RelPath},
    system::{FileInfo, FileKind, System},
};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env,
    ffi::OsString,
    fs::{self, Metadata},
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::{Mutex, PoisonError},
    thread,
};
use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::{debug, instrument};

/// Program used to run scripts with a given extension.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Interpreter {
    /// Program name or path.
    pub command: String,

    /// Arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Cache of executable lookups through `PATH`.
///
/// Owned by whoever runs the show, so tests can start from a clean slate.
#[derive(Debug, Default)]
pub struct ExecutableCache {
    found: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl ExecutableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate executable by name.
    ///
    /// Names containing a separator are used as is.
    pub fn look_path(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
            return Some(PathBuf::from(name));
        }

        let mut found = self.found.lock().unwrap_or_else(PoisonError::into_inner);
        found
            .entry(name.to_owned())
            .or_insert_with(|| search_path(name))
            .clone()
    }

    /// Forget every lookup.
    pub fn clear(&self) {
        self.found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// The host file system.
#[derive(Debug, Default)]
pub struct RealSystem {
    interpreters: HashMap<String, Interpreter>,
    executables: ExecutableCache,
}

impl RealSystem {
    /// Construct new real system.
    ///
    /// Interpreters are keyed by script extension without the dot.
    pub fn new(interpreters: HashMap<String, Interpreter>) -> Self {
        Self {
            interpreters,
            executables: ExecutableCache::new(),
        }
    }

    /// Cache of executable lookups used for interpreters.
    pub fn executables(&self) -> &ExecutableCache {
        &self.executables
    }

    // Write script into a private temporary file, closed so it can be run.
    fn script_file(&self, name: &RelPath, script: &[u8]) -> io::Result<TempPath> {
        let extension = extension(name);
        let suffix = extension.map(|ext| format!(".{ext}")).unwrap_or_default();
        let mut file = Builder::new()
            .prefix("dotwright-script.")
            .suffix(suffix.as_str())
            .tempfile()?;
        file.write_all(script)?;
        file.flush()?;
        set_perm(file.path(), 0o700)?;
        Ok(file.into_temp_path())
    }

    fn command(&self, name: &RelPath, script_path: &Path) -> io::Result<Command> {
        let interpreter = extension(name).and_then(|ext| self.interpreters.get(ext));
        let mut command = match interpreter {
            Some(interpreter) => {
                let program = self
                    .executables
                    .look_path(&interpreter.command)
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("{}: interpreter not found", interpreter.command),
                        )
                    })?;
                let mut command = Command::new(program);
                command.args(interpreter.args.iter().map(OsString::from));
                command.arg(script_path);
                command
            }
            None => Command::new(script_path),
        };
        command.env("DOTWRIGHT_SCRIPT_NAME", name.as_str());
        Ok(command)
    }
}

// Nearest existing directory at or above dir.
fn working_dir(dir: &AbsPath) -> io::Result<AbsPath> {
    let mut dir = dir.clone();
    loop {
        match fs::metadata(&dir) {
            Ok(metadata) if metadata.is_dir() => return Ok(dir),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }

        let parent = dir.dir();
        if parent == dir {
            return Ok(dir);
        }
        dir = parent;
    }
}

impl System for RealSystem {
    fn chmod(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        set_perm(path.as_path(), perm)
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(perm);
        }
        builder.create(path)?;

        // INVARIANT: Exact permissions regardless of process umask.
        set_perm(path.as_path(), perm)
    }

    fn remove_all(&self, path: &AbsPath) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(error) => Err(error),
        };

        match result {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    fn rename(&self, old: &AbsPath, new: &AbsPath) -> io::Result<()> {
        fs::rename(old, new)
    }

    fn stat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        fs::metadata(path).map(|metadata| file_info(path.base(), &metadata))
    }

    fn lstat(&self, path: &AbsPath) -> io::Result<FileInfo> {
        fs::symlink_metadata(path).map(|metadata| file_info(path.base(), &metadata))
    }

    fn read_dir(&self, path: &AbsPath) -> io::Result<Vec<FileInfo>> {
        let mut infos = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = fs::symlink_metadata(entry.path())?;
            let name = entry.file_name().to_string_lossy().into_owned();
            infos.push(file_info(&name, &metadata));
        }
        infos.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(infos)
    }

    fn read_file(&self, path: &AbsPath) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn readlink(&self, path: &AbsPath) -> io::Result<String> {
        fs::read_link(path).map(|link| link.to_string_lossy().into_owned())
    }

    fn write_file(&self, path: &AbsPath, data: &[u8], perm: u32) -> io::Result<()> {
        // INVARIANT: Replace atomically through a sibling temporary file.
        let mut file = NamedTempFile::new_in(path.dir())?;
        file.write_all(data)?;
        file.flush()?;
        set_perm(file.path(), perm)?;
        file.persist(path).map_err(|error| error.error)?;
        Ok(())
    }

    fn write_symlink(&self, linkname: &str, path: &AbsPath) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(linkname, path)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_file(linkname, path)
        }
    }

    #[instrument(skip(self, script), level = "debug")]
    fn run_script(&self, name: &RelPath, dir: &AbsPath, script: &[u8]) -> io::Result<()> {
        let script_path = self.script_file(name, script)?;
        let mut command = self.command(name, &script_path)?;
        command.current_dir(working_dir(dir)?);

        debug!("run script {name}");
        let status = command.status()?;
        check_status(name, status)
    }

    #[instrument(skip(self, script, stdin), level = "debug")]
    fn run_idempotent_command(
        &self,
        name: &RelPath,
        script: &[u8],
        stdin: &[u8],
    ) -> io::Result<Vec<u8>> {
        let script_path = self.script_file(name, script)?;
        let mut child = self
            .command(name, &script_path)?
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin unavailable"))?;

        // INVARIANT: Feed stdin while draining stdout to avoid pipe deadlock.
        let output = thread::scope(|scope| {
            let writer = scope.spawn(move || match child_stdin.write_all(stdin) {
                Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                result => result,
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            written.and(output)
        })?;

        check_status(name, output.status)?;
        Ok(output.stdout)
    }
}

fn extension(name: &RelPath) -> Option<&str> {
    let base = name.base();
    base.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

fn check_status(name: &RelPath, status: ExitStatus) -> io::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{name}: {status}")))
    }
}

fn file_info(name: &str, metadata: &Metadata) -> FileInfo {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Dir
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    FileInfo {
        name: name.to_owned(),
        kind,
        perm: perm_of(metadata, kind),
        len: metadata.len(),
    }
}

#[cfg(unix)]
fn perm_of(metadata: &Metadata, _: FileKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn perm_of(metadata: &Metadata, kind: FileKind) -> u32 {
    match (kind, metadata.permissions().readonly()) {
        (FileKind::Dir, _) => 0o777,
        (_, true) => 0o444,
        (_, false) => 0o666,
    }
}

#[cfg(unix)]
fn set_perm(path: &Path, perm: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_perm(_: &Path, _: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn write_file_replaces_contents_and_perm() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let system = RealSystem::default();
        let path = AbsPath::new(dir.path().join("file"))?;

        system.write_file(&path, b"one", 0o644)?;
        system.write_file(&path, b"two", 0o600)?;
        assert_eq!(system.read_file(&path)?, b"two");

        let info = system.lstat(&path)?;
        assert_eq!(info.kind, FileKind::File);
        assert_eq!(info.perm, 0o600);
        assert_eq!(info.len, 3);

        Ok(())
    }

    #[test]
    fn read_dir_is_sorted_and_lstats() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let system = RealSystem::default();
        let root = AbsPath::new(dir.path())?;
        system.write_file(&root.join_name("b"), b"", 0o644)?;
        system.mkdir(&root.join_name("a"), 0o755)?;
        system.write_symlink("b", &root.join_name("c"))?;

        let infos = system.read_dir(&root)?;
        let kinds = infos
            .iter()
            .map(|info| (info.name.as_str(), info.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![("a", FileKind::Dir), ("b", FileKind::File), ("c", FileKind::Symlink)]
        );
        assert_eq!(system.readlink(&root.join_name("c"))?, "b");

        system.remove_all(&root.join_name("a"))?;
        system.remove_all(&root.join_name("missing"))?;
        assert_eq!(system.read_dir(&root)?.len(), 2);

        Ok(())
    }

    #[test]
    fn run_script_in_dir() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let system = RealSystem::default();
        let root = AbsPath::new(dir.path())?;

        system.run_script(
            &RelPath::new("touch.sh"),
            &root,
            b"#!/bin/sh\necho ran > marker\n",
        )?;
        assert_eq!(system.read_file(&root.join_name("marker"))?, b"ran\n");

        // Missing directories fall back to the nearest existing parent.
        system.run_script(
            &RelPath::new("missing/touch.sh"),
            &root.join_name("missing").join_name("deeper"),
            b"#!/bin/sh\necho up > fallback\n",
        )?;
        assert_eq!(system.read_file(&root.join_name("fallback"))?, b"up\n");

        let error = system
            .run_script(&RelPath::new("fail.sh"), &root, b"#!/bin/sh\nexit 3\n")
            .unwrap_err();
        assert!(error.to_string().starts_with("fail.sh: "));

        Ok(())
    }

    #[test]
    fn run_idempotent_command_filters_stdin() -> anyhow::Result<()> {
        let interpreters = HashMap::from([(
            "sh".to_owned(),
            Interpreter {
                command: "sh".into(),
                args: vec![],
            },
        )]);
        let system = RealSystem::new(interpreters);

        let output = system.run_idempotent_command(
            &RelPath::new(".profile.sh"),
            b"tr a-z A-Z\n",
            b"export foo\n",
        )?;
        assert_eq!(output, b"EXPORT FOO\n");
        assert!(system.executables().look_path("sh").is_some());

        Ok(())
    }
}
