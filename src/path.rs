// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path types and path resolution utilities.
//!
//! Dotwright juggles three flavours of path: absolute paths on some
//! [`System`](crate::system::System), paths relative to the destination
//! directory, and paths relative to the source directory. All three are kept as
//! forward-slash normalized strings so they can be used as map keys, persisted
//! as state keys, and compared lexically without surprises.
//!
//! # Invariants
//!
//! - [`AbsPath`] is always absolute and clean, i.e., no `.` or `..`
//!   components, no duplicate or trailing separators.
//! - [`RelPath`] never starts or ends with a separator. The empty relative path
//!   stands for the directory it is relative to.
//! - [`SourceRelPath`] remembers whether it names a directory, because
//!   directory and file names decode through different attribute grammars.
//!
//! # See Also
//!
//! - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)

use crate::attr::{DirAttr, FileAttr};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

const SEPARATOR: char = '/';

/// Absolute, clean, slash-normalized path.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AbsPath(String);

impl AbsPath {
    /// Construct new absolute path.
    ///
    /// Path is cleaned lexically, without touching any file system.
    ///
    /// # Errors
    ///
    /// - Return [`NotAbsolute`] if path is relative.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, NotAbsolute> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(NotAbsolute(path.to_path_buf()));
        }

        Ok(Self(to_slash(&path.to_path_buf().clean())))
    }

    /// Treat absolute path as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Treat absolute path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        Path::new(self.0.as_str())
    }

    /// Last component of path.
    pub fn base(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Parent directory of path.
    ///
    /// The parent of the root directory is the root directory.
    pub fn dir(&self) -> AbsPath {
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Self(SEPARATOR.to_string()),
            Some(index) => Self(self.0[..index].to_owned()),
        }
    }

    /// Join relative path onto absolute path.
    pub fn join(&self, rel_path: &RelPath) -> AbsPath {
        if rel_path.is_empty() {
            return self.clone();
        }

        if self.0.ends_with(SEPARATOR) {
            Self(format!("{}{}", self.0, rel_path.as_str()))
        } else {
            Self(format!("{}{SEPARATOR}{}", self.0, rel_path.as_str()))
        }
    }

    /// Join a single path component onto absolute path.
    pub fn join_name(&self, name: &str) -> AbsPath {
        self.join(&RelPath::new(name))
    }

    /// Strip directory prefix from path.
    ///
    /// # Errors
    ///
    /// - Return [`NotInDir`] if `dir` is not a prefix of this path.
    pub fn trim_dir_prefix(&self, dir: &AbsPath) -> Result<RelPath, NotInDir> {
        if self == dir {
            return Ok(RelPath::default());
        }

        let prefix = if dir.0.ends_with(SEPARATOR) {
            dir.0.clone()
        } else {
            format!("{}{SEPARATOR}", dir.0)
        };

        self.0
            .strip_prefix(prefix.as_str())
            .map(RelPath::new)
            .ok_or_else(|| NotInDir {
                path: self.clone(),
                dir: dir.clone(),
            })
    }

    /// Strip directory prefix from path, panicking when that is impossible.
    ///
    /// # Panics
    ///
    /// - Panics if `dir` is not a prefix of this path. Callers use this only
    ///   when they built the path from `dir` themselves.
    pub fn must_trim_dir_prefix(&self, dir: &AbsPath) -> RelPath {
        match self.trim_dir_prefix(dir) {
            Ok(rel_path) => rel_path,
            Err(error) => panic!("{error}"),
        }
    }
}

impl Display for AbsPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.as_str())
    }
}

impl AsRef<Path> for AbsPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// Slash-normalized path relative to some directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RelPath(String);

impl RelPath {
    /// Construct new relative path.
    ///
    /// Leading, trailing, and duplicate separators are dropped.
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', "/");
        let components = path
            .split(SEPARATOR)
            .filter(|component| !component.is_empty() && *component != ".")
            .collect::<Vec<_>>();

        Self(components.join("/"))
    }

    /// Treat relative path as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Relative path names the directory it is relative to.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last component of path.
    pub fn base(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Parent of path, empty for single component paths.
    pub fn dir(&self) -> RelPath {
        match self.0.rfind(SEPARATOR) {
            Some(index) => Self(self.0[..index].to_owned()),
            None => Self::default(),
        }
    }

    /// Split path into its parent and last component.
    pub fn split(&self) -> (RelPath, &str) {
        (self.dir(), self.base())
    }

    /// Iterate through each path component.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|component| !component.is_empty())
    }

    /// Join relative path onto this one.
    pub fn join(&self, other: &RelPath) -> RelPath {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}{SEPARATOR}{}", self.0, other.0)),
        }
    }

    /// Join a single path component onto this one.
    pub fn join_name(&self, name: &str) -> RelPath {
        self.join(&RelPath::new(name))
    }

    /// Check if `dir` is this path or one of its ancestors.
    pub fn has_dir_prefix(&self, dir: &RelPath) -> bool {
        dir.is_empty()
            || self == dir
            || self
                .0
                .strip_prefix(dir.0.as_str())
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }

    /// Every proper ancestor of this path, outermost first.
    pub fn ancestors(&self) -> Vec<RelPath> {
        let mut ancestors = Vec::new();
        let mut current = self.dir();
        while !current.is_empty() {
            ancestors.push(current.clone());
            current = current.dir();
        }
        ancestors.reverse();
        ancestors
    }
}

impl Display for RelPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.as_str())
    }
}

impl From<&str> for RelPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Path relative to the source directory.
///
/// Each component is an encoded source name. Every component but the last
/// always names a directory. The last component names a directory only if
/// `is_dir` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRelPath {
    rel_path: RelPath,
    is_dir: bool,
}

impl SourceRelPath {
    /// Construct source relative path naming a directory.
    pub fn new_dir(rel_path: impl Into<RelPath>) -> Self {
        Self {
            rel_path: rel_path.into(),
            is_dir: true,
        }
    }

    /// Construct source relative path naming a file.
    pub fn new_file(rel_path: impl Into<RelPath>) -> Self {
        Self {
            rel_path: rel_path.into(),
            is_dir: false,
        }
    }

    pub fn rel_path(&self) -> &RelPath {
        &self.rel_path
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_empty(&self) -> bool {
        self.rel_path.is_empty()
    }

    /// Parent directory of source path.
    pub fn dir(&self) -> SourceRelPath {
        Self::new_dir(self.rel_path.dir())
    }

    /// Join another source path onto this one.
    pub fn join(&self, other: &SourceRelPath) -> SourceRelPath {
        Self {
            rel_path: self.rel_path.join(&other.rel_path),
            is_dir: other.is_dir,
        }
    }

    /// Decode source path into the target path it manages.
    ///
    /// Directory components decode through [`DirAttr`], the last component
    /// decodes through [`FileAttr`] unless this path names a directory.
    pub fn target_rel_path(&self, encrypted_suffix: &str) -> RelPath {
        let names = self.rel_path.components().collect::<Vec<_>>();
        let mut target = RelPath::default();
        for (index, name) in names.iter().enumerate() {
            let last = index + 1 == names.len();
            let target_name = if last && !self.is_dir {
                FileAttr::parse(name, encrypted_suffix).target_name
            } else {
                DirAttr::parse(name).target_name
            };
            target = target.join_name(&target_name);
        }
        target
    }
}

impl Display for SourceRelPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.rel_path.as_str())
    }
}

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf, NoWayHome> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the source directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/dotwright`. Does not check
/// if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory path cannot be determined.
pub fn default_source_dir() -> Result<PathBuf, NoWayHome> {
    dirs::data_dir()
        .map(|path| path.join("dotwright"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the configuration file.
///
/// Uses `$XDG_CONFIG_HOME/dotwright/dotwright.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
pub fn default_config_file() -> Result<PathBuf, NoWayHome> {
    dirs::config_dir()
        .map(|path| path.join("dotwright").join("dotwright.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the persistent state database.
///
/// Uses `$XDG_CONFIG_HOME/dotwright/dotwrightstate.redb`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
pub fn default_state_file() -> Result<PathBuf, NoWayHome> {
    dirs::config_dir()
        .map(|path| path.join("dotwright").join("dotwrightstate.redb"))
        .ok_or(NoWayHome)
}

fn to_slash(path: &Path) -> String {
    let path = path.to_string_lossy();
    if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.into_owned()
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Path expected to be absolute was relative.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{:?} is not an absolute path", .0.display())]
pub struct NotAbsolute(pub PathBuf);

/// Path is not inside of the directory it was claimed to be in.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{path}: not in {dir}")]
pub struct NotInDir {
    pub path: AbsPath,
    pub dir: AbsPath,
}
