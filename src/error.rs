// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Crate-wide error types.
//!
//! Modules with a self-contained failure domain (configuration, encryption,
//! persistent state, paths) own their error types. Everything the source
//! state does funnels into [`Error`], wrapping lower level errors with the
//! path that caused them.

use crate::{
    encryption::EncryptionError,
    path::{AbsPath, NotAbsolute, NotInDir, RelPath},
    persistent_state::PersistentStateError,
    template::DataError,
};

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io,
    sync::Arc,
};

/// Source state error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error replayed from a lazily evaluated cell.
    #[error(transparent)]
    Cached(#[from] Arc<Error>),

    /// Multiple source entries claim the same targets.
    #[error(transparent)]
    DuplicateTargets(#[from] DuplicateTargets),

    /// Multiple origins disagree about the state of one source path.
    #[error(transparent)]
    InconsistentState(#[from] InconsistentState),

    #[error(transparent)]
    NotInDir(#[from] NotInDir),

    #[error(transparent)]
    NotAbsolute(#[from] NotAbsolute),

    /// Device files, sockets, fifos and friends cannot be managed.
    #[error("{path}: unsupported file type")]
    UnsupportedFileType { path: AbsPath },

    /// Entry does not belong in a special source directory.
    #[error("{path}: not allowed in {dir} directory")]
    NotAllowed { path: AbsPath, dir: &'static str },

    /// Only scripts may live in the scripts directory.
    #[error("{path}: not a script")]
    NotAScript { path: AbsPath },

    /// File system operation failed.
    #[error("failed to {op} {path}")]
    System {
        op: &'static str,
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Template failed to parse or render.
    #[error("failed to render template {name}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to decrypt {path}")]
    Decrypt {
        path: AbsPath,
        #[source]
        source: EncryptionError,
    },

    #[error("failed to encrypt {path}")]
    Encrypt {
        path: AbsPath,
        #[source]
        source: EncryptionError,
    },

    /// Script exited unsuccessfully or could not be started.
    #[error("failed to run script {name}")]
    Script {
        name: RelPath,
        #[source]
        source: io::Error,
    },

    /// Modify filter exited unsuccessfully or could not be started.
    #[error("failed to run modify filter for {name}")]
    Modify {
        name: RelPath,
        #[source]
        source: io::Error,
    },

    /// Template data file could not be parsed.
    #[error("failed to parse data file {path}")]
    Data {
        path: AbsPath,
        #[source]
        source: DataError,
    },

    #[error("{path}: invalid pattern {pattern:?}")]
    Pattern {
        path: AbsPath,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("{path}: invalid version")]
    Version {
        path: AbsPath,
        #[source]
        source: semver::Error,
    },

    /// Source state demands a newer release.
    #[error("source state requires version {need} or later, running version {have}")]
    TooOld {
        need: semver::Version,
        have: semver::Version,
    },

    #[error(transparent)]
    PersistentState(#[from] PersistentStateError),

    /// Target path has no entry in the source state.
    #[error("{0}: not in source state")]
    NotManaged(RelPath),

    /// Applying a single target failed.
    #[error("failed to apply {path}")]
    Apply {
        path: RelPath,
        #[source]
        source: Box<Error>,
    },

    /// Applying several targets failed.
    #[error(transparent)]
    ApplyFailures(#[from] ApplyFailures),
}

/// Target claimed by more than one source entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateTarget {
    pub target_rel_path: RelPath,

    /// Sorted source paths claiming the target.
    pub source_rel_paths: Vec<String>,
}

/// Every duplicate target found while reading the source state.
///
/// # Invariant
///
/// - Sorted by target path.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub struct DuplicateTargets(pub Vec<DuplicateTarget>);

impl Display for DuplicateTargets {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let lines = self
            .0
            .iter()
            .map(|duplicate| {
                format!(
                    "{}: duplicate source state entries ({})",
                    duplicate.target_rel_path,
                    duplicate.source_rel_paths.join(", ")
                )
            })
            .collect::<Vec<_>>();
        fmt.write_str(lines.join("\n").as_str())
    }
}

/// Origins disagree about one source path.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{path}: inconsistent state ({})", origins.join(", "))]
pub struct InconsistentState {
    pub path: String,

    /// Sorted origins of the disagreeing updates.
    pub origins: Vec<String>,
}

/// Collected failures of a keep-going apply.
#[derive(Debug, thiserror::Error)]
pub struct ApplyFailures(pub Vec<Error>);

impl Display for ApplyFailures {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} targets failed to apply", self.0.len())?;
        for error in &self.0 {
            write!(fmt, "\n  {error}")?;
            let mut source = StdError::source(error);
            while let Some(cause) = source {
                write!(fmt, ": {cause}")?;
                source = StdError::source(cause);
            }
        }
        Ok(())
    }
}

/// Attach path context to I/O results.
pub(crate) trait IoResultExt<T> {
    fn with_path(self, op: &'static str, path: &AbsPath) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, op: &'static str, path: &AbsPath) -> Result<T> {
        self.map_err(|source| Error::System {
            op,
            path: path.clone(),
            source,
        })
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_targets_report_every_source() {
        let error = Error::from(DuplicateTargets(vec![
            DuplicateTarget {
                target_rel_path: RelPath::new(".bashrc"),
                source_rel_paths: vec!["dot_bashrc".into(), "dot_bashrc.tmpl".into()],
            },
            DuplicateTarget {
                target_rel_path: RelPath::new(".vim"),
                source_rel_paths: vec!["dot_vim".into(), "exact_dot_vim".into()],
            },
        ]));

        let expect = indoc! {"
            .bashrc: duplicate source state entries (dot_bashrc, dot_bashrc.tmpl)
            .vim: duplicate source state entries (dot_vim, exact_dot_vim)"};
        assert_eq!(error.to_string(), expect);
    }

    #[test]
    fn apply_failures_include_causes() {
        let error = ApplyFailures(vec![Error::Apply {
            path: RelPath::new(".bashrc"),
            source: Box::new(Error::NotManaged(RelPath::new(".bashrc"))),
        }]);

        assert_eq!(
            error.to_string(),
            "1 targets failed to apply\n  failed to apply .bashrc: .bashrc: not in source state"
        );
    }
}
