// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Include/exclude glob pattern sets.
//!
//! Ignore and remove files list one glob per line. Patterns are rooted at the
//! target directory of the file that declared them, `#` starts a comment, and
//! a leading `!` turns a pattern into an exclusion. Exclusions always win over
//! inclusions.

use crate::{
    path::{AbsPath, RelPath},
    system::{is_not_found, FileInfo, System},
};

use glob::{MatchOptions, Pattern, PatternError};
use std::{collections::BTreeSet, io};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Set of include and exclude glob patterns over target paths.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add pattern to the set.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError`] if pattern is not a valid glob.
    pub fn add(&mut self, pattern: &str, include: bool) -> Result<(), PatternError> {
        let pattern = Pattern::new(pattern)?;
        if include {
            self.include.push(pattern);
        } else {
            self.exclude.push(pattern);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Check if target path is matched by the set.
    ///
    /// A path matched by any exclusion is never matched, otherwise it is
    /// matched if any inclusion matches it.
    pub fn matches(&self, path: &RelPath) -> bool {
        let path = path.as_str();
        if self
            .exclude
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
        {
            return false;
        }

        self.include
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
    }

    /// Find existing paths under `base` matched by the set.
    ///
    /// Matches are relative to `base` and sorted. Symlinks are never followed
    /// while descending through `**`.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if directories under `base` cannot be read.
    pub fn glob(&self, system: &dyn System, base: &AbsPath) -> io::Result<Vec<RelPath>> {
        let mut matches = BTreeSet::new();
        for pattern in &self.include {
            let components = pattern.as_str().split('/').collect::<Vec<_>>();
            expand(system, base, RelPath::default(), &components, &mut matches)?;
        }

        Ok(matches
            .into_iter()
            .filter(|path| self.matches(path))
            .collect())
    }
}

/// Split ignore or remove file line into its pattern and whether it includes.
///
/// Returns nothing for blank and comment lines.
pub fn parse_line(line: &str) -> Option<(&str, bool)> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return None;
    }

    match line.strip_prefix('!') {
        Some(pattern) => Some((pattern.trim_start(), false)),
        None => Some((line, true)),
    }
}

/// Root pattern at target directory.
pub fn rooted(dir: &RelPath, pattern: &str) -> String {
    let pattern = pattern.trim_start_matches('/');
    if dir.is_empty() {
        pattern.to_owned()
    } else {
        format!("{}/{pattern}", Pattern::escape(dir.as_str()))
    }
}

fn has_meta(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

fn expand(
    system: &dyn System,
    base: &AbsPath,
    prefix: RelPath,
    components: &[&str],
    matches: &mut BTreeSet<RelPath>,
) -> io::Result<()> {
    match components.split_first() {
        None => {
            if !prefix.is_empty() && exists(system, &base.join(&prefix))? {
                matches.insert(prefix);
            }
        }
        Some((&"**", rest)) => {
            expand(system, base, prefix.clone(), rest, matches)?;
            for child in children(system, &base.join(&prefix))? {
                if child.is_dir() {
                    expand(system, base, prefix.join_name(&child.name), components, matches)?;
                }
            }
        }
        Some((component, rest)) if !has_meta(component) => {
            expand(system, base, prefix.join_name(component), rest, matches)?;
        }
        Some((component, rest)) => {
            let pattern = Pattern::new(component)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
            for child in children(system, &base.join(&prefix))? {
                if pattern.matches_with(&child.name, MATCH_OPTIONS) {
                    expand(system, base, prefix.join_name(&child.name), rest, matches)?;
                }
            }
        }
    }

    Ok(())
}

fn exists(system: &dyn System, path: &AbsPath) -> io::Result<bool> {
    match system.lstat(path) {
        Ok(_) => Ok(true),
        Err(error) if is_not_found(&error) => Ok(false),
        Err(error) => Err(error),
    }
}

fn children(system: &dyn System, path: &AbsPath) -> io::Result<Vec<FileInfo>> {
    match system.lstat(path) {
        Ok(info) if info.is_dir() => system.read_dir(path),
        Ok(_) => Ok(Vec::new()),
        Err(error) if is_not_found(&error) => Ok(Vec::new()),
        Err(error) => Err(error),
    }
}
