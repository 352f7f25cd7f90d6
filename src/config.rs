// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file dotwright reads at startup to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! # General Layout
//!
//! ```toml
//! source_dir = "$XDG_DATA_HOME/dotwright"
//! dest_dir = "~"
//! umask = "022"
//!
//! [interpreters.py]
//! command = "python3"
//!
//! [apply]
//! exclude = ["scripts"]
//! keep_going = true
//!
//! [data]
//! email = "jane@doe.com"
//! ```
//!
//! Every field is optional. Path fields go through shell expansion, so
//! environment variables and `~` work as expected.

use crate::{
    entry_type_set::{EntryTypeSet, UnknownEntryType},
    path::{default_source_dir, default_state_file, home_dir, NoWayHome},
    system::Interpreter,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    num::ParseIntError,
    path::PathBuf,
    str::FromStr,
};

/// Configuration file layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Source directory, `$XDG_DATA_HOME/dotwright` if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Destination directory, the home directory if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_dir: Option<PathBuf>,

    /// Persistent state database, `$XDG_CONFIG_HOME/dotwright` if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    pub umask: Umask,

    /// Suffix of encrypted source files.
    pub encrypted_suffix: String,

    /// Interpreters keyed by script extension.
    pub interpreters: BTreeMap<String, Interpreter>,
    pub apply: ApplySettings,

    /// Extra template data, merged under data files.
    pub data: Map<String, Value>,
}

impl Config {
    /// Source directory with default applied.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if the default cannot be found.
    pub fn source_dir(&self) -> Result<PathBuf> {
        match &self.source_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(default_source_dir()?),
        }
    }

    /// Destination directory with default applied.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if the default cannot be found.
    pub fn dest_dir(&self) -> Result<PathBuf> {
        match &self.dest_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(home_dir()?),
        }
    }

    /// Persistent state database with default applied.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if the default cannot be found.
    pub fn state_file(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(default_state_file()?),
        }
    }

    /// Interpreters in the shape [`RealSystem`](crate::system::RealSystem)
    /// wants them.
    pub fn interpreters(&self) -> HashMap<String, Interpreter> {
        self.interpreters
            .iter()
            .map(|(ext, interpreter)| (ext.trim_start_matches('.').to_owned(), interpreter.clone()))
            .collect()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for path in [
            &mut config.source_dir,
            &mut config.dest_dir,
            &mut config.state_file,
        ]
        .into_iter()
        .flatten()
        {
            *path = PathBuf::from(
                shellexpand::full(path.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Apply settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplySettings {
    /// Entry kinds to apply, everything if empty.
    pub include: Vec<String>,

    /// Entry kinds never to apply.
    pub exclude: Vec<String>,

    /// Keep applying after a target fails.
    pub keep_going: bool,
}

impl ApplySettings {
    /// Entry kinds selected by include and exclude lists.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::EntryType`] for unknown entry kind names.
    pub fn entry_types(&self) -> Result<EntryTypeSet> {
        Ok(EntryTypeSet::from_lists(&self.include, &self.exclude)?)
    }
}

/// Permission bits cleared from every target, written in octal.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Umask(pub u32);

impl Default for Umask {
    fn default() -> Self {
        Self(0o022)
    }
}

impl TryFrom<String> for Umask {
    type Error = ParseIntError;

    fn try_from(mask: String) -> Result<Self, Self::Error> {
        let mask = mask.trim();
        u32::from_str_radix(mask.strip_prefix("0o").unwrap_or(mask), 8).map(|mask| Self(mask & 0o777))
    }
}

impl From<Umask> for String {
    fn from(mask: Umask) -> Self {
        format!("{:03o}", mask.0)
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),

    /// Unknown entry kind in apply settings.
    #[error(transparent)]
    EntryType(#[from] UnknownEntryType),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use serde_json::json;

    #[sealed_test(env = [("DOTS", "/home/jane/dots")])]
    fn deserialize_config() -> anyhow::Result<()> {
        let result: Config = r#"
            source_dir = "$DOTS/source"
            state_file = "${DOTS}/state.redb"
            umask = "077"
            encrypted_suffix = ".age"

            [interpreters.py]
            command = "python3"
            args = ["-u"]

            [apply]
            exclude = ["scripts"]
            keep_going = true

            [data]
            name = "Jane"

            [data.git]
            email = "jane@doe.com"
        "#
        .parse()?;

        let mut interpreters = BTreeMap::new();
        interpreters.insert(
            "py".to_owned(),
            Interpreter {
                command: "python3".into(),
                args: vec!["-u".into()],
            },
        );
        let Value::Object(data) = json!({"name": "Jane", "git": {"email": "jane@doe.com"}}) else {
            anyhow::bail!("data should be a map");
        };
        let expect = Config {
            source_dir: Some("/home/jane/dots/source".into()),
            dest_dir: None,
            state_file: Some("/home/jane/dots/state.redb".into()),
            umask: Umask(0o077),
            encrypted_suffix: ".age".into(),
            interpreters,
            apply: ApplySettings {
                include: vec![],
                exclude: vec!["scripts".into()],
                keep_going: true,
            },
            data,
        };

        assert_eq!(result, expect);
        assert_eq!(
            result.apply.entry_types()?,
            EntryTypeSet::all() - EntryTypeSet::SCRIPTS
        );

        Ok(())
    }

    #[test]
    fn empty_config_uses_defaults() -> anyhow::Result<()> {
        let result: Config = "".parse()?;
        assert_eq!(result, Config::default());
        assert_eq!(result.umask, Umask(0o022));
        assert_eq!(result.apply.entry_types()?, EntryTypeSet::all());

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/jane")])]
    fn defaults_resolve_against_home() -> anyhow::Result<()> {
        let config = Config::default();
        assert_eq!(config.dest_dir()?, PathBuf::from("/home/jane"));

        let config: Config = "dest_dir = \"~/sandbox\"".parse()?;
        assert_eq!(config.dest_dir()?, PathBuf::from("/home/jane/sandbox"));

        Ok(())
    }

    #[test]
    fn serialize_round_trips() -> anyhow::Result<()> {
        let mut config = Config {
            dest_dir: Some("/home/jane".into()),
            umask: Umask(0o002),
            ..Default::default()
        };
        config.apply.include = vec!["files".into(), "dirs".into()];
        config.data.insert("name".into(), json!("Jane"));

        let text = config.to_string();
        assert!(text.contains("umask = \"002\""));
        assert_eq!(text.parse::<Config>()?, config);

        Ok(())
    }

    #[test]
    fn reject_bad_values() {
        assert!(matches!(
            "umask = \"9\"".parse::<Config>(),
            Err(ConfigError::Deserialize(_))
        ));

        let config = Config {
            apply: ApplySettings {
                include: vec!["sockets".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.apply.entry_types(),
            Err(ConfigError::EntryType(_))
        ));
    }
}
