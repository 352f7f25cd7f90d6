// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template rendering and template data.
//!
//! Source files with the `.tmpl` suffix, ignore files, and remove files are
//! rendered with [`minijinja`] before use. Templates see one merged data map
//! assembled from configuration and from data files in the source directory,
//! and may include named partials registered from the templates directory.
//!
//! Undefined variables are errors rather than silently empty, and a single
//! trailing newline survives rendering, so a rendered file ends exactly like
//! its template does.

use crate::error::{Error, Result};

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

/// Renders templates against shared template data.
///
/// Partials and data may be added while the source state is being read, and
/// rendering happens lazily afterwards, so both live behind locks.
#[derive(Debug)]
pub struct Templater {
    env: RwLock<Environment<'static>>,
    data: RwLock<Map<String, Value>>,
}

impl Templater {
    /// Construct templater seeded with data.
    pub fn new(data: Map<String, Value>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        Self {
            env: RwLock::new(env),
            data: RwLock::new(data),
        }
    }

    /// Register named partial usable through `include`.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Template`] if partial fails to parse.
    pub fn add_template(&self, name: impl Into<String>, source: &[u8]) -> Result<()> {
        let name = name.into();
        let source = String::from_utf8_lossy(source).into_owned();
        self.env
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_template_owned(name.clone(), source)
            .map_err(|source| Error::Template { name, source })
    }

    /// Deep merge data into template data, new values win.
    pub fn merge_data(&self, data: Map<String, Value>) {
        let mut current = self.data.write().unwrap_or_else(PoisonError::into_inner);
        recursive_merge(&mut current, data);
    }

    /// Snapshot of current template data.
    pub fn data(&self) -> Map<String, Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Render template source.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Template`] if template fails to parse or render.
    pub fn render(&self, name: &str, source: &[u8]) -> Result<Vec<u8>> {
        let source = String::from_utf8_lossy(source);
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        self.env
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .render_named_str(name, &source, &*data)
            .map(String::into_bytes)
            .map_err(|source| Error::Template {
                name: name.to_owned(),
                source,
            })
    }
}

impl Default for Templater {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

/// Deep merge `src` into `dst`.
///
/// Nested maps merge key by key, anything else in `src` replaces what is in
/// `dst`.
pub fn recursive_merge(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Object(dst_map)), Value::Object(src_map)) => {
                recursive_merge(dst_map, src_map)
            }
            (_, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// Serialization format of a data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Toml,
    Yaml,
}

impl DataFormat {
    /// Pick format by file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Parse data file contents into a map.
    ///
    /// # Errors
    ///
    /// - Return [`DataError`] if contents are malformed, or not a map.
    pub fn parse(self, contents: &[u8]) -> Result<Map<String, Value>, DataError> {
        let value: Value = match self {
            Self::Json => serde_json::from_slice(contents)?,
            Self::Toml => toml::de::from_str(std::str::from_utf8(contents)?)?,
            Self::Yaml => serde_yaml::from_slice(contents)?,
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            _ => Err(DataError::NotAMap),
        }
    }
}

/// Data file error types.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    /// Top level value is not a map.
    #[error("data must be a map at the top level")]
    NotAMap,
}
