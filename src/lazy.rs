// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lazily evaluated content cells.
//!
//! Decrypting, rendering templates, and running modify filters are costly,
//! yet most applies only need a content hash to decide that nothing changed.
//! A [`Lazy`] cell defers that work until somebody asks for the value, then
//! caches the value, its SHA-256 digest, or the error it failed with. Every
//! later read returns the cached outcome.
//!
//! Cells are meant to be shared through [`Arc`] between an entry state and the
//! eventual write, so both see the same single evaluation.

use crate::error::{Error, Result};

use sha2::{Digest, Sha256};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

/// SHA-256 digest of some bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

type Evaluator<T> = Box<dyn FnOnce() -> Result<T> + Send>;

struct Evaluated<T> {
    value: T,
    sha256: [u8; 32],
}

/// Memoized value-or-error computed at most once.
pub struct Lazy<T> {
    cell: OnceLock<Result<Evaluated<T>, Arc<Error>>>,
    evaluator: Mutex<Option<Evaluator<T>>>,
}

/// Lazily evaluated file contents.
pub type LazyContents = Lazy<Vec<u8>>;

/// Lazily evaluated symlink target.
pub type LazyLinkname = Lazy<String>;

impl<T> Lazy<T>
where
    T: AsRef<[u8]> + Default,
{
    /// Construct cell holding an already known value.
    pub fn new(value: impl Into<T>) -> Self {
        let cell = OnceLock::new();
        let value = value.into();
        let _ = cell.set(Ok(Evaluated {
            sha256: sha256(value.as_ref()),
            value,
        }));

        Self {
            cell,
            evaluator: Mutex::new(None),
        }
    }

    /// Construct cell whose value is computed on first read.
    pub fn from_fn(evaluator: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self {
            cell: OnceLock::new(),
            evaluator: Mutex::new(Some(Box::new(evaluator))),
        }
    }

    /// Value of cell.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] holding whatever error the evaluator failed
    ///   with, on this read and every read after.
    pub fn get(&self) -> Result<&T> {
        match self.evaluate() {
            Ok(evaluated) => Ok(&evaluated.value),
            Err(error) => Err(Error::Cached(Arc::clone(error))),
        }
    }

    /// SHA-256 digest of the cell's value.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if evaluation failed.
    pub fn sha256(&self) -> Result<[u8; 32]> {
        match self.evaluate() {
            Ok(evaluated) => Ok(evaluated.sha256),
            Err(error) => Err(Error::Cached(Arc::clone(error))),
        }
    }

    /// Cell has been evaluated, successfully or not.
    pub fn is_evaluated(&self) -> bool {
        self.cell.get().is_some()
    }

    fn evaluate(&self) -> &Result<Evaluated<T>, Arc<Error>> {
        self.cell.get_or_init(|| {
            // INVARIANT: The evaluator is dropped after its single use.
            let evaluator = self
                .evaluator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let value = match evaluator {
                Some(evaluator) => evaluator().map_err(Arc::new)?,
                None => T::default(),
            };

            Ok(Evaluated {
                sha256: sha256(value.as_ref()),
                value,
            })
        })
    }
}

impl Lazy<Vec<u8>> {
    /// File contents.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if evaluation failed.
    pub fn contents(&self) -> Result<&[u8]> {
        self.get().map(Vec::as_slice)
    }
}

impl Lazy<String> {
    /// Symlink target.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Cached`] if evaluation failed.
    pub fn linkname(&self) -> Result<&str> {
        self.get().map(String::as_str)
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self {
            cell: OnceLock::new(),
            evaluator: Mutex::new(None),
        }
    }
}

impl<T: Debug> Debug for Lazy<T> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.cell.get() {
            Some(Ok(evaluated)) => fmt.debug_tuple("Lazy").field(&evaluated.value).finish(),
            Some(Err(error)) => fmt.debug_tuple("Lazy").field(error).finish(),
            None => fmt.write_str("Lazy(<unevaluated>)"),
        }
    }
}
