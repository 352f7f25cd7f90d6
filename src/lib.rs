// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Declarative dotfile reconciliation.
//!
//! Dotwright keeps three views of a user's configuration files:
//!
//! - The __source state__, a directory tree whose names encode metadata
//!   about the files they manage, e.g., `private_dot_ssh/config.tmpl`.
//! - The __target state__, what every managed path should look like,
//!   computed from the source state by rendering templates, decrypting, and
//!   running modify filters.
//! - The __actual state__, what every managed path looks like right now.
//!
//! Applying reconciles the actual state with the target state one path at a
//! time, performing the smallest mutation needed. A persistent state
//! remembers what was last written to every path, and which run-once scripts
//! already ran.
//!
//! All file system access goes through the [`System`](system::System) trait,
//! so the same code drives real changes, dry runs, and tests.

pub mod actual;
pub mod attr;
pub mod config;
pub mod encryption;
pub mod entry_state;
pub mod entry_type_set;
pub mod error;
pub mod lazy;
pub mod path;
pub mod pattern;
pub mod persistent_state;
pub mod source;
pub mod system;
pub mod target;
pub mod template;
