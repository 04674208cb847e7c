//! # sqlward engine contract
//!
//! Driver-level contract between the sqlward core and the embedded SQL
//! engine it coordinates.
//!
//! The core never executes SQL itself - it drives an engine through the
//! [`SqlEngine`] trait, which mirrors the surface of a C-style embedded
//! database driver:
//!
//! - failures from `execute` are signalled by a **negative affected-row
//!   count**, with detail available from `last_error`
//! - failed selects return `None` instead of a cursor
//! - the online-backup primitive reports `(remaining, total)` page counts
//!   through a synchronous callback
//!
//! ## Design principles
//!
//! - Engines are consumed through `Box<dyn SqlEngine>` and must be
//!   `Send + Sync`
//! - A [`SqlConnector`] hands out **unopened** connections per path;
//!   callers open them with explicit [`OpenFlags`]
//! - The engine owns all files; the core never touches the database
//!   bytes directly
//!
//! ## Implementations
//!
//! - [`MemoryEngine`] / [`MemoryConnector`] - in-memory, for testing
//! - A real driver binding (e.g. over SQLite) lives outside this
//!   workspace

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod memory;

pub use engine::{OpenFlags, ResultCursor, SqlConnector, SqlEngine};
pub use memory::{MemoryConnector, MemoryEngine};
