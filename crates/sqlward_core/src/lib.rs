//! # sqlward core
//!
//! The write-coordination core of a networked SQL database service.
//!
//! Many concurrent sessions issue queries against one shared embedded
//! database while online backups run alongside live traffic. This crate
//! provides the pieces that keep those two activities from corrupting
//! each other:
//!
//! - [`ProgressTracker`] - shared backup/restore progress, readable by
//!   any number of sessions
//! - [`BackupCoordinator`] - drives a single online backup with
//!   post-backup integrity verification and a stale-state safety timer
//! - [`WriteJournal`] - durable side-store for writes that arrive while
//!   a backup snapshot is being taken
//! - [`JournalReplayer`] - single-flight, in-order replay of the
//!   journal into the primary database once the backup is done
//! - [`ConfigCache`] - a lazily-loaded, concurrently-readable cached
//!   scalar backed by a query against the primary database
//!
//! The session layer owns one instance of each component behind an
//! `Arc` and injects it into every connection handler; nothing here
//! spawns threads except the one-shot stale-guard timer.
//!
//! SQL itself is executed by an engine supplied through the
//! [`sqlward_engine`] traits; this crate never touches database bytes
//! directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod config_cache;
mod error;
mod guard;
mod journal;
mod progress;
mod replay;

pub use backup::{BackupCoordinator, RestoreCoordinator};
pub use config::Config;
pub use config_cache::ConfigCache;
pub use error::{CoreError, CoreResult};
pub use guard::StaleGuard;
pub use journal::WriteJournal;
pub use progress::{percent_complete, OperationKind, ProgressTracker, IDLE};
pub use replay::{DrainOutcome, JournalReplayer};
