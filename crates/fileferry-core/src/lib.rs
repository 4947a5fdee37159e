//! Core types and traits for fileferry.
//!
//! This crate provides the data model shared by the task engine and its
//! hosts: file-system entries, the collaborator traits the engine consumes
//! ([`FileStore`], [`DirectoryReader`], [`Archiver`]), their error types and
//! the task configuration.

mod config;
mod entry;
mod error;
mod store;

pub use config::{TaskConfig, TaskConfigBuilder, TaskConfigBuilderError};
pub use entry::{Entry, EntryId, EntryKind};
pub use error::{ArchiveError, StoreError, StoreResult};
pub use store::{Archiver, BoxFuture, CopyEvent, DirectoryReader, FileStore};
