//! Local disk adapters for fileferry.
//!
//! [`LocalFileStore`] implements [`FileStore`] over `tokio::fs`, with entry
//! identifiers being absolute paths. [`ZipArchiver`] implements [`Archiver`]
//! with the `zip` crate.
//!
//! [`FileStore`]: fileferry_core::FileStore
//! [`Archiver`]: fileferry_core::Archiver

mod archive;
mod store;

pub use archive::ZipArchiver;
pub use store::{LocalFileStore, READ_PAGE_SIZE};
