//! Filesystem-style operations over an object-storage bucket.
//!
//! [`storage::StorageAdapter`] borrows any [`adapters::ObjectClient`] (S3, GCS, or the in-memory
//! mock) and exposes write, read, list, delete, rename, copy, metadata and pre-signed URL calls on
//! paths relative to an optional key prefix.

pub mod adapters;
pub mod model;
pub mod storage;
pub mod util;

pub use adapters::ObjectClient;
pub use model::{
    config::Config,
    entry::{EntryType, ObjectEntry, ReadResult, StreamResult},
    error::{ErrorKind, FSError},
    report::StepReport,
};
pub use storage::StorageAdapter;
