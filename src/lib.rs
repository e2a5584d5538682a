//! File-backed DICOM query/retrieve index database
//!
//! The [`index`] module holds the engine: a fixed-slot index file describing
//! every stored object, matched by linear scan for C-FIND, planned for
//! C-MOVE/C-GET and maintained under per-study quotas on C-STORE.

pub mod config;
pub mod index;
pub mod logging;
pub mod storage;

pub use config::config::{Config, ConfigError};
pub use config::StorageAreaConfig;
pub use index::{
    AttributeCatalog, DatabaseHandle, DbError, FindResponse, InstanceRecord, MoveItem,
    MoveResponse, StudyDescriptor,
};
