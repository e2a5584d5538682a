//! Query/retrieve index engine
//!
//! Layout of the index file: the study descriptor table sits at offset 0
//! (`max_studies` fixed-size entries), followed by an open-ended array of
//! fixed-size instance record slots. Every lookup is a linear scan.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod find;
pub mod handle;
pub mod lock;
pub mod matching;
pub mod query;
pub mod quota;
pub mod record;
pub mod retrieve;

pub use catalog::{AttributeCatalog, CatalogEntry, KeyRole, MatchClass};
pub use error::{DbError, Result};
pub use find::FindResponse;
pub use handle::DatabaseHandle;
pub use lock::{IndexLock, LockMode};
pub use record::{InstanceRecord, StudyDescriptor, StudyTable};
pub use retrieve::{MoveItem, MoveResponse};
