pub mod compress;
pub mod marker;
pub mod runner;
pub mod store;

pub use compress::{gzip_into, CompressError, GZIP_SUFFIX};
pub use marker::{Marker, MarkerError, MarkerStore};
pub use runner::{ArchiveError, ArchiveJob, ArchiveSettings, PassReport};
pub use store::{build_store, object_name, GcsStore, LocalStore, ObjectStore, StoreError};
