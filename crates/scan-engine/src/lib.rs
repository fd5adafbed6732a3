//! Scan orchestration and catalog curation over a shared [`catalog_sqlite::Db`].
//!
//! Every operation that changes a profile's services runs under that
//! profile's lock, so a scan never interleaves with an edit, a reorder or
//! another scan of the same profile. Different profiles never wait on each
//! other except for the brief store calls.

mod curation;
mod engine;
mod locks;
mod scan;
mod status;

#[cfg(test)]
mod testing;

pub use engine::{EngineConfig, ScanEngine};
pub use locks::ProfileLocks;
pub use scan::ScanReport;
pub use status::ScanStatus;
