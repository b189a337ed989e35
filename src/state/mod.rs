//! Release persistence.
//!
//! Stores hand out revisions atomically per (project, workspace, stack) and
//! persist every release of that triple.

mod store;
mod memory;
mod local;
mod s3;

pub use store::ReleaseStore;
pub use memory::MemoryReleaseStore;
pub use local::LocalReleaseStore;
pub use s3::S3ReleaseStore;
