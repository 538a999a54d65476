//! Store interfaces and in-memory reference backends.

pub mod memory;
mod traits;

pub use memory::{MemoryDocumentStore, MemoryPackageRepository, MemoryRelationalStore};
pub use traits::{DocumentStore, PackageRepository, RelationalStore, StoredPackage};
