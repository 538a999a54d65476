//! Packagers: extract schema and data from a source store into a
//! portable [`Package`](crate::package::Package).

mod document;
mod relational;

pub use document::{DocumentPackager, ReferenceRegistry, ReferenceRule};
pub use relational::RelationalPackager;
