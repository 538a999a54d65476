//! Core value and schema types shared by packagers and deployers.

pub mod schema;
pub mod value;

pub use schema::{Column, ForeignKey, IndexDef, TableSchema};
pub use value::{FieldValue, KeyValue, Record};
