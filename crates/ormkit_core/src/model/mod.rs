//! Model declaration: the tables a data access layer manages.
//!
//! # Responsibility
//! - Provide the registry that persisted entity definitions attach to.
//! - Ship the placeholder entity that downstream projects replace.
//!
//! # Invariants
//! - Schema operations only ever touch tables registered in a `Schema`.

pub mod sample;
pub mod schema;
