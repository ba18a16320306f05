//! Foundation types for memgov.
//!
//! This crate provides the data model shared by every other memgov crate:
//! the memory item record, its lifecycle status, scope and value types, and
//! the item identifier format.
//!
//! # Key Types
//!
//! - [`MemoryItem`]: A durable, identified fact with status, scope, and validity window
//! - [`Status`]: Lifecycle status (`active`, `pending`, `deprecated`); one bucket per status
//! - [`Scope`]: Where a fact applies: environment, optional service and region
//! - [`ItemValue`]: Scalar fact value (text, integer, float, boolean)
//! - [`StatusCounts`]: Per-bucket item counts

pub mod error;
pub mod id;
pub mod item;
pub mod status;

pub use error::TypeError;
pub use id::validate_item_id;
pub use item::{Confidence, Env, ItemValue, MemoryItem, Scope};
pub use status::{Status, StatusCounts};
