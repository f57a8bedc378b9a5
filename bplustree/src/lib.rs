//! A disk-resident, concurrent B+ tree secondary index.
//!
//! The tree stores fixed-width keys (`key::FixedKey`) mapped to fixed-width
//! values (`value::FixedValue`), ordered by an externally supplied
//! `key::KeyComparator`, latch-coupling against any `common::api::BufferPool`
//! implementation. See [`tree::BPlusTree`] for the public surface.

mod descent;
mod header;
mod layout;
mod merge;
mod node;
mod split;

pub mod iter;
pub mod key;
pub mod tree;
pub mod value;

pub use iter::Cursor;
pub use key::{FixedKey, KeyComparator, NaturalOrder};
pub use node::{internal_max_size, leaf_max_size};
pub use tree::BPlusTree;
pub use value::{FixedValue, RowId};
