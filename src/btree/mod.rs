//! B-tree Module
//!
//! Ordered key → record index stored in the pages of a `PageStore`.
//!
//! ## Responsibilities
//! - Point lookup, insert/overwrite and delete by byte-string key
//! - Ordered iteration along the doubly linked leaf chain
//! - Node splits on overflow, merge or redistribution on underflow
//! - Overflow chains for records too large to sit in a leaf
//! - Bottom-up bulk loading from sorted input
//! - Cycle and depth checks on every descent
//!
//! ## Shape
//! ```text
//!                    ┌──────────────────────────┐
//!                    │ Index  c0 │ k1 c1 │ k2 c2│
//!                    └────┬──────────┬──────┬───┘
//!            ┌────────────┘          │      └────────────┐
//!            ▼                       ▼                   ▼
//!      ┌───────────┐  next     ┌───────────┐  next  ┌───────────┐
//!      │ Leaf < k1 │ ────────▶ │ Leaf ≥ k1 │ ─────▶ │ Leaf ≥ k2 │
//!      │           │ ◀──────── │           │ ◀───── │           │
//!      └───────────┘  prev     └─────┬─────┘  prev  └───────────┘
//!                                    │ large record
//!                                    ▼
//!                             ┌──────────┐   ┌──────────┐
//!                             │ Overflow │──▶│ Overflow │
//!                             └──────────┘   └──────────┘
//! ```
//!
//! A separator equals the first key of the subtree on its right.

mod builder;
mod iterator;
mod node;
mod overflow;
mod tree;

pub use builder::TreeBuilder;
pub use iterator::TreeIter;
pub use node::{IndexNode, LeafEntry, LeafNode, Node, RecordRef, RECORD_COMPRESSED, RECORD_OVERFLOW};
pub use overflow::Limits;
pub use tree::BTree;
