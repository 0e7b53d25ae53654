//! A disk-resident B+Tree mapping `i64` keys to fixed-width values.
//!
//! The store is a single file of 4 KiB pages. Page 0 is the header; every
//! other page is a tree node or a member of the free list. All tree
//! operations address nodes by page number and read or write whole pages
//! through the pager, so no in-memory graph of the tree ever exists and
//! every mutation is durable (by default) when the call returns.
//!
//! ```no_run
//! use sable::Table;
//!
//! # fn main() -> sable::Result<()> {
//! let mut table = Table::open("data.db")?;
//! table.insert(1, b"one")?;
//! if let Some(value) = table.find(1)? {
//!     assert_eq!(value.trimmed(), b"one");
//! }
//! table.delete(1)?;
//! # Ok(())
//! # }
//! ```

pub mod io;
pub mod pager;
pub mod tree;
pub mod types;

pub use tree::{Scan, Table, TableOptions};
pub use types::{PageId, Result, SableError, Value, PAGE_SIZE, VALUE_LEN};
