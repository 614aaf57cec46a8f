#![allow(unused)]
/*!

Type aliases and small utilities that abstract over their backing implementation.

`IString` is the motivating example: schema node short names, unit-class names, and value-class
names are interned strings, and more than one external crate could provide the interning. This
module pins the choice in one place — `string_cache::DefaultAtom`, whose global cache is shared
across threads, which matters because a schema (and the tag names it resolves) is meant to be
shared freely across per-file workers. Swapping the backing crate is a one-line change here
rather than a crate-wide edit.

For infrastructure with a wider surface than a type alias, the module boundary is the
abstraction. The `log` module's crate-facing interface is only
`set_global_logging_threshold()`/`get_global_logging_threshold()` and the
`critical!`/`error!`/`warning!`/`info!`/`debug!`/`trace!` macro family; the backing framework is
encapsulated behind it.

*/

mod nat_set;
mod string_join;

use std::collections::HashSet as StdHashSet;

// Logging
pub mod log;

// Interned string. `DefaultAtom` uses a global cache shared across threads, which matters because a Schema (and
// the tag names it resolves) is meant to be shared freely across worker threads per the concurrency model.
pub use string_cache::DefaultAtom as IString;

// region Items meant to be used only internally

// A set of (small) natural numbers: arena indices matched by a query, or columns in a requested-columns filter.
pub(crate) use nat_set::NatSet;

// Join sequences with a separator.
pub(crate) use string_join::{join_string, join_iter};

/// A hash set used for membership tests over interned names.
pub type Set<T> = StdHashSet<T>;

// endregion
