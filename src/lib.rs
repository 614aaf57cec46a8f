#![allow(dead_code)]
/*!

The annotation core of the Hierarchical Event Descriptor (HED) toolkit: parsing HED tag
strings into a typed tree, resolving tags against a schema, managing named definitions and
their expansion, assembling per-row annotations from tabular event files and JSON sidecars,
and reconstructing the temporal extent of Onset/Offset/Duration-described events.

See `DESIGN.md` in the repository root for the module map and design decisions.

*/

pub mod abstractions;
pub mod error;
pub mod arena;
pub mod schema;
pub mod tag;
pub mod group;
pub mod parser;
pub mod definitions;
pub mod sidecar;
pub mod tabular;
pub mod events;
pub mod query;
pub mod visitor;

// We re-export abstractions that are meant to be used publicly: the logging facade and the
// interned-string alias are part of the public API, everything else in `abstractions` is
// crate-internal plumbing.
pub use abstractions::{log, IString};

pub use error::{ErrorContext, ContextFrame, HedError, Issue};
