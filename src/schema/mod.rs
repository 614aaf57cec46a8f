/*!

The Schema Query Interface. The schema itself — its XML/MediaWiki loader, its version cache, its
library-schema resolution — is an external collaborator; this module defines only the small,
read-only query surface the rest of the core consumes. A schema is a value handed to the parser
and to `Tag::new`, never a process-wide singleton.

*/

pub mod memory_schema;

use std::collections::HashMap;
use enumflags2::{bitflags, BitFlags};

use crate::abstractions::IString;
use crate::arena::Index;

/// Boolean attributes a schema entry may carry. `unitClass`/`valueClass` are *named* attributes
/// (they carry a class name, not just a bit) and are queried through `attribute_value` instead.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TagAttribute {
  TakesValue,
  ExtensionAllowed,
  Unique,
  Required,
}

pub type TagAttributes = BitFlags<TagAttribute, u8>;

/// Whether a unit is matched case-sensitively (a symbol, e.g. `"s"`) or case-insensitively (a
/// spelled-out unit name, e.g. `"seconds"`), and whether it is a prefix unit (currency-style,
/// written before the value) or a suffix unit.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct UnitInfo {
  pub is_symbol: bool,
  pub is_prefix: bool,
}

/// A unit class (e.g. "time", "distance"), exposing every derivative-unit permutation (plural,
/// prefixed, cased) a tag's extension might use.
#[derive(Clone, Debug, Default)]
pub struct UnitClassEntry {
  pub derivative_units: HashMap<String, UnitInfo>,
}

impl UnitClassEntry {
  pub fn is_time_class(&self) -> bool {
    self.derivative_units.keys().any(|u| {
      let lower = u.to_lowercase();
      lower == "s" || lower == "second" || lower == "seconds"
    })
  }
}

/// A value class (e.g. "numericClass", "textClass"). The core only needs to know that a tag
/// belongs to one; deeper validation of the class's shape is the validator's job, out of scope.
#[derive(Clone, Debug)]
pub struct ValueClassEntry {
  pub name: IString,
}

/// A single resolved node in the schema tree, identified by its canonical long path.
#[derive(Clone, Debug)]
pub struct SchemaEntry {
  pub short_name: IString,
  pub long_name: String,
  /// Ancestor terms, lowercased, root-first, not including this entry's own short name.
  pub ancestors: Vec<String>,
  pub attributes: TagAttributes,
  pub named_attributes: HashMap<String, String>,
  pub unit_classes: Vec<IString>,
  pub value_classes: Vec<IString>,
}

pub type EntryId = Index<SchemaEntry>;

/// The result of resolving a (possibly namespaced) tag string against the schema.
pub struct FindResult {
  pub entry: Option<EntryId>,
  pub remainder: String,
}

/// The query interface the core consumes. Implementors own however they actually represent the
/// schema tree; the core never mutates entries and never reaches past this trait.
pub trait Schema {
  /// Resolve `text` (already stripped of any `ns:` namespace prefix) as a slash-separated path,
  /// from the deepest matching node upward. The longest matching prefix is the schema entry; the
  /// rest is the extension, with its original casing preserved.
  fn find_tag_entry(&self, text: &str) -> FindResult;

  /// Direct lookup by a full long name or a short name.
  fn get_tag_entry(&self, long_or_short_name: &str) -> Option<EntryId>;

  fn entry(&self, id: EntryId) -> &SchemaEntry;

  fn has_attribute(&self, id: EntryId, attr: TagAttribute) -> bool {
    self.entry(id).attributes.contains(attr)
  }

  fn any_parent_has_attribute(&self, id: EntryId, attr: TagAttribute) -> bool {
    if self.has_attribute(id, attr) {
      return true;
    }
    let mut ancestors: Vec<String> = self.entry(id).ancestors.clone();
    while let Some(parent_name) = ancestors.pop() {
      if let Some(parent_id) = self.get_tag_entry(&parent_name) {
        if self.has_attribute(parent_id, attr) {
          return true;
        }
      }
    }
    false
  }

  fn attribute_value(&self, id: EntryId, attr: &str) -> Option<String> {
    self.entry(id).named_attributes.get(attr).cloned()
  }

  fn unit_classes(&self, id: EntryId) -> HashMap<IString, UnitClassEntry>;

  fn value_classes(&self, id: EntryId) -> HashMap<IString, ValueClassEntry>;

  /// Whether `namespace` (including its trailing colon) names a library this schema knows about.
  fn is_valid_namespace(&self, namespace: &str) -> bool;
}
