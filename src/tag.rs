/*!

`Tag`: a single resolved node reference in a HED string, together with its trailing
extension value. Resolution against the schema happens once, at construction, and its results
(short/long/base forms, attribute booleans, the flattened unit-permutation table) are cached on
the `Tag` so that the many accessor methods used by search, rendering, and assembly are plain
field reads rather than repeated schema queries.

*/

use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

use crate::error::HedError;
use crate::schema::{EntryId, Schema, TagAttribute, UnitInfo};

/// Declares an `is_<name>() -> bool` reader over a same-named private field. `paste!` builds the
/// `is_` prefix onto the field identifier at the call site so the field and its accessor never
/// drift apart under a rename.
macro_rules! attribute_check {
  ($field:ident, $name:ident) => {
    paste::paste! {
      pub fn [<is_ $name>](&self) -> bool {
        self.$field
      }
    }
  };
}

/// A byte-offset span into the HED string a tag was parsed from.
pub type Span = (usize, usize);

#[derive(Clone)]
pub struct Tag {
  pub source_text: String,
  pub span: Span,
  pub namespace: Option<String>,
  pub schema_entry: Option<EntryId>,
  pub extension: String,

  // Cached at resolution time; see module docs.
  short_tag: String,
  base_tag: String,
  short_base_tag: String,
  long_tag: String,
  takes_value: bool,
  unit_class: bool,
  value_class: bool,
  extension_allowed: bool,
  unique: bool,
  required: bool,
  unit_permutations: Vec<(String, UnitInfo)>,

  /// A clone of a definition's body, attached once this tag is recognized as `Def/name`; see
  /// the definition expander.
  pub expandable: Option<Box<crate::group::Group>>,
  pub expanded: bool,
}

impl Tag {
  /// Parses a leading `ns:` namespace prefix off of `source_text`, if present.
  fn split_namespace(source_text: &str) -> (Option<String>, &str) {
    if let Some(colon) = source_text.find(':') {
      // A namespace prefix never contains '/', so a colon after the first slash isn't one.
      let before_slash = source_text.find('/').map_or(true, |slash| colon < slash);
      if before_slash && colon > 0 {
        return (Some(source_text[..=colon].to_string()), &source_text[colon + 1..]);
      }
    }
    (None, source_text)
  }

  /// Constructs a `Tag` from the exact substring `source_text` found at `span`. If `schema` is
  /// supplied, resolution runs immediately. Passing `defs` without `schema` is a usage error.
  pub fn new(
    source_text: &str,
    span: Span,
    schema: Option<&dyn Schema>,
    defs: Option<&crate::definitions::DefinitionDictionary>,
  ) -> Result<Tag, HedError> {
    if defs.is_some() && schema.is_none() {
      return Err(HedError::InvalidUsage {
        detail: "Tag::new: a definition dictionary was supplied without a schema".to_string(),
      });
    }

    let (namespace, rest) = Self::split_namespace(source_text);

    if let Some(schema) = schema {
      if let Some(ns) = &namespace {
        if !schema.is_valid_namespace(ns) {
          return Err(HedError::InvalidNamespace { namespace: ns.clone() });
        }
      }

      let result = schema.find_tag_entry(rest);
      let extension = result.remainder.trim_start_matches('/').to_string();

      let mut tag = Tag {
        source_text: source_text.to_string(),
        span,
        namespace,
        schema_entry: result.entry,
        extension,
        short_tag: String::new(),
        base_tag: String::new(),
        short_base_tag: String::new(),
        long_tag: String::new(),
        takes_value: false,
        unit_class: false,
        value_class: false,
        extension_allowed: false,
        unique: false,
        required: false,
        unit_permutations: Vec::new(),
        expandable: None,
        expanded: false,
      };
      tag.recompute_cache(schema);
      Ok(tag)
    } else {
      Ok(Tag {
        short_tag: source_text.to_string(),
        base_tag: source_text.to_string(),
        short_base_tag: source_text.to_string(),
        long_tag: source_text.to_string(),
        source_text: source_text.to_string(),
        span,
        namespace,
        schema_entry: None,
        extension: String::new(),
        takes_value: false,
        unit_class: false,
        value_class: false,
        extension_allowed: false,
        unique: false,
        required: false,
        unit_permutations: Vec::new(),
        expandable: None,
        expanded: false,
      })
    }
  }

  /// Recomputes every cached accessor after `schema_entry` or `extension` changes.
  fn recompute_cache(&mut self, schema: &dyn Schema) {
    let ns = self.namespace.clone().unwrap_or_default();
    if let Some(id) = self.schema_entry {
      let entry = schema.entry(id);
      let ext_suffix = if self.extension.is_empty() { String::new() } else { format!("/{}", self.extension) };
      self.short_tag = format!("{}{}{}", ns, entry.short_name, ext_suffix);
      self.short_base_tag = format!("{}{}", ns, entry.short_name);
      self.base_tag = format!("{}{}", ns, entry.long_name);
      self.long_tag = format!("{}{}{}", ns, entry.long_name, ext_suffix);

      self.takes_value = schema.has_attribute(id, TagAttribute::TakesValue);
      self.unit_class = !schema.unit_classes(id).is_empty();
      self.value_class = !schema.value_classes(id).is_empty();
      self.extension_allowed = !self.takes_value && schema.any_parent_has_attribute(id, TagAttribute::ExtensionAllowed);
      self.unique = schema.has_attribute(id, TagAttribute::Unique);
      self.required = schema.has_attribute(id, TagAttribute::Required);

      self.unit_permutations = schema
          .unit_classes(id)
          .into_values()
          .flat_map(|uc| uc.derivative_units.into_iter())
          .collect();
    } else {
      crate::log::debug!(1, "tag '{}' did not resolve against the schema", self.source_text);
      self.short_tag = self.source_text.clone();
      self.base_tag = self.source_text.clone();
      self.short_base_tag = self.source_text.clone();
      self.long_tag = self.source_text.clone();
      self.takes_value = false;
      self.unit_class = false;
      self.value_class = false;
      self.extension_allowed = false;
      self.unique = false;
      self.required = false;
      self.unit_permutations.clear();
    }
  }

  // region Canonical forms

  pub fn short_tag(&self) -> &str { &self.short_tag }
  pub fn base_tag(&self) -> &str { &self.base_tag }
  pub fn short_base_tag(&self) -> &str { &self.short_base_tag }
  pub fn long_tag(&self) -> &str { &self.long_tag }
  pub fn org_tag(&self) -> &str { &self.source_text }
  pub fn extension(&self) -> &str { &self.extension }

  /// Ancestor short names (lowercased) plus this tag's own short name (lowercased); empty if
  /// unresolved.
  pub fn tag_terms(&self, schema: &dyn Schema) -> Vec<String> {
    match self.schema_entry {
      Some(id) => {
        let entry = schema.entry(id);
        let mut terms = entry.ancestors.clone();
        terms.push(entry.short_name.to_lowercase());
        terms
      }
      None => Vec::new(),
    }
  }

  // endregion

  // region Attribute checks

  pub fn is_placeholder(&self) -> bool {
    self.source_text.contains('#') || self.extension.contains('#')
  }

  attribute_check!(takes_value, takes_value_tag);
  attribute_check!(unit_class, unit_class_tag);
  attribute_check!(value_class, value_class_tag);
  attribute_check!(extension_allowed, extension_allowed_tag);
  attribute_check!(unique, unique_tag);
  attribute_check!(required, required_tag);

  // endregion

  /// Parses the extension as `<value> <unit>` using every permutation cached from the tag's
  /// unit classes. Unit symbols (`unitSymbol`) match case-sensitively; spelled-out unit names
  /// match case-insensitively. `unitPrefix` units (currency-style) precede the value instead of
  /// following it.
  pub fn get_stripped_unit_value(&self) -> (String, Option<String>) {
    let ext = self.extension.trim();
    if self.unit_permutations.is_empty() {
      return (ext.to_string(), None);
    }

    for (unit_text, info) in &self.unit_permutations {
      if info.is_prefix {
        let matched = if info.is_symbol {
          ext.starts_with(unit_text.as_str())
        } else {
          ext.to_lowercase().starts_with(&unit_text.to_lowercase())
        };
        if matched {
          let value_part = ext[unit_text.len()..].trim();
          return (value_part.to_string(), Some(unit_text.clone()));
        }
      } else {
        for candidate in [format!(" {}", unit_text), unit_text.clone()] {
          let matched = if info.is_symbol {
            ext.ends_with(candidate.as_str())
          } else {
            ext.to_lowercase().ends_with(&candidate.to_lowercase())
          };
          if matched && ext.len() >= candidate.len() {
            let value_part = ext[..ext.len() - candidate.len()].trim();
            return (value_part.to_string(), Some(unit_text.clone()));
          }
        }
      }
    }

    (ext.to_string(), None)
  }

  /// Substitutes the first `#` in this tag's source text and extension with `value`. Valid only
  /// on placeholder tags.
  pub fn replace_placeholder(&mut self, value: &str, schema: Option<&dyn Schema>) -> Result<(), HedError> {
    if !self.is_placeholder() {
      return Err(HedError::InvalidUsage { detail: "replace_placeholder called on a non-placeholder tag".to_string() });
    }
    self.source_text = self.source_text.replacen('#', value, 1);
    self.extension = self.extension.replacen('#', value, 1);
    if let Some(schema) = schema {
      self.recompute_cache(schema);
    } else if self.schema_entry.is_none() {
      self.short_tag = self.source_text.clone();
      self.base_tag = self.source_text.clone();
      self.short_base_tag = self.source_text.clone();
      self.long_tag = self.source_text.clone();
    }
    Ok(())
  }

  /// Flips this tag's schema entry to the entry named `new_short_name` in the same schema and
  /// namespace, used exclusively to toggle `Def` <-> `Def-expand`.
  pub fn set_short_tag(&mut self, new_short_name: &str, schema: &dyn Schema) -> Result<(), HedError> {
    let id = schema
        .get_tag_entry(new_short_name)
        .ok_or_else(|| HedError::UnresolvedTag { text: new_short_name.to_string() })?;
    self.schema_entry = Some(id);
    let ns = self.namespace.clone().unwrap_or_default();
    let entry = schema.entry(id);
    let ext_suffix = if self.extension.is_empty() { String::new() } else { format!("/{}", self.extension) };
    self.source_text = format!("{}{}{}", ns, entry.short_name, ext_suffix);
    self.recompute_cache(schema);
    Ok(())
  }
}

impl PartialEq for Tag {
  fn eq(&self, other: &Self) -> bool {
    self.normalized_key() == other.normalized_key()
  }
}
impl Eq for Tag {}

impl Hash for Tag {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.normalized_key().hash(state);
  }
}

impl Tag {
  fn normalized_key(&self) -> (bool, String, String, String) {
    if self.schema_entry.is_some() {
      (
        true,
        self.namespace.clone().unwrap_or_default().to_lowercase(),
        self.short_base_tag.to_lowercase(),
        self.extension.to_lowercase(),
      )
    } else {
      (false, String::new(), self.source_text.clone(), String::new())
    }
  }
}

impl Debug for Tag {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Tag({:?})", self.source_text)
  }
}
