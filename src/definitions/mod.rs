/*!

The definition dictionary: the table of named, reusable tag groups a document's
`Definition/name` tags declare, built by scanning a parsed document (or several, merged) once
before any `Def`/`Def-expand` tag is resolved against it. Expansion and shrinking themselves live
in [`expander`], which is the only other module that reaches into a `DefinitionEntry`'s body.

Building a dictionary entry validates the structural rules for a `Definition/name` tag group:
exactly one body group, no stray tags beside `Definition/` and the body, a body placeholder
count matching the declared arity (`Definition/name/#` demands exactly one `#`, `Definition/name`
none), the placeholder tag must take a value, no nested `Definition`/`Def`/`Def-expand`, and the
definition's name must not itself contain `/` or `#`.
Unlike most of the rest of the core, a second definition with an already-used name is not an
error raised to the caller — it is *recorded* as an issue and the first definition wins, so
that one bad sidecar file does not invalidate an otherwise-usable dictionary.

*/

pub mod expander;

use indexmap::IndexMap;

use crate::error::{ErrorContext, HedError, Issue};
use crate::group::{Group, NodeId};
use crate::schema::Schema;

/// One definition's compiled shape: its body, and whether the body carries a `#` placeholder
/// tag that `Def/name/value` usages must supply.
#[derive(Clone, Debug)]
pub struct DefinitionEntry {
  pub name: String,
  pub body: Group,
  pub takes_value: bool,
}

// Bodies are stored canonically sorted, so rendered equality is value equality.
impl PartialEq for DefinitionEntry {
  fn eq(&self, other: &Self) -> bool {
    self.name.to_lowercase() == other.name.to_lowercase()
        && self.takes_value == other.takes_value
        && self.body.render(self.body.root(), crate::group::RenderMode::Short)
            == other.body.render(other.body.root(), crate::group::RenderMode::Short)
  }
}
impl Eq for DefinitionEntry {}

#[derive(Default)]
pub struct DefinitionDictionary {
  entries: IndexMap<String, DefinitionEntry>,
}

impl DefinitionDictionary {
  pub fn new() -> Self {
    DefinitionDictionary::default()
  }

  pub fn get_definition(&self, name: &str) -> Option<&DefinitionEntry> {
    self.entries.get(&name.to_lowercase())
  }

  /// Produces a fresh clone of `name`'s body, with `placeholder_value` substituted into the
  /// body's `#` tag when the definition takes a value. The returned string is the expanded
  /// name (`name` or `name/value`) a `Def-expand` tag would carry. Supplying a value to an
  /// arity-0 definition, or omitting it for an arity-1 definition, is `PlaceholderArityMismatch`.
  pub fn expand(
    &self,
    name: &str,
    placeholder_value: Option<&str>,
    schema: &dyn Schema,
  ) -> Result<(String, Group), Issue> {
    let Some(entry) = self.get_definition(name) else {
      return Err(Issue::new(HedError::DefUnmatched { name: name.to_string() }, ErrorContext::new()));
    };
    if entry.takes_value != placeholder_value.is_some() {
      return Err(Issue::new(HedError::PlaceholderArityMismatch { name: name.to_string() }, ErrorContext::new()));
    }

    let mut body = entry.body.deep_copy();
    if let Some(value) = placeholder_value {
      let placeholder = body
          .all_tags(body.root())
          .into_iter()
          .find(|&t| body.tag(t).map_or(false, |tag| tag.is_placeholder()));
      if let Some(id) = placeholder {
        if let Some(tag) = body.tag_mut(id) {
          let _ = tag.replace_placeholder(value, Some(schema));
        }
      }
    }

    let expanded_name = match placeholder_value {
      Some(value) => format!("{}/{}", entry.name, value),
      None => entry.name.clone(),
    };
    Ok((expanded_name, body))
  }

  /// Inserts an already-compiled entry directly, used when merging dictionaries harvested from
  /// separate sidecar files. Overwrites any existing entry with the same name; callers that need
  /// the "first wins" duplicate rule check [`DefinitionDictionary::get_definition`] first.
  pub fn insert_compiled(&mut self, entry: DefinitionEntry) {
    self.entries.insert(entry.name.to_lowercase(), entry);
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.values().map(|e| e.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Scans `document` for `Definition/name` tag groups and adds each valid one. Returns the
  /// issues found along the way (malformed definitions and duplicate names); a malformed
  /// definition is simply skipped, not added. Tag resolution already happened when `document`
  /// was parsed, so no schema is consulted here.
  pub fn check_for_definitions(&mut self, document: &Group) -> Vec<Issue> {
    let mut issues = Vec::new();
    for &top_group in &document.groups(document.root()) {
      let def_tags = document.find_tags(top_group, &["Definition"], false, 2);
      for (tag_id, _) in def_tags {
        let Some(tag_id) = tag_id else { continue };
        match self.compile_one(document, top_group, tag_id) {
          Ok(entry) => {
            let key = entry.name.to_lowercase();
            if self.entries.contains_key(&key) {
              crate::log::warning!(1, "duplicate definition '{}' skipped, keeping the first", entry.name);
              issues.push(Issue::new(HedError::DuplicateDefinition { name: entry.name.clone() }, ErrorContext::new()));
            } else {
              self.entries.insert(key, entry);
            }
          }
          Err(issue) => issues.push(issue),
        }
      }
    }
    issues
  }

  /// Reconstructs definitions purely from `Def-expand/name/value` usage, for names with no
  /// `Definition/...` declaration. See [`expander::gather_ambiguous_defs`] for the unification
  /// rule. An inferred entry never overrides one already present.
  pub fn gather_ambiguous_defs(&mut self, document: &Group, schema: &dyn Schema) -> Vec<Issue> {
    let (entries, issues) = expander::gather_ambiguous_defs(document, self, schema);
    for entry in entries {
      let key = entry.name.to_lowercase();
      if !self.entries.contains_key(&key) {
        self.entries.insert(key, entry);
      }
    }
    issues
  }

  fn compile_one(&self, document: &Group, def_group: NodeId, def_tag: NodeId) -> Result<DefinitionEntry, Issue> {
    let tag = document.tag(def_tag).expect("find_tags returned a tag id");
    let ctx = ErrorContext::new();

    // `Definition/Name` declares arity 0; `Definition/Name/#` declares arity 1. Anything else
    // left in the name after stripping the placeholder marker is malformed.
    let extension = tag.extension();
    let (name, declares_placeholder) = match extension.strip_suffix("/#") {
      Some(stripped) => (stripped.to_string(), true),
      None => (extension.to_string(), false),
    };

    if name.contains('/') || name.contains('#') {
      return Err(Issue::new(HedError::InvalidDefinitionName { name }, ctx));
    }

    let sibling_tags = document.tags(def_group);
    if sibling_tags.len() != 1 {
      return Err(Issue::new(HedError::DefinitionExtraTag { name }, ctx));
    }

    let body_groups = document.groups(def_group);
    if body_groups.is_empty() {
      return Err(Issue::new(HedError::DefinitionMissingBody { name }, ctx));
    }
    if body_groups.len() > 1 {
      return Err(Issue::new(HedError::DefinitionTooManyGroups { name }, ctx));
    }

    let body_root = body_groups[0];
    let descendant_tags = document.all_tags(body_root);

    let reserved = ["definition", "def", "def-expand"];
    if descendant_tags
        .iter()
        .filter_map(|&t| document.tag(t))
        .any(|t| reserved.contains(&t.short_base_tag().to_lowercase().as_str()))
    {
      return Err(Issue::new(HedError::NestedDefinition { name }, ctx));
    }

    let placeholder_tags: Vec<NodeId> = descendant_tags
        .iter()
        .copied()
        .filter(|&t| document.tag(t).map_or(false, |tag| tag.is_placeholder()))
        .collect();
    let expected = if declares_placeholder { 1 } else { 0 };
    if placeholder_tags.len() != expected {
      return Err(Issue::new(HedError::PlaceholderCount { name, found: placeholder_tags.len() }, ctx));
    }
    if let Some(&placeholder) = placeholder_tags.first() {
      let placeholder_tag = document.tag(placeholder).unwrap();
      if !placeholder_tag.is_takes_value_tag() {
        return Err(Issue::new(HedError::PlaceholderNotTakesValue { name }, ctx));
      }
    }
    let takes_value = declares_placeholder;

    // A body tag carrying Unique or Required would make the definition's expansion depend on
    // where it lands in the assembled string, which the definition/Def-expand mechanism never
    // accounts for.
    for &t in &descendant_tags {
      let Some(body_tag) = document.tag(t) else { continue };
      if body_tag.is_unique_tag() {
        return Err(Issue::new(HedError::DefinitionBadAttribute { name, attribute: "unique".to_string() }, ctx));
      }
      if body_tag.is_required_tag() {
        return Err(Issue::new(HedError::DefinitionBadAttribute { name, attribute: "required".to_string() }, ctx));
      }
    }

    // The body is extracted into a standalone `Group` so that every use of the definition can
    // be deep-copied from one canonical copy, never sharing nodes with the document it came
    // from or with other uses. Sorting it canonically makes entry equality value equality.
    let mut body = Group::new_document(0);
    let spliced_root = body.splice_in_subtree(document, body_root);
    body.set_root(spliced_root);
    body.sort_children_canonical();

    Ok(DefinitionEntry { name, body, takes_value })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::group::RenderMode;
  use crate::parser::parse;
  use crate::schema::memory_schema::test_fixture_schema;

  fn dictionary_with(schema: &dyn Schema, def_text: &str) -> (DefinitionDictionary, Vec<Issue>) {
    let (doc, parse_issues) = parse(def_text, Some(schema), None);
    assert!(parse_issues.is_empty(), "{:?}", parse_issues);
    let mut dict = DefinitionDictionary::new();
    let issues = dict.check_for_definitions(&doc);
    (dict, issues)
  }

  #[test]
  fn placeholder_declaration_strips_the_marker_from_the_name() {
    let schema = test_fixture_schema();
    let (dict, issues) = dictionary_with(&schema, "(Definition/Wait/#, (Delay/# ms))");
    assert!(issues.is_empty(), "{:?}", issues);
    let entry = dict.get_definition("wait").unwrap();
    assert_eq!(entry.name, "Wait");
    assert!(entry.takes_value);
  }

  #[test]
  fn declared_placeholder_with_no_body_placeholder_is_rejected() {
    let schema = test_fixture_schema();
    let (dict, issues) = dictionary_with(&schema, "(Definition/Wait/#, (Red))");
    assert!(dict.get_definition("Wait").is_none());
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].error, HedError::PlaceholderCount { name: "Wait".to_string(), found: 0 });
  }

  #[test]
  fn undeclared_placeholder_in_body_is_rejected() {
    let schema = test_fixture_schema();
    let (dict, issues) = dictionary_with(&schema, "(Definition/Wait, (Delay/# ms))");
    assert!(dict.get_definition("Wait").is_none());
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].error, HedError::PlaceholderCount { name: "Wait".to_string(), found: 1 });
  }

  #[test]
  fn expand_substitutes_the_placeholder_value() {
    let schema = test_fixture_schema();
    let (dict, issues) = dictionary_with(&schema, "(Definition/Wait/#, (Delay/# ms))");
    assert!(issues.is_empty(), "{:?}", issues);

    let (expanded_name, body) = dict.expand("Wait", Some("250"), &schema).unwrap();
    assert_eq!(expanded_name, "Wait/250");
    assert_eq!(body.render(body.root(), RenderMode::Short), "Delay/250 ms");
  }

  #[test]
  fn expand_arity_mismatch_is_reported() {
    let schema = test_fixture_schema();
    let (dict, _) = dictionary_with(&schema, "(Definition/Blink, (Eye-blink))");
    let err = dict.expand("Blink", Some("7"), &schema).unwrap_err();
    assert_eq!(err.error, HedError::PlaceholderArityMismatch { name: "Blink".to_string() });
  }

  #[test]
  fn entries_compare_by_value_regardless_of_declared_child_order() {
    let schema = test_fixture_schema();
    let (a, _) = dictionary_with(&schema, "(Definition/Pair, (Red, Blue))");
    let (b, _) = dictionary_with(&schema, "(Definition/Pair, (Blue, Red))");
    assert_eq!(a.get_definition("Pair").unwrap(), b.get_definition("Pair").unwrap());
  }
}
