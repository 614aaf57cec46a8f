/*!

A minimal in-memory `Schema` used by the test suite and by callers who have already loaded and
flattened a schema document elsewhere. The schema file formats themselves (XML, MediaWiki,
version cache) are a collaborator's job; this builder exists so the core's tests can exercise
resolution, attributes, and unit classes without a real schema loader.

*/

use std::collections::HashMap;

use crate::abstractions::IString;
use crate::arena::Arena;
use crate::schema::{
  EntryId,
  FindResult,
  Schema,
  SchemaEntry,
  TagAttribute,
  TagAttributes,
  UnitClassEntry,
  UnitInfo,
  ValueClassEntry,
};

#[derive(Default)]
pub struct MemorySchema {
  entries: Arena<SchemaEntry>,
  by_long_path: HashMap<String, EntryId>,
  by_short_name: HashMap<String, Vec<EntryId>>,
  unit_classes: HashMap<IString, UnitClassEntry>,
  value_classes: HashMap<IString, ValueClassEntry>,
  namespaces: Vec<String>,
}

impl MemorySchema {
  pub fn builder() -> MemorySchemaBuilder {
    MemorySchemaBuilder { schema: MemorySchema::default() }
  }
}

pub struct MemorySchemaBuilder {
  schema: MemorySchema,
}

impl MemorySchemaBuilder {
  /// Declare a unit class by name with its derivative-unit permutations.
  pub fn unit_class(mut self, name: &str, entry: UnitClassEntry) -> Self {
    self.schema.unit_classes.insert(IString::from(name), entry);
    self
  }

  pub fn value_class(mut self, name: &str) -> Self {
    self.schema.value_classes.insert(IString::from(name), ValueClassEntry { name: IString::from(name) });
    self
  }

  pub fn namespace(mut self, prefix: &str) -> Self {
    self.schema.namespaces.push(prefix.to_string());
    self
  }

  /// Declare a node at `long_path` (slash-separated, root-first, e.g.
  /// `"Property/Sensory-property/Sensory-attribute/Azure"`) with the given attributes and
  /// class names. Ancestors are inferred from the path and registered as plain entries of their
  /// own when missing, since every intermediate node of a real schema is itself a valid tag.
  pub fn node(
    mut self,
    long_path: &str,
    attributes: TagAttributes,
    named_attributes: &[(&str, &str)],
    unit_classes: &[&str],
    value_classes: &[&str],
  ) -> Self {
    let parts: Vec<&str> = long_path.split('/').collect();
    for k in 1..parts.len() {
      let prefix = parts[..k].join("/");
      if !self.schema.by_long_path.contains_key(&prefix.to_lowercase()) {
        self.insert_entry(&prefix, TagAttributes::empty(), &[], &[], &[]);
      }
    }
    self.insert_entry(long_path, attributes, named_attributes, unit_classes, value_classes);
    self
  }

  fn insert_entry(
    &mut self,
    long_path: &str,
    attributes: TagAttributes,
    named_attributes: &[(&str, &str)],
    unit_classes: &[&str],
    value_classes: &[&str],
  ) {
    let parts: Vec<&str> = long_path.split('/').collect();
    let short_name = *parts.last().expect("node path must not be empty");
    let ancestors: Vec<String> = parts[..parts.len() - 1].iter().map(|p| p.to_lowercase()).collect();

    let entry = SchemaEntry {
      short_name: IString::from(short_name),
      long_name: long_path.to_string(),
      ancestors,
      attributes,
      named_attributes: named_attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
      unit_classes: unit_classes.iter().map(|u| IString::from(*u)).collect(),
      value_classes: value_classes.iter().map(|v| IString::from(*v)).collect(),
    };

    let id = self.schema.entries.insert(entry);
    self.schema.by_long_path.insert(long_path.to_lowercase(), id);
    self.schema.by_short_name.entry(short_name.to_lowercase()).or_default().push(id);
  }

  pub fn build(self) -> MemorySchema {
    self.schema
  }
}

impl Schema for MemorySchema {
  fn find_tag_entry(&self, text: &str) -> FindResult {
    let parts: Vec<&str> = text.split('/').collect();
    for k in (1..=parts.len()).rev() {
      let candidate = parts[..k].join("/");
      if let Some(&id) = self.by_long_path.get(&candidate.to_lowercase()) {
        let remainder = parts[k..].join("/");
        return FindResult { entry: Some(id), remainder };
      }
    }
    // Fall back to a bare short-name match on the first path component, which covers tags
    // referenced by short form (e.g. `Azure/4.5 m-per-s^2` rather than the full long path).
    if let Some(first) = parts.first() {
      if let Some(ids) = self.by_short_name.get(&first.to_lowercase()) {
        if ids.len() == 1 {
          let remainder = parts[1..].join("/");
          return FindResult { entry: Some(ids[0]), remainder };
        }
      }
    }
    FindResult { entry: None, remainder: text.to_string() }
  }

  fn get_tag_entry(&self, long_or_short_name: &str) -> Option<EntryId> {
    let lower = long_or_short_name.to_lowercase();
    if let Some(&id) = self.by_long_path.get(&lower) {
      return Some(id);
    }
    self.by_short_name.get(&lower).and_then(|ids| if ids.len() == 1 { Some(ids[0]) } else { None })
  }

  fn entry(&self, id: EntryId) -> &SchemaEntry {
    self.entries.get(id).expect("EntryId from this schema must resolve")
  }

  fn unit_classes(&self, id: EntryId) -> HashMap<IString, UnitClassEntry> {
    let entry = self.entry(id);
    entry
        .unit_classes
        .iter()
        .filter_map(|name| self.unit_classes.get(name).map(|uc| (name.clone(), uc.clone())))
        .collect()
  }

  fn value_classes(&self, id: EntryId) -> HashMap<IString, ValueClassEntry> {
    let entry = self.entry(id);
    entry
        .value_classes
        .iter()
        .filter_map(|name| self.value_classes.get(name).map(|vc| (name.clone(), vc.clone())))
        .collect()
  }

  fn is_valid_namespace(&self, namespace: &str) -> bool {
    let trimmed = namespace.trim_end_matches(':');
    self.namespaces.iter().any(|ns| ns.trim_end_matches(':') == trimmed)
  }
}

/// A small schema fixture covering the tags exercised by this crate's tests: a few leaf tags, a
/// takes-value tag with a unit class, and the reserved structural tags (`Definition`, `Def`,
/// `Def-expand`, `Onset`, `Offset`, `Inset`, `Duration`, `Event-context`).
pub fn test_fixture_schema() -> MemorySchema {
  use TagAttribute::*;

  let time_units = UnitClassEntry {
    derivative_units: [
      ("s", UnitInfo { is_symbol: true, is_prefix: false }),
      ("second", UnitInfo { is_symbol: false, is_prefix: false }),
      ("seconds", UnitInfo { is_symbol: false, is_prefix: false }),
      ("ms", UnitInfo { is_symbol: true, is_prefix: false }),
      ("millisecond", UnitInfo { is_symbol: false, is_prefix: false }),
      ("milliseconds", UnitInfo { is_symbol: false, is_prefix: false }),
    ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
  };

  MemorySchema::builder()
      .namespace("ts:")
      .unit_class("time", time_units)
      .node("Event/Sensory-event/Visual-presentation/Red", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Visual-presentation/Blue", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Visual-presentation/Green", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Visual-presentation/Yellow", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Visual-presentation/Purple", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Visual-presentation/Black", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Agent-action/Move", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Agent-action/Inhibit", TagAttributes::empty(), &[], &[], &[])
      .node("Event/Sensory-event/Eye-blink", TagAttributes::empty(), &[], &[], &[])
      .node("Attribute/Temporal-rate/Delay", TakesValue.into(), &[], &[], &["numericClass"])
      .node("Attribute/Agent-property/Acceleration", TakesValue.into(), &[], &["time"], &[])
      .node("Property/Organizational-property/Definition", TakesValue.into(), &[], &[], &[])
      .node("Property/Organizational-property/Def", TakesValue.into(), &[], &[], &[])
      .node("Property/Organizational-property/Def-expand", TakesValue.into(), &[], &[], &[])
      .node("Property/Organizational-property/Onset", TagAttributes::empty(), &[], &[], &[])
      .node("Property/Organizational-property/Offset", TagAttributes::empty(), &[], &[], &[])
      .node("Property/Organizational-property/Inset", TagAttributes::empty(), &[], &[], &[])
      .node("Property/Organizational-property/Duration", TakesValue.into(), &[], &["time"], &[])
      .node("Property/Organizational-property/Event-context", TagAttributes::empty(), &[], &[], &[])
      .build()
}
