/*!

Column metadata and the sidecar. A Sidecar is the JSON-described mapping of
tabular column names to how their cells should become HED material — categorical lookup tables,
single-placeholder value templates, raw HEDTags cells, opaque attributes, or ignored columns —
plus whatever `Definition/...` groups are embedded in any of its HED fragments.

The column-to-tag logic itself (per-cell `expand_column`, finalization against a Tabular Input's
actual header) lives in [`mapper`]; this module owns loading, merging, and the structural
validation that must pass before any expansion is attempted.

*/

pub mod mapper;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::definitions::DefinitionDictionary;
use crate::error::{ContextFrame, ErrorContext, HedError, Issue};
use crate::schema::Schema;

#[derive(Clone, Debug)]
pub enum ColumnCategory {
  Ignore,
  Categorical(IndexMap<String, String>),
  Value(String),
  HEDTags { prefix: Option<String> },
  Attribute,
}

#[derive(Clone, Debug)]
pub struct ColumnMetadata {
  pub name: String,
  pub category: ColumnCategory,
  /// Non-HED keys such as `Description`/`Levels`, preserved verbatim but never interpreted.
  pub extra: IndexMap<String, Json>,
}

pub struct Sidecar {
  pub columns: IndexMap<String, ColumnMetadata>,
  pub definitions: DefinitionDictionary,
}

impl Sidecar {
  pub fn empty() -> Self {
    Sidecar { columns: IndexMap::new(), definitions: DefinitionDictionary::new() }
  }

  /// Parses one sidecar JSON document, validates its shape, and harvests its definitions.
  pub fn from_json(text: &str, schema: &dyn Schema) -> Result<(Sidecar, Vec<Issue>), Issue> {
    let parsed: Json = serde_json::from_str(text).map_err(|e| {
      Issue::new(HedError::InvalidUsage { detail: format!("sidecar JSON parse error: {}", e) }, ErrorContext::new())
    })?;
    let Json::Object(map) = parsed else {
      return Err(Issue::new(HedError::InvalidUsage { detail: "sidecar root must be a JSON object".to_string() }, ErrorContext::new()));
    };

    let mut sidecar = Sidecar::empty();
    let mut issues = Vec::new();

    for (column_name, value) in map {
      let mut ctx = ErrorContext::new();
      ctx.push(ContextFrame::SidecarColumn(column_name.clone()));

      match compile_column(&column_name, &value, &ctx, &mut issues) {
        Ok(metadata) => {
          sidecar.columns.insert(column_name, metadata);
        }
        Err(issue) => issues.push(issue),
      }
    }

    // Definitions may be declared inside any column's HED fragments; one harvester accumulates
    // them all into the sidecar's dictionary, so duplicates across columns are caught here.
    let mut harvester = crate::visitor::DefinitionHarvester::new(&mut sidecar.definitions);
    for (column_name, metadata) in &sidecar.columns {
      let mut ctx = ErrorContext::new();
      ctx.push(ContextFrame::SidecarColumn(column_name.clone()));
      for fragment in metadata.category.hed_fragments() {
        let (doc, parse_issues) = crate::parser::parse(fragment, Some(schema), None);
        for mut issue in parse_issues {
          issue.context = ctx.clone();
          issues.push(issue);
        }
        issues.extend(crate::visitor::visit_document(&doc, &ctx, &mut [], &mut [&mut harvester]));
      }
    }

    Ok((sidecar, issues))
  }

  /// Merges `other` into `self` left-to-right: a column present in both keeps `other`'s
  /// definition, and `other`'s definitions are folded in (first-wins on name collision, per
  /// the Definition Dictionary's own duplicate rule).
  pub fn merge(&mut self, other: Sidecar) -> Vec<Issue> {
    for (name, metadata) in other.columns {
      if self.columns.contains_key(&name) {
        crate::log::info!(1, "sidecar merge: column '{}' overridden by a later file", name);
      }
      self.columns.insert(name, metadata);
    }
    let mut issues = Vec::new();
    for name in other.definitions.names() {
      if let Some(entry) = other.definitions.get_definition(name) {
        if self.definitions.get_definition(name).is_some() {
          crate::log::warning!(1, "sidecar merge: duplicate definition '{}' skipped, keeping the first", name);
          issues.push(Issue::new(HedError::DuplicateDefinition { name: name.to_string() }, ErrorContext::new()));
        } else {
          self.definitions.insert_compiled(entry.clone());
        }
      }
    }
    issues
  }
}

impl ColumnCategory {
  fn hed_fragments(&self) -> Vec<&str> {
    match self {
      ColumnCategory::Categorical(map) => map.values().map(String::as_str).collect(),
      ColumnCategory::Value(fragment) => vec![fragment.as_str()],
      ColumnCategory::HEDTags { .. } | ColumnCategory::Attribute | ColumnCategory::Ignore => Vec::new(),
    }
  }

  /// Expected `#` placeholder count after embedded-definition bodies are excluded: exactly 1
  /// for Value, 0 for everything else.
  fn expected_pound_signs(&self) -> usize {
    match self {
      ColumnCategory::Value(_) => 1,
      _ => 0,
    }
  }
}

fn compile_column(name: &str, value: &Json, ctx: &ErrorContext, issues: &mut Vec<Issue>) -> Result<ColumnMetadata, Issue> {
  let Json::Object(obj) = value else {
    return Ok(ColumnMetadata { name: name.to_string(), category: ColumnCategory::Attribute, extra: IndexMap::new() });
  };

  let mut extra = IndexMap::new();

  let category = if let Some(hed) = obj.get("HED") {
    match hed {
      Json::String(fragment) => ColumnCategory::Value(fragment.clone()),
      Json::Object(levels) => {
        let mut map = IndexMap::new();
        for (key, v) in levels {
          let Json::String(fragment) = v else {
            return Err(Issue::new(
              HedError::InvalidUsage { detail: format!("sidecar column '{}': categorical value for '{}' must be a string", name, key) },
              ctx.clone(),
            ));
          };
          map.insert(key.clone(), fragment.clone());
        }
        if map.is_empty() {
          return Err(Issue::new(HedError::InvalidUsage { detail: format!("sidecar column '{}': empty categorical HED map", name) }, ctx.clone()));
        }
        ColumnCategory::Categorical(map)
      }
      _ => return Err(Issue::new(HedError::InvalidUsage { detail: format!("sidecar column '{}': HED value has unsupported shape", name) }, ctx.clone())),
    }
  } else {
    ColumnCategory::Attribute
  };

  for (key, v) in obj {
    if key != "HED" {
      extra.insert(key.clone(), v.clone());
    }
  }

  for fragment in category.hed_fragments() {
    let without_defs = strip_definition_bodies(fragment);
    let found = without_defs.matches('#').count();
    let expected = category.expected_pound_signs();
    if found != expected {
      issues.push(Issue::new(
        HedError::WrongPoundSigns { column: name.to_string(), expected, found },
        ctx.clone(),
      ));
    }
  }

  Ok(ColumnMetadata { name: name.to_string(), category, extra })
}

/// Strips the text of every top-level `(Definition/..., (...))` group out of `fragment` before
/// counting placeholders, since a definition body may legitimately contain `#`.
fn strip_definition_bodies(fragment: &str) -> String {
  let lower = fragment.to_lowercase();
  let mut result = String::new();
  let mut depth: i32 = 0;
  let mut skip_depth: Option<i32> = None;
  let mut chars = fragment.char_indices().peekable();

  while let Some((i, ch)) = chars.next() {
    match ch {
      '(' => {
        if skip_depth.is_none() && lower[i..].starts_with("(definition/") {
          skip_depth = Some(depth);
        }
        depth += 1;
        if skip_depth.is_none() {
          result.push(ch);
        }
      }
      ')' => {
        depth -= 1;
        if skip_depth == Some(depth) {
          skip_depth = None;
        } else if skip_depth.is_none() {
          result.push(ch);
        }
      }
      _ => {
        if skip_depth.is_none() {
          result.push(ch);
        }
      }
    }
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::memory_schema::test_fixture_schema;

  #[test]
  fn loads_categorical_and_value_columns() {
    let schema = test_fixture_schema();
    let json = r#"{
      "trial_type": {"HED": {"go": "Move", "stop": "Inhibit"}},
      "delay_col": {"HED": "Delay/#"}
    }"#;
    let (sidecar, issues) = Sidecar::from_json(json, &schema).unwrap();
    assert!(issues.is_empty(), "{:?}", issues);
    assert!(matches!(sidecar.columns["trial_type"].category, ColumnCategory::Categorical(_)));
    assert!(matches!(sidecar.columns["delay_col"].category, ColumnCategory::Value(_)));
  }

  #[test]
  fn wrong_pound_signs_is_reported() {
    let schema = test_fixture_schema();
    let json = r#"{"delay_col": {"HED": "Delay/# plus Delay/#"}}"#;
    let (_, issues) = Sidecar::from_json(json, &schema).unwrap();
    assert_eq!(issues.len(), 1);
    assert!(matches!(issues[0].error, HedError::WrongPoundSigns { expected: 1, found: 2, .. }));
  }

  #[test]
  fn pound_signs_inside_definitions_are_excluded() {
    let schema = test_fixture_schema();
    let json = r#"{"delay_col": {"HED": "(Definition/Foo/#, (Delay/#)), Delay/#"}}"#;
    let (_, issues) = Sidecar::from_json(json, &schema).unwrap();
    assert!(issues.is_empty(), "{:?}", issues);
  }

  #[test]
  fn definitions_are_harvested_from_fragments() {
    let schema = test_fixture_schema();
    let json = r#"{"trial_type": {"HED": {"go": "(Definition/Go-cue, (Move)), Def/Go-cue"}}}"#;
    let (sidecar, issues) = Sidecar::from_json(json, &schema).unwrap();
    assert!(issues.is_empty(), "{:?}", issues);
    assert!(sidecar.definitions.get_definition("Go-cue").is_some());
  }

  #[test]
  fn merge_overrides_columns_but_keeps_the_first_definition() {
    let schema = test_fixture_schema();
    let first = r#"{"trial_type": {"HED": {"go": "(Definition/Cue, (Move)), Def/Cue"}}}"#;
    let second = r#"{
      "trial_type": {"HED": {"go": "Inhibit"}},
      "other": {"HED": "(Definition/Cue, (Red)), Delay/#"}
    }"#;
    let (mut merged, issues) = Sidecar::from_json(first, &schema).unwrap();
    assert!(issues.is_empty(), "{:?}", issues);
    let (later, issues) = Sidecar::from_json(second, &schema).unwrap();
    assert!(issues.is_empty(), "{:?}", issues);

    let merge_issues = merged.merge(later);
    assert_eq!(merge_issues.len(), 1);
    assert_eq!(merge_issues[0].error, HedError::DuplicateDefinition { name: "Cue".to_string() });

    // The later file's column wins; the earlier file's definition wins.
    match &merged.columns["trial_type"].category {
      ColumnCategory::Categorical(map) => assert_eq!(map["go"], "Inhibit"),
      other => panic!("unexpected category {:?}", other),
    }
    let body = &merged.definitions.get_definition("Cue").unwrap().body;
    assert_eq!(body.render(body.root(), crate::group::RenderMode::Short), "Move");
  }
}
