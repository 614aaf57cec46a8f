/*!

The column mapper: binds a [`Sidecar`](super::Sidecar) to the actual header
of a Tabular Input, layering in explicit tag-column overrides and a requested-columns filter, and
answers the per-cell question `expand_column` that the row assembler drives for every cell
of every row.

Finalization is idempotent and cheap enough to simply re-run on every configuration change
instead of tracking dirtiness: `final_map` is fully recomputed each time from the sidecar, the
overrides, and the header actually present.

*/

use indexmap::IndexMap;

use crate::error::{ErrorContext, HedError, Issue};
use crate::parser::parse;
use crate::schema::Schema;
use crate::sidecar::{ColumnCategory, ColumnMetadata, Sidecar};

#[derive(Clone, Debug, Default)]
pub struct ColumnMapperConfig {
  /// Columns to treat as bare HEDTags regardless of what the sidecar says.
  pub tag_columns: Vec<String>,
  /// Like `tag_columns`, but absence of the column is not an error.
  pub optional_tag_columns: Vec<String>,
  /// Per-column tag prefix applied during HEDTags expansion.
  pub column_prefixes: IndexMap<String, String>,
  /// If non-empty, only these column names survive finalization.
  pub requested_columns: Vec<String>,
  /// Columns forced to ride along as named side values, whatever the sidecar says.
  pub attribute_columns: Vec<String>,
}

pub struct ColumnMapper {
  config: ColumnMapperConfig,
  final_map: IndexMap<String, ColumnMetadata>,
}

/// What a finalized cell expansion looks like for the assembler: either a HED fragment or a
/// `(name, value)` attribute pair, or nothing at all.
#[derive(Debug)]
pub enum CellExpansion {
  Hed(String),
  Attribute(String, String),
  None,
}

impl ColumnMapper {
  pub fn new(config: ColumnMapperConfig) -> Self {
    ColumnMapper { config, final_map: IndexMap::new() }
  }

  pub fn final_map(&self) -> &IndexMap<String, ColumnMetadata> {
    &self.final_map
  }

  /// Recomputes `final_map` from `sidecar` and the header columns actually present: sidecar
  /// seed, tag/attribute overrides, prefixes, the requested-columns filter, then consistency
  /// checks.
  pub fn finalize(&mut self, sidecar: &Sidecar, header: &[String]) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut map: IndexMap<String, ColumnMetadata> = IndexMap::new();

    // 1. Seed from the sidecar.
    for name in header {
      if let Some(metadata) = sidecar.columns.get(name) {
        map.insert(name.clone(), metadata.clone());
      }
    }

    // 2. Layer in explicit tag-column overrides.
    for name in &self.config.tag_columns {
      if !header.contains(name) {
        issues.push(Issue::new(HedError::MissingColumn { name: name.clone() }, ErrorContext::new()));
        continue;
      }
      map.insert(name.clone(), ColumnMetadata { name: name.clone(), category: ColumnCategory::HEDTags { prefix: None }, extra: IndexMap::new() });
    }
    for name in &self.config.optional_tag_columns {
      if header.contains(name) {
        map.insert(name.clone(), ColumnMetadata { name: name.clone(), category: ColumnCategory::HEDTags { prefix: None }, extra: IndexMap::new() });
      }
    }
    for name in &self.config.attribute_columns {
      if header.contains(name) {
        map.insert(name.clone(), ColumnMetadata { name: name.clone(), category: ColumnCategory::Attribute, extra: IndexMap::new() });
      }
    }

    // 3. Apply the column-prefix map.
    for (name, prefix) in &self.config.column_prefixes {
      if let Some(metadata) = map.get_mut(name) {
        if let ColumnCategory::HEDTags { prefix: slot } = &mut metadata.category {
          *slot = Some(prefix.clone());
        }
      }
    }

    // 4. Apply the requested-columns filter.
    if !self.config.requested_columns.is_empty() {
      map.retain(|name, _| self.config.requested_columns.contains(name));
    }

    // 5. Columns named by the sidecar but absent from the header are unknown; uncovered header
    // columns fall back to Attribute (caller policy: everything not otherwise described rides
    // along as a side value rather than silently vanishing).
    for name in sidecar.columns.keys() {
      if !header.contains(name) {
        issues.push(Issue::new(HedError::UnknownColumn { name: name.clone() }, ErrorContext::new()));
      }
    }
    for name in header {
      if !self.config.requested_columns.is_empty() && !self.config.requested_columns.contains(name) {
        continue;
      }
      map.entry(name.clone()).or_insert_with(|| ColumnMetadata { name: name.clone(), category: ColumnCategory::Attribute, extra: IndexMap::new() });
    }

    self.final_map = map;
    issues
  }

  /// Expands one cell. Empty, `"n/a"`, and `"nan"` cells (case-insensitive) produce `None` with
  /// no attribute regardless of column category.
  pub fn expand_column(&self, column: &str, cell_text: &str, schema: &dyn Schema) -> Result<CellExpansion, Issue> {
    let trimmed = cell_text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") || trimmed.eq_ignore_ascii_case("nan") {
      return Ok(CellExpansion::None);
    }

    let Some(metadata) = self.final_map.get(column) else {
      return Err(Issue::new(HedError::UnknownColumn { name: column.to_string() }, ErrorContext::new()));
    };

    match &metadata.category {
      ColumnCategory::Ignore => Ok(CellExpansion::None),
      ColumnCategory::Attribute => Ok(CellExpansion::Attribute(column.to_string(), trimmed.to_string())),
      ColumnCategory::Value(fragment) => Ok(CellExpansion::Hed(fragment.replacen('#', trimmed, 1))),
      ColumnCategory::Categorical(values) => match values.get(trimmed) {
        Some(fragment) => Ok(CellExpansion::Hed(fragment.clone())),
        None => Err(Issue::new(
          HedError::SidecarKeyMissing { column: column.to_string(), key: trimmed.to_string(), known: values.keys().cloned().collect() },
          ErrorContext::new(),
        )),
      },
      ColumnCategory::HEDTags { prefix } => {
        let (mut doc, issues) = parse(trimmed, Some(schema), None);
        if let Some(first) = issues.into_iter().next() {
          return Err(first);
        }
        if let Some(p) = prefix {
          apply_prefix(&mut doc, p);
        }
        Ok(CellExpansion::Hed(doc.render(doc.root(), crate::group::RenderMode::Original)))
      }
    }
  }
}

/// Prepends `prefix` to each tag's text in place unless the tag already carries it
/// (case-insensitive), leaving the fragment's group nesting untouched. The rendered fragment is
/// re-parsed with the schema during row assembly, so cached canonical forms need not be
/// refreshed here.
fn apply_prefix(doc: &mut crate::group::Group, prefix: &str) {
  let prefix_lower = prefix.to_lowercase();
  for id in doc.all_tags(doc.root()) {
    let Some(tag) = doc.tag_mut(id) else { continue };
    if !tag.source_text.to_lowercase().starts_with(&prefix_lower) {
      tag.source_text = format!("{}{}", prefix, tag.source_text);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::memory_schema::test_fixture_schema;
  use crate::sidecar::Sidecar;

  fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn categorical_cell_expands_and_reports_missing_keys() {
    let schema = test_fixture_schema();
    let json = r#"{"trial_type": {"HED": {"go": "Move", "stop": "Inhibit"}}}"#;
    let (sidecar, _) = Sidecar::from_json(json, &schema).unwrap();

    let mut mapper = ColumnMapper::new(ColumnMapperConfig::default());
    let finalize_issues = mapper.finalize(&sidecar, &header(&["trial_type"]));
    assert!(finalize_issues.is_empty());

    match mapper.expand_column("trial_type", "go", &schema).unwrap() {
      CellExpansion::Hed(fragment) => assert_eq!(fragment, "Move"),
      _ => panic!("expected a HED fragment"),
    }
    assert!(matches!(mapper.expand_column("trial_type", "n/a", &schema).unwrap(), CellExpansion::None));
    assert!(mapper.expand_column("trial_type", "unknown", &schema).is_err());
  }

  #[test]
  fn tag_column_override_applies_prefix_unless_already_present() {
    let schema = test_fixture_schema();
    let sidecar = Sidecar::empty();

    let mut config = ColumnMapperConfig::default();
    config.tag_columns.push("response".to_string());
    config.column_prefixes.insert("response".to_string(), "Event/Agent-action/".to_string());
    let mut mapper = ColumnMapper::new(config);
    mapper.finalize(&sidecar, &header(&["response"]));

    match mapper.expand_column("response", "Move, Event/Agent-action/Inhibit", &schema).unwrap() {
      CellExpansion::Hed(fragment) => assert_eq!(fragment, "Event/Agent-action/Move, Event/Agent-action/Inhibit"),
      _ => panic!("expected a HED fragment"),
    }

    // Group nesting in the cell survives prefixing.
    match mapper.expand_column("response", "(Move, (Inhibit)), Move", &schema).unwrap() {
      CellExpansion::Hed(fragment) => assert_eq!(
        fragment,
        "(Event/Agent-action/Move, (Event/Agent-action/Inhibit)), Event/Agent-action/Move"
      ),
      _ => panic!("expected a HED fragment"),
    }
  }

  #[test]
  fn attribute_column_override_carries_the_cell_through() {
    let schema = test_fixture_schema();
    let json = r#"{"sample_rate": {"HED": "Delay/#"}}"#;
    let (sidecar, _) = Sidecar::from_json(json, &schema).unwrap();

    let mut config = ColumnMapperConfig::default();
    config.attribute_columns.push("sample_rate".to_string());
    let mut mapper = ColumnMapper::new(config);
    mapper.finalize(&sidecar, &header(&["sample_rate"]));

    match mapper.expand_column("sample_rate", "256", &schema).unwrap() {
      CellExpansion::Attribute(name, value) => {
        assert_eq!(name, "sample_rate");
        assert_eq!(value, "256");
      }
      _ => panic!("expected an attribute"),
    }
  }

  #[test]
  fn requested_columns_filter_drops_everything_else() {
    let schema = test_fixture_schema();
    let json = r#"{
      "trial_type": {"HED": {"go": "Move"}},
      "delay_col": {"HED": "Delay/#"}
    }"#;
    let (sidecar, _) = Sidecar::from_json(json, &schema).unwrap();

    let mut config = ColumnMapperConfig::default();
    config.requested_columns.push("trial_type".to_string());
    let mut mapper = ColumnMapper::new(config);
    mapper.finalize(&sidecar, &header(&["trial_type", "delay_col"]));
    assert!(mapper.final_map().contains_key("trial_type"));
    assert!(!mapper.final_map().contains_key("delay_col"));
  }

  #[test]
  fn value_column_substitutes_placeholder() {
    let schema = test_fixture_schema();
    let json = r#"{"delay_col": {"HED": "Delay/#"}}"#;
    let (sidecar, _) = Sidecar::from_json(json, &schema).unwrap();

    let mut mapper = ColumnMapper::new(ColumnMapperConfig::default());
    mapper.finalize(&sidecar, &header(&["delay_col"]));
    match mapper.expand_column("delay_col", "250", &schema).unwrap() {
      CellExpansion::Hed(fragment) => assert_eq!(fragment, "Delay/250"),
      _ => panic!("expected a HED fragment"),
    }
  }
}
