/*!

The row assembler: combines a Tabular Input's rows, a bound Column Mapper, and a Schema into
one assembled HED String per row, resolving `{column}` references and tracking each row's
side-channel attributes (`onset`, `duration`, and any Attribute-category columns) along the way.

A row that fails assembly keeps its slot: it records its issues and yields an empty HED String,
so downstream temporal processing still sees one entry per input row.

*/

use crate::abstractions::join_string;
use crate::definitions::DefinitionDictionary;
use crate::error::{ContextFrame, ErrorContext, HedError, Issue};
use crate::group::Group;
use crate::schema::Schema;
use crate::sidecar::mapper::{CellExpansion, ColumnMapper};
use crate::sidecar::ColumnCategory;

/// How (if at all) `Def/name` tags should be rewritten while assembling each row.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum DefinitionHandling {
  #[default]
  Leave,
  Expand,
  Shrink,
}

#[derive(Clone, Debug)]
pub struct AssemblyOptions {
  pub definition_handling: DefinitionHandling,
  /// Validate `Def-expand` bodies against the dictionary while expanding.
  pub validate_def_expand: bool,
  /// Silently re-sort disordered rows by onset instead of reporting `OnsetsNotOrdered`.
  pub sort_rows_by_onset: bool,
  /// The conventional role columns, overridable for datasets with non-English headers.
  pub onset_column: String,
  pub duration_column: String,
  pub hed_column: String,
}

impl Default for AssemblyOptions {
  fn default() -> Self {
    AssemblyOptions {
      definition_handling: DefinitionHandling::default(),
      validate_def_expand: false,
      sort_rows_by_onset: false,
      onset_column: "onset".to_string(),
      duration_column: "duration".to_string(),
      hed_column: "HED".to_string(),
    }
  }
}

pub struct TabularInput {
  pub header: Vec<String>,
  pub rows: Vec<Vec<String>>,
}

impl TabularInput {
  pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
    TabularInput { header, rows }
  }

  /// Parses tab-separated UTF-8 text with a header row. Short rows are padded with empty cells
  /// so every row indexes uniformly against the header.
  pub fn from_tsv(text: &str) -> TabularInput {
    let mut lines = text.lines();
    let header: Vec<String> = lines.next().unwrap_or_default().split('\t').map(|s| s.to_string()).collect();
    let rows = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
          let mut cells: Vec<String> = line.split('\t').map(|s| s.to_string()).collect();
          cells.resize(header.len().max(cells.len()), String::new());
          cells
        })
        .collect();
    TabularInput { header, rows }
  }

  fn column_index(&self, name: &str) -> Option<usize> {
    self.header.iter().position(|h| h == name)
  }

  fn cell<'a>(&'a self, row: &'a [String], name: &str) -> Option<&'a str> {
    self.column_index(name).and_then(|i| row.get(i)).map(String::as_str)
  }
}

pub struct AssembledRow {
  pub index: usize,
  pub hed_string: String,
  pub tree: Group,
  pub attributes: Vec<(String, String)>,
  pub onset: Option<f64>,
  pub duration: Option<f64>,
}

/// Assembles every row of `input` using `mapper` and `schema`, one result per input row. Row
/// order is preserved; see [`assemble`] for the ordered, flattened form.
pub fn assemble_rows(
  input: &TabularInput,
  mapper: &ColumnMapper,
  schema: &dyn Schema,
  definitions: &DefinitionDictionary,
  options: &AssemblyOptions,
) -> Vec<(AssembledRow, Vec<Issue>)> {
  input
      .rows
      .iter()
      .enumerate()
      .map(|(row_index, row)| assemble_one_row(input, row_index, row, mapper, schema, definitions, options))
      .collect()
}

/// Assembles all rows, then enforces the onset ordering contract: disordered rows are stably
/// re-sorted when `options.sort_rows_by_onset` is set and reported as `OnsetsNotOrdered`
/// otherwise. The flattened row list plus every collected issue.
pub fn assemble(
  input: &TabularInput,
  mapper: &ColumnMapper,
  schema: &dyn Schema,
  definitions: &DefinitionDictionary,
  options: &AssemblyOptions,
) -> (Vec<AssembledRow>, Vec<Issue>) {
  let mut rows = Vec::with_capacity(input.rows.len());
  let mut issues = Vec::new();
  for (row, row_issues) in assemble_rows(input, mapper, schema, definitions, options) {
    issues.extend(row_issues);
    rows.push(row);
  }

  if !onsets_are_ordered(&rows) {
    if options.sort_rows_by_onset {
      rows = sort_by_onset(rows);
    } else {
      crate::log::warning!(1, "rows are not sorted by onset");
      issues.push(Issue::new(HedError::OnsetsNotOrdered, ErrorContext::new()));
    }
  }
  (rows, issues)
}

fn assemble_one_row(
  input: &TabularInput,
  row_index: usize,
  row: &[String],
  mapper: &ColumnMapper,
  schema: &dyn Schema,
  definitions: &DefinitionDictionary,
  options: &AssemblyOptions,
) -> (AssembledRow, Vec<Issue>) {
  let mut issues = Vec::new();
  let mut ctx = ErrorContext::new();
  ctx.push(ContextFrame::Row(row_index));

  let onset = parse_numeric_attribute(input, row, &options.onset_column, &ctx, &mut issues);
  let duration = parse_numeric_attribute(input, row, &options.duration_column, &ctx, &mut issues);

  let empty_row = |issues: Vec<Issue>| {
    (
      AssembledRow {
        index: row_index,
        hed_string: String::new(),
        tree: Group::new_document(0),
        attributes: Vec::new(),
        onset,
        duration,
      },
      issues,
    )
  };

  let mut fragments: Vec<(String, String)> = Vec::new(); // (column, fragment)
  let mut attributes: Vec<(String, String)> = Vec::new();

  for (column, _) in mapper.final_map() {
    // The conventional HED column is appended wholesale below, not expanded per-cell.
    if *column == options.hed_column {
      continue;
    }
    let Some(cell_text) = input.cell(row, column) else { continue };
    match mapper.expand_column(column, cell_text, schema) {
      Ok(CellExpansion::Hed(fragment)) => fragments.push((column.clone(), fragment)),
      Ok(CellExpansion::Attribute(name, value)) => attributes.push((name, value)),
      // An empty expansion still occupies its column slot so a `{reference}` to it
      // substitutes as nothing rather than failing as unknown.
      Ok(CellExpansion::None) => fragments.push((column.clone(), String::new())),
      Err(mut issue) => {
        issue.context = ctx.clone();
        issues.push(issue);
      }
    }
  }

  let resolved: Vec<String> = match resolve_column_refs(&fragments) {
    Ok(list) => list,
    Err(err) => {
      crate::log::error!(0, "row {} failed to assemble: {}", row_index, err);
      issues.push(Issue::new(err, ctx.clone()));
      return empty_row(issues);
    }
  };

  let mut hed_string = join_string(resolved.into_iter().filter(|s| !s.trim().is_empty()), ", ");
  if let Some(existing_hed) = input.cell(row, &options.hed_column) {
    if !existing_hed.trim().is_empty() && !existing_hed.eq_ignore_ascii_case("n/a") {
      hed_string = if hed_string.is_empty() { existing_hed.to_string() } else { format!("{}, {}", hed_string, existing_hed) };
    }
  }

  if hed_string.trim().is_empty() {
    // Only a problem when nothing could have supplied HED material in the first place: a file
    // with a HED column or a bound HEDTags column legitimately has unannotated rows.
    let has_hed_source = input.column_index(&options.hed_column).is_some()
        || mapper.final_map().values().any(|m| matches!(m.category, ColumnCategory::HEDTags { .. }));
    if !has_hed_source {
      crate::log::warning!(1, "row {} assembled to a blank HED string", row_index);
      issues.push(Issue::new(HedError::BlankHEDString, ctx.clone()));
    }
    return empty_row(issues);
  }

  let (mut tree, parse_issues) = crate::parser::parse(&hed_string, Some(schema), Some(definitions));
  for mut issue in parse_issues {
    issue.context = ctx.clone();
    issues.push(issue);
  }

  match options.definition_handling {
    DefinitionHandling::Leave => {}
    DefinitionHandling::Expand => {
      let expand_issues = crate::definitions::expander::expand_defs(&mut tree, definitions, schema, options.validate_def_expand);
      for mut issue in expand_issues {
        issue.context = ctx.clone();
        issues.push(issue);
      }
    }
    DefinitionHandling::Shrink => {
      crate::definitions::expander::shrink_defs(&mut tree, definitions, schema);
    }
  }

  (AssembledRow { index: row_index, hed_string, tree, attributes, onset, duration }, issues)
}

fn parse_numeric_attribute(input: &TabularInput, row: &[String], name: &str, ctx: &ErrorContext, issues: &mut Vec<Issue>) -> Option<f64> {
  let raw = input.cell(row, name)?;
  let trimmed = raw.trim();
  if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
    return None;
  }
  match trimmed.parse::<f64>() {
    Ok(v) => Some(v),
    Err(_) => {
      issues.push(Issue::new(HedError::WrongHEDDataType { column: name.to_string(), value: raw.to_string() }, ctx.clone()));
      None
    }
  }
}

/// Resolves `{column}` references inside each column's own fragment against the other columns'
/// fragments for the same row. A column consumed by a reference contributes where it is
/// referenced, not standalone. A referenced column's fragment must not itself contain a `{...}`
/// reference: self-references and chains (which would otherwise need cycle detection) are both
/// rejected up front as `CircularColumnRef`.
fn resolve_column_refs<'a>(fragments: &'a [(String, String)]) -> Result<Vec<String>, HedError> {
  let lookup = |name: &str| fragments.iter().find(|(c, _)| c == name).map(|(_, f)| f.as_str());

  let mut referenced: Vec<&str> = Vec::new();
  for (column, fragment) in fragments {
    if fragment.contains(&format!("{{{}}}", column)) {
      return Err(HedError::CircularColumnRef { column: column.clone() });
    }
    let mut rest = fragment.as_str();
    while let Some(start) = rest.find('{') {
      let Some(len) = rest[start..].find('}') else { break };
      referenced.push(&rest[start + 1..start + len]);
      rest = &rest[start + len + 1..];
    }
  }

  let mut out = Vec::with_capacity(fragments.len());
  for (column, fragment) in fragments {
    if referenced.iter().any(|r| r == column) {
      continue;
    }
    out.push(substitute_refs(fragment, &lookup)?);
  }
  Ok(out)
}

fn substitute_refs<'a>(fragment: &str, lookup: &dyn Fn(&str) -> Option<&'a str>) -> Result<String, HedError> {
  let mut result = String::new();
  let mut chars = fragment.char_indices().peekable();
  while let Some((i, ch)) = chars.next() {
    if ch == '{' {
      if let Some(end) = fragment[i..].find('}') {
        let name = &fragment[i + 1..i + end];
        while chars.peek().map_or(false, |&(j, _)| j < i + end + 1) {
          chars.next();
        }
        match lookup(name) {
          Some(referenced) => {
            if referenced.contains('{') {
              return Err(HedError::CircularColumnRef { column: name.to_string() });
            }
            result.push_str(referenced);
          }
          None => return Err(HedError::UnknownColumnRef { column: name.to_string() }),
        }
        continue;
      }
    }
    result.push(ch);
  }
  Ok(prune_empty_groups(&result))
}

/// Removes parenthesized groups that became empty once a `{column}` reference resolved to
/// nothing.
fn prune_empty_groups(text: &str) -> String {
  let mut previous = text.to_string();
  loop {
    let next = previous.replace("(, ", "(").replace(", )", ")").replace("()", "");
    let next = collapse_dangling_commas(&next);
    if next == previous {
      return next;
    }
    previous = next;
  }
}

fn collapse_dangling_commas(text: &str) -> String {
  let mut result = String::with_capacity(text.len());
  for part in text.split(", ") {
    if part.is_empty() {
      continue;
    }
    if !result.is_empty() {
      result.push_str(", ");
    }
    result.push_str(part);
  }
  result
}

/// Whether `rows`' onsets form a non-decreasing finite sequence. `None` onsets are treated as
/// not participating in ordering.
pub fn onsets_are_ordered(rows: &[AssembledRow]) -> bool {
  let mut last = f64::NEG_INFINITY;
  for row in rows {
    if let Some(onset) = row.onset {
      if onset.is_nan() || onset < last {
        return false;
      }
      last = onset;
    }
  }
  true
}

/// A stable sort by onset (rows without an onset keep their relative position at the end),
/// preserving original row indices for diagnostics.
pub fn sort_by_onset(rows: Vec<AssembledRow>) -> Vec<AssembledRow> {
  let mut rows = rows;
  rows.sort_by(|a, b| match (a.onset, b.onset) {
    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
    (Some(_), None) => std::cmp::Ordering::Less,
    (None, Some(_)) => std::cmp::Ordering::Greater,
    (None, None) => std::cmp::Ordering::Equal,
  });
  rows
}
