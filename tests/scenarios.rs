//! End-to-end checks of the annotation core: parsing, definitions, column mapping, row
//! assembly, temporal reconstruction, and search, plus table-driven round-trip, equivalence,
//! duality, and purity checks. Each test is a minimal, hand-written HED string rather than a
//! combinatorial grid.

use hed_core::definitions::expander::{expand_defs, remove_definitions, shrink_defs};
use hed_core::definitions::DefinitionDictionary;
use hed_core::error::HedError;
use hed_core::events::EventManager;
use hed_core::group::RenderMode;
use hed_core::parser::parse;
use hed_core::query::search;
use hed_core::schema::memory_schema::test_fixture_schema;
use hed_core::schema::Schema;
use hed_core::sidecar::mapper::{CellExpansion, ColumnMapper, ColumnMapperConfig};
use hed_core::sidecar::Sidecar;
use hed_core::tabular::{assemble, AssemblyOptions, TabularInput};
use hed_core::tag::Tag;

fn dictionary_from(schema: &dyn Schema, text: &str) -> DefinitionDictionary {
  let (doc, parse_issues) = parse(text, Some(schema), None);
  assert!(parse_issues.is_empty(), "{:?}", parse_issues);
  let mut dict = DefinitionDictionary::new();
  let issues = dict.check_for_definitions(&doc);
  assert!(issues.is_empty(), "{:?}", issues);
  dict
}

#[test]
fn parser_builds_nested_groups() {
  let schema = test_fixture_schema();
  let (doc, issues) = parse("Red, (Blue, (Green, Yellow)), Purple", Some(&schema), None);
  assert!(issues.is_empty(), "{:?}", issues);

  let top_children = doc.children(doc.root());
  assert_eq!(top_children.len(), 3);

  let outer_group = doc.groups(doc.root());
  assert_eq!(outer_group.len(), 1);
  let inner_group = doc.groups(outer_group[0]);
  assert_eq!(inner_group.len(), 1);
  assert_eq!(doc.tags(inner_group[0]).len(), 2);
}

#[test]
fn definition_expand_then_shrink_round_trips() {
  let schema = test_fixture_schema();
  let dict = dictionary_from(&schema, "(Definition/Blink, (Eye-blink))");

  let (mut doc, issues) = parse("Def/Blink, Red", Some(&schema), None);
  assert!(issues.is_empty(), "{:?}", issues);

  let expand_issues = expand_defs(&mut doc, &dict, &schema, true);
  assert!(expand_issues.is_empty(), "{:?}", expand_issues);
  assert_eq!(doc.render(doc.root(), RenderMode::Short), "(Def-expand/Blink, (Eye-blink)), Red");

  shrink_defs(&mut doc, &dict, &schema);
  assert_eq!(doc.render(doc.root(), RenderMode::Short), "Def/Blink, Red");
}

#[test]
fn placeholder_definition_substitutes_value() {
  let schema = test_fixture_schema();
  let dict = dictionary_from(&schema, "(Definition/Delay/#, (Delay/# ms))");

  let (mut doc, issues) = parse("Def/Delay/250", Some(&schema), None);
  assert!(issues.is_empty(), "{:?}", issues);

  let expand_issues = expand_defs(&mut doc, &dict, &schema, true);
  assert!(expand_issues.is_empty(), "{:?}", expand_issues);
  assert_eq!(doc.render(doc.root(), RenderMode::Short), "(Def-expand/Delay/250, (Delay/250 ms))");
}

#[test]
fn categorical_column_expands_misses_and_blanks() {
  let schema = test_fixture_schema();
  let json = r#"{"trial_type": {"HED": {"go": "Action/Move", "stop": "Action/Inhibit"}}}"#;
  let (sidecar, issues) = Sidecar::from_json(json, &schema).unwrap();
  assert!(issues.is_empty(), "{:?}", issues);

  let mut mapper = ColumnMapper::new(ColumnMapperConfig::default());
  let finalize_issues = mapper.finalize(&sidecar, &["trial_type".to_string()]);
  assert!(finalize_issues.is_empty(), "{:?}", finalize_issues);

  match mapper.expand_column("trial_type", "go", &schema).unwrap() {
    CellExpansion::Hed(fragment) => assert_eq!(fragment, "Action/Move"),
    _ => panic!("expected a HED fragment"),
  }
  assert!(matches!(mapper.expand_column("trial_type", "n/a", &schema).unwrap(), CellExpansion::None));

  let err = mapper.expand_column("trial_type", "unknown", &schema).unwrap_err();
  assert_eq!(
    err.error,
    HedError::SidecarKeyMissing {
      column: "trial_type".to_string(),
      key: "unknown".to_string(),
      known: vec!["go".to_string(), "stop".to_string()],
    }
  );
}

#[test]
fn column_references_substitute_and_prune_empty_groups() {
  let schema = test_fixture_schema();
  let json = r#"{"cue": {"HED": {"x": "({column2}, ({column3}, {column4})), Event"}}}"#;
  let (sidecar, issues) = Sidecar::from_json(json, &schema).unwrap();
  assert!(issues.is_empty(), "{:?}", issues);

  let mut config = ColumnMapperConfig::default();
  config.tag_columns = vec!["column2".to_string(), "column3".to_string(), "column4".to_string()];
  let mut mapper = ColumnMapper::new(config);
  let header: Vec<String> =
      ["onset", "cue", "column2", "column3", "column4"].iter().map(|s| s.to_string()).collect();
  let finalize_issues = mapper.finalize(&sidecar, &header);
  assert!(finalize_issues.is_empty(), "{:?}", finalize_issues);

  let input = TabularInput::from_tsv("onset\tcue\tcolumn2\tcolumn3\tcolumn4\n0.5\tx\tRed\tn/a\tn/a");
  let defs = DefinitionDictionary::new();
  let (rows, issues) = assemble(&input, &mapper, &schema, &defs, &AssemblyOptions::default());
  assert!(issues.is_empty(), "{:?}", issues);
  assert_eq!(rows[0].hed_string, "(Red), Event");
}

#[test]
fn duration_marks_context_on_rows_it_spans() {
  let schema = test_fixture_schema();
  let defs = DefinitionDictionary::new();

  let (doc0, _) = parse("(Duration/3.0 s, (Black))", Some(&schema), None);
  let (doc1, _) = parse("Red", Some(&schema), None);
  let (doc2, _) = parse("Blue", Some(&schema), None);
  let (doc3, _) = parse("Green", Some(&schema), None);

  let rows = vec![(1.0, doc0), (2.0, doc1), (3.0, doc2), (5.0, doc3)];
  let mut manager = EventManager::new(&schema, &defs);
  let (events, issues) = manager.process(&rows).unwrap();
  assert!(issues.is_empty(), "{:?}", issues);

  assert_eq!(events[1].context.trim(), "(Black)");
  assert_eq!(events[2].context.trim(), "(Black)");
  assert!(events[3].context.trim().is_empty());
}

#[test]
fn unmatched_offset_is_reported() {
  let schema = test_fixture_schema();
  let defs = DefinitionDictionary::new();
  let (doc0, _) = parse("(Offset)", Some(&schema), None);
  let mut manager = EventManager::new(&schema, &defs);
  let (_, issues) = manager.process(&[(0.0, doc0)]).unwrap();
  assert_eq!(issues.len(), 1);
  assert!(matches!(issues[0].error, HedError::UnmatchedOffset { .. }));
}

#[test]
fn query_matches_direct_and_compound_group_sets() {
  let schema = test_fixture_schema();
  let (doc, _) = parse("((A, B), (C, D))", Some(&schema), None);

  let direct = search(&doc, "[[a, b]]").unwrap();
  assert_eq!(direct.len(), 1);
  assert_eq!(doc.render(direct[0], RenderMode::Short), "(A, B)");

  let compound = search(&doc, "[[a]] and [[d]]").unwrap();
  let rendered: Vec<String> = compound.iter().map(|&g| doc.render(g, RenderMode::Short)).collect();
  assert_eq!(compound.len(), 2);
  assert!(rendered.contains(&"(A, B)".to_string()));
  assert!(rendered.contains(&"(C, D)".to_string()));
}

/// Parse-render round trip and definition-removal purity, checked over a small hand-written
/// table rather than a combinatorial grid.
#[test]
fn round_trip_and_definition_purity_hold_for_sample_strings() {
  let schema = test_fixture_schema();
  let samples = [
    "Red",
    "Red, Blue",
    "(Red, Blue)",
    "Red, (Blue, Green)",
    "Delay/250, (Duration/3.0 s, (Black))",
  ];

  for text in samples {
    let (doc, issues) = parse(text, Some(&schema), None);
    assert!(issues.is_empty(), "{}: {:?}", text, issues);
    assert_eq!(doc.render(doc.root(), RenderMode::Original), text);
    assert!(doc.check_invariants());
  }

  let (mut with_def, issues) = parse("(Definition/MyBlink, (Eye-blink)), Red, Def/MyBlink", Some(&schema), None);
  assert!(issues.is_empty(), "{:?}", issues);
  remove_definitions(&mut with_def);
  let rendered = with_def.render(with_def.root(), RenderMode::Short);
  assert_eq!(rendered, "Red, Def/MyBlink");
  assert!(!rendered.contains("Definition"));
  assert!(with_def.check_invariants());
}

/// Parsing a tag's long form and short form against the same schema yields the same schema
/// entry and extension.
#[test]
fn short_and_long_forms_resolve_identically() {
  let schema = test_fixture_schema();
  let samples = ["Red", "Delay/250", "Eye-blink", "Duration/3.0 s"];

  for text in samples {
    let tag = Tag::new(text, (0, text.len()), Some(&schema), None).unwrap();
    let from_long = Tag::new(tag.long_tag(), (0, tag.long_tag().len()), Some(&schema), None).unwrap();
    let from_short = Tag::new(tag.short_tag(), (0, tag.short_tag().len()), Some(&schema), None).unwrap();
    assert_eq!(from_long.schema_entry, from_short.schema_entry, "{}", text);
    assert_eq!(from_long.extension(), from_short.extension(), "{}", text);
  }
}

/// shrink(expand(H)) == H and expand(shrink(expand(H))) == expand(H), compared on rendered
/// short form (tree equality modulo group identity).
#[test]
fn expand_shrink_duality_holds() {
  let schema = test_fixture_schema();
  let dict = dictionary_from(&schema, "(Definition/Blink, (Eye-blink)), (Definition/Wait/#, (Delay/# ms))");

  let source = "Red, Def/Blink, (Blue, Def/Wait/40)";
  let (original, issues) = parse(source, Some(&schema), None);
  assert!(issues.is_empty(), "{:?}", issues);
  let original_rendered = original.render(original.root(), RenderMode::Short);

  let mut expanded = original.deep_copy();
  assert!(expand_defs(&mut expanded, &dict, &schema, true).is_empty());
  let expanded_rendered = expanded.render(expanded.root(), RenderMode::Short);
  assert!(expanded.check_invariants());

  let mut shrunk = expanded.deep_copy();
  shrink_defs(&mut shrunk, &dict, &schema);
  assert_eq!(shrunk.render(shrunk.root(), RenderMode::Short), original_rendered);
  assert!(shrunk.check_invariants());

  assert!(expand_defs(&mut shrunk, &dict, &schema, true).is_empty());
  assert_eq!(shrunk.render(shrunk.root(), RenderMode::Short), expanded_rendered);
}

/// `A and B` holds iff both hold, `~A` holds iff `A` does not.
#[test]
fn query_connectives_agree_with_their_operands() {
  let schema = test_fixture_schema();
  let (doc, _) = parse("(Red, (Blue)), Green", Some(&schema), None);

  let red = !search(&doc, "red").unwrap().is_empty();
  let blue = !search(&doc, "blue").unwrap().is_empty();
  let purple = !search(&doc, "purple").unwrap().is_empty();

  assert_eq!(!search(&doc, "red and blue").unwrap().is_empty(), red && blue);
  assert_eq!(!search(&doc, "red and purple").unwrap().is_empty(), red && purple);
  assert_eq!(!search(&doc, "red or purple").unwrap().is_empty(), red || purple);
  assert_eq!(!search(&doc, "~purple").unwrap().is_empty(), !purple);
  assert_eq!(!search(&doc, "~red").unwrap().is_empty(), !red);
}
