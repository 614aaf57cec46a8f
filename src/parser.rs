/*!

The parser: a single-pass tokenizer over raw HED string text that produces a `Group` tree
directly, rather than a separate token stream feeding a second tree-building pass. Delimiters are
`(`, `)`, and `,`; everything else accumulates into a tag's source-text span. Commas are
permissive — runs of commas, and commas adjacent to a parenthesis, collapse to nothing rather
than producing an error.

Unmatched delimiters are reported with the span of the offending character, one `Issue` per
problem, so a caller can point a user at the exact byte. Parsing never panics on malformed input;
the worst outcome is a list of issues and a best-effort partial tree.

*/

use crate::definitions::DefinitionDictionary;
use crate::error::{ErrorContext, HedError, Issue};
use crate::group::{Group, NodeId};
use crate::schema::Schema;
use crate::tag::Tag;

/// Parses `text` into a `Group` (the HED String is just its root). Schema resolution happens
/// inline as each tag is built, the same single pass, so a `Tag`'s cached canonical forms are
/// already populated by the time parsing finishes.
pub fn parse(text: &str, schema: Option<&dyn Schema>, defs: Option<&DefinitionDictionary>) -> (Group, Vec<Issue>) {
  let mut group = Group::new_document(text.len());
  let mut issues = Vec::new();
  let mut stack: Vec<NodeId> = vec![group.root()];

  let mut pending_start: Option<usize> = None;
  let mut pending_last_non_ws: usize = 0;

  let flush = |group: &mut Group, stack: &[NodeId], pending_start: &mut Option<usize>, pending_last_non_ws: usize, issues: &mut Vec<Issue>| {
    if let Some(start) = pending_start.take() {
      let end = pending_last_non_ws + 1;
      if end > start {
        let span = (start, end);
        let slice = &text[start..end];
        match Tag::new(slice, span, schema, defs) {
          Ok(tag) => {
            let parent = *stack.last().expect("group stack is never empty while parsing");
            if let Err(err) = group.insert_tag(parent, tag) {
              issues.push(Issue::new(err, ErrorContext::new()).with_span(span));
            }
          }
          Err(err) => issues.push(Issue::new(err, ErrorContext::new()).with_span(span)),
        }
      }
    }
  };

  for (i, ch) in text.char_indices() {
    match ch {
      '(' => {
        flush(&mut group, &stack, &mut pending_start, pending_last_non_ws, &mut issues);
        let parent = *stack.last().expect("group stack is never empty while parsing");
        let new_group = group.insert_group(parent, (i, i + 1)).expect("parent is always a group while parsing");
        stack.push(new_group);
      }
      ')' => {
        flush(&mut group, &stack, &mut pending_start, pending_last_non_ws, &mut issues);
        if stack.len() <= 1 {
          issues.push(Issue::new(HedError::UnmatchedClose { span: (i, i + 1) }, ErrorContext::new()).with_span((i, i + 1)));
        } else {
          let closed = stack.pop().unwrap();
          let start = group.span(closed).0;
          if let crate::group::NodeData::Group(g) = group.node_mut(closed) {
            g.span = (start, i + 1);
          }
          if group.children(closed).is_empty() {
            let parent = *stack.last().unwrap();
            let _ = group.remove(parent, &[closed]);
          }
        }
      }
      ',' => {
        flush(&mut group, &stack, &mut pending_start, pending_last_non_ws, &mut issues);
      }
      c if c.is_whitespace() => {}
      _ => {
        if pending_start.is_none() {
          pending_start = Some(i);
        }
        pending_last_non_ws = i + ch.len_utf8() - 1;
      }
    }
  }
  flush(&mut group, &stack, &mut pending_start, pending_last_non_ws, &mut issues);

  if stack.len() > 1 {
    let unclosed = stack[1];
    let span = group.span(unclosed);
    issues.push(Issue::new(HedError::UnmatchedOpen { span }, ErrorContext::new()).with_span(span));
  }

  (group, issues)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::memory_schema::test_fixture_schema;

  #[test]
  fn parses_flat_tag_list() {
    let schema = test_fixture_schema();
    let (group, issues) = parse("Red, Blue, Green", Some(&schema), None);
    assert!(issues.is_empty());
    assert_eq!(group.tags(group.root()).len(), 3);
  }

  #[test]
  fn permissive_comma_runs_collapse() {
    let schema = test_fixture_schema();
    let (group, issues) = parse("Red,,, Blue", Some(&schema), None);
    assert!(issues.is_empty());
    assert_eq!(group.tags(group.root()).len(), 2);
  }

  #[test]
  fn unmatched_close_is_reported_with_span() {
    let schema = test_fixture_schema();
    let (_, issues) = parse("Red)", Some(&schema), None);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].error, HedError::UnmatchedClose { span: (3, 4) });
  }

  #[test]
  fn unmatched_open_is_reported() {
    let schema = test_fixture_schema();
    let (_, issues) = parse("(Red, Blue", Some(&schema), None);
    assert_eq!(issues.len(), 1);
    assert!(matches!(issues[0].error, HedError::UnmatchedOpen { .. }));
  }

  #[test]
  fn empty_parens_are_pruned_not_reported() {
    let schema = test_fixture_schema();
    let (group, issues) = parse("Red, (), Blue", Some(&schema), None);
    assert!(issues.is_empty());
    assert!(group.groups(group.root()).is_empty());
  }

  #[test]
  fn nested_groups_parse_correctly() {
    let schema = test_fixture_schema();
    let (group, issues) = parse("Red, (Blue, (Green, Yellow))", Some(&schema), None);
    assert!(issues.is_empty());
    let outer = group.groups(group.root());
    assert_eq!(outer.len(), 1);
    let inner = group.groups(outer[0]);
    assert_eq!(inner.len(), 1);
    assert_eq!(group.tags(inner[0]).len(), 2);
  }
}
