/*!

Typed visitor capabilities for running checks over parsed HED material. A `TagVisitor` receives
each tag in a document; a `StringVisitor` receives the whole document. Callers compose the two
explicitly through [`visit_document`], so a pipeline of checks is a typed list rather than a
runtime switch over "is this a tag operation or a string operation".

Both visitor kinds return diagnostics rather than failing: a visitor that finds nothing wrong
returns an empty list, and the caller concatenates whatever every visitor reported.

*/

use crate::definitions::DefinitionDictionary;
use crate::error::{ErrorContext, HedError, Issue};
use crate::group::Group;
use crate::schema::Schema;
use crate::tag::Tag;

/// A check applied to every tag of a document, in depth-first order.
pub trait TagVisitor {
  fn visit_tag(&mut self, tag: &Tag, context: &ErrorContext) -> Vec<Issue>;
}

/// A check (or harvest) applied once to a whole document.
pub trait StringVisitor {
  fn visit_string(&mut self, document: &Group, context: &ErrorContext) -> Vec<Issue>;
}

/// Runs every string visitor over `document`, then every tag visitor over each of its tags.
/// `context` is the caller's current error-context stack, snapshotted into each issue.
pub fn visit_document(
  document: &Group,
  context: &ErrorContext,
  tag_visitors: &mut [&mut dyn TagVisitor],
  string_visitors: &mut [&mut dyn StringVisitor],
) -> Vec<Issue> {
  let mut issues = Vec::new();
  for visitor in string_visitors.iter_mut() {
    issues.extend(visitor.visit_string(document, context));
  }
  if !tag_visitors.is_empty() {
    for tag_id in document.all_tags(document.root()) {
      let Some(tag) = document.tag(tag_id) else { continue };
      for visitor in tag_visitors.iter_mut() {
        issues.extend(visitor.visit_tag(tag, context));
      }
    }
  }
  issues
}

/// Reports tags the schema could not identify (`UnresolvedTag`), extensions on tags that allow
/// none (`ExtensionNotAllowed`), unit-class extensions matching no known unit (`InvalidUnit`),
/// and numeric-class values that fail to parse (`InvalidValueClass`). Placeholder tags are
/// exempt: a `#` is a template slot, not a value.
pub struct SchemaComplianceChecker<'a> {
  schema: &'a dyn Schema,
}

impl<'a> SchemaComplianceChecker<'a> {
  pub fn new(schema: &'a dyn Schema) -> Self {
    SchemaComplianceChecker { schema }
  }
}

impl TagVisitor for SchemaComplianceChecker<'_> {
  fn visit_tag(&mut self, tag: &Tag, context: &ErrorContext) -> Vec<Issue> {
    let mut issues = Vec::new();
    if tag.is_placeholder() {
      return issues;
    }

    let Some(entry_id) = tag.schema_entry else {
      issues.push(Issue::new(HedError::UnresolvedTag { text: tag.org_tag().to_string() }, context.clone()).with_span(tag.span));
      return issues;
    };

    if !tag.extension().is_empty() && !tag.is_takes_value_tag() && !tag.is_extension_allowed_tag() {
      issues.push(Issue::new(HedError::ExtensionNotAllowed { tag: tag.org_tag().to_string() }, context.clone()).with_span(tag.span));
      return issues;
    }

    if tag.is_takes_value_tag() && !tag.extension().is_empty() {
      let (value, unit) = tag.get_stripped_unit_value();
      if tag.is_unit_class_tag() && unit.is_none() && value.parse::<f64>().is_err() {
        issues.push(
          Issue::new(HedError::InvalidUnit { extension: tag.extension().to_string() }, context.clone()).with_span(tag.span),
        );
      }
      let is_numeric_class = self.schema.value_classes(entry_id).keys().any(|name| name.as_ref() == "numericClass");
      if is_numeric_class && value.parse::<f64>().is_err() {
        issues.push(
          Issue::new(HedError::InvalidValueClass { extension: tag.extension().to_string() }, context.clone()).with_span(tag.span),
        );
      }
    }

    issues
  }
}

/// Folds every `Definition/...` group found in visited documents into one dictionary, carrying
/// the caller's context into each collected issue. Used by the Sidecar loader, where the same
/// dictionary accumulates across every HED fragment of every column.
pub struct DefinitionHarvester<'a> {
  dictionary: &'a mut DefinitionDictionary,
}

impl<'a> DefinitionHarvester<'a> {
  pub fn new(dictionary: &'a mut DefinitionDictionary) -> Self {
    DefinitionHarvester { dictionary }
  }
}

impl StringVisitor for DefinitionHarvester<'_> {
  fn visit_string(&mut self, document: &Group, context: &ErrorContext) -> Vec<Issue> {
    let mut issues = self.dictionary.check_for_definitions(document);
    for issue in &mut issues {
      if issue.context.frames().is_empty() {
        issue.context = context.clone();
      }
    }
    issues
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::schema::memory_schema::test_fixture_schema;

  fn check(text: &str) -> Vec<HedError> {
    let schema = test_fixture_schema();
    let (doc, parse_issues) = parse(text, Some(&schema), None);
    assert!(parse_issues.is_empty(), "{:?}", parse_issues);
    let mut checker = SchemaComplianceChecker::new(&schema);
    visit_document(&doc, &ErrorContext::new(), &mut [&mut checker], &mut [])
        .into_iter()
        .map(|issue| issue.error)
        .collect()
  }

  #[test]
  fn clean_string_reports_nothing() {
    assert!(check("Red, (Blue, Delay/250)").is_empty());
  }

  #[test]
  fn unidentifiable_tag_is_unresolved() {
    let errors = check("Red, Mystery-tag");
    assert_eq!(errors, vec![HedError::UnresolvedTag { text: "Mystery-tag".to_string() }]);
  }

  #[test]
  fn extension_on_a_plain_tag_is_rejected() {
    let errors = check("Red/darker");
    assert_eq!(errors, vec![HedError::ExtensionNotAllowed { tag: "Red/darker".to_string() }]);
  }

  #[test]
  fn unit_class_extension_without_a_known_unit_is_invalid() {
    let errors = check("Duration/3.0 parsecs");
    assert_eq!(errors, vec![HedError::InvalidUnit { extension: "3.0 parsecs".to_string() }]);
  }

  #[test]
  fn numeric_class_value_must_parse() {
    let errors = check("Delay/fast");
    assert_eq!(errors, vec![HedError::InvalidValueClass { extension: "fast".to_string() }]);
  }

  #[test]
  fn placeholders_are_exempt_from_value_checks() {
    assert!(check("Delay/#").is_empty());
  }

  #[test]
  fn harvester_collects_definitions_with_the_callers_context() {
    let schema = test_fixture_schema();
    let (doc, _) = parse("(Definition/Blink, (Eye-blink)), (Definition/Blink, (Red))", Some(&schema), None);

    let mut dictionary = DefinitionDictionary::new();
    let mut harvester = DefinitionHarvester::new(&mut dictionary);
    let mut context = ErrorContext::new();
    context.push(crate::error::ContextFrame::SidecarColumn("trial_type".to_string()));

    let issues = visit_document(&doc, &context, &mut [], &mut [&mut harvester]);
    assert_eq!(dictionary.len(), 1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].error, HedError::DuplicateDefinition { name: "Blink".to_string() });
    assert_eq!(issues[0].context, context);
  }
}
