/*!

The definition expander: rewrites `Def/name` and `Def/name/value` tags into
`(Def-expand/name, (body))` groups, and the reverse — shrinking a `Def-expand` group back down
to its bare `Def` tag — without ever consulting the dictionary again once a body has been
attached. A `Def-expand` group whose body does not match the dictionary's canonical body for
that name is reported as `DefExpandInvalid`, not silently trusted or silently repaired.

Both directions use [`Group::replace_in_place`] to swap a node's content while keeping its slot's
identity: expanding turns a `Def` tag's own slot into a two-child group (`Def-expand` tag plus a
freshly spliced-in body copy); shrinking turns a `(Def-expand/name, (body))` group's slot back
into a bare tag. Neither direction touches the enclosing group's child list, so no pruning or
reparenting bookkeeping is needed.

`Def` expansion is one-way text growth: the body is deep-copied fresh out of the dictionary on
every expansion, so two expansions of the same definition in the same document never alias any
node.

*/

use crate::definitions::{DefinitionDictionary, DefinitionEntry};
use crate::error::{ErrorContext, HedError, Issue};
use crate::group::{Group, NodeData, NodeId, RenderMode};
use crate::schema::Schema;
use crate::tag::Tag;

/// Replaces every `Def/name` (and `Def/name/value`) tag in `document` with a
/// `(Def-expand/name, (body))` group. If `validate` is true, a `Def-expand` tag already present
/// is checked against the dictionary's current body and reported as `DefExpandInvalid` if they
/// disagree; expansion always proceeds using the dictionary's version for a bare `Def` tag.
pub fn expand_defs(document: &mut Group, dictionary: &DefinitionDictionary, schema: &dyn Schema, validate: bool) -> Vec<Issue> {
  let mut issues = Vec::new();

  for (def_tag, def_expand_group, _enclosing) in document.find_def_tags(document.root(), true) {
    let Some(tag) = document.tag(def_tag) else { continue };
    let base = tag.short_base_tag().to_lowercase();
    let name = tag.extension().split('/').next().unwrap_or("").to_string();
    let value = tag.extension().splitn(2, '/').nth(1).map(|s| s.to_string());

    let Some(entry) = dictionary.get_definition(&name) else {
      issues.push(Issue::new(HedError::DefUnmatched { name: name.clone() }, ErrorContext::new()));
      continue;
    };

    if entry.takes_value && value.is_none() {
      issues.push(Issue::new(HedError::DefValueMissing { name: name.clone() }, ErrorContext::new()));
      continue;
    }
    if !entry.takes_value && value.is_some() {
      issues.push(Issue::new(HedError::DefValueExtra { name: name.clone() }, ErrorContext::new()));
      continue;
    }

    if base == "def-expand" {
      if validate {
        if let Ok((_, mut expected_body)) = dictionary.expand(&name, value.as_deref(), schema) {
          expected_body.sort_children_canonical();
          let expected = expected_body.render(expected_body.root(), RenderMode::Long);
          let actual = document
              .groups(def_expand_group)
              .first()
              .map(|&g| {
                let mut copy = Group::new_document(0);
                let root = copy.splice_in_subtree(document, g);
                copy.set_root(root);
                copy.sort_children_canonical();
                copy.render(copy.root(), RenderMode::Long)
              })
              .unwrap_or_default();
          if actual != expected {
            issues.push(Issue::new(HedError::DefExpandInvalid { name: name.clone() }, ErrorContext::new()));
          }
        }
      }
      continue;
    }

    // base == "def": replace this tag's own slot with a (Def-expand/name, (body)) group. The
    // arity pre-checks above guarantee the dictionary expansion cannot fail on arity.
    let body = match dictionary.expand(&name, value.as_deref(), schema) {
      Ok((_, body)) => body,
      Err(issue) => {
        issues.push(issue);
        continue;
      }
    };

    let span = document.span(def_tag);
    let mut expanded_tag = tag.clone();
    if let Err(err) = expanded_tag.set_short_tag("Def-expand", schema) {
      issues.push(Issue::new(err, ErrorContext::new()));
      continue;
    }

    let new_tag_id = document.alloc_tag(expanded_tag);
    let body_root = document.splice_in_subtree(&body, body.root());
    let parent = document.parent_of(def_tag);
    let group_id = document.alloc_group(vec![new_tag_id, body_root], parent, span);
    // `alloc_group` returns the id of an already-inserted node; fold its content into
    // `def_tag`'s slot and tombstone the now-unreachable extra slot.
    let node = document.take_node(group_id);
    let _ = document.replace_in_place(def_tag, node);
  }

  issues
}

/// Replaces every well-formed `(Def-expand/name, (body))` group back with a bare `Def/name`
/// (or `Def/name/value`) tag, keeping the group's own slot identity.
pub fn shrink_defs(document: &mut Group, dictionary: &DefinitionDictionary, schema: &dyn Schema) {
  for (def_tag, def_expand_group, _enclosing) in document.find_def_tags(document.root(), true) {
    let Some(tag) = document.tag(def_tag) else { continue };
    if tag.short_base_tag().to_lowercase() != "def-expand" {
      continue;
    }
    let name = tag.extension().split('/').next().unwrap_or("").to_string();
    if dictionary.get_definition(&name).is_none() {
      continue;
    }
    let mut shrunk = tag.clone();
    if shrunk.set_short_tag("Def", schema).is_err() {
      continue;
    }
    let _ = document.replace_in_place(def_expand_group, NodeData::Tag(shrunk));
  }
}

/// Removes every top-level `(Definition/name, (body))` group from `document` outright. Unlike
/// [`shrink_defs`], this does not touch `Def`/`Def-expand` usages elsewhere in the string — it
/// only deletes the declaration groups themselves, leaving every other tag untouched.
pub fn remove_definitions(document: &mut Group) {
  let declaration_groups: Vec<NodeId> = document
      .groups(document.root())
      .into_iter()
      .filter(|&g| !document.find_tags(g, &["Definition"], false, 0).is_empty())
      .collect();
  if !declaration_groups.is_empty() {
    let _ = document.remove(document.root(), &declaration_groups);
  }
}

/// Reconstructs definitions from `Def-expand/name/value` usage alone, for names the dictionary
/// has no `Definition/...` declaration for. Bodies across occurrences of the same name are
/// unified tag-by-tag; the one position whose tag text varies 1-to-1 with the usage's value is
/// the placeholder. Zero or more than one such position is `AmbiguousDefinition`.
pub fn gather_ambiguous_defs(document: &Group, dictionary: &DefinitionDictionary, schema: &dyn Schema) -> (Vec<DefinitionEntry>, Vec<Issue>) {
  let mut by_name: std::collections::HashMap<String, Vec<(Option<String>, NodeId)>> = std::collections::HashMap::new();

  for (def_tag, def_expand_group, _enclosing) in document.find_def_tags(document.root(), true) {
    let Some(tag) = document.tag(def_tag) else { continue };
    if tag.short_base_tag().to_lowercase() != "def-expand" {
      continue;
    }
    let name = tag.extension().split('/').next().unwrap_or("").to_string();
    if dictionary.get_definition(&name).is_some() {
      continue;
    }
    let value = tag.extension().splitn(2, '/').nth(1).map(|s| s.to_string());
    let Some(&body_group) = document.groups(def_expand_group).first() else { continue };
    by_name.entry(name).or_default().push((value, body_group));
  }

  let mut entries = Vec::new();
  let mut issues = Vec::new();
  for (name, occurrences) in by_name {
    match unify_occurrences(document, &name, &occurrences, schema) {
      Ok(entry) => entries.push(entry),
      Err(issue) => issues.push(issue),
    }
  }
  (entries, issues)
}

/// Unifies every occurrence's body into one template, locating the placeholder position. A lone
/// occurrence needs no unification: its body (and value, if any) is taken verbatim.
fn unify_occurrences(document: &Group, name: &str, occurrences: &[(Option<String>, NodeId)], schema: &dyn Schema) -> Result<DefinitionEntry, Issue> {
  let ctx = ErrorContext::new();

  if occurrences.len() == 1 {
    let (value, body_group) = &occurrences[0];
    let mut body = Group::new_document(0);
    let spliced_root = body.splice_in_subtree(document, *body_group);
    body.set_root(spliced_root);
    return Ok(DefinitionEntry { name: name.to_string(), body, takes_value: value.is_some() });
  }

  let tag_lists: Vec<Vec<NodeId>> = occurrences.iter().map(|&(_, g)| document.all_tags(g)).collect();
  let len = tag_lists[0].len();
  if len == 0 || tag_lists.iter().any(|t| t.len() != len) {
    return Err(Issue::new(HedError::AmbiguousDefinition { name: name.to_string() }, ctx));
  }

  let mut placeholder_position = None;
  for i in 0..len {
    let extensions: Vec<&str> = tag_lists.iter().map(|t| document.tag(t[i]).map_or("", |tag| tag.extension())).collect();
    if extensions.windows(2).all(|w| w[0] == w[1]) {
      continue;
    }
    let matches_values = occurrences.iter().zip(&extensions).all(|((value, _), ext)| value.as_deref() == Some(*ext));
    if !matches_values || placeholder_position.is_some() {
      return Err(Issue::new(HedError::AmbiguousDefinition { name: name.to_string() }, ctx));
    }
    placeholder_position = Some(i);
  }

  let Some(position) = placeholder_position else {
    return Err(Issue::new(HedError::AmbiguousDefinition { name: name.to_string() }, ctx));
  };

  let (first_value, template_group) = &occurrences[0];
  let mut body = Group::new_document(0);
  let spliced_root = body.splice_in_subtree(document, *template_group);
  body.set_root(spliced_root);

  let body_tags = body.all_tags(body.root());
  let Some(&placeholder_id) = body_tags.get(position) else {
    return Err(Issue::new(HedError::AmbiguousDefinition { name: name.to_string() }, ctx));
  };
  if let Some(t) = body.tag_mut(placeholder_id) {
    let value = first_value.clone().unwrap_or_default();
    let template_text = t.source_text.replacen(&value, "#", 1);
    if let Ok(placeholder_tag) = Tag::new(&template_text, t.span, Some(schema), None) {
      *t = placeholder_tag;
    }
  }

  Ok(DefinitionEntry { name: name.to_string(), body, takes_value: true })
}
