/*!

The tag tree: a parenthesized tree of tags and nested groups with node identity (two groups
with identical contents are not the same group) and weak, non-owning parent links. This is
realized as an arena of nodes addressed by small `Copy` indices rather than as a web of
`Rc<RefCell<_>>` pointers: an edit replaces or removes by `Index<NodeData>`, which *is* the
node's identity, and a parent link is simply `Option<Index<NodeData>>`.

A `Group` owns one whole document: the top-level HED String is the group whose root has no
parent and whose span covers the entire source. A `Group` is also how a Definition Entry stores
its body — a self-contained document in its own right, spliced into a host group wherever it is
expanded.

*/

use std::collections::HashMap;

use crate::abstractions::{join_string, Set};
use crate::arena::{Arena, Index};
use crate::error::HedError;
use crate::tag::{Span, Tag};

pub type NodeId = Index<NodeData>;

#[derive(Clone, Debug)]
pub enum NodeData {
  Tag(Tag),
  Group(GroupData),
}

#[derive(Clone, Debug)]
pub struct GroupData {
  pub(crate) children: Vec<NodeId>,
  pub(crate) parent: Option<NodeId>,
  pub(crate) span: Span,
}

/// How to render each tag when serializing a group back to text.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum RenderMode {
  /// Whatever form the tag was originally written in (its `org_tag`).
  #[default]
  Original,
  Short,
  Long,
}

#[derive(Clone, Debug)]
pub struct Group {
  nodes: Arena<NodeData>,
  root: NodeId,
}

impl Group {
  /// A document with a single, empty root group covering `[0, source_len)`.
  pub fn new_document(source_len: usize) -> Group {
    let mut nodes = Arena::new();
    let root = nodes.insert(NodeData::Group(GroupData { children: Vec::new(), parent: None, span: (0, source_len) }));
    Group { nodes, root }
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub(crate) fn node(&self, id: NodeId) -> &NodeData {
    self.nodes.get(id).expect("NodeId from this group must resolve")
  }

  pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
    self.nodes.get_mut(id).expect("NodeId from this group must resolve")
  }

  pub fn is_group(&self, id: NodeId) -> bool {
    matches!(self.node(id), NodeData::Group(_))
  }

  pub fn is_tag(&self, id: NodeId) -> bool {
    matches!(self.node(id), NodeData::Tag(_))
  }

  pub fn tag(&self, id: NodeId) -> Option<&Tag> {
    match self.node(id) {
      NodeData::Tag(t) => Some(t),
      NodeData::Group(_) => None,
    }
  }

  pub fn tag_mut(&mut self, id: NodeId) -> Option<&mut Tag> {
    match self.node_mut(id) {
      NodeData::Tag(t) => Some(t),
      NodeData::Group(_) => None,
    }
  }

  pub fn span(&self, id: NodeId) -> Span {
    match self.node(id) {
      NodeData::Tag(t) => t.span,
      NodeData::Group(g) => g.span,
    }
  }

  /// The weak, non-owning parent link. A group's parent is stored inline; a tag's is recovered
  /// by a linear walk from the root, since adding a field to every `Tag` just to cache it would
  /// have to be kept in sync on every reparent.
  pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
    match self.node(id) {
      NodeData::Group(g) => g.parent,
      NodeData::Tag(_) => self.find_parent(id),
    }
  }

  fn find_parent(&self, target: NodeId) -> Option<NodeId> {
    let mut stack = vec![self.root];
    while let Some(current) = stack.pop() {
      if let NodeData::Group(g) = self.node(current) {
        if g.children.contains(&target) {
          return Some(current);
        }
        stack.extend(g.children.iter().copied());
      }
    }
    None
  }

  // region Construction helpers

  pub fn insert_tag(&mut self, parent: NodeId, tag: Tag) -> Result<NodeId, HedError> {
    let id = self.nodes.insert(NodeData::Tag(tag));
    self.append_child(parent, id)?;
    Ok(id)
  }

  pub fn insert_group(&mut self, parent: NodeId, span: Span) -> Result<NodeId, HedError> {
    let id = self.nodes.insert(NodeData::Group(GroupData { children: Vec::new(), parent: Some(parent), span }));
    self.append_child(parent, id)?;
    Ok(id)
  }

  fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HedError> {
    match self.node_mut(parent) {
      NodeData::Group(g) => g.children.push(child),
      NodeData::Tag(_) => return Err(HedError::InvalidUsage { detail: "cannot append a child to a Tag".to_string() }),
    }
    self.set_parent_of(child, Some(parent));
    Ok(())
  }

  /// Updates a child group's stored back-link. Tags carry no parent field; their parent is
  /// recovered by [`Group::parent_of`].
  fn set_parent_of(&mut self, id: NodeId, parent: Option<NodeId>) {
    if let NodeData::Group(g) = self.node_mut(id) {
      g.parent = parent;
    }
  }

  pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), HedError> {
    self.append_child(parent, child)
  }

  /// Allocates a new tag node without attaching it to any parent's child list. Paired with
  /// [`Group::replace_in_place`], this lets a caller build a replacement subtree out-of-band and
  /// then splice it into an existing slot in one step, preserving that slot's identity.
  pub fn alloc_tag(&mut self, tag: Tag) -> NodeId {
    self.nodes.insert(NodeData::Tag(tag))
  }

  /// Allocates a new group node from already-allocated `children`, without attaching it to any
  /// parent's child list. Each child group's back-link is repointed at the new node. See
  /// [`Group::alloc_tag`].
  pub fn alloc_group(&mut self, children: Vec<NodeId>, parent: Option<NodeId>, span: Span) -> NodeId {
    let child_list = children.clone();
    let id = self.nodes.insert(NodeData::Group(GroupData { children, parent, span }));
    for child in child_list {
      self.set_parent_of(child, Some(id));
    }
    id
  }

  /// Removes and returns the node at `id`, tombstoning its slot. Used to lift a freshly
  /// `alloc_group`-ed node's content out so it can be folded into another slot via
  /// [`Group::replace_in_place`] without leaving an orphaned duplicate behind.
  pub fn take_node(&mut self, id: NodeId) -> NodeData {
    self.nodes.remove(id).expect("take_node called with an id that does not resolve")
  }

  /// Splices a standalone `Group` (e.g. a Definition body) into `self`, returning the index of
  /// the spliced root within `self`'s arena. No identity is shared with the source group.
  pub fn splice_in(&mut self, other: &Group) -> NodeId {
    self.splice_in_subtree(other, other.root)
  }

  /// Splices the subtree rooted at `at` in `other` into `self`, returning its new index. The
  /// spliced root's own back-link starts out unset; attaching it through `append`,
  /// `alloc_group`, or `replace_in_place` fills it in. Every descendant's back-link is already
  /// correct within the spliced subtree.
  pub fn splice_in_subtree(&mut self, other: &Group, at: NodeId) -> NodeId {
    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
    self.splice_node(other, at, None, &mut remap)
  }

  /// Overrides which node is considered this group's document root. Used right after building
  /// a fresh `Group` via `splice_in_subtree` from an empty placeholder document.
  pub fn set_root(&mut self, new_root: NodeId) {
    self.root = new_root;
  }

  fn splice_node(&mut self, other: &Group, id: NodeId, parent: Option<NodeId>, remap: &mut HashMap<NodeId, NodeId>) -> NodeId {
    if let Some(&existing) = remap.get(&id) {
      return existing;
    }
    let new_id = match other.node(id) {
      NodeData::Tag(t) => self.nodes.insert(NodeData::Tag(t.clone())),
      NodeData::Group(g) => {
        let placeholder = self.nodes.insert(NodeData::Group(GroupData { children: Vec::new(), parent, span: g.span }));
        remap.insert(id, placeholder);
        let new_children: Vec<NodeId> =
            g.children.iter().map(|&c| self.splice_node(other, c, Some(placeholder), remap)).collect();
        if let NodeData::Group(new_g) = self.node_mut(placeholder) {
          new_g.children = new_children;
        }
        placeholder
      }
    };
    remap.insert(id, new_id);
    new_id
  }

  // endregion

  // region Traversal

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    match self.node(id) {
      NodeData::Group(g) => &g.children,
      NodeData::Tag(_) => &[],
    }
  }

  pub fn tags(&self, id: NodeId) -> Vec<NodeId> {
    self.children(id).iter().copied().filter(|&c| self.is_tag(c)).collect()
  }

  pub fn groups(&self, id: NodeId) -> Vec<NodeId> {
    self.children(id).iter().copied().filter(|&c| self.is_group(c)).collect()
  }

  /// Depth-first, iterative descendant tags, rooted at `id`.
  pub fn all_tags(&self, id: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
      match self.node(current) {
        NodeData::Tag(_) => result.push(current),
        NodeData::Group(g) => stack.extend(g.children.iter().rev().copied()),
      }
    }
    result
  }

  /// Depth-first, iterative descendant groups below `id`, optionally limited to `include_depth`
  /// levels (`None` means unlimited).
  pub fn all_groups(&self, id: NodeId, include_depth: Option<usize>) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![(id, 0usize)];
    while let Some((current, depth)) = stack.pop() {
      if let NodeData::Group(g) = self.node(current) {
        if current != id {
          result.push(current);
        }
        if include_depth.map_or(true, |max| depth < max) {
          stack.extend(g.children.iter().rev().map(|&c| (c, depth + 1)));
        }
      }
    }
    result
  }

  /// Tags under `at` whose `short_base_tag` (case-insensitively) matches one of
  /// `short_base_tags`. `include_groups`: 0 returns matching tags, 1 returns the groups that
  /// directly enclose a match (deduplicated), 2 returns `(tag, enclosing_group)` pairs.
  pub fn find_tags(&self, at: NodeId, short_base_tags: &[&str], recursive: bool, include_groups: u8) -> Vec<(Option<NodeId>, Option<NodeId>)> {
    let lowered: Vec<String> = short_base_tags.iter().map(|s| s.to_lowercase()).collect();
    let candidates: Vec<NodeId> = if recursive { self.all_tags(at) } else { self.tags(at) };

    let mut out = Vec::new();
    let mut seen_groups = Set::new();
    for tag_id in candidates {
      let matches = self.tag(tag_id).map_or(false, |t| lowered.iter().any(|l| t.short_base_tag().to_lowercase() == *l));
      if !matches {
        continue;
      }
      let enclosing = self.find_parent(tag_id);
      match include_groups {
        0 => out.push((Some(tag_id), None)),
        1 => {
          if let Some(g) = enclosing {
            if seen_groups.insert(g) {
              out.push((None, Some(g)));
            }
          }
        }
        _ => out.push((Some(tag_id), enclosing)),
      }
    }
    out
  }

  /// Yields `(def_tag, def_expand_group_or_tag, enclosing_group)` triples. For a bare `Def/...`
  /// tag the second component equals the first; for `(Def-expand/..., body)` it is the whole
  /// def-expand group.
  pub fn find_def_tags(&self, at: NodeId, recursive: bool) -> Vec<(NodeId, NodeId, Option<NodeId>)> {
    let candidates: Vec<NodeId> = if recursive { self.all_tags(at) } else { self.tags(at) };
    let mut out = Vec::new();
    for tag_id in candidates {
      let Some(tag) = self.tag(tag_id) else { continue };
      let base = tag.short_base_tag().to_lowercase();
      if base == "def" {
        out.push((tag_id, tag_id, self.find_parent(tag_id)));
      } else if base == "def-expand" {
        // A bare Def-expand at top level has no enclosing def-expand group of its own.
        match self.find_parent(tag_id) {
          Some(enclosing) if enclosing != self.root => out.push((tag_id, enclosing, self.parent_of(enclosing))),
          other => out.push((tag_id, tag_id, other)),
        }
      }
    }
    out
  }

  /// At each of `at`'s top-level child groups, returns at most one tag matching `anchor_tags`.
  pub fn find_top_level_tags(&self, at: NodeId, anchor_tags: &[&str]) -> Vec<NodeId> {
    let lowered: Vec<String> = anchor_tags.iter().map(|s| s.to_lowercase()).collect();
    let mut out = Vec::new();
    for &top_child in self.groups(at).iter() {
      for &tag_id in &self.tags(top_child) {
        if let Some(tag) = self.tag(tag_id) {
          if lowered.iter().any(|l| tag.short_base_tag().to_lowercase() == *l) {
            out.push(tag_id);
            break;
          }
        }
      }
    }
    out
  }

  // endregion

  // region Mutation

  /// Replaces the node at `old`'s slot with `new`, preserving `old`'s identity (its `NodeId`
  /// does not change). If `new` is a group, its children's back-links are repointed at the
  /// slot they now live under. Fails with `ItemNotFound` if `old` does not currently exist.
  pub fn replace_in_place(&mut self, old: NodeId, new: NodeData) -> Result<(), HedError> {
    if self.nodes.get(old).is_none() {
      return Err(HedError::ItemNotFound);
    }
    *self.nodes.get_mut(old).unwrap() = new;
    let kids: Vec<NodeId> = self.children(old).to_vec();
    for child in kids {
      self.set_parent_of(child, Some(old));
    }
    Ok(())
  }

  /// Removes `children` from `parent` by identity. A group that becomes empty after removal has
  /// the removal propagated to its own parent, recursively, per the "no empty groups" invariant.
  pub fn remove(&mut self, parent: NodeId, children: &[NodeId]) -> Result<(), HedError> {
    let removed: Set<NodeId> = children.iter().copied().collect();
    let before = match self.node(parent) {
      NodeData::Group(g) => g.children.len(),
      NodeData::Tag(_) => return Err(HedError::InvalidUsage { detail: "cannot remove children from a Tag".to_string() }),
    };
    if let NodeData::Group(g) = self.node_mut(parent) {
      g.children.retain(|c| !removed.contains(c));
    }
    let after = match self.node(parent) {
      NodeData::Group(g) => g.children.len(),
      NodeData::Tag(_) => unreachable!(),
    };
    if after == before {
      return Err(HedError::ItemNotFound);
    }
    if after == 0 && parent != self.root {
      // The emptied group's own back-link is already at hand; no walk from the root needed.
      let grandparent = match self.node(parent) {
        NodeData::Group(g) => g.parent,
        NodeData::Tag(_) => unreachable!(),
      };
      if let Some(grandparent) = grandparent {
        return self.remove(grandparent, &[parent]);
      }
    }
    Ok(())
  }

  // endregion

  /// Serializes the subtree rooted at `id` to canonical text. The document root is rendered
  /// without enclosing parentheses, matching the HED String convention.
  pub fn render(&self, id: NodeId, mode: RenderMode) -> String {
    match self.node(id) {
      NodeData::Tag(t) => match mode {
        RenderMode::Original => t.org_tag().to_string(),
        RenderMode::Short => t.short_tag().to_string(),
        RenderMode::Long => t.long_tag().to_string(),
      },
      NodeData::Group(g) => {
        let inner = join_string(g.children.iter().map(|&c| self.render(c, mode)), ", ");
        if id == self.root {
          inner
        } else {
          format!("({})", inner)
        }
      }
    }
  }

  /// Recursively sorts every group's children by their short-form rendering, producing the
  /// deterministic canonical ordering definitions are stored in so they compare by value.
  pub fn sort_children_canonical(&mut self) {
    let group_ids: Vec<NodeId> = std::iter::once(self.root).chain(self.all_groups(self.root, None)).collect();
    for id in group_ids {
      let mut kids = self.children(id).to_vec();
      kids.sort_by(|&a, &b| self.render(a, RenderMode::Short).cmp(&self.render(b, RenderMode::Short)));
      if let NodeData::Group(g) = self.node_mut(id) {
        g.children = kids;
      }
    }
  }

  /// Produces a new, independent group with cloned tags (schema handles are shared, being plain
  /// `Copy` ids) and fresh node identities.
  pub fn deep_copy(&self) -> Group {
    let mut copy = Group { nodes: Arena::new(), root: self.root };
    let mut remap = HashMap::new();
    let new_root = copy.splice_node(self, self.root, None, &mut remap);
    copy.root = new_root;
    copy
  }

  /// True if every child's parent resolves back to its container — checking both the stored
  /// back-link on child groups and positional containment — and no group (other than the root)
  /// is empty; used by tests to check the ownership invariant after edits.
  pub fn check_invariants(&self) -> bool {
    let mut stack = vec![self.root];
    while let Some(current) = stack.pop() {
      if let NodeData::Group(g) = self.node(current) {
        if g.children.is_empty() && current != self.root {
          return false;
        }
        for &child in &g.children {
          if let NodeData::Group(child_group) = self.node(child) {
            if child_group.parent != Some(current) {
              return false;
            }
          }
          if self.find_parent(child) != Some(current) {
            return false;
          }
        }
        stack.extend(g.children.iter().copied());
      }
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::schema::memory_schema::test_fixture_schema;

  #[test]
  fn parse_render_round_trips_simple_string() {
    let schema = test_fixture_schema();
    let (group, issues) = parse("Red, (Blue, (Green, Yellow)), Purple", Some(&schema), None);
    assert!(issues.is_empty());
    assert_eq!(group.render(group.root(), RenderMode::Original), "Red, (Blue, (Green, Yellow)), Purple");
  }

  #[test]
  fn no_empty_groups_and_parent_links_are_consistent() {
    let schema = test_fixture_schema();
    let (group, _) = parse("Red, (Blue, (Green, Yellow)), Purple", Some(&schema), None);
    assert!(group.check_invariants());
  }

  #[test]
  fn spliced_subtrees_keep_parent_links_consistent() {
    let schema = test_fixture_schema();
    let (doc, _) = parse("(Red, (Blue))", Some(&schema), None);
    let copy = doc.deep_copy();
    assert!(copy.check_invariants());

    let (mut host, _) = parse("Green", Some(&schema), None);
    let spliced = host.splice_in(&copy);
    host.append(host.root(), spliced).unwrap();
    assert!(host.check_invariants());
    assert_eq!(host.parent_of(spliced), Some(host.root()));
  }

  #[test]
  fn remove_prunes_empty_parent_groups() {
    let schema = test_fixture_schema();
    let (mut group, _) = parse("(Red), Blue", Some(&schema), None);
    let inner_group = group.groups(group.root())[0];
    let tag_in_group = group.tags(inner_group)[0];
    group.remove(inner_group, &[tag_in_group]).unwrap();
    assert!(group.groups(group.root()).is_empty());
    assert_eq!(group.render(group.root(), RenderMode::Original), "Blue");
  }
}
