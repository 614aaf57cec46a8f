/*!

A `NatSet` is a set of small natural numbers, backed by `bit_set::BitSet`. We use it wherever the
core needs to track "which positions/indices matched" without the overhead of a `HashSet<usize>`:
the query engine's matched-group index sets, and the column mapper's requested-columns filter.

*/

use std::fmt::{Debug, Formatter};
use bit_set::BitSet;

#[derive(Clone, Default, Eq, PartialEq)]
pub(crate) struct NatSet(BitSet);

impl NatSet {
  pub(crate) fn new() -> Self {
    NatSet(BitSet::new())
  }

  pub(crate) fn insert(&mut self, value: usize) -> bool {
    self.0.insert(value)
  }

  pub(crate) fn contains(&self, value: usize) -> bool {
    self.0.contains(value)
  }

  pub(crate) fn remove(&mut self, value: usize) -> bool {
    self.0.remove(value)
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub(crate) fn len(&self) -> usize {
    self.0.len()
  }

  pub(crate) fn union_with(&mut self, other: &NatSet) {
    self.0.union_with(&other.0);
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    self.0.iter()
  }
}

impl FromIterator<usize> for NatSet {
  fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
    let mut set = BitSet::new();
    for value in iter {
      set.insert(value);
    }
    NatSet(set)
  }
}

impl Debug for NatSet {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_set().entries(self.0.iter()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_and_contains() {
    let mut set = NatSet::new();
    assert!(set.insert(3));
    assert!(!set.insert(3));
    assert!(set.contains(3));
    assert!(!set.contains(4));
  }

  #[test]
  fn union_with_merges_members() {
    let mut a: NatSet = [1usize, 2].into_iter().collect();
    let b: NatSet = [2usize, 3].into_iter().collect();
    a.union_with(&b);
    assert_eq!(a.len(), 3);
    assert!(a.contains(1) && a.contains(2) && a.contains(3));
  }
}
