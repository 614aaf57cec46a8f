use std::iter::once;
use std::fmt::Display;

/// Interleaves `sep(item)` between successive elements of `iter`. The separator is computed
/// per-pair rather than fixed, which is what `join_string` below needs when the separator is a
/// plain string slice cloned on every gap.
pub fn join_iter<T>(mut iter: impl Iterator<Item = T>, sep: impl Fn(&T) -> T) -> impl Iterator<Item = T> {
  iter
      .next()
      .into_iter()
      .chain(iter.flat_map(move |s| once(sep(&s)).chain(once(s))))
}

/// Joins displayable items with `sep`, used throughout rendering and row assembly wherever a
/// comma-separated HED fragment list needs to become one string (`Group::render`, column
/// resolution, row-level `hed`/`context` assembly).
pub fn join_string<T: Display>(iter: impl Iterator<Item = T>, sep: &str) -> String {
  join_iter(iter.map(|t| t.to_string()), |_| sep.to_string()).collect::<String>()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn joins_tag_names_with_comma_space() {
    let tags = ["Red", "Blue", "Green"];
    assert_eq!(join_string(tags.iter(), ", "), "Red, Blue, Green");
  }

  #[test]
  fn single_tag_needs_no_separator() {
    let tags = ["Red"];
    assert_eq!(join_string(tags.iter(), ", "), "Red");
  }

  #[test]
  fn empty_list_joins_to_empty_string() {
    let tags: [&str; 0] = [];
    assert_eq!(join_string(tags.iter(), ", "), "");
  }

  #[test]
  fn join_iter_can_vary_separator_per_gap() {
    let onsets = [0.0, 0.5, 1.0].iter().cloned();
    let with_arrows: Vec<f64> = join_iter(onsets, |_| -1.0).collect();
    assert_eq!(with_arrows, vec![0.0, -1.0, 0.5, -1.0, 1.0]);
  }
}
