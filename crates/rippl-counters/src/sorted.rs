//! A score-ordered set with O(log n) updates and ordered iteration.

use std::{
  cmp::{Ordering, Reverse},
  collections::{BTreeSet, HashMap},
  ops::Bound,
};

/// `f64` with a total order, so scores can key a `BTreeSet`.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Score {}

impl PartialOrd for Score {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Score {
  fn cmp(&self, other: &Self) -> Ordering { self.0.total_cmp(&other.0) }
}

/// Members ordered by score descending, then member ascending.
#[derive(Debug, Default)]
pub struct SortedSet {
  scores: HashMap<String, f64>,
  order:  BTreeSet<(Reverse<Score>, String)>,
}

impl SortedSet {
  pub fn insert(&mut self, member: &str, score: f64) {
    if let Some(old) = self.scores.insert(member.to_owned(), score) {
      self.order.remove(&(Reverse(Score(old)), member.to_owned()));
    }
    self.order.insert((Reverse(Score(score)), member.to_owned()));
  }

  pub fn score(&self, member: &str) -> Option<f64> { self.scores.get(member).copied() }

  pub fn top(&self, n: usize) -> Vec<(String, f64)> {
    self
      .order
      .iter()
      .take(n)
      .map(|(Reverse(Score(s)), m)| (m.clone(), *s))
      .collect()
  }

  /// Members scored within `[min, max]`. Walks only the matching range.
  pub fn count_between(&self, min: f64, max: f64) -> u64 {
    // The empty string sorts first, so this bound admits every member at `max`.
    let from = (Reverse(Score(max)), String::new());
    self
      .order
      .range((Bound::Included(from), Bound::Unbounded))
      .take_while(|(Reverse(Score(s)), _)| *s >= min)
      .count() as u64
  }

  /// Remove every member scored `<= max_score`.
  pub fn prune_through(&mut self, max_score: f64) -> u64 {
    let mut removed = 0;
    // Lowest scores sit at the back of the descending order.
    while let Some((Reverse(Score(s)), _)) = self.order.last() {
      if *s > max_score {
        break;
      }
      if let Some((_, member)) = self.order.pop_last() {
        self.scores.remove(&member);
        removed += 1;
      }
    }
    removed
  }

  #[cfg(test)]
  pub fn len(&self) -> usize { self.scores.len() }
}
