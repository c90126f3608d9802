//! Pareto frontier of evaluated solutions.

use serde::{Deserialize, Serialize};

use crate::loss::Loss;

/// A solution with its loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<S> {
    /// The evaluated candidate.
    pub solution: S,
    /// Its loss.
    pub loss: Loss,
}

impl<S> SearchResult<S> {
    /// Pairs a solution with its loss.
    #[must_use]
    pub const fn new(solution: S, loss: Loss) -> Self {
        Self { solution, loss }
    }
}

/// Results no other evaluated result dominates, in insertion order.
///
/// ```
/// use lockdown_planner::frontier::{ParetoFrontier, SearchResult};
/// use lockdown_planner::loss::Loss;
///
/// let mut frontier = ParetoFrontier::new();
/// frontier.update(SearchResult::new("a", Loss::from(vec![1.0, 2.0])));
/// frontier.update(SearchResult::new("b", Loss::from(vec![2.0, 1.0])));
/// assert_eq!(frontier.len(), 2);
/// frontier.update(SearchResult::new("c", Loss::from(vec![0.0, 0.0])));
/// assert_eq!(frontier.members()[0].solution, "c");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFrontier<S> {
    members: Vec<SearchResult<S>>,
}

impl<S> Default for ParetoFrontier<S> {
    fn default() -> Self {
        Self { members: Vec::new() }
    }
}

impl<S: PartialEq> ParetoFrontier<S> {
    /// An empty frontier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers `result` to the frontier and reports whether it was added.
    ///
    /// Nothing changes when a member holds the same solution or dominates the
    /// new loss. Otherwise every member the new loss dominates is removed and
    /// the result is appended.
    ///
    /// # Panics
    ///
    /// Panics if losses of different arity or kind meet.
    pub fn update(&mut self, result: SearchResult<S>) -> bool {
        for member in &self.members {
            if member.solution == result.solution || member.loss.dominates(&result.loss) {
                return false;
            }
        }
        self.members.retain(|member| !result.loss.dominates(&member.loss));
        self.members.push(result);
        true
    }

    /// Current members, oldest first.
    #[must_use]
    pub fn members(&self) -> &[SearchResult<S>] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True before the first update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Consumes the frontier, returning its members.
    #[must_use]
    pub fn into_members(self) -> Vec<SearchResult<S>> {
        self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &'static str, loss: &[f64]) -> SearchResult<&'static str> {
        SearchResult::new(name, Loss::from(loss.to_vec()))
    }

    fn names(frontier: &ParetoFrontier<&'static str>) -> Vec<&'static str> {
        frontier.members().iter().map(|m| m.solution).collect()
    }

    fn seeded() -> ParetoFrontier<&'static str> {
        let mut frontier = ParetoFrontier::new();
        assert!(frontier.update(result("a", &[1.0, 4.0])));
        assert!(frontier.update(result("b", &[2.0, 2.0])));
        assert!(frontier.update(result("c", &[4.0, 1.0])));
        frontier
    }

    #[test]
    fn test_dominated_result_is_ignored() {
        let mut frontier = seeded();
        let before = frontier.clone();
        assert!(!frontier.update(result("d", &[3.0, 3.0])));
        assert_eq!(frontier, before);
    }

    #[test]
    fn test_dominating_result_removes_exactly_what_it_dominates() {
        let mut frontier = seeded();
        assert!(frontier.update(result("d", &[1.5, 1.5])));
        assert_eq!(names(&frontier), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_incomparable_result_grows_frontier() {
        let mut frontier = seeded();
        assert!(frontier.update(result("d", &[0.5, 5.0])));
        assert_eq!(frontier.len(), 4);
    }

    #[test]
    fn test_same_solution_is_ignored() {
        let mut frontier = seeded();
        assert!(!frontier.update(result("b", &[0.0, 0.0])));
        assert_eq!(names(&frontier), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_loss_different_solution_is_kept() {
        let mut frontier = seeded();
        assert!(frontier.update(result("b2", &[2.0, 2.0])));
        assert_eq!(frontier.len(), 4);
    }

    #[test]
    fn test_scalar_frontier_keeps_single_best() {
        let mut frontier = ParetoFrontier::new();
        for (name, loss) in [("x", 3.0), ("y", 1.0), ("z", 2.0)] {
            frontier.update(SearchResult::new(name, Loss::Scalar(loss)));
        }
        assert_eq!(names(&frontier), vec!["y"]);
        assert!(!frontier.is_empty());
        assert_eq!(frontier.into_members()[0].loss, Loss::Scalar(1.0));
    }
}
