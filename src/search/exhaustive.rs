//! Enumeration of every combination of discrete dial options.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PlannerResult;
use crate::frontier::SearchResult;
use crate::loss::{Loss, LossFunction};
use crate::policy::{Dial, PolicyTimeline, PolicyVector};

use super::space::{DialSpace, LockdownConfig};
use super::PolicySearch;

/// Walks the cross product of all `Options` dials, last dial fastest.
/// `Range` dials are drawn afresh for each combination and `Fixed` dials
/// keep their value. Exhausts after the last combination.
pub struct ExhaustiveSearch {
    config: LockdownConfig,
    loss: Box<dyn LossFunction>,
    rng: StdRng,
    history: Vec<SearchResult<PolicyTimeline>>,
    options: Vec<(Dial, Vec<f64>)>,
    /// Option index per dial of the next combination; `None` once exhausted.
    cursor: Option<Vec<usize>>,
}

impl ExhaustiveSearch {
    /// Enumerates `config` with entropy-seeded range draws.
    #[must_use]
    pub fn new(config: LockdownConfig, loss: impl LossFunction + 'static) -> Self {
        Self::with_rng(config, loss, StdRng::from_entropy())
    }

    /// Reproducible draws for `Range` dials.
    #[must_use]
    pub fn with_seed(config: LockdownConfig, loss: impl LossFunction + 'static, seed: u64) -> Self {
        Self::with_rng(config, loss, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LockdownConfig, loss: impl LossFunction + 'static, rng: StdRng) -> Self {
        let options: Vec<(Dial, Vec<f64>)> = config
            .dials()
            .filter_map(|(dial, space)| match space {
                DialSpace::Options(values) => Some((dial, values.clone())),
                _ => None,
            })
            .collect();
        let cursor = if options.iter().any(|(_, values)| values.is_empty()) {
            None
        } else {
            Some(vec![0; options.len()])
        };
        Self {
            config,
            loss: Box::new(loss),
            rng,
            history: Vec::new(),
            options,
            cursor,
        }
    }

    /// Number of combinations in the full enumeration.
    #[must_use]
    pub fn combinations(&self) -> usize {
        self.options.iter().map(|(_, values)| values.len()).product()
    }

    /// Search space.
    #[must_use]
    pub const fn config(&self) -> &LockdownConfig {
        &self.config
    }

    fn advance(&mut self) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        for (idx, (_, values)) in cursor.iter_mut().zip(&self.options).rev() {
            *idx += 1;
            if *idx < values.len() {
                return;
            }
            *idx = 0;
        }
        self.cursor = None;
    }
}

impl fmt::Debug for ExhaustiveSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExhaustiveSearch")
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl PolicySearch for ExhaustiveSearch {
    fn propose(&mut self) -> PlannerResult<Option<PolicyTimeline>> {
        let Some(cursor) = self.cursor.clone() else {
            return Ok(None);
        };

        let mut policy = PolicyVector::default();
        for (dial, space) in self.config.dials() {
            let value = match space {
                DialSpace::Fixed(value) => *value,
                DialSpace::Range { .. } => space.sample(&mut self.rng),
                DialSpace::Options(_) => {
                    let slot = self.options.iter().position(|(d, _)| *d == dial).unwrap_or_default();
                    self.options[slot].1[cursor[slot]]
                }
            };
            policy = policy.with(dial, value)?;
        }

        self.advance();
        Ok(Some(self.config.timeline_for(policy)))
    }

    fn record(&mut self, proposal: PolicyTimeline, loss: Loss) {
        self.history.push(SearchResult::new(proposal, loss));
    }

    fn loss(&self) -> &dyn LossFunction {
        self.loss.as_ref()
    }

    fn history(&self) -> &[SearchResult<PolicyTimeline>] {
        &self.history
    }
}
