//! Independent random proposals.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PlannerResult;
use crate::frontier::SearchResult;
use crate::loss::{Loss, LossFunction};
use crate::policy::PolicyTimeline;

use super::space::LockdownConfig;
use super::PolicySearch;

/// Samples every dial afresh on each step. Never exhausts, so `optimize`
/// needs a step limit.
pub struct RandomSearch {
    config: LockdownConfig,
    loss: Box<dyn LossFunction>,
    rng: StdRng,
    history: Vec<SearchResult<PolicyTimeline>>,
}

impl RandomSearch {
    /// Samples `config` with an entropy-seeded generator.
    #[must_use]
    pub fn new(config: LockdownConfig, loss: impl LossFunction + 'static) -> Self {
        Self::with_rng(config, loss, StdRng::from_entropy())
    }

    /// Reproducible search.
    #[must_use]
    pub fn with_seed(config: LockdownConfig, loss: impl LossFunction + 'static, seed: u64) -> Self {
        Self::with_rng(config, loss, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LockdownConfig, loss: impl LossFunction + 'static, rng: StdRng) -> Self {
        Self {
            config,
            loss: Box::new(loss),
            rng,
            history: Vec::new(),
        }
    }

    /// Search space.
    #[must_use]
    pub const fn config(&self) -> &LockdownConfig {
        &self.config
    }
}

impl fmt::Debug for RandomSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomSearch")
            .field("config", &self.config)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl PolicySearch for RandomSearch {
    fn propose(&mut self) -> PlannerResult<Option<PolicyTimeline>> {
        let policy = self.config.sample(&mut self.rng)?;
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
