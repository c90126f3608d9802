//! Bounded worker pool for objective evaluations.
//!
//! Candidates are queued on a bounded crossbeam channel and drained by named
//! scoped threads, so the objective may borrow from the caller's stack. A
//! pool with one worker evaluates inline on the calling thread.

use std::num::NonZeroUsize;
use std::thread;

use crossbeam_channel::bounded;

use crate::error::OptimizeError;

use super::Objective;

/// Evaluates batches of candidates in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationPool {
    workers: usize,
}

impl EvaluationPool {
    /// Creates a pool; `0` workers means one per available core.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            workers
        };
        Self { workers }
    }

    /// Thread count used for batches.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Returns `objective(candidate)` for each candidate, in input order.
    ///
    /// # Errors
    ///
    /// Returns `OptimizeError::WorkerSpawn` if a worker thread cannot be started.
    pub fn evaluate(&self, objective: &Objective<'_>, candidates: &[Vec<f64>]) -> Result<Vec<f64>, OptimizeError> {
        let workers = self.workers.min(candidates.len());
        if workers <= 1 {
            return Ok(candidates.iter().map(|c| objective(c)).collect());
        }

        let (job_tx, job_rx) = bounded::<usize>(candidates.len());
        let (result_tx, result_rx) = bounded::<(usize, f64)>(candidates.len());
        for idx in 0..candidates.len() {
            job_tx.send(idx).map_err(|err| OptimizeError::WorkerSpawn {
                message: err.to_string(),
            })?;
        }
        // Close the queue: workers drain it then exit.
        drop(job_tx);

        thread::scope(|scope| {
            for worker in 0..workers {
                let rx = job_rx.clone();
                let tx = result_tx.clone();
                thread::Builder::new()
                    .name(format!("planner-eval-{worker}"))
                    .spawn_scoped(scope, move || {
                        while let Ok(idx) = rx.recv() {
                            let _ = tx.send((idx, objective(&candidates[idx])));
                        }
                    })
                    .map_err(|err| OptimizeError::WorkerSpawn {
                        message: err.to_string(),
                    })?;
            }
            Ok::<(), OptimizeError>(())
        })?;
        drop(result_tx);

        let mut values = vec![f64::INFINITY; candidates.len()];
        for (idx, value) in result_rx.try_iter() {
            values[idx] = value;
        }
        Ok(values)
    }
}

impl Default for EvaluationPool {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let candidates: Vec<Vec<f64>> = (0..50).map(|i| vec![f64::from(i)]).collect();
        let pool = EvaluationPool::new(4);
        let values = pool.evaluate(&|x: &[f64]| x[0] * 2.0, &candidates).unwrap();
        let expected: Vec<f64> = (0..50).map(|i| f64::from(i) * 2.0).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_work_runs_on_named_threads() {
        let names = Mutex::new(HashSet::new());
        let candidates = vec![vec![0.0]; 16];
        let objective = |_: &[f64]| {
            let name = thread::current().name().unwrap_or_default().to_string();
            names.lock().unwrap().insert(name);
            0.0
        };
        EvaluationPool::new(2).evaluate(&objective, &candidates).unwrap();
        let names = names.into_inner().unwrap();
        assert!(names.iter().all(|n| n.starts_with("planner-eval-")));
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let caller = thread::current().id();
        let objective = |_: &[f64]| {
            assert_eq!(thread::current().id(), caller);
            1.0
        };
        let values = EvaluationPool::new(1).evaluate(&objective, &[vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(values, vec![1.0, 1.0]);
    }

    #[test]
    fn test_zero_means_available_parallelism() {
        assert!(EvaluationPool::new(0).workers() >= 1);
        assert!(EvaluationPool::new(0).evaluate(&|_: &[f64]| 0.0, &[]).unwrap().is_empty());
    }
}
