use std::sync::Arc;

use crate::config::XFeatConfig;
use crate::error::CoreResult;

/// Execution backend handed to every pipeline stage.
///
/// Owns a dedicated Rayon pool instead of configuring the global one, so two
/// pipelines with different thread counts can live in the same process.
/// Cloning shares the pool.
#[derive(Clone)]
pub struct ExecutionContext {
    pool: Arc<rayon::ThreadPool>,
    n_threads: usize,
}

impl ExecutionContext {
    /// Build a pool with `n_threads` workers (0 selects one per core).
    pub fn new(n_threads: usize) -> CoreResult<Self> {
        let n_threads = if n_threads == 0 {
            num_cpus::get().max(1)
        } else {
            n_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("xfeat-worker-{i}"))
            .build()?;
        log::debug!("execution context ready with {} threads", n_threads);
        Ok(Self {
            pool: Arc::new(pool),
            n_threads,
        })
    }

    pub fn from_config(cfg: &XFeatConfig) -> CoreResult<Self> {
        Self::new(cfg.n_threads)
    }

    /// Single worker, for deterministic tests and tiny inputs.
    pub fn single_threaded() -> CoreResult<Self> {
        Self::new(1)
    }

    /// Run `op` inside the pool; parallel iterators in `op` use its workers.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("n_threads", &self.n_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_install_runs_on_pool() {
        let ctx = ExecutionContext::new(2).unwrap();
        assert_eq!(ctx.n_threads(), 2);
        let sum: usize = ctx.install(|| (0..100usize).into_par_iter().sum());
        assert_eq!(sum, 4950);
        assert_eq!(ctx.install(rayon::current_num_threads), 2);
    }

    #[test]
    fn test_zero_threads_uses_all_cores() {
        let ctx = ExecutionContext::new(0).unwrap();
        assert!(ctx.n_threads() >= 1);
    }
}
