use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::debug;

/// Shared compute pool for CPU-bound batch work such as meshing a set of
/// already-generated chunks. Terrain generation itself runs on dedicated
/// worker threads with their own request protocol, not on this pool.
pub struct JobSystem {
    pool: ThreadPool,
}

impl JobSystem {
    pub fn new(num_threads: Option<usize>) -> Result<Self, ThreadPoolBuildError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|index| format!("job-{index}"));
        if let Some(count) = num_threads {
            builder = builder.num_threads(count);
        }

        let pool = builder.build()?;
        debug!("job system started with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }

    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&rayon::Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::new(None).expect("failed to create default job system thread pool")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::JobSystem;

    #[test]
    fn scoped_jobs_complete_before_scope_returns() {
        let jobs = JobSystem::new(Some(2)).expect("job system");
        let counter = AtomicUsize::new(0);

        jobs.scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn thread_count_matches_request() {
        let jobs = JobSystem::new(Some(3)).expect("job system");
        assert_eq!(jobs.num_threads(), 3);
    }
}
