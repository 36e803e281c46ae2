//! Bounded-concurrency fan-out for per-file encrypt/decrypt work.
//!
//! Jobs run on a dedicated rayon pool sized by `N_JOBS` (0 = online CPUs).
//! Each job writes progress to its own [`JobLog`]; logs are replayed grouped
//! per job after the pool drains, so concurrent jobs never interleave lines
//! on the parent's output. When any job fails the pool still drains, all
//! captured output is replayed, and the first error (in submission order) is
//! returned. No ordering is guaranteed among running jobs; results come back
//! in submission order.

use crate::error::{MybaError, Result};
use rayon::prelude::*;
use std::thread;

pub struct Pool {
    threads: usize,
}

#[derive(Default)]
pub struct JobLog {
    lines: Vec<String>,
}

impl JobLog {
    pub fn say(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

impl Pool {
    pub fn new(n_jobs: usize) -> Self {
        let threads = if n_jobs == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            n_jobs
        };
        Pool { threads }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` over every job, collecting results in submission order.
    pub fn run<T, R, F>(&self, jobs: &[T], work: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, &mut JobLog) -> Result<R> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| MybaError::Other(format!("cannot build worker pool: {e}")))?;

        let mut outcomes: Vec<(JobLog, Result<R>)> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let mut log = JobLog::default();
                    let result = work(job, &mut log);
                    (log, result)
                })
                .collect()
        });

        for (log, _) in &outcomes {
            for line in &log.lines {
                println!("{line}");
            }
        }

        let mut results = Vec::with_capacity(outcomes.len());
        for (_, outcome) in outcomes.drain(..) {
            results.push(outcome?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_in_submission_order() {
        let pool = Pool::new(4);
        let jobs: Vec<usize> = (0..32).collect();
        let results = pool.run(&jobs, |j, _| Ok(j * 2)).unwrap();
        assert_eq!(results, (0..32).map(|j| j * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_jobs_run_despite_failure() {
        let pool = Pool::new(4);
        let ran = AtomicUsize::new(0);
        let jobs: Vec<usize> = (0..16).collect();
        let result = pool.run(&jobs, |j, _| {
            ran.fetch_add(1, Ordering::SeqCst);
            if *j == 3 {
                Err(MybaError::Other("job 3 failed".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        // The pool drains before reporting: every job ran.
        assert_eq!(ran.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_first_error_in_submission_order_wins() {
        let pool = Pool::new(4);
        let jobs: Vec<usize> = (0..8).collect();
        let err = pool
            .run(&jobs, |j, _| -> Result<()> {
                if *j >= 2 {
                    Err(MybaError::Other(format!("job {j}")))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "job 2");
    }

    #[test]
    fn test_zero_means_online_cpus() {
        assert!(Pool::new(0).threads() >= 1);
        assert_eq!(Pool::new(3).threads(), 3);
    }
}
