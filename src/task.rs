//! Fork-join fan-out of index ranges to worker threads.
//!
//! The world hands each parallel pass to a [`TaskScheduler`]
//! and continues only after every range has been processed.

use std::ops::Range;

/// Runs a task over `0..item_count` split into ranges, possibly on several threads,
/// and returns once all of them are done.
///
/// The task receives the range to process and the index of the worker running it.
/// Ranges handed to the task are disjoint and together cover `0..item_count`.
pub trait TaskScheduler: Send + Sync {
    fn parallel_for(
        &self,
        item_count: usize,
        min_range: usize,
        task: &(dyn Fn(Range<usize>, usize) + Sync),
    );

    /// Number of workers that may run tasks at once.
    fn worker_count(&self) -> usize;
}

/// Runs everything on the calling thread as worker 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialScheduler;

impl TaskScheduler for SerialScheduler {
    fn parallel_for(
        &self,
        item_count: usize,
        _min_range: usize,
        task: &(dyn Fn(Range<usize>, usize) + Sync),
    ) {
        if item_count > 0 {
            task(0..item_count, 0);
        }
    }

    fn worker_count(&self) -> usize {
        1
    }
}

#[cfg(feature = "parallel")]
pub use rayon_impl::RayonScheduler;

#[cfg(feature = "parallel")]
mod rayon_impl {
    use super::TaskScheduler;
    use rayon::prelude::*;
    use std::ops::Range;

    /// Splits the work into chunks of at least `min_range` items
    /// and runs them on a rayon thread pool.
    ///
    /// Uses rayon's global pool unless constructed with [`with_threads`][Self::with_threads].
    #[derive(Debug, Default)]
    pub struct RayonScheduler {
        pool: Option<rayon::ThreadPool>,
    }

    impl RayonScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a scheduler with its own pool of `thread_count` threads.
        pub fn with_threads(thread_count: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(thread_count)
                .build()?;
            Ok(Self { pool: Some(pool) })
        }

        fn run(
            &self,
            item_count: usize,
            chunk: usize,
            task: &(dyn Fn(Range<usize>, usize) + Sync),
        ) {
            let chunk_count = (item_count + chunk - 1) / chunk;
            (0..chunk_count).into_par_iter().for_each(|chunk_idx| {
                let start = chunk_idx * chunk;
                let end = (start + chunk).min(item_count);
                task(start..end, rayon::current_thread_index().unwrap_or(0));
            });
        }
    }

    impl TaskScheduler for RayonScheduler {
        fn parallel_for(
            &self,
            item_count: usize,
            min_range: usize,
            task: &(dyn Fn(Range<usize>, usize) + Sync),
        ) {
            if item_count == 0 {
                return;
            }
            let worker_count = self.worker_count();
            let chunk = min_range
                .max(1)
                .max((item_count + worker_count - 1) / worker_count);
            if chunk >= item_count {
                // not worth a trip to the pool
                task(0..item_count, 0);
                return;
            }
            match &self.pool {
                Some(pool) => pool.install(|| self.run(item_count, chunk, task)),
                None => self.run(item_count, chunk, task),
            }
        }

        fn worker_count(&self) -> usize {
            match &self.pool {
                Some(pool) => pool.current_num_threads(),
                None => rayon::current_num_threads(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn check_coverage(scheduler: &dyn TaskScheduler, item_count: usize, min_range: usize) {
        let seen: Vec<AtomicUsize> = (0..item_count).map(|_| AtomicUsize::new(0)).collect();
        let ranges = Mutex::new(Vec::new());
        scheduler.parallel_for(item_count, min_range, &|range, worker| {
            assert!(worker < scheduler.worker_count().max(1));
            ranges.lock().unwrap().push(range.clone());
            for i in range {
                seen[i].fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(seen.iter().all(|s| s.load(Ordering::Relaxed) == 1));
        let ranges = ranges.into_inner().unwrap();
        // every range but the last one respects the minimum size
        let short = ranges.iter().filter(|r| r.len() < min_range).count();
        assert!(short <= 1);
    }

    #[test]
    fn serial_covers_everything_once() {
        check_coverage(&SerialScheduler, 1000, 64);
        check_coverage(&SerialScheduler, 0, 64);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn rayon_covers_everything_once() {
        let scheduler = RayonScheduler::with_threads(4).unwrap();
        assert_eq!(scheduler.worker_count(), 4);
        check_coverage(&scheduler, 1000, 16);
        check_coverage(&scheduler, 10, 16);
        check_coverage(&scheduler, 0, 16);
        check_coverage(&RayonScheduler::new(), 777, 1);
    }
}
