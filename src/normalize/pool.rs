//! Bounded worker pool for per-row normalization.

use std::fmt::Display;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::config::PoolSettings;
use crate::error::{ViewError, ViewResult};

/// A fixed-size pool shared by every request. Built once at startup and
/// passed to the service; there is no global instance.
pub struct RowPool {
    pool: ThreadPool,
}

impl RowPool {
    pub fn new(threads: usize) -> ViewResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("vista-rows-{}", i))
            .build()
            .map_err(|e| ViewError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_settings(settings: &PoolSettings) -> ViewResult<Self> {
        Self::new(settings.threads())
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` over every item and return the results in input order.
    ///
    /// Blocks until every row is done. If any row fails the whole batch
    /// fails, reporting how many rows failed and the first error by position.
    pub fn process<T, R, E, F>(&self, items: Vec<T>, f: F) -> ViewResult<Vec<R>>
    where
        T: Send,
        R: Send,
        E: Display + Send,
        F: Fn(usize, T) -> Result<R, E> + Sync,
    {
        let total = items.len();
        let results: Vec<Result<R, E>> = self.pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(i, item)| f(i, item))
                .collect()
        });

        let mut rows = Vec::with_capacity(total);
        let mut failed = 0;
        let mut first = None;
        for result in results {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    failed += 1;
                    first.get_or_insert_with(|| e.to_string());
                }
            }
        }

        match first {
            None => Ok(rows),
            Some(first) => {
                warn!(failed, total, error = %first, "row processing failed");
                Err(ViewError::RowProcessing {
                    failed,
                    total,
                    first,
                })
            }
        }
    }
}

impl std::fmt::Debug for RowPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowPool")
            .field("threads", &self.threads())
            .finish()
    }
}
