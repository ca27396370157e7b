// src/engine/pool.rs
//
// Global thread pool for batch processing. A single pool is shared by all
// batches so pool construction cost is paid once and thread count stays
// predictable under concurrent callers.
//
// The pool is initialized lazily on first use; later changes to the
// environment have no effect.

use rayon::ThreadPool;
use std::sync::OnceLock;

/// Minimum number of worker threads.
const MIN_WORKER_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// The shared batch worker pool, sized from available_parallelism so
/// cgroup CPU quotas are respected.
pub fn get_pool() -> &'static ThreadPool {
    GLOBAL_THREAD_POOL.get_or_init(|| {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_WORKER_THREADS);

        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("imagemill-worker-{i}"))
            .build()
            .unwrap_or_else(|_| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(MIN_WORKER_THREADS)
                    .build()
                    .expect("failed to create fallback thread pool")
            })
    })
}
