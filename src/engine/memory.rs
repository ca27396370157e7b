// src/engine/memory.rs
//
// Memory backpressure for batch processing. A weighted semaphore bounds the
// total estimated decoded bytes in flight, so a batch of large images cannot
// OOM a constrained container even when the thread pool allows more
// parallelism.

use parking_lot::{Condvar, Mutex};
use std::fs;
use std::sync::{Arc, OnceLock};

use crate::engine::decoder::{probe_image, ImageProbe};

/// Conservative fallback weight when the header cannot be parsed.
const FALLBACK_ESTIMATE_BYTES: u64 = 100 * 1024 * 1024;

/// Lower bound for any estimate to avoid zero-ish weights.
const MIN_ESTIMATE_BYTES: u64 = 24 * 1024 * 1024;

/// Heuristic overhead for decode scratch buffers.
const DECODE_OVERHEAD_BYTES: u64 = 8 * 1024 * 1024;

/// Memory reserved for the rest of the process.
const MIN_RESERVED_MEMORY: u64 = 64 * 1024 * 1024;
const MAX_RESERVED_MEMORY: u64 = 512 * 1024 * 1024;

/// Capacity used when no memory limit can be detected.
const FALLBACK_SEMAPHORE_CAPACITY: u64 = 16 * FALLBACK_ESTIMATE_BYTES;

/// Byte-weighted semaphore. Acquire blocks until the requested weight fits;
/// the permit releases on drop.
#[derive(Debug)]
pub struct WeightedSemaphore {
    capacity: u64,
    state: Mutex<u64>, // available bytes
    cvar: Condvar,
}

#[derive(Debug)]
pub struct MemoryPermit {
    sem: Arc<WeightedSemaphore>,
    weight: u64,
}

impl WeightedSemaphore {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn acquire(self: &Arc<Self>, weight: u64) -> MemoryPermit {
        let mut available = self.state.lock();
        // clamp absurd weights to capacity to avoid deadlock
        let need = weight.min(self.capacity);
        while *available < need {
            self.cvar.wait(&mut available);
        }
        *available -= need;
        MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        }
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock();
        *available = (*available).saturating_add(weight).min(self.capacity);
        // notify_all: waiters have heterogeneous weights, notify_one can starve
        // a small waiter behind a large one.
        self.cvar.notify_all();
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.sem.release(self.weight);
    }
}

static GLOBAL_MEMORY_SEMAPHORE: OnceLock<Arc<WeightedSemaphore>> = OnceLock::new();

/// Global weighted semaphore for decode backpressure.
pub fn memory_semaphore() -> Arc<WeightedSemaphore> {
    GLOBAL_MEMORY_SEMAPHORE
        .get_or_init(|| Arc::new(WeightedSemaphore::new(compute_semaphore_capacity())))
        .clone()
}

fn compute_semaphore_capacity() -> u64 {
    match detect_available_memory() {
        Some(mem) => {
            let reserved = (mem / 20).clamp(MIN_RESERVED_MEMORY, MAX_RESERVED_MEMORY);
            mem.saturating_sub(reserved).max(MIN_ESTIMATE_BYTES)
        }
        None => FALLBACK_SEMAPHORE_CAPACITY,
    }
}

/// Estimate peak decoded memory for one input from its header dimensions.
/// The model is deterministic: pixel count times RGBA bytes plus decode
/// scratch, floored at a minimum weight.
pub fn estimate_decode_weight(bytes: &[u8]) -> u64 {
    match probe_image(bytes) {
        Some(ImageProbe { width, height, .. }) => {
            let pixels = width as u64 * height as u64;
            pixels
                .saturating_mul(4)
                .saturating_add(DECODE_OVERHEAD_BYTES)
                .max(MIN_ESTIMATE_BYTES)
        }
        None => FALLBACK_ESTIMATE_BYTES,
    }
}

/// Detect the memory ceiling: cgroup v2 limit first, then total system
/// memory. Returns None when neither can be read.
fn detect_available_memory() -> Option<u64> {
    detect_cgroup_v2_memory().or_else(detect_system_memory)
}

fn detect_cgroup_v2_memory() -> Option<u64> {
    let content = fs::read_to_string("/sys/fs/cgroup/memory.max").ok()?;
    let trimmed = content.trim();
    if trimmed == "max" {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn detect_system_memory() -> Option<u64> {
    let content = fs::read_to_string("/proc/meminfo").ok()?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn permits_release_on_drop() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        {
            let _a = sem.acquire(60);
            let _b = sem.acquire(40);
            assert_eq!(*sem.state.lock(), 0);
        }
        assert_eq!(*sem.state.lock(), 100);
    }

    #[test]
    fn oversized_weight_is_clamped_to_capacity() {
        let sem = Arc::new(WeightedSemaphore::new(50));
        let permit = sem.acquire(10_000);
        assert_eq!(permit.weight, 50);
        drop(permit);
        assert_eq!(*sem.state.lock(), 50);
    }

    #[test]
    fn acquire_blocks_until_capacity_frees() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        let progressed = Arc::new(AtomicUsize::new(0));

        let first = sem.acquire(100);
        let handle = {
            let sem = Arc::clone(&sem);
            let progressed = Arc::clone(&progressed);
            thread::spawn(move || {
                let _p = sem.acquire(100);
                progressed.store(1, Ordering::SeqCst);
            })
        };

        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(progressed.load(Ordering::SeqCst), 0);

        drop(first);
        handle.join().unwrap();
        assert_eq!(progressed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn estimates_scale_with_header_dimensions() {
        let small = {
            let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(10, 10));
            let mut buf = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };
        let weight = estimate_decode_weight(&small);
        assert_eq!(weight, MIN_ESTIMATE_BYTES);

        assert_eq!(estimate_decode_weight(b"garbage"), FALLBACK_ESTIMATE_BYTES);
    }
}
