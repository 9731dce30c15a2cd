//! Resource usage sampling.
//!
//! Every benchmark operation is bracketed by two [`UsageSnapshot`]s; their
//! difference yields the elapsed wall-clock time, the CPU time consumed, and
//! the bytes allocated during the operation.
//!
//! The allocation counter is process wide. With several workers running, an
//! operation's memory delta includes allocations made concurrently by other
//! workers; this cross-worker noise is an accepted source of measurement
//! variance, exact attribution would require thread-local tracking.

use std::alloc::{GlobalAlloc, Layout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mimalloc::MiMalloc;

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Global allocator that counts allocated bytes on top of mimalloc.
///
/// The benchmark binary installs this with `#[global_allocator]`; the counter
/// feeding [`AllocationCounter`] only moves when it is installed.
#[derive(Debug)]
pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { MiMalloc.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        ALLOCATED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { MiMalloc.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // The counter tracks cumulative allocation, not live bytes, so the
        // new block counts in full.
        ALLOCATED_BYTES.fetch_add(new_size as u64, Ordering::Relaxed);
        unsafe { MiMalloc.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { MiMalloc.dealloc(ptr, layout) }
    }
}

/// Read handle for the process-wide allocated-bytes counter.
///
/// The sampler depends only on this read capability; the counter itself is
/// incremented by [`CountingAllocator`] on every allocation.
#[derive(Clone, Copy, Debug)]
pub struct AllocationCounter {
    bytes: &'static AtomicU64,
}

impl AllocationCounter {
    /// The counter fed by [`CountingAllocator`].
    pub fn global() -> Self {
        Self {
            bytes: &ALLOCATED_BYTES,
        }
    }

    /// Current reading; monotonically increasing, never reset.
    pub fn reading(self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Point-in-time capture of the three resource counters.
#[derive(Clone, Copy, Debug)]
pub struct UsageSnapshot {
    allocated: u64,
    clock: Instant,
    cpu: Duration,
}

impl UsageSnapshot {
    /// Captures the allocation counter, a monotonic timestamp, and the
    /// cumulative process CPU time.
    pub fn capture(counter: AllocationCounter) -> Self {
        Self {
            allocated: counter.reading(),
            clock: Instant::now(),
            cpu: process_cpu_time(),
        }
    }
}

/// Resource consumption between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceUsage {
    /// Elapsed wall-clock time.
    pub elapsed: Duration,
    /// CPU nanoseconds consumed; divided by the object size when it is
    /// non-zero.
    pub cpu: f64,
    /// Bytes allocated; divided by the object size when it is non-zero.
    pub memory: f64,
}

impl ResourceUsage {
    /// Differences the two snapshots bracketing an operation.
    ///
    /// With `object_size == 0` the CPU and memory values are the raw deltas,
    /// otherwise each is scaled to a per-byte rate.
    pub fn between(start: &UsageSnapshot, end: &UsageSnapshot, object_size: u64) -> Self {
        let cpu_delta = end.cpu.saturating_sub(start.cpu).as_nanos() as f64;
        let memory_delta = end.allocated.saturating_sub(start.allocated) as f64;

        let scale = |value: f64| {
            if object_size == 0 {
                value
            } else {
                value / object_size as f64
            }
        };

        Self {
            elapsed: end.clock.saturating_duration_since(start.clock),
            cpu: scale(cpu_delta),
            memory: scale(memory_delta),
        }
    }
}

/// Cumulative user+system CPU time of this process.
#[cfg(unix)]
fn process_cpu_time() -> Duration {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage fills the struct on success; on failure the zeroed
    // value reads as zero CPU time.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return Duration::ZERO;
    }
    let usage = unsafe { usage.assume_init() };

    timeval_duration(usage.ru_utime) + timeval_duration(usage.ru_stime)
}

#[cfg(unix)]
fn timeval_duration(time: libc::timeval) -> Duration {
    Duration::from_secs(time.tv_sec.max(0) as u64) + Duration::from_micros(time.tv_usec.max(0) as u64)
}

/// Platforms without a usable process CPU counter report zero rather than
/// fail.
#[cfg(not(unix))]
fn process_cpu_time() -> Duration {
    Duration::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(allocated: u64, clock: Instant, cpu: Duration) -> UsageSnapshot {
        UsageSnapshot {
            allocated,
            clock,
            cpu,
        }
    }

    #[test]
    fn bracketing_a_noop_is_non_negative() {
        let counter = AllocationCounter::global();
        let start = UsageSnapshot::capture(counter);
        let end = UsageSnapshot::capture(counter);

        let usage = ResourceUsage::between(&start, &end, 0);
        assert!(usage.elapsed >= Duration::ZERO);
        assert!(usage.cpu >= 0.0);
        assert!(usage.memory >= 0.0);
    }

    #[test]
    fn zero_object_size_reports_raw_deltas() {
        let clock = Instant::now();
        let start = snapshot(100, clock, Duration::from_nanos(500));
        let end = snapshot(1124, clock, Duration::from_nanos(2500));

        let usage = ResourceUsage::between(&start, &end, 0);
        assert_eq!(usage.cpu, 2000.0);
        assert_eq!(usage.memory, 1024.0);
    }

    #[test]
    fn positive_object_size_scales_per_byte() {
        let clock = Instant::now();
        let start = snapshot(100, clock, Duration::from_nanos(500));
        let end = snapshot(1124, clock, Duration::from_nanos(2500));

        let usage = ResourceUsage::between(&start, &end, 512);
        assert_eq!(usage.cpu, 2000.0 / 512.0);
        assert_eq!(usage.memory, 2.0);
    }

    #[test]
    fn counter_reading_is_monotonic() {
        let counter = AllocationCounter::global();
        let first = counter.reading();
        let _data = vec![0u8; 4096];
        assert!(counter.reading() >= first);
    }

    #[test]
    fn process_cpu_time_is_available() {
        // Burn a little CPU so the counter has something to show on unix;
        // other platforms legitimately report zero.
        let mut total = 0u64;
        for i in 0..100_000u64 {
            total = total.wrapping_add(i * i);
        }
        std::hint::black_box(total);

        assert!(process_cpu_time() >= Duration::ZERO);
    }
}
