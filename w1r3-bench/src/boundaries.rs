//! Histogram bucket planning.
//!
//! The metrics backend supports at most 200 buckets per histogram, so the
//! boundaries have to be chosen carefully: resolution is concentrated where
//! the expected value density is highest (small latencies, near-zero per-byte
//! rates) while the step-doubling schedules still cover the
//! multi-order-of-magnitude tails.
//!
//! All three planners are pure functions of fixed policy constants and run
//! once at startup.

/// Maximum number of buckets the exporting backend accepts per histogram.
pub const MAX_BUCKETS: usize = 200;

/// Bucket boundaries for the latency histogram, in seconds.
///
/// For the first 100ms use 2ms buckets, the resolution needed for small
/// object uploads and downloads. The remaining buckets are 10ms wide, then
/// 20ms, and so forth, doubling every 10 buckets. The schedule stops once a
/// boundary reaches 300s, any latency over that is too high for this
/// benchmark.
pub fn latency() -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(MAX_BUCKETS);

    let mut boundary: f64 = 0.0;
    let mut increment: f64 = 0.002;
    for _ in 0..50 {
        boundaries.push(boundary);
        boundary += increment;
    }

    boundary = 0.1;
    increment = 0.01;
    for i in 0..150 {
        boundaries.push(boundary);
        if boundary >= 300.0 {
            break;
        }
        if i != 0 && i % 10 == 0 {
            increment *= 2.0;
        }
        boundary += increment;
    }

    boundaries
}

/// Bucket boundaries for the CPU histogram, in nanoseconds per byte.
///
/// Starts at 0 with increments of 1/8, doubling the increment every 32
/// buckets.
pub fn cpu_per_byte() -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(MAX_BUCKETS);

    let mut boundary: f64 = 0.0;
    let mut increment: f64 = 1.0 / 8.0;
    for i in 0..MAX_BUCKETS {
        boundaries.push(boundary);
        if i != 0 && i % 32 == 0 {
            increment *= 2.0;
        }
        boundary += increment;
    }

    boundaries
}

/// Bucket boundaries for the memory histogram, in allocated bytes per byte.
///
/// The client is expected to allocate less than the transferred size, that is
/// the point of streaming the data. Starts at 0 with increments of 1/16,
/// doubling the increment every 16 buckets.
pub fn memory_per_byte() -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(MAX_BUCKETS);

    let mut boundary: f64 = 0.0;
    let mut increment: f64 = 1.0 / 16.0;
    for i in 0..MAX_BUCKETS {
        boundaries.push(boundary);
        boundary += increment;
        if i != 0 && i % 16 == 0 {
            increment *= 2.0;
        }
    }

    boundaries
}
