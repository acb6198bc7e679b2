use std::sync::atomic::{AtomicU64, Ordering};

/// Accumulated `1/n` steps may land a hair below an integer position.
const DRIFT_TOLERANCE: f64 = 1e-3;

/// Lock-free fractional playhead, stored as `f64` bits.
///
/// The value is a fraction of the track: `0.0` is sample 0, `1.0` is one past
/// the last sample. Writers never block; readers are a single atomic load.
#[derive(Debug)]
pub struct ProgressTracker {
    bits: AtomicU64,
    num_samples: usize,
}

impl ProgressTracker {
    pub fn new(num_samples: usize) -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            num_samples: num_samples.max(1),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Overwrite the playhead, discarding any concurrent accumulation.
    pub fn set(&self, value: f64) {
        self.bits.store(value.max(0.0).to_bits(), Ordering::Release);
    }

    /// Add `delta` with a compare-and-retry loop. Returns the new value.
    pub fn advance(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = f64::from_bits(current) + delta;
            match self.bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Fraction covered by one sample.
    pub fn step(&self) -> f64 {
        1.0 / self.num_samples as f64
    }

    pub fn fraction_of(&self, sample: usize) -> f64 {
        sample as f64 / self.num_samples as f64
    }

    /// Unclamped sample position; equals `num_samples` once the end is reached.
    pub fn position(&self) -> usize {
        let scaled = self.load() * self.num_samples as f64 + DRIFT_TOLERANCE;
        if scaled <= 0.0 { 0 } else { scaled.floor() as usize }
    }

    /// Next sample to read, always in `[0, num_samples)`.
    pub fn sample_index(&self) -> usize {
        self.position().min(self.num_samples - 1)
    }

    pub fn is_at_end(&self) -> bool {
        self.position() >= self.num_samples
    }
}
