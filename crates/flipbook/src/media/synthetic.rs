//! A generated single-track movie: no file, no ffprobe, deterministic pixels.
//!
//! Every pixel of sample `i` encodes the index as `[i & 0xff, (i >> 8) & 0xff, 0x80, 0xff]`,
//! so a presented frame can be traced back to the sample it came from.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::types::{Sample, TrackDescription, TrackKind};
use super::container::ContainerReader;
use crate::error::{MovieError, Result};

/// Codec identifier of generated samples (packed RGBA8).
pub const SYNTHETIC_CODEC: &str = "rgba";

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub samples: usize,
    pub framerate: f32,
    pub width: u32,
    pub height: u32,
    /// Samples that come back truncated, so they fail to decode.
    pub corrupt: HashSet<usize>,
    /// Artificial per-sample read latency.
    pub read_delay: Option<Duration>,
    pub codec: String,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            samples: 10,
            framerate: 10.0,
            width: 4,
            height: 4,
            corrupt: HashSet::new(),
            read_delay: None,
            codec: SYNTHETIC_CODEC.to_string(),
        }
    }
}

pub struct SyntheticContainer {
    spec: SyntheticSpec,
    tracks: Vec<TrackDescription>,
    reads: Arc<AtomicUsize>,
}

impl SyntheticContainer {
    pub fn new(spec: SyntheticSpec) -> Self {
        let duration = if spec.framerate > 0.0 {
            spec.samples as f64 / spec.framerate as f64
        } else {
            0.0
        };
        let tracks = vec![TrackDescription {
            kind: TrackKind::Video,
            codec: spec.codec.clone(),
            width: spec.width,
            height: spec.height,
            framerate: spec.framerate,
            sample_count: spec.samples,
            duration,
        }];
        Self {
            spec,
            tracks,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `read_sample` calls, readable after the container has
    /// been handed to a movie.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    /// The colour every pixel of sample `index` carries.
    pub fn pixel_for(index: usize) -> [u8; 4] {
        [(index & 0xff) as u8, ((index >> 8) & 0xff) as u8, 0x80, 0xff]
    }

    /// Recover the sample index from a generated pixel buffer.
    pub fn sample_of(pixels: &[u8]) -> Option<usize> {
        match pixels {
            [lo, hi, 0x80, 0xff, ..] => Some(*lo as usize | ((*hi as usize) << 8)),
            _ => None,
        }
    }
}

impl ContainerReader for SyntheticContainer {
    fn source_name(&self) -> String {
        format!("synthetic:{}x{}x{}", self.spec.width, self.spec.height, self.spec.samples)
    }

    fn format(&self) -> String {
        "synthetic".to_string()
    }

    fn tracks(&self) -> &[TrackDescription] {
        &self.tracks
    }

    fn read_sample(&mut self, track: usize, index: usize) -> Result<Sample> {
        if track != 0 || index >= self.spec.samples {
            return Err(MovieError::Sample {
                index,
                reason: format!("no sample {index} in track {track}"),
            });
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.spec.read_delay {
            std::thread::sleep(delay);
        }

        let pixel_count = (self.spec.width as usize) * (self.spec.height as usize);
        let pixels = vec![Self::pixel_for(index); pixel_count];
        let mut data: Vec<u8> = bytemuck::cast_slice(&pixels).to_vec();
        if self.spec.corrupt.contains(&index) {
            data.truncate(data.len() / 2);
        }

        Ok(Sample {
            data,
            timestamp: index as f64 / self.spec.framerate.max(f32::EPSILON) as f64,
        })
    }
}
