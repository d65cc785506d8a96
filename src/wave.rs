// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wave resources shared between the sound manager and the mixer.
//!
//! A wave is identified by its allocation: two `WaveRef`s refer to the same wave only if they
//! point at the same `WaveFile`. A wave may be handed out before its audio has finished
//! decoding; `is_loaded` reports when the samples are available.

mod loader;

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub use loader::WaveLoader;

/// Shared reference to a wave resource.
pub type WaveRef = Arc<WaveFile>;

/// Error types for wave loading.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("No playable audio track in {0}")]
    NoTrack(String),

    #[error("Audio file {0} contains no samples")]
    Empty(String),

    #[error("Audio file {0} has no sample rate")]
    NoSampleRate(String),
}

/// Decoded audio for a wave.
#[derive(Clone)]
pub struct WaveData {
    /// Interleaved f32 samples.
    samples: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl WaveData {
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> WaveData {
        WaveData {
            samples: Arc::new(samples),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    /// Returns the sample at the given frame and channel, silence past the end.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channel = channel.min(self.channel_count as usize - 1);
        self.samples
            .get(frame * self.channel_count as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// A wave resource.
pub struct WaveFile {
    name: String,
    data: OnceLock<WaveData>,
}

impl WaveFile {
    /// Creates a wave whose audio is still being loaded.
    pub fn pending(name: &str) -> WaveRef {
        Arc::new(WaveFile {
            name: name.to_string(),
            data: OnceLock::new(),
        })
    }

    /// Creates a fully loaded wave.
    pub fn loaded(name: &str, data: WaveData) -> WaveRef {
        let wave = WaveFile::pending(name);
        wave.complete(data);
        wave
    }

    /// Supplies the decoded audio. Returns false if the wave was already loaded.
    pub fn complete(&self, data: WaveData) -> bool {
        self.data.set(data).is_ok()
    }

    /// Returns true once the audio is available.
    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// Returns the decoded audio, if loaded.
    pub fn data(&self) -> Option<&WaveData> {
        self.data.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WaveFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveFile")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .field("frames", &self.data().map(WaveData::frames))
            .finish()
    }
}

/// Returns true if both references point at the same wave.
pub fn same_wave(a: &WaveRef, b: &WaveRef) -> bool {
    Arc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_complete() {
        let wave = WaveFile::pending("door");
        assert!(!wave.is_loaded());
        assert!(wave.data().is_none());

        assert!(wave.complete(WaveData::new(vec![0.1, 0.2, 0.3, 0.4], 2, 22050)));
        assert!(wave.is_loaded());
        assert_eq!(wave.data().unwrap().frames(), 2);

        // A second completion is refused.
        assert!(!wave.complete(WaveData::new(vec![0.0], 1, 22050)));
        assert_eq!(wave.data().unwrap().frames(), 2);
    }

    #[test]
    fn test_identity() {
        let a = WaveFile::loaded("a", WaveData::new(vec![0.0; 4], 1, 22050));
        let b = WaveFile::loaded("a", WaveData::new(vec![0.0; 4], 1, 22050));
        assert!(same_wave(&a, &a.clone()));
        assert!(!same_wave(&a, &b));
    }

    #[test]
    fn test_sample_lookup() {
        let data = WaveData::new(vec![1.0, -1.0, 0.5, -0.5], 2, 22050);
        assert_eq!(data.sample(0, 0), 1.0);
        assert_eq!(data.sample(1, 1), -0.5);
        // Channels beyond the wave's reuse the last one.
        assert_eq!(data.sample(1, 5), -0.5);
        assert_eq!(data.sample(9, 0), 0.0);
        assert_eq!(data.duration(), Duration::from_secs_f64(2.0 / 22050.0));
    }
}
