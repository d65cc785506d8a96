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

//! Wave loading and caching.
//!
//! Decoded audio is cached by path, but every load hands out a fresh `WaveFile` so that each
//! loaded wave keeps its own identity.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::{WaveData, WaveError, WaveFile, WaveRef};

/// Loads waves from disk.
///
/// The cache keeps every decoded file until it is evicted or cleared, so long-running callers
/// that load many distinct files should call [`WaveLoader::evict`] or
/// [`WaveLoader::clear_cache`]. Waves already handed out keep their audio either way.
pub struct WaveLoader {
    /// Directory that relative names are resolved against.
    base_path: PathBuf,
    /// Decoded audio by resolved path.
    cache: HashMap<PathBuf, WaveData>,
}

impl WaveLoader {
    pub fn new(base_path: &Path) -> WaveLoader {
        WaveLoader {
            base_path: base_path.to_path_buf(),
            cache: HashMap::new(),
        }
    }

    /// Resolves a sound name to a path on disk.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Loads the named wave, decoding it unless it's already cached.
    pub fn load(&mut self, name: &str) -> Result<WaveRef, WaveError> {
        let path = self.resolve(name);
        self.load_path(&path)
    }

    /// Loads the wave at the given path.
    pub fn load_path(&mut self, path: &Path) -> Result<WaveRef, WaveError> {
        if let Some(data) = self.cache.get(path) {
            debug!(path = ?path, "Using cached wave");
            return Ok(WaveFile::loaded(&display_name(path), data.clone()));
        }

        let data = decode(path)?;
        self.cache.insert(path.to_path_buf(), data.clone());
        Ok(WaveFile::loaded(&display_name(path), data))
    }

    /// Returns a pending wave immediately and decodes it on a background thread. The wave
    /// reports itself loaded once decoding finishes; if decoding fails it stays pending.
    pub fn load_in_background(&self, name: &str) -> WaveRef {
        let path = self.resolve(name);
        let wave = WaveFile::pending(&display_name(&path));
        let pending = wave.clone();
        thread::spawn(move || match decode(&path) {
            Ok(data) => {
                pending.complete(data);
            }
            Err(e) => warn!(path = ?path, err = %e, "Failed to load wave in background"),
        });
        wave
    }

    /// Drops the named wave's decoded audio from the cache. Returns false if it wasn't cached.
    pub fn evict(&mut self, name: &str) -> bool {
        let path = self.resolve(name);
        self.cache.remove(&path).is_some()
    }

    /// Drops every cached wave.
    pub fn clear_cache(&mut self) {
        debug!(cached = self.cache.len(), "Clearing wave cache");
        self.cache.clear();
    }

    /// Returns the number of cached waves.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Returns the total memory used by cached audio.
    pub fn total_memory_usage(&self) -> usize {
        self.cache
            .values()
            .map(|data| std::mem::size_of_val(data.samples()))
            .sum()
    }
}

impl std::fmt::Debug for WaveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveLoader")
            .field("base_path", &self.base_path)
            .field("cached_waves", &self.cache.len())
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
        .to_string()
}

/// Decodes an entire file into memory as interleaved f32 samples.
fn decode(path: &Path) -> Result<WaveData, WaveError> {
    info!(path = ?path, "Loading wave into memory");

    let file = File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WaveError::NoTrack(path.display().to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut channel_count = codec_params
        .channels
        .map(|channels| channels.count() as u16)
        .unwrap_or(1);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channel_count = spec.channels.count() as u16;
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if samples.is_empty() {
        return Err(WaveError::Empty(path.display().to_string()));
    }

    let sample_rate = require_sample_rate(path, sample_rate)?;
    let data = WaveData::new(samples, channel_count, sample_rate);
    info!(
        path = ?path,
        channels = data.channel_count(),
        sample_rate = data.sample_rate(),
        duration_ms = data.duration().as_millis(),
        "Wave loaded"
    );
    Ok(data)
}

/// Rejects a zero sample rate.
fn require_sample_rate(path: &Path, sample_rate: u32) -> Result<u32, WaveError> {
    if sample_rate == 0 {
        return Err(WaveError::NoSampleRate(path.display().to_string()));
    }
    Ok(sample_rate)
}
