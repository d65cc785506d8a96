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
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::wave::{WaveData, WaveFile, WaveRef};

const TEST_SAMPLE_RATE: u32 = 22050;

/// Generates a 440Hz sine wave with the given number of frames per channel.
pub fn sine(channels: u16, frames: usize, sample_rate: u32) -> Vec<f32> {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let value = 0.5 * (2.0 * PI * 440.0 * t).sin();
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

/// Creates a loaded mono wave of the given length.
pub fn tone(name: &str, frames: usize) -> WaveRef {
    WaveFile::loaded(
        name,
        WaveData::new(sine(1, frames, TEST_SAMPLE_RATE), 1, TEST_SAMPLE_RATE),
    )
}

/// Creates a loaded mono wave holding a constant value.
pub fn constant(name: &str, value: f32, frames: usize) -> WaveRef {
    WaveFile::loaded(
        name,
        WaveData::new(vec![value; frames], 1, TEST_SAMPLE_RATE),
    )
}

/// Writes a 16-bit WAV file of a sine wave and returns its path.
pub fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).expect("unable to create wav");
    for sample in sine(channels, frames, sample_rate) {
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .expect("unable to write sample");
    }
    writer.finalize().expect("unable to finalize wav");
    path
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
