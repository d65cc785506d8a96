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

//! The mixer the sound manager drives.
//!
//! The mixer owns the actual output: it holds a queue of waves per channel, applies volume and
//! spatial placement, and reports when a wave has finished playing. Commands are fire and
//! forget; none of them block on audio I/O.

use crate::wave::WaveRef;

pub mod cpal;
pub mod mock;
pub mod software;
mod thread_priority;

/// Largest volume a mixer channel renders at full scale.
pub const MAX_VOLUME: u32 = 32767;

/// Whether a setting persists on the channel or applies to the next rendered buffer only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Apply {
    Persistent,
    UseOnce,
}

/// How a new wave is submitted to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Queueing {
    /// Clear anything queued on the channel and play immediately.
    Replace,
    /// Play after everything already queued on the channel.
    Append,
}

/// A spatial placement relative to the listener. Angles are in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Position {
    Vector { x: f64, y: f64, z: f64 },
    Polar {
        range: f64,
        azimuth: f64,
        elevation: f64,
    },
}

impl Position {
    /// Straight ahead of the listener at unit distance.
    pub const AHEAD: Position = Position::Vector {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    /// Horizontal angle from straight ahead, positive to the right.
    pub fn azimuth(&self) -> f64 {
        match *self {
            Position::Vector { x, z, .. } => {
                if x == 0.0 && z == 0.0 {
                    0.0
                } else {
                    x.atan2(z).to_degrees()
                }
            }
            Position::Polar { azimuth, .. } => azimuth,
        }
    }

    /// Distance from the listener.
    pub fn distance(&self) -> f64 {
        match *self {
            Position::Vector { x, y, z } => (x * x + y * y + z * z).sqrt(),
            Position::Polar { range, .. } => range.abs(),
        }
    }
}

/// Sent by the mixer when a wave finishes playing on its own. Flushed and stopped waves are
/// not reported.
#[derive(Clone, Debug)]
pub struct Completion {
    pub channel: usize,
    pub wave: WaveRef,
    /// The tag the wave was submitted with.
    pub tag: u64,
}

pub type CompletionSender = crossbeam_channel::Sender<Completion>;
pub type CompletionReceiver = crossbeam_channel::Receiver<Completion>;

/// Creates the channel a mixer reports completions through.
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    crossbeam_channel::unbounded()
}

/// Error types for mixer operations.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("Channel {0} does not exist")]
    InvalidChannel(usize),

    #[error("Channel {0} is not open")]
    ChannelClosed(usize),

    #[error("Wave {0} is not loaded")]
    NotLoaded(String),

    #[error("Output device error: {0}")]
    Device(String),
}

/// The mixer interface consumed by the sound manager.
pub trait Mixer: Send + Sync {
    /// Returns the number of channels the mixer renders.
    fn channel_count(&self) -> usize;

    /// Opens a channel for playback.
    fn open_channel(&self, channel: usize) -> Result<(), MixerError>;

    /// Closes a channel, dropping anything queued on it.
    fn close_channel(&self, channel: usize);

    /// Sets the channel volume, 0 to `MAX_VOLUME` for full scale.
    fn set_volume(&self, channel: usize, apply: Apply, volume: u32);

    /// Sets the time over which volume changes are interpolated.
    fn set_pan_rate(&self, channel: usize, apply: Apply, pan_rate_ms: u32);

    /// Places the channel's source relative to the listener.
    fn set_position(&self, channel: usize, apply: Apply, position: Position);

    /// Submits a wave to a channel. A repeating wave loops until flushed. The tag comes back
    /// in the wave's completion and selects it in `stop`.
    fn play(
        &self,
        channel: usize,
        wave: WaveRef,
        queueing: Queueing,
        repeat: bool,
        tag: u64,
    ) -> Result<(), MixerError>;

    /// Removes the wave submitted with `tag` from the channel, leaving the rest of the queue
    /// playing. No completion is reported for it.
    fn stop(&self, channel: usize, tag: u64);

    /// Drops everything queued on the channel without reporting completions.
    fn flush_channel(&self, channel: usize);

    /// Returns true if nothing is playing or queued on the channel.
    fn is_channel_done(&self, channel: usize) -> bool;

    /// Opens every channel.
    fn open_all(&self) -> Result<(), MixerError> {
        for channel in 0..self.channel_count() {
            self.open_channel(channel)?;
        }
        Ok(())
    }

    /// Flushes every channel.
    fn flush_all(&self) {
        for channel in 0..self.channel_count() {
            self.flush_channel(channel);
        }
    }
}
