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

//! Blends per-channel volume and the global percent knobs into a mixer volume.

use std::time::Duration;

use tracing::debug;

use crate::mixer::{Apply, Mixer};

/// Scale from a 0-100 channel volume to mixer amplitude.
const AMPLITUDE_PER_STEP: u32 = 327;

/// Tier factor that ignores the knobs.
const FIXED_TIER_FACTOR: u64 = 24525;

/// Channel volumes are percentages.
pub const MAX_CHANNEL_VOLUME: u32 = 100;

/// Which knob, if any, scales a channel on top of the music percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// Modes 0-2.
    Speech,
    /// Modes 3-5.
    Fixed,
    /// Modes 6-9.
    Master,
    Unscaled,
}

impl Tier {
    pub fn from_mode(mode: u8) -> Tier {
        match mode {
            0..=2 => Tier::Speech,
            3..=5 => Tier::Fixed,
            6..=9 => Tier::Master,
            _ => Tier::Unscaled,
        }
    }
}

/// The global gain knobs, in percent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PercentKnobs {
    pub music: f64,
    pub speech: f64,
    pub master: f64,
    pub parrot: f64,
}

impl Default for PercentKnobs {
    fn default() -> Self {
        PercentKnobs {
            music: 75.0,
            speech: 75.0,
            master: 75.0,
            parrot: 75.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// 0-100.
    pub volume: u32,
    pub mode: u8,
}

/// Scales `value` by a percent, truncating toward zero. Negative results clamp to zero.
fn scale(percent: f64, value: u32) -> u32 {
    (percent * value as f64 / 100.0) as u32
}

/// Computes the mixer volume for a channel. Each step truncates.
pub fn compute_volume(state: ChannelState, knobs: &PercentKnobs) -> u32 {
    let raw = state.volume * AMPLITUDE_PER_STEP;
    let tiered = match Tier::from_mode(state.mode) {
        Tier::Speech => scale(knobs.speech, raw),
        Tier::Fixed => (FIXED_TIER_FACTOR * raw as u64 / 100).min(u32::MAX as u64) as u32,
        Tier::Master => scale(knobs.master, raw),
        Tier::Unscaled => raw,
    };
    scale(knobs.music, tiered)
}

/// Per-channel volume and mode for the logical channels, plus the knobs that scale them.
#[derive(Debug)]
pub struct VolumeModel {
    knobs: PercentKnobs,
    channels: Vec<ChannelState>,
    ramp: Duration,
}

impl VolumeModel {
    /// Every channel starts silent in mode 0.
    pub fn new(channel_count: usize, knobs: PercentKnobs, ramp: Duration) -> VolumeModel {
        VolumeModel {
            knobs,
            channels: vec![ChannelState::default(); channel_count],
            ramp,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn knobs(&self) -> &PercentKnobs {
        &self.knobs
    }

    pub fn knobs_mut(&mut self) -> &mut PercentKnobs {
        &mut self.knobs
    }

    pub fn channel(&self, channel: usize) -> Option<ChannelState> {
        self.channels.get(channel).copied()
    }

    /// Stores a volume, clamped to 0-100. Returns false for untracked channels.
    pub fn set_volume(&mut self, channel: usize, volume: u32) -> bool {
        match self.channels.get_mut(channel) {
            Some(state) => {
                state.volume = volume.min(MAX_CHANNEL_VOLUME);
                true
            }
            None => false,
        }
    }

    /// Stores a volume and mode. Returns false for untracked channels.
    pub fn set_channel(&mut self, channel: usize, volume: u32, mode: u8) -> bool {
        match self.channels.get_mut(channel) {
            Some(state) => {
                state.volume = volume.min(MAX_CHANNEL_VOLUME);
                state.mode = mode;
                true
            }
            None => false,
        }
    }

    pub fn reset_channel(&mut self, channel: usize) {
        if let Some(state) = self.channels.get_mut(channel) {
            *state = ChannelState::default();
        }
    }

    /// The mixer volume for a tracked channel.
    pub fn compute(&self, channel: usize) -> Option<u32> {
        self.channel(channel)
            .map(|state| compute_volume(state, &self.knobs))
    }

    /// Pushes the channel's volume to the mixer, ramping over `pan_rate_ms`.
    pub fn update_volume(&self, mixer: &dyn Mixer, channel: usize, pan_rate_ms: u32) {
        let Some(volume) = self.compute(channel) else {
            debug!(channel, "Channel volume is not tracked");
            return;
        };
        mixer.set_pan_rate(channel, Apply::Persistent, pan_rate_ms);
        mixer.set_volume(channel, Apply::Persistent, volume);
    }

    /// Pushes every tracked channel with the configured ramp.
    pub fn update_volumes(&self, mixer: &dyn Mixer) {
        let ramp_ms = self.ramp.as_millis().min(u32::MAX as u128) as u32;
        for channel in 0..self.channels.len() {
            self.update_volume(mixer, channel, ramp_ms);
        }
    }
}
