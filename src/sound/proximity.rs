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
use std::fmt;
use std::sync::{Arc, Weak};

use super::registry::{EndCallback, Talker};
use super::slots::Handle;
use crate::mixer::Position;

/// Channel mode that asks for any free pooled channel.
pub const POOLED_MODE: u8 = 10;

/// How and where a sound should play.
pub struct Proximity {
    /// Channel volume, 0-100.
    pub volume: u32,
    /// Modes 0-9 play on that channel and pick its volume tier. Anything higher takes a free
    /// pooled channel.
    pub channel_mode: u8,
    /// Ramp for the initial volume, in milliseconds.
    pub pan_rate_ms: u32,
    /// Initial position. None is straight ahead.
    pub position: Option<Position>,
    /// Loop until stopped.
    pub repeated: bool,
    /// Queue after this sound, on its channel, if it is still playing.
    pub prior_sound: Option<Handle>,
    on_end: Option<EndCallback>,
    owner: Option<Weak<dyn Talker>>,
}

impl Default for Proximity {
    fn default() -> Self {
        Proximity {
            volume: 100,
            channel_mode: POOLED_MODE,
            pan_rate_ms: 0,
            position: None,
            repeated: false,
            prior_sound: None,
            on_end: None,
            owner: None,
        }
    }
}

impl Proximity {
    /// Full volume on any free pooled channel, straight ahead, played once.
    pub fn new() -> Proximity {
        Proximity::default()
    }

    /// Sets the channel volume, 0-100.
    pub fn volume(mut self, volume: u32) -> Proximity {
        self.volume = volume;
        self
    }

    /// Plays on channel `mode` for 0-9, or on a pooled channel for anything higher.
    pub fn channel_mode(mut self, mode: u8) -> Proximity {
        self.channel_mode = mode;
        self
    }

    /// Ramps the initial volume over this many milliseconds.
    pub fn pan_rate(mut self, pan_rate_ms: u32) -> Proximity {
        self.pan_rate_ms = pan_rate_ms;
        self
    }

    /// Starts at a listener-relative point. +z is ahead, +x to the right.
    pub fn vector(mut self, x: f64, y: f64, z: f64) -> Proximity {
        self.position = Some(Position::Vector { x, y, z });
        self
    }

    /// Starts at a range and angles in degrees.
    pub fn polar(mut self, range: f64, azimuth: f64, elevation: f64) -> Proximity {
        self.position = Some(Position::Polar {
            range,
            azimuth,
            elevation,
        });
        self
    }

    pub fn repeated(mut self, repeated: bool) -> Proximity {
        self.repeated = repeated;
        self
    }

    /// Queues behind `prior_sound` on its channel. A stale handle plays normally.
    pub fn after(mut self, prior_sound: Handle) -> Proximity {
        self.prior_sound = Some(prior_sound);
        self
    }

    /// Runs once when the sound is stopped, flushed or finishes.
    pub fn on_end(
        mut self,
        on_end: impl FnOnce(Option<Arc<dyn Talker>>) + Send + 'static,
    ) -> Proximity {
        self.on_end = Some(Box::new(on_end));
        self
    }

    /// Hands the end callback this talker, if it is still alive by then.
    pub fn owner(mut self, owner: &Arc<dyn Talker>) -> Proximity {
        self.owner = Some(Arc::downgrade(owner));
        self
    }

    pub(crate) fn into_parts(self) -> (Settings, Option<EndCallback>, Option<Weak<dyn Talker>>) {
        (
            Settings {
                volume: self.volume,
                channel_mode: self.channel_mode,
                pan_rate_ms: self.pan_rate_ms,
                position: self.position.unwrap_or(Position::AHEAD),
                repeated: self.repeated,
                prior_sound: self.prior_sound,
            },
            self.on_end,
            self.owner,
        )
    }
}

/// The plain values of a proximity, once its callback and owner are split off.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Settings {
    pub volume: u32,
    pub channel_mode: u8,
    pub pan_rate_ms: u32,
    pub position: Position,
    pub repeated: bool,
    pub prior_sound: Option<Handle>,
}

impl fmt::Debug for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proximity")
            .field("volume", &self.volume)
            .field("channel_mode", &self.channel_mode)
            .field("pan_rate_ms", &self.pan_rate_ms)
            .field("position", &self.position)
            .field("repeated", &self.repeated)
            .field("prior_sound", &self.prior_sound)
            .finish()
    }
}
