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

//! Spatial placement of channels.
//!
//! Placement at play time persists on the channel. Later moves are one-shot: they affect the
//! next buffer the mixer renders and nothing after it, so continuous motion needs repeated
//! calls.

use crate::mixer::{Apply, Mixer, Position};

/// Places a channel for the rest of its playback, without interpolation.
pub fn place_initial(mixer: &dyn Mixer, channel: usize, position: Position) {
    mixer.set_pan_rate(channel, Apply::UseOnce, 0);
    mixer.set_position(channel, Apply::Persistent, position);
}

/// Moves a channel for the next buffer only, interpolating over `pan_rate_ms`.
pub fn place_once(mixer: &dyn Mixer, channel: usize, position: Position, pan_rate_ms: u32) {
    mixer.set_pan_rate(channel, Apply::UseOnce, pan_rate_ms);
    mixer.set_position(channel, Apply::UseOnce, position);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{completion_channel, mock};

    #[test]
    fn test_place_once_is_use_once() {
        let (tx, _rx) = completion_channel();
        let mixer = mock::Mixer::new("position", 4, tx);
        let position = Position::Polar {
            range: 2.0,
            azimuth: -45.0,
            elevation: 10.0,
        };
        place_once(&mixer, 1, position, 300);
        assert_eq!(
            mixer.commands(),
            vec![
                mock::Command::PanRate {
                    channel: 1,
                    apply: Apply::UseOnce,
                    pan_rate: 300
                },
                mock::Command::Position {
                    channel: 1,
                    apply: Apply::UseOnce,
                    position
                },
            ]
        );
    }

    #[test]
    fn test_place_initial_persists() {
        let (tx, _rx) = completion_channel();
        let mixer = mock::Mixer::new("position", 4, tx);
        place_initial(&mixer, 0, Position::AHEAD);
        assert!(mixer.commands().contains(&mock::Command::Position {
            channel: 0,
            apply: Apply::Persistent,
            position: Position::AHEAD
        }));
    }
}
