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
use std::ops::Range;

use tracing::debug;

use super::registry::{SoundInstance, SoundRegistry};
use crate::mixer::Mixer;

/// A named range of channels that is flushed together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelGroup {
    Speech,
    Fixed,
    Master,
    /// Channels handed out by scanning for a free one.
    Pool,
}

/// Group code, group, and the channels it covers.
const GROUPS: [(i32, ChannelGroup, Range<usize>); 4] = [
    (0, ChannelGroup::Speech, 0..3),
    (3, ChannelGroup::Fixed, 3..6),
    (6, ChannelGroup::Master, 6..10),
    (10, ChannelGroup::Pool, 10..48),
];

impl ChannelGroup {
    /// Looks up a group by its code. Unknown codes have no group.
    pub fn from_code(code: i32) -> Option<ChannelGroup> {
        GROUPS
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, group, _)| *group)
    }

    pub fn code(self) -> i32 {
        self.entry().0
    }

    pub fn channels(self) -> Range<usize> {
        self.entry().2.clone()
    }

    fn entry(self) -> &'static (i32, ChannelGroup, Range<usize>) {
        match self {
            ChannelGroup::Speech => &GROUPS[0],
            ChannelGroup::Fixed => &GROUPS[1],
            ChannelGroup::Master => &GROUPS[2],
            ChannelGroup::Pool => &GROUPS[3],
        }
    }
}

/// Flushes each channel in the range on the mixer and takes the first registry entry bound to
/// it. The taken instances are returned in channel order for the caller to finish.
pub fn flush_range(
    mixer: &dyn Mixer,
    registry: &mut SoundRegistry,
    channels: Range<usize>,
) -> Vec<SoundInstance> {
    debug!(start = channels.start, end = channels.end, "Flushing channels");
    let mut flushed = Vec::new();
    for channel in channels {
        mixer.flush_channel(channel);
        flushed.extend(registry.take_first_on_channel(channel));
    }
    flushed
}
