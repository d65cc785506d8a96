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

//! The sound-mixing core: slots and handles, the sound registry, the volume model, channel
//! groups and positioning, tied together by [`SoundManager`].

mod groups;
mod manager;
mod position;
mod proximity;
mod registry;
mod slots;
mod volume;

pub use groups::ChannelGroup;
pub use manager::SoundManager;
pub use proximity::{Proximity, POOLED_MODE};
pub use registry::{EndCallback, SoundInstance, SoundRegistry, Talker};
pub use slots::{Handle, Slot, SlotTable};
pub use volume::{compute_volume, ChannelState, PercentKnobs, Tier, VolumeModel};
