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

use super::slots::Handle;
use crate::wave::{same_wave, WaveRef};

/// An entity that speaks through a sound and wants to know when it ends.
pub trait Talker: Send + Sync {
    fn name(&self) -> &str;
}

/// Called once when a sound is flushed or finishes, with its owner if still alive.
pub type EndCallback = Box<dyn FnOnce(Option<Arc<dyn Talker>>) + Send>;

/// A wave playing on a channel.
pub struct SoundInstance {
    wave: WaveRef,
    channel: usize,
    handle: Handle,
    on_end: Option<EndCallback>,
    owner: Option<Weak<dyn Talker>>,
}

impl SoundInstance {
    /// Creates an instance of `wave` playing on `channel` under `handle`, with no end callback
    /// or owner.
    pub fn new(wave: WaveRef, channel: usize, handle: Handle) -> SoundInstance {
        SoundInstance {
            wave,
            channel,
            handle,
            on_end: None,
            owner: None,
        }
    }

    /// Sets the callback run when the instance ends.
    pub fn with_end_callback(mut self, on_end: Option<EndCallback>) -> SoundInstance {
        self.on_end = on_end;
        self
    }

    /// Sets the talker the end callback is told about.
    pub fn with_owner(mut self, owner: Option<Weak<dyn Talker>>) -> SoundInstance {
        self.owner = owner;
        self
    }

    pub fn wave(&self) -> &WaveRef {
        &self.wave
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The handle the instance was played under.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The owner, if one was set and is still alive.
    pub fn owner(&self) -> Option<Arc<dyn Talker>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Ends the instance, running its end callback. Consuming self makes this happen at most once.
    pub fn finish(self) {
        let owner = self.owner();
        if let Some(on_end) = self.on_end {
            on_end(owner);
        }
    }
}

impl fmt::Debug for SoundInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundInstance")
            .field("wave", &self.wave.name())
            .field("channel", &self.channel)
            .field("handle", &self.handle)
            .field("has_end_callback", &self.on_end.is_some())
            .finish()
    }
}

/// Active sound instances in registration order.
///
/// Channel scans take out the first match only. Removed instances are handed back to the
/// caller, who is expected to call [`SoundInstance::finish`] once no locks are held.
#[derive(Debug, Default)]
pub struct SoundRegistry {
    instances: Vec<SoundInstance>,
}

impl SoundRegistry {
    pub fn new() -> SoundRegistry {
        SoundRegistry::default()
    }

    /// Registers an instance after every one already registered.
    pub fn add(&mut self, instance: SoundInstance) {
        self.instances.push(instance);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn take_first(&mut self, predicate: impl Fn(&SoundInstance) -> bool) -> Option<SoundInstance> {
        let index = self.instances.iter().position(predicate)?;
        Some(self.instances.remove(index))
    }

    /// Removes the first instance on the channel.
    pub fn take_first_on_channel(&mut self, channel: usize) -> Option<SoundInstance> {
        self.take_first(|instance| instance.channel == channel)
    }

    /// Removes the first instance on the channel whose wave has finished loading.
    pub fn take_first_loaded_on_channel(&mut self, channel: usize) -> Option<SoundInstance> {
        self.take_first(|instance| instance.channel == channel && instance.wave.is_loaded())
    }

    /// Removes the instance played under the handle.
    pub fn take_handle(&mut self, handle: Handle) -> Option<SoundInstance> {
        self.take_first(|instance| instance.handle == handle)
    }

    /// Removes every instance matching the predicate, keeping registration order.
    pub fn take_where(&mut self, predicate: impl Fn(&SoundInstance) -> bool) -> Vec<SoundInstance> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.instances)
            .into_iter()
            .partition(&predicate);
        self.instances = kept;
        taken
    }

    /// Whether an instance was played under the handle.
    pub fn contains_handle(&self, handle: Handle) -> bool {
        self.instances
            .iter()
            .any(|instance| instance.handle == handle)
    }

    /// Whether any instance plays this exact wave.
    pub fn contains(&self, wave: &WaveRef) -> bool {
        self.instances
            .iter()
            .any(|instance| same_wave(&instance.wave, wave))
    }

    /// Whether any instance is bound to the channel.
    pub fn is_channel_busy(&self, channel: usize) -> bool {
        self.instances
            .iter()
            .any(|instance| instance.channel == channel)
    }
}
