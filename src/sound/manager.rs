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
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::groups::{flush_range, ChannelGroup};
use super::position::{place_initial, place_once};
use super::proximity::{Proximity, Settings, POOLED_MODE};
use super::registry::{SoundInstance, SoundRegistry};
use super::slots::{Handle, Slot, SlotTable};
use super::volume::{PercentKnobs, VolumeModel};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{DialogueIndex, MixerConfig};
use crate::mixer::{CompletionReceiver, Mixer, Position, Queueing};
use crate::wave::{WaveLoader, WaveRef};

/// Everything guarded by the manager lock.
struct State {
    slots: SlotTable,
    sounds: SoundRegistry,
    volume: VolumeModel,
}

/// Owns the channel pool and hands out handles to playing sounds.
///
/// All methods take `&self` and may be called from any thread. Mixer completions arrive on a
/// channel and are only acted upon in [`SoundManager::process_completions`] and
/// [`SoundManager::update_sounds`], so the audio thread never touches the manager lock. End
/// callbacks always run after the lock is released.
pub struct SoundManager {
    state: Mutex<State>,
    mixer: Arc<dyn Mixer>,
    completions: CompletionReceiver,
    clock: Arc<dyn Clock>,
    loader: Mutex<WaveLoader>,
    latency: Duration,
}

/// Runs the end callbacks of removed instances, in order.
fn finish_all(instances: Vec<SoundInstance>) {
    for instance in instances {
        instance.finish();
    }
}

fn clamp_ms(duration_ms: u64) -> u32 {
    duration_ms.min(u32::MAX as u64) as u32
}

impl SoundManager {
    /// Creates a sound manager over the given mixer and opens all of its channels.
    pub fn new(
        config: &MixerConfig,
        mixer: Arc<dyn Mixer>,
        completions: CompletionReceiver,
    ) -> Result<SoundManager, Box<dyn Error>> {
        Self::with_clock(config, mixer, completions, Arc::new(MonotonicClock::new()))
    }

    /// Creates a sound manager with an explicit tick source.
    pub fn with_clock(
        config: &MixerConfig,
        mixer: Arc<dyn Mixer>,
        completions: CompletionReceiver,
        clock: Arc<dyn Clock>,
    ) -> Result<SoundManager, Box<dyn Error>> {
        config.validate()?;
        mixer.open_all()?;

        let knobs = PercentKnobs {
            music: config.music_percent(),
            speech: config.speech_percent(),
            master: config.master_percent(),
            parrot: config.parrot_percent(),
        };
        let state = State {
            slots: SlotTable::new(config.slot_capacity()),
            sounds: SoundRegistry::new(),
            volume: VolumeModel::new(config.channels(), knobs, config.volume_ramp()?),
        };
        info!(
            channels = config.channels(),
            mixer_channels = mixer.channel_count(),
            slots = config.slot_capacity(),
            "Sound manager started"
        );

        Ok(SoundManager {
            state: Mutex::new(state),
            mixer,
            completions,
            clock,
            loader: Mutex::new(WaveLoader::new(&config.sounds_path())),
            latency: config.latency()?,
        })
    }

    /// Loads a sound by name. Returns None if it can't be loaded.
    pub fn load_sound(&self, name: &str) -> Option<WaveRef> {
        match self.loader.lock().load(name) {
            Ok(wave) => Some(wave),
            Err(e) => {
                warn!(name, err = %e, "Unable to load sound");
                None
            }
        }
    }

    /// Starts loading a sound in the background. The returned wave can't be played until it
    /// reports itself loaded.
    pub fn load_sound_in_background(&self, name: &str) -> WaveRef {
        self.loader.lock().load_in_background(name)
    }

    /// Frees the decoded audio cached by earlier loads. Waves already loaded keep playing.
    pub fn clear_sound_cache(&self) {
        self.loader.lock().clear_cache();
    }

    /// Loads a line of dialogue. Returns None if the index doesn't list it or it can't be loaded.
    pub fn load_speech(&self, dialogue: &DialogueIndex, speech_id: u32) -> Option<WaveRef> {
        let Some(path) = dialogue.resolve(speech_id) else {
            warn!(
                operation = "load_speech",
                speech_id, "Speech is not in the dialogue index"
            );
            return None;
        };
        match self.loader.lock().load_path(&path) {
            Ok(wave) => Some(wave),
            Err(e) => {
                warn!(speech_id, path = ?path, err = %e, "Unable to load speech");
                None
            }
        }
    }

    /// Plays a loaded wave. Returns None, and drops the sound, if the wave isn't loaded or no
    /// slot or channel is free.
    pub fn play_sound(&self, wave: &WaveRef, proximity: Proximity) -> Option<Handle> {
        let (settings, on_end, owner) = proximity.into_parts();
        let mut flushed = Vec::new();

        let handle = {
            let mut state = self.state.lock();
            self.start(&mut state, wave, settings, &mut flushed)
                .map(|(handle, channel)| {
                    state.sounds.add(
                        SoundInstance::new(wave.clone(), channel, handle)
                            .with_end_callback(on_end)
                            .with_owner(owner),
                    );
                    handle
                })
        };

        finish_all(flushed);
        handle
    }

    fn start(
        &self,
        state: &mut State,
        wave: &WaveRef,
        settings: Settings,
        flushed: &mut Vec<SoundInstance>,
    ) -> Option<(Handle, usize)> {
        if !wave.is_loaded() {
            warn!(wave = wave.name(), "Wave is not loaded, dropping sound");
            return None;
        }

        let prior_channel = settings
            .prior_sound
            .and_then(|prior| state.slots.find(prior))
            .map(|slot| slot.channel());
        let (channel, queueing) = match prior_channel {
            Some(channel) => (channel, Queueing::Append),
            None => (
                self.claim_channel(state, settings.channel_mode, flushed)?,
                Queueing::Replace,
            ),
        };

        let Some(handle) = state.slots.acquire(channel) else {
            warn!(wave = wave.name(), channel, "No free slot, dropping sound");
            return None;
        };

        if queueing == Queueing::Replace {
            if state
                .volume
                .set_channel(channel, settings.volume, settings.channel_mode)
            {
                state
                    .volume
                    .update_volume(self.mixer.as_ref(), channel, settings.pan_rate_ms);
            }
            place_initial(self.mixer.as_ref(), channel, settings.position);
        }

        if let Err(e) = self.mixer.play(
            channel,
            wave.clone(),
            queueing,
            settings.repeated,
            handle.raw(),
        ) {
            warn!(wave = wave.name(), channel, err = %e, "Mixer refused sound, dropping it");
            state.slots.release(handle);
            return None;
        }

        debug!(
            wave = wave.name(),
            channel,
            handle = %handle,
            queued = queueing == Queueing::Append,
            "Playing sound"
        );
        Some((handle, channel))
    }

    /// Picks the channel for a new sound. Direct modes take over their channel; pooled modes
    /// scan for one that's idle.
    fn claim_channel(
        &self,
        state: &mut State,
        mode: u8,
        flushed: &mut Vec<SoundInstance>,
    ) -> Option<usize> {
        let channel_count = self.mixer.channel_count();
        if mode < POOLED_MODE {
            let channel = mode as usize;
            if channel >= channel_count {
                warn!(channel, channel_count, "Channel does not exist, dropping sound");
                return None;
            }
            // The flush silences everything queued here, so every loaded instance ends.
            self.mixer.flush_channel(channel);
            while let Some(instance) = state.sounds.take_first_loaded_on_channel(channel) {
                flushed.push(instance);
            }
            state.slots.release_channel(channel);
            state.volume.reset_channel(channel);
            return Some(channel);
        }

        let start = ChannelGroup::Pool.channels().start;
        let free = (start..channel_count).find(|channel| {
            !state.sounds.is_channel_busy(*channel) && self.mixer.is_channel_done(*channel)
        });
        match free {
            Some(channel) => {
                // Slots left over from a finished sound on this channel.
                state.slots.release_channel(channel);
                Some(channel)
            }
            None => {
                warn!("No free channel, dropping sound");
                None
            }
        }
    }

    /// Stops a sound and frees its handle. Anything queued behind it on the channel keeps
    /// playing. Unknown handles are ignored.
    pub fn stop_sound(&self, handle: Handle) {
        let stopped = {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.release(handle) else {
                debug!(handle = %handle, "Ignoring stop for unknown handle");
                return;
            };
            self.stop_voice(&mut state, &slot)
        };
        finish_all(stopped.into_iter().collect());
    }

    /// Drops a released slot's voice from the mixer and its instance from the registry.
    fn stop_voice(&self, state: &mut State, slot: &Slot) -> Option<SoundInstance> {
        self.mixer.stop(slot.channel(), slot.handle().raw());
        state.sounds.take_handle(slot.handle())
    }

    /// Marks a sound as timed: once its fade deadline passes, [`SoundManager::update_sounds`]
    /// stops it.
    pub fn set_can_free(&self, handle: Handle) {
        let mut state = self.state.lock();
        match state.slots.find_mut(handle) {
            Some(slot) => slot.set_timed(true),
            None => debug!(handle = %handle, "Ignoring can-free for unknown handle"),
        }
    }

    /// Stops every channel and frees every handle.
    pub fn stop_all_channels(&self) {
        let flushed = {
            let mut state = self.state.lock();
            self.mixer.flush_all();

            let mut flushed = Vec::new();
            for channel in 0..state.volume.channel_count() {
                flushed.extend(state.sounds.take_first_on_channel(channel));
            }
            flushed.extend(flush_range(
                self.mixer.as_ref(),
                &mut state.sounds,
                ChannelGroup::Pool.channels(),
            ));
            let released = state.slots.release_all();
            debug!(released, "Stopped all channels");
            flushed
        };
        finish_all(flushed);
    }

    /// Flushes a group of channels by code (0, 3, 6 or 10). Other codes do nothing.
    pub fn flush_channels(&self, code: i32) {
        let Some(group) = ChannelGroup::from_code(code) else {
            debug!(code, "Ignoring flush of unknown channel group");
            return;
        };
        let flushed = {
            let mut state = self.state.lock();
            flush_range(self.mixer.as_ref(), &mut state.sounds, group.channels())
        };
        finish_all(flushed);
    }

    /// Sets the volume (0-100) of a sound's channel, ramping over `fade_secs`. A non-zero
    /// volume schedules the fade deadline, never moving it earlier. Zero clears it.
    pub fn set_volume(&self, handle: Handle, volume: u32, fade_secs: u32) {
        let mut state = self.state.lock();
        let Some(channel) = state.slots.find(handle).map(|slot| slot.channel()) else {
            debug!(handle = %handle, "Ignoring volume for unknown handle");
            return;
        };

        let fade_ms = fade_secs as u64 * 1000;
        if state.volume.set_volume(channel, volume) {
            state
                .volume
                .update_volume(self.mixer.as_ref(), channel, clamp_ms(fade_ms));
        }

        let now = self.clock.ticks();
        if let Some(slot) = state.slots.find_mut(handle) {
            if volume > 0 {
                slot.extend_fade(now + fade_ms);
            } else {
                slot.clear_fade();
            }
        }
    }

    /// Sets the volume and mode of a channel directly.
    pub fn set_channel_volume(&self, channel: usize, volume: u32, mode: u8, pan_rate_ms: u32) {
        let mut state = self.state.lock();
        if state.volume.set_channel(channel, volume, mode) {
            state
                .volume
                .update_volume(self.mixer.as_ref(), channel, pan_rate_ms);
        } else {
            debug!(channel, "Ignoring volume for untracked channel");
        }
    }

    fn move_sound(&self, handle: Handle, position: Position, pan_rate_ms: u32) {
        let state = self.state.lock();
        match state.slots.find(handle) {
            Some(slot) => place_once(self.mixer.as_ref(), slot.channel(), position, pan_rate_ms),
            None => debug!(handle = %handle, "Ignoring position for unknown handle"),
        }
    }

    /// Moves a sound for the next buffer only.
    pub fn set_vector_position(&self, handle: Handle, x: f64, y: f64, z: f64, pan_rate_ms: u32) {
        self.move_sound(handle, Position::Vector { x, y, z }, pan_rate_ms);
    }

    /// Moves a sound for the next buffer only. Angles are in degrees.
    pub fn set_polar_position(
        &self,
        handle: Handle,
        range: f64,
        azimuth: f64,
        elevation: f64,
        pan_rate_ms: u32,
    ) {
        self.move_sound(
            handle,
            Position::Polar {
                range,
                azimuth,
                elevation,
            },
            pan_rate_ms,
        );
    }

    /// Whether the handle still refers to a live slot.
    pub fn is_active(&self, handle: Handle) -> bool {
        self.state.lock().slots.find(handle).is_some()
    }

    /// Whether this exact wave is registered as playing.
    pub fn is_wave_active(&self, wave: &WaveRef) -> bool {
        self.state.lock().sounds.contains(wave)
    }

    /// The configured output latency.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// The current global percent knobs.
    pub fn percents(&self) -> PercentKnobs {
        *self.state.lock().volume.knobs()
    }

    fn set_knob(&self, update: impl FnOnce(&mut PercentKnobs)) {
        let mut state = self.state.lock();
        update(state.volume.knobs_mut());
        state.volume.update_volumes(self.mixer.as_ref());
    }

    /// Sets the music knob and recomputes every channel's volume.
    pub fn set_music_percent(&self, percent: f64) {
        self.set_knob(|knobs| knobs.music = percent);
    }

    /// Sets the speech knob, which scales channel modes 0 to 2, and recomputes every channel.
    pub fn set_speech_percent(&self, percent: f64) {
        self.set_knob(|knobs| knobs.speech = percent);
    }

    /// Sets the master knob, which scales channel modes 6 to 9, and recomputes every channel.
    pub fn set_master_percent(&self, percent: f64) {
        self.set_knob(|knobs| knobs.master = percent);
    }

    /// Sets the parrot knob. It doesn't scale any channel, so nothing is recomputed.
    pub fn set_parrot_percent(&self, percent: f64) {
        self.state.lock().volume.knobs_mut().parrot = percent;
    }

    /// Acts on completions reported by the mixer: the sound each one was tagged with leaves
    /// the registry, its handle is freed and its end callback runs. Completions for sounds that
    /// were already stopped or flushed are ignored. Returns how many completions were handled.
    pub fn process_completions(&self) -> usize {
        let completions: Vec<_> = self.completions.try_iter().collect();
        if completions.is_empty() {
            return 0;
        }

        let finished: Vec<_> = {
            let mut state = self.state.lock();
            completions
                .iter()
                .filter_map(|completion| {
                    let handle = Handle::from_raw(completion.tag)?;
                    state.slots.release(handle);
                    state.sounds.take_handle(handle)
                })
                .collect()
        };
        debug!(
            completions = completions.len(),
            finished = finished.len(),
            "Processed completions"
        );
        finish_all(finished);
        completions.len()
    }

    /// Periodic housekeeping: stops timed sounds whose fade has run out and handles pending
    /// completions. Sounds whose audio was flushed from under them (their channel went quiet
    /// without a completion) end here too, and handles left without a sound are freed.
    pub fn update_sounds(&self) {
        let now = self.clock.ticks();
        let expired = {
            let mut state = self.state.lock();
            let expired_slots = state.slots.release_where(|slot| slot.is_expired(now));
            let mut stopped = Vec::new();
            for slot in expired_slots {
                debug!(handle = %slot.handle(), channel = slot.channel(), "Fade finished");
                stopped.extend(self.stop_voice(&mut state, &slot));
            }
            stopped
        };
        finish_all(expired);

        self.process_completions();

        let orphaned = {
            let mut state = self.state.lock();
            let State { slots, sounds, .. } = &mut *state;
            let orphaned =
                sounds.take_where(|instance| self.mixer.is_channel_done(instance.channel()));
            for instance in &orphaned {
                slots.release(instance.handle());
            }
            let released = slots.release_where(|slot| !sounds.contains_handle(slot.handle()));
            if !orphaned.is_empty() || !released.is_empty() {
                debug!(
                    orphaned = orphaned.len(),
                    released = released.len(),
                    "Released finished sounds"
                );
            }
            orphaned
        };
        finish_all(orphaned);
    }

    /// Number of live handles.
    pub fn active_sounds(&self) -> usize {
        self.state.lock().slots.len()
    }
}

impl Drop for SoundManager {
    fn drop(&mut self) {
        self.mixer.flush_all();
        for channel in 0..self.mixer.channel_count() {
            self.mixer.close_channel(channel);
        }
    }
}

impl fmt::Debug for SoundManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SoundManager")
            .field("slots", &state.slots)
            .field("sounds", &state.sounds.len())
            .field("knobs", state.volume.knobs())
            .field("latency", &self.latency)
            .finish()
    }
}
