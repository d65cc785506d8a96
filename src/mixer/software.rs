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

//! A software mixer that renders every channel into an interleaved stereo buffer.
//!
//! Volume changes ramp linearly over the channel's pan rate. Positions become an equal-power
//! stereo pan plus distance attenuation; a use-once position or pan rate affects the next
//! rendered buffer only.

use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_4;

use parking_lot::Mutex;
use tracing::debug;

use super::{
    Apply, Completion, CompletionSender, MixerError, Position, Queueing, MAX_VOLUME,
};
use crate::wave::WaveRef;

/// Stereo output.
pub const OUTPUT_CHANNELS: u16 = 2;

/// A wave playing (or queued) on a channel.
struct Voice {
    wave: WaveRef,
    /// Read position in source frames.
    cursor: f64,
    repeat: bool,
    tag: u64,
}

/// Linear gain ramp.
#[derive(Clone, Copy, Default)]
struct Ramp {
    current: f32,
    target: f32,
    step: f32,
}

impl Ramp {
    fn set(&mut self, target: f32, frames: usize) {
        self.target = target;
        if frames == 0 {
            self.current = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / frames as f32;
        }
    }

    #[inline]
    fn advance(&mut self) -> f32 {
        if self.step != 0.0 {
            self.current += self.step;
            if (self.step > 0.0 && self.current >= self.target)
                || (self.step < 0.0 && self.current <= self.target)
            {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }
}

struct Channel {
    open: bool,
    queue: VecDeque<Voice>,
    gain: Ramp,
    once_gain: Option<f32>,
    pan_rate_ms: u32,
    once_pan_rate_ms: Option<u32>,
    position: Position,
    once_position: Option<Position>,
    /// Pan gains at the end of the last rendered buffer.
    last_pan: (f32, f32),
}

impl Channel {
    fn new() -> Channel {
        Channel {
            open: false,
            queue: VecDeque::new(),
            gain: Ramp::default(),
            once_gain: None,
            pan_rate_ms: 0,
            once_pan_rate_ms: None,
            position: Position::AHEAD,
            once_position: None,
            last_pan: pan_gains(&Position::AHEAD),
        }
    }
}

/// Core mixing logic that's independent of any audio backend.
pub struct SoftwareMixer {
    sample_rate: u32,
    channels: Mutex<Vec<Channel>>,
    completions: CompletionSender,
}

impl SoftwareMixer {
    /// Creates a new software mixer.
    pub fn new(channel_count: usize, sample_rate: u32, completions: CompletionSender) -> Self {
        Self {
            sample_rate,
            channels: Mutex::new((0..channel_count).map(|_| Channel::new()).collect()),
            completions,
        }
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn ms_to_frames(&self, ms: u32) -> usize {
        (ms as u64 * self.sample_rate as u64 / 1000) as usize
    }

    /// Renders into an interleaved stereo buffer, replacing its contents. Waves that reach
    /// their end are reported through the completion channel.
    pub fn render(&self, output: &mut [f32]) {
        output.fill(0.0);
        let frames = output.len() / OUTPUT_CHANNELS as usize;
        let mut finished = Vec::new();

        let mut channels = self.channels.lock();
        for (index, channel) in channels.iter_mut().enumerate() {
            let position = channel.once_position.take().unwrap_or(channel.position);
            let pan_rate = channel
                .once_pan_rate_ms
                .take()
                .unwrap_or(channel.pan_rate_ms);
            let once_gain = channel.once_gain.take();
            if !channel.open || channel.queue.is_empty() {
                continue;
            }

            let target_pan = pan_gains(&position);
            let start_pan = channel.last_pan;
            let pan_frames = self.ms_to_frames(pan_rate).max(1);
            let attenuation = 1.0 / position.distance().max(1.0) as f32;

            let mut frame = 0;
            while frame < frames {
                let Some(voice) = channel.queue.front_mut() else {
                    break;
                };

                let (left, right, ended) = match voice.wave.data() {
                    Some(data)
                        if data.sample_rate() > 0 && (voice.cursor as usize) < data.frames() =>
                    {
                        let source_frame = voice.cursor as usize;
                        voice.cursor += data.sample_rate() as f64 / self.sample_rate as f64;
                        (data.sample(source_frame, 0), data.sample(source_frame, 1), false)
                    }
                    _ => (0.0, 0.0, true),
                };

                if ended {
                    let loops = voice
                        .wave
                        .data()
                        .is_some_and(|d| d.frames() > 0 && d.sample_rate() > 0);
                    if voice.repeat && loops {
                        voice.cursor = 0.0;
                        continue;
                    }
                    if let Some(voice) = channel.queue.pop_front() {
                        finished.push(Completion {
                            channel: index,
                            wave: voice.wave,
                            tag: voice.tag,
                        });
                    }
                    continue;
                }

                let gain = match once_gain {
                    Some(gain) => gain,
                    None => channel.gain.advance(),
                } * attenuation;
                let t = ((frame + 1) as f32 / pan_frames as f32).min(1.0);
                let pan_left = start_pan.0 + (target_pan.0 - start_pan.0) * t;
                let pan_right = start_pan.1 + (target_pan.1 - start_pan.1) * t;

                output[frame * 2] += left * gain * pan_left;
                output[frame * 2 + 1] += right * gain * pan_right;
                frame += 1;
            }

            let t = (frames as f32 / pan_frames as f32).min(1.0);
            channel.last_pan = (
                start_pan.0 + (target_pan.0 - start_pan.0) * t,
                start_pan.1 + (target_pan.1 - start_pan.1) * t,
            );
        }
        drop(channels);

        for completion in finished {
            debug!(
                channel = completion.channel,
                wave = completion.wave.name(),
                tag = completion.tag,
                "Wave finished"
            );
            let _ = self.completions.send(completion);
        }
    }

    fn with_channel<R>(&self, channel: usize, f: impl FnOnce(&mut Channel) -> R) -> Option<R> {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel) {
            Some(state) => Some(f(state)),
            None => {
                debug!(channel, "Ignoring command for channel outside the mixer");
                None
            }
        }
    }
}

/// Equal-power left/right gains for a position.
fn pan_gains(position: &Position) -> (f32, f32) {
    let pan = position.azimuth().to_radians().sin() as f32;
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

fn volume_to_gain(volume: u32) -> f32 {
    volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32
}

impl super::Mixer for SoftwareMixer {
    fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    fn open_channel(&self, channel: usize) -> Result<(), MixerError> {
        self.with_channel(channel, |state| state.open = true)
            .ok_or(MixerError::InvalidChannel(channel))
    }

    fn close_channel(&self, channel: usize) {
        self.with_channel(channel, |state| {
            state.open = false;
            state.queue.clear();
        });
    }

    fn set_volume(&self, channel: usize, apply: Apply, volume: u32) {
        let gain = volume_to_gain(volume);
        let ramp_ms = self
            .with_channel(channel, |state| {
                state.once_pan_rate_ms.unwrap_or(state.pan_rate_ms)
            })
            .unwrap_or(0);
        let ramp_frames = self.ms_to_frames(ramp_ms);
        self.with_channel(channel, |state| match apply {
            Apply::Persistent => state.gain.set(gain, ramp_frames),
            Apply::UseOnce => state.once_gain = Some(gain),
        });
    }

    fn set_pan_rate(&self, channel: usize, apply: Apply, pan_rate_ms: u32) {
        self.with_channel(channel, |state| match apply {
            Apply::Persistent => state.pan_rate_ms = pan_rate_ms,
            Apply::UseOnce => state.once_pan_rate_ms = Some(pan_rate_ms),
        });
    }

    fn set_position(&self, channel: usize, apply: Apply, position: Position) {
        self.with_channel(channel, |state| match apply {
            Apply::Persistent => state.position = position,
            Apply::UseOnce => state.once_position = Some(position),
        });
    }

    fn play(
        &self,
        channel: usize,
        wave: WaveRef,
        queueing: Queueing,
        repeat: bool,
        tag: u64,
    ) -> Result<(), MixerError> {
        if !wave.is_loaded() {
            return Err(MixerError::NotLoaded(wave.name().to_string()));
        }
        self.with_channel(channel, |state| {
            if !state.open {
                return Err(MixerError::ChannelClosed(channel));
            }
            if queueing == Queueing::Replace {
                state.queue.clear();
            }
            state.queue.push_back(Voice {
                wave,
                cursor: 0.0,
                repeat,
                tag,
            });
            Ok(())
        })
        .unwrap_or(Err(MixerError::InvalidChannel(channel)))
    }

    fn stop(&self, channel: usize, tag: u64) {
        self.with_channel(channel, |state| state.queue.retain(|voice| voice.tag != tag));
    }

    fn flush_channel(&self, channel: usize) {
        self.with_channel(channel, |state| state.queue.clear());
    }

    fn is_channel_done(&self, channel: usize) -> bool {
        self.channels
            .lock()
            .get(channel)
            .map_or(true, |state| state.queue.is_empty())
    }

    fn flush_all(&self) {
        for state in self.channels.lock().iter_mut() {
            state.queue.clear();
        }
    }
}

impl std::fmt::Debug for SoftwareMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.lock();
        f.debug_struct("SoftwareMixer")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &channels.len())
            .field(
                "playing",
                &channels.iter().filter(|c| !c.queue.is_empty()).count(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{completion_channel, Mixer as _};
    use crate::testutil::constant;

    const RATE: u32 = 22050;
    const CENTER: f32 = std::f32::consts::FRAC_1_SQRT_2;

    fn mixer() -> (SoftwareMixer, crate::mixer::CompletionReceiver) {
        let (tx, rx) = completion_channel();
        let mixer = SoftwareMixer::new(4, RATE, tx);
        mixer.open_all().unwrap();
        (mixer, rx)
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_silence_without_sources() {
        let (mixer, _rx) = mixer();
        let mut output = vec![1.0; 16];
        mixer.render(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_full_volume_center() {
        let (mixer, _rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer
            .play(0, constant("c", 0.5, 100), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 8];
        mixer.render(&mut output);
        assert_close(output[0], 0.5 * CENTER);
        assert_close(output[1], 0.5 * CENTER);
    }

    #[test]
    fn test_volume_clamps_above_full_scale() {
        let (mixer, _rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME * 100);
        mixer
            .play(0, constant("c", 0.5, 100), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 2];
        mixer.render(&mut output);
        assert_close(output[0], 0.5 * CENTER);
    }

    #[test]
    fn test_volume_ramps_over_pan_rate() {
        let (mixer, _rx) = mixer();
        // 10ms at 22050Hz is 220 frames.
        mixer.set_pan_rate(0, Apply::Persistent, 10);
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer
            .play(0, constant("c", 1.0, 1000), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 440 * 2];
        mixer.render(&mut output);
        assert!(output[0] < 0.05);
        assert!(output[200] < output[400]);
        assert_close(output[439 * 2], CENTER);
    }

    #[test]
    fn test_sources_sum() {
        let (mixer, _rx) = mixer();
        for channel in 0..2 {
            mixer.set_volume(channel, Apply::Persistent, MAX_VOLUME);
        }
        mixer
            .play(0, constant("a", 0.25, 10), Queueing::Replace, false, 1)
            .unwrap();
        mixer
            .play(1, constant("b", 0.5, 10), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 2];
        mixer.render(&mut output);
        assert_close(output[0], 0.75 * CENTER);
    }

    #[test]
    fn test_completion_after_end() {
        let (mixer, rx) = mixer();
        mixer.set_volume(3, Apply::Persistent, MAX_VOLUME);
        let wave = constant("short", 0.5, 4);
        mixer
            .play(3, wave.clone(), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 16];
        mixer.render(&mut output);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.channel, 3);
        assert!(crate::wave::same_wave(&completion.wave, &wave));
        assert!(mixer.is_channel_done(3));
        // Only the first four frames carry audio.
        assert!(output[6] != 0.0);
        assert_eq!(output[8], 0.0);
    }

    #[test]
    fn test_queued_wave_follows() {
        let (mixer, rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer
            .play(0, constant("first", 0.5, 2), Queueing::Replace, false, 1)
            .unwrap();
        mixer
            .play(0, constant("second", 0.25, 2), Queueing::Append, false, 2)
            .unwrap();

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert_close(output[2], 0.5 * CENTER);
        assert_close(output[4], 0.25 * CENTER);
        let tags: Vec<u64> = rx.try_iter().map(|completion| completion.tag).collect();
        assert_eq!(tags, vec![1, 2]);
    }

    #[test]
    fn test_stop_drops_one_voice() {
        let (mixer, rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        let wave = constant("same", 0.5, 2);
        for tag in 1..=3 {
            mixer
                .play(0, wave.clone(), Queueing::Append, false, tag)
                .unwrap();
        }

        mixer.stop(0, 1);
        mixer.stop(0, 3);
        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert_close(output[0], 0.5 * CENTER);
        assert_eq!(output[4], 0.0);
        let tags: Vec<u64> = rx.try_iter().map(|completion| completion.tag).collect();
        assert_eq!(tags, vec![2]);
        assert!(mixer.is_channel_done(0));
    }

    #[test]
    fn test_zero_rate_wave_ends_immediately() {
        let (mixer, rx) = mixer();
        let wave = crate::wave::WaveFile::loaded(
            "no rate",
            crate::wave::WaveData::new(vec![0.5; 10], 1, 0),
        );
        mixer
            .play(0, wave.clone(), Queueing::Replace, false, 4)
            .unwrap();
        mixer.play(1, wave, Queueing::Replace, true, 5).unwrap();

        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        let tags: Vec<u64> = rx.try_iter().map(|completion| completion.tag).collect();
        assert_eq!(tags, vec![4, 5]);
        assert!(mixer.is_channel_done(0));
        assert!(mixer.is_channel_done(1));
    }

    #[test]
    fn test_repeat_loops_until_flushed() {
        let (mixer, rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer
            .play(0, constant("loop", 0.5, 3), Queueing::Replace, true, 1)
            .unwrap();

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert_close(output[18], 0.5 * CENTER);
        assert!(rx.try_recv().is_err());

        mixer.flush_channel(0);
        assert!(mixer.is_channel_done(0));
        mixer.render(&mut output);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_one_shot_position_applies_to_next_buffer_only() {
        let (mixer, _rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer
            .play(0, constant("c", 1.0, 100), Queueing::Replace, false, 1)
            .unwrap();

        mixer.set_pan_rate(0, Apply::UseOnce, 0);
        mixer.set_position(
            0,
            Apply::UseOnce,
            Position::Polar {
                range: 1.0,
                azimuth: 90.0,
                elevation: 0.0,
            },
        );
        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        assert_close(output[0], 0.0);
        assert_close(output[1], 1.0);

        // Back to the persistent position, straight ahead.
        mixer.render(&mut output);
        assert_close(output[0], CENTER);
        assert_close(output[1], CENTER);
    }

    #[test]
    fn test_distance_attenuates() {
        let (mixer, _rx) = mixer();
        mixer.set_volume(0, Apply::Persistent, MAX_VOLUME);
        mixer.set_position(
            0,
            Apply::Persistent,
            Position::Vector {
                x: 0.0,
                y: 0.0,
                z: 4.0,
            },
        );
        mixer
            .play(0, constant("c", 1.0, 10), Queueing::Replace, false, 1)
            .unwrap();

        let mut output = vec![0.0; 2];
        mixer.render(&mut output);
        assert_close(output[0], 0.25 * CENTER);
    }

    #[test]
    fn test_rejects_closed_and_unknown_channels() {
        let (tx, _rx) = completion_channel();
        let mixer = SoftwareMixer::new(2, RATE, tx);
        assert!(matches!(
            mixer.play(0, constant("c", 1.0, 1), Queueing::Replace, false, 1),
            Err(MixerError::ChannelClosed(0))
        ));
        assert!(matches!(
            mixer.play(9, constant("c", 1.0, 1), Queueing::Replace, false, 1),
            Err(MixerError::InvalidChannel(9))
        ));
        assert!(matches!(
            mixer.play(
                0,
                crate::wave::WaveFile::pending("later"),
                Queueing::Replace,
                false,
                1
            ),
            Err(MixerError::NotLoaded(_))
        ));
    }
}
