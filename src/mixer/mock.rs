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
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{Apply, Completion, CompletionSender, MixerError, Position, Queueing};
use crate::wave::WaveRef;

/// A command received by the mock mixer.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Open(usize),
    Close(usize),
    Volume {
        channel: usize,
        apply: Apply,
        volume: u32,
    },
    PanRate {
        channel: usize,
        apply: Apply,
        pan_rate: u32,
    },
    Position {
        channel: usize,
        apply: Apply,
        position: Position,
    },
    Play {
        channel: usize,
        wave: String,
        queueing: Queueing,
        repeat: bool,
        tag: u64,
    },
    Stop {
        channel: usize,
        tag: u64,
    },
    Flush(usize),
    FlushAll,
}

/// A wave waiting on a mock channel.
struct Queued {
    wave: WaveRef,
    repeat: bool,
    tag: u64,
}

/// A mock mixer. Doesn't render anything; records every command it receives and plays waves
/// only as far as a test tells it to.
pub struct Mixer {
    name: String,
    channel_count: usize,
    commands: Mutex<Vec<Command>>,
    open: Mutex<Vec<bool>>,
    queues: Mutex<Vec<VecDeque<Queued>>>,
    refuse_play: AtomicBool,
    completions: CompletionSender,
}

impl Mixer {
    /// Creates a mock mixer with the given number of channels.
    pub fn new(name: &str, channel_count: usize, completions: CompletionSender) -> Mixer {
        Mixer {
            name: name.to_string(),
            channel_count,
            commands: Mutex::new(Vec::new()),
            open: Mutex::new(vec![false; channel_count]),
            queues: Mutex::new((0..channel_count).map(|_| VecDeque::new()).collect()),
            refuse_play: AtomicBool::new(false),
            completions,
        }
    }

    /// Returns every command received so far.
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Returns and forgets every command received so far.
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Returns the last persistent volume sent to the channel.
    pub fn volume(&self, channel: usize) -> Option<u32> {
        self.commands.lock().iter().rev().find_map(|command| match command {
            Command::Volume {
                channel: c,
                apply: Apply::Persistent,
                volume,
            } if *c == channel => Some(*volume),
            _ => None,
        })
    }

    /// Returns the channels flushed individually, in order.
    pub fn flushed_channels(&self) -> Vec<usize> {
        self.commands
            .lock()
            .iter()
            .filter_map(|command| match command {
                Command::Flush(channel) => Some(*channel),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of waves queued on the channel.
    pub fn queued(&self, channel: usize) -> usize {
        self.queues.lock().get(channel).map_or(0, VecDeque::len)
    }

    /// Returns the tags of the waves queued on the channel, front first.
    pub fn queued_tags(&self, channel: usize) -> Vec<u64> {
        self.queues
            .lock()
            .get(channel)
            .map(|queue| queue.iter().map(|queued| queued.tag).collect())
            .unwrap_or_default()
    }

    /// Makes subsequent play requests fail.
    pub fn refuse_play(&self, refuse: bool) {
        self.refuse_play.store(refuse, Ordering::Relaxed);
    }

    /// Finishes the wave at the front of the channel, as if it played to its end, and reports
    /// the completion. Repeating waves never finish.
    pub fn finish(&self, channel: usize) -> Option<WaveRef> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(channel)?;
        if queue.front().is_some_and(|queued| queued.repeat) {
            return None;
        }
        let Queued { wave, tag, .. } = queue.pop_front()?;
        drop(queues);

        debug!(channel, wave = wave.name(), tag, "Mock wave finished");
        let _ = self.completions.send(Completion {
            channel,
            wave: wave.clone(),
            tag,
        });
        Some(wave)
    }

    fn record(&self, command: Command) {
        self.commands.lock().push(command);
    }
}

impl super::Mixer for Mixer {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn open_channel(&self, channel: usize) -> Result<(), MixerError> {
        let mut open = self.open.lock();
        let slot = open
            .get_mut(channel)
            .ok_or(MixerError::InvalidChannel(channel))?;
        *slot = true;
        drop(open);
        self.record(Command::Open(channel));
        Ok(())
    }

    fn close_channel(&self, channel: usize) {
        if let Some(open) = self.open.lock().get_mut(channel) {
            *open = false;
        }
        if let Some(queue) = self.queues.lock().get_mut(channel) {
            queue.clear();
        }
        self.record(Command::Close(channel));
    }

    fn set_volume(&self, channel: usize, apply: Apply, volume: u32) {
        self.record(Command::Volume {
            channel,
            apply,
            volume,
        });
    }

    fn set_pan_rate(&self, channel: usize, apply: Apply, pan_rate_ms: u32) {
        self.record(Command::PanRate {
            channel,
            apply,
            pan_rate: pan_rate_ms,
        });
    }

    fn set_position(&self, channel: usize, apply: Apply, position: Position) {
        self.record(Command::Position {
            channel,
            apply,
            position,
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
        self.record(Command::Play {
            channel,
            wave: wave.name().to_string(),
            queueing,
            repeat,
            tag,
        });

        if !self.open.lock().get(channel).copied().unwrap_or(false) {
            return Err(MixerError::ChannelClosed(channel));
        }
        if self.refuse_play.load(Ordering::Relaxed) {
            return Err(MixerError::Device("mock refused to play".into()));
        }
        if !wave.is_loaded() {
            return Err(MixerError::NotLoaded(wave.name().to_string()));
        }

        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(channel)
            .ok_or(MixerError::InvalidChannel(channel))?;
        if queueing == Queueing::Replace {
            queue.clear();
        }
        queue.push_back(Queued { wave, repeat, tag });
        Ok(())
    }

    fn stop(&self, channel: usize, tag: u64) {
        if let Some(queue) = self.queues.lock().get_mut(channel) {
            queue.retain(|queued| queued.tag != tag);
        }
        self.record(Command::Stop { channel, tag });
    }

    fn flush_channel(&self, channel: usize) {
        if let Some(queue) = self.queues.lock().get_mut(channel) {
            queue.clear();
        }
        self.record(Command::Flush(channel));
    }

    fn is_channel_done(&self, channel: usize) -> bool {
        self.queues.lock().get(channel).map_or(true, VecDeque::is_empty)
    }

    fn flush_all(&self) {
        for queue in self.queues.lock().iter_mut() {
            queue.clear();
        }
        self.record(Command::FlushAll);
    }
}

impl fmt::Display for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{completion_channel, Mixer as _};
    use crate::testutil::tone;

    #[test]
    fn test_records_commands() {
        let (tx, _rx) = completion_channel();
        let mixer = Mixer::new("mock", 4, tx);

        mixer.open_channel(1).unwrap();
        mixer.set_pan_rate(1, Apply::Persistent, 250);
        mixer.set_volume(1, Apply::Persistent, 1000);
        mixer.set_volume(1, Apply::UseOnce, 5);
        mixer.flush_channel(1);

        assert_eq!(mixer.volume(1), Some(1000));
        assert_eq!(mixer.volume(2), None);
        assert_eq!(mixer.flushed_channels(), vec![1]);
        assert_eq!(mixer.commands().len(), 5);
        assert_eq!(mixer.take_commands().len(), 5);
        assert!(mixer.commands().is_empty());
    }

    #[test]
    fn test_play_requires_open_channel() {
        let (tx, _rx) = completion_channel();
        let mixer = Mixer::new("mock", 4, tx);

        let result = mixer.play(0, tone("a", 10), Queueing::Replace, false, 1);
        assert!(matches!(result, Err(MixerError::ChannelClosed(0))));

        mixer.open_all().unwrap();
        assert!(mixer
            .play(0, tone("a", 10), Queueing::Replace, false, 1)
            .is_ok());
        assert!(!mixer.is_channel_done(0));
    }

    #[test]
    fn test_finish_reports_completion() {
        let (tx, rx) = completion_channel();
        let mixer = Mixer::new("mock", 4, tx);
        mixer.open_all().unwrap();

        let first = tone("first", 10);
        let second = tone("second", 10);
        mixer
            .play(2, first.clone(), Queueing::Replace, false, 7)
            .unwrap();
        mixer
            .play(2, second.clone(), Queueing::Append, false, 8)
            .unwrap();
        assert_eq!(mixer.queued(2), 2);

        let finished = mixer.finish(2).unwrap();
        assert!(crate::wave::same_wave(&finished, &first));
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.channel, 2);
        assert!(crate::wave::same_wave(&completion.wave, &first));
        assert_eq!(completion.tag, 7);
        assert_eq!(mixer.queued_tags(2), vec![8]);
    }

    #[test]
    fn test_stop_removes_only_tagged_wave() {
        let (tx, rx) = completion_channel();
        let mixer = Mixer::new("mock", 4, tx);
        mixer.open_all().unwrap();

        for tag in 1..=3 {
            mixer
                .play(1, tone("same", 10), Queueing::Append, false, tag)
                .unwrap();
        }
        mixer.stop(1, 2);
        assert_eq!(mixer.queued_tags(1), vec![1, 3]);
        mixer.stop(1, 1);
        assert_eq!(mixer.queued_tags(1), vec![3]);
        // Unknown tags leave the queue alone.
        mixer.stop(1, 99);
        assert_eq!(mixer.queued(1), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_repeating_wave_never_finishes() {
        let (tx, rx) = completion_channel();
        let mixer = Mixer::new("mock", 4, tx);
        mixer.open_all().unwrap();

        mixer
            .play(0, tone("loop", 10), Queueing::Replace, true, 1)
            .unwrap();
        assert!(mixer.finish(0).is_none());
        assert!(rx.try_recv().is_err());

        mixer.flush_channel(0);
        assert!(mixer.is_channel_done(0));
        // Flushing doesn't report a completion.
        assert!(rx.try_recv().is_err());
    }
}
