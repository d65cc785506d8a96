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

//! Monotonic tick source used for fade deadlines.

#[cfg(not(feature = "quanta"))]
use std::time::Instant;

#[cfg(feature = "quanta")]
use quanta::Instant;

/// A source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn ticks(&self) -> u64;
}

/// Wall clock backed by a monotonic instant taken at construction.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a new clock whose origin is now.
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn ticks(&self) -> u64 {
        Instant::now().duration_since(self.origin).as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    ticks: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: u64) -> ManualClock {
        ManualClock {
            ticks: std::sync::atomic::AtomicU64::new(start),
        }
    }

    /// Moves the clock forward by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.ticks
            .fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn ticks(&self) -> u64 {
        self.ticks.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.ticks();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = clock.ticks();
        assert!(second >= first);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.ticks(), 1000);
        clock.advance(250);
        assert_eq!(clock.ticks(), 1250);
    }
}
