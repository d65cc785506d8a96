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
use std::num::NonZeroU64;

use tracing::debug;

const INDEX_BITS: u32 = 16;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Opaque identifier for a playing sound.
///
/// The low bits hold the slot index plus one and the high bits the slot's generation, so a
/// handle kept after its slot was released never matches the slot's next occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);

impl Handle {
    pub(crate) fn new(index: usize, generation: u64) -> Option<Handle> {
        NonZeroU64::new((generation << INDEX_BITS) | (index as u64 + 1)).map(Handle)
    }

    /// Rebuilds a handle from its raw value. Zero is never a valid handle.
    pub fn from_raw(raw: u64) -> Option<Handle> {
        NonZeroU64::new(raw).map(Handle)
    }

    /// The raw value of this handle.
    pub fn raw(self) -> u64 {
        self.0.get()
    }

    fn index(self) -> Option<usize> {
        (self.0.get() & INDEX_MASK).checked_sub(1).map(|i| i as usize)
    }

    fn generation(self) -> u64 {
        self.0.get() >> INDEX_BITS
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Binds a handle to a channel and its fade state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    handle: Handle,
    channel: usize,
    timed: bool,
    fade_deadline: Option<u64>,
}

impl Slot {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Whether the slot's channel is flushed once its fade deadline passes.
    pub fn is_timed(&self) -> bool {
        self.timed
    }

    pub fn set_timed(&mut self, timed: bool) {
        self.timed = timed;
    }

    /// Tick at which a pending fade completes.
    pub fn fade_deadline(&self) -> Option<u64> {
        self.fade_deadline
    }

    /// Schedules a fade deadline. An existing deadline is only ever moved later.
    pub fn extend_fade(&mut self, deadline: u64) {
        if self.fade_deadline.map_or(true, |current| deadline >= current) {
            self.fade_deadline = Some(deadline);
        }
    }

    pub fn clear_fade(&mut self) {
        self.fade_deadline = None;
    }

    /// Whether this slot is timed and its deadline is at or before `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.timed && self.fade_deadline.is_some_and(|deadline| deadline <= now)
    }
}

struct Entry {
    generation: u64,
    slot: Option<Slot>,
}

/// Fixed-capacity table of slots.
pub struct SlotTable {
    entries: Vec<Entry>,
}

impl SlotTable {
    /// Creates a table with the given capacity. The capacity never changes, and slot channels
    /// must be below it.
    pub fn new(capacity: usize) -> SlotTable {
        let capacity = capacity.min(INDEX_MASK as usize);
        SlotTable {
            entries: (0..capacity)
                .map(|_| Entry {
                    generation: 0,
                    slot: None,
                })
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.slot.is_none())
    }

    /// Binds a new handle to the channel in the first free slot. Returns None when the
    /// channel is out of range or every slot is taken.
    pub fn acquire(&mut self, channel: usize) -> Option<Handle> {
        if channel >= self.entries.len() {
            debug!(channel, "Channel is outside the slot table");
            return None;
        }
        let (index, entry) = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, entry)| entry.slot.is_none())?;
        let handle = Handle::new(index, entry.generation)?;
        entry.slot = Some(Slot {
            handle,
            channel,
            timed: false,
            fade_deadline: None,
        });
        Some(handle)
    }

    fn entry(&self, handle: Handle) -> Option<&Entry> {
        self.entries
            .get(handle.index()?)
            .filter(|entry| entry.generation == handle.generation())
    }

    /// Finds the live slot for a handle. Stale and unknown handles find nothing.
    pub fn find(&self, handle: Handle) -> Option<&Slot> {
        self.entry(handle)?.slot.as_ref()
    }

    pub fn find_mut(&mut self, handle: Handle) -> Option<&mut Slot> {
        let entry = self.entries.get_mut(handle.index()?)?;
        if entry.generation != handle.generation() {
            return None;
        }
        entry.slot.as_mut()
    }

    fn release_entry(entry: &mut Entry) -> Option<Slot> {
        let slot = entry.slot.take()?;
        entry.generation = (entry.generation + 1) & (u64::MAX >> INDEX_BITS);
        Some(slot)
    }

    /// Frees the handle's slot so it can be reused. The handle itself is dead afterwards.
    pub fn release(&mut self, handle: Handle) -> Option<Slot> {
        let entry = self.entries.get_mut(handle.index()?)?;
        if entry.generation != handle.generation() {
            return None;
        }
        Self::release_entry(entry)
    }

    /// Frees every slot bound to the channel and returns how many there were.
    pub fn release_channel(&mut self, channel: usize) -> usize {
        self.release_where(|slot| slot.channel == channel).len()
    }

    /// Frees every slot matching the predicate, returning the freed slots.
    pub fn release_where(&mut self, mut predicate: impl FnMut(&Slot) -> bool) -> Vec<Slot> {
        self.entries
            .iter_mut()
            .filter(|entry| entry.slot.as_ref().is_some_and(&mut predicate))
            .filter_map(Self::release_entry)
            .collect()
    }

    /// Frees every slot.
    pub fn release_all(&mut self) -> usize {
        self.release_where(|_| true).len()
    }

    /// Iterates over live slots in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.entries.iter().filter_map(|entry| entry.slot.as_ref())
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("capacity", &self.capacity())
            .field("live", &self.len())
            .finish()
    }
}
