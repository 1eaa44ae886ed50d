//! VoicePool: fixed-capacity voice allocation with age-based stealing.

use alloc::vec::Vec;

/// Lifecycle hooks the pool needs from a voice.
pub trait PoolVoice {
    /// Begin the release phase.
    fn release(&mut self);
    /// Stop immediately.
    fn kill(&mut self);
    /// The voice no longer produces output.
    fn is_finished(&self) -> bool;
}

/// Identifies one allocation of a slot. Stale once the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceHandle {
    pub slot: usize,
    pub age: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct SlotState {
    active: bool,
    released: bool,
    age: u64,
}

/// Pool of voices allocated once at construction.
#[derive(Clone, Debug)]
pub struct VoicePool<V> {
    voices: Vec<V>,
    slots: Vec<SlotState>,
    polyphony: usize,
    next_age: u64,
}

impl<V: PoolVoice> VoicePool<V> {
    /// Create `capacity` voices with `make`.
    pub fn new(capacity: usize, make: impl FnMut() -> V) -> Self {
        let capacity = capacity.max(1);
        let mut make = make;
        Self {
            voices: (0..capacity).map(|_| make()).collect(),
            slots: alloc::vec![SlotState::default(); capacity],
            polyphony: capacity,
            next_age: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    /// Clamped to 1..=capacity. Voices above the limit finish normally.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.polyphony = polyphony.clamp(1, self.voices.len());
    }

    /// Claim a slot for a new note.
    ///
    /// Takes the first inactive slot within the polyphony limit, otherwise
    /// kills and reuses the oldest. With polyphony 1 the single slot is always
    /// cut. The caller initialises the returned voice.
    pub fn allocate(&mut self) -> (VoiceHandle, &mut V) {
        let limit = self.polyphony;
        let free = if limit == 1 {
            None
        } else {
            self.slots[..limit].iter().position(|s| !s.active)
        };
        let slot = match free {
            Some(i) => i,
            None => {
                let oldest = self.slots[..limit]
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, s)| s.age)
                    .map_or(0, |(i, _)| i);
                self.voices[oldest].kill();
                oldest
            }
        };
        let age = self.next_age;
        self.next_age += 1;
        self.slots[slot] = SlotState { active: true, released: false, age };
        (VoiceHandle { slot, age }, &mut self.voices[slot])
    }

    fn live(&self, handle: VoiceHandle) -> bool {
        self.slots
            .get(handle.slot)
            .is_some_and(|s| s.active && s.age == handle.age)
    }

    pub fn get(&self, handle: VoiceHandle) -> Option<&V> {
        self.live(handle).then(|| &self.voices[handle.slot])
    }

    pub fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut V> {
        if self.live(handle) {
            Some(&mut self.voices[handle.slot])
        } else {
            None
        }
    }

    /// Release one voice. Stale handles are ignored.
    pub fn release(&mut self, handle: VoiceHandle) -> bool {
        if !self.live(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.slot];
        if !slot.released {
            slot.released = true;
            self.voices[handle.slot].release();
        }
        true
    }

    pub fn release_all(&mut self) {
        for (slot, voice) in self.slots.iter_mut().zip(self.voices.iter_mut()) {
            if slot.active && !slot.released {
                slot.released = true;
                voice.release();
            }
        }
    }

    /// Silence everything and free all slots.
    pub fn kill_all(&mut self) {
        for (slot, voice) in self.slots.iter_mut().zip(self.voices.iter_mut()) {
            if slot.active {
                voice.kill();
            }
            slot.active = false;
            slot.released = false;
        }
    }

    /// Return finished voices to the free list.
    pub fn reap(&mut self) {
        for (slot, voice) in self.slots.iter_mut().zip(self.voices.iter()) {
            if slot.active && voice.is_finished() {
                slot.active = false;
                slot.released = false;
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    /// Sounding voices, in slot order.
    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.slots
            .iter()
            .zip(self.voices.iter_mut())
            .filter_map(|(s, v)| s.active.then_some(v))
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &V> {
        self.slots
            .iter()
            .zip(self.voices.iter())
            .filter_map(|(s, v)| s.active.then_some(v))
    }

    /// Every voice, active or not (for parameter updates).
    pub fn voices_mut(&mut self) -> &mut [V] {
        &mut self.voices
    }
}
