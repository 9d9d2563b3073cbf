// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Anti-replay frame counters of the GTK slots, kept durable across restarts.
//!
//! The persisted counter of a slot is never lower than a value the MAC has used. After a
//! restart every counter resumes `FRAME_COUNTER_INCREMENT` above the last persisted value,
//! which covers the frames sent between the last store and the power loss.

use {
    crate::{
        nvm::{
            data::{FrameCounterEntry, FrameCounterRecord},
            NvmStore, FRAME_COUNTER_FILE_NAME,
        },
        time, Error, GTK_LEN, GTK_NUM,
    },
    log::{info, warn},
};

pub const FRAME_COUNTER_INCREMENT: u32 = 1_000_000;
pub const FRAME_COUNTER_STORE_THRESHOLD: u32 = 800_000;
pub const FRAME_COUNTER_STORE_INTERVAL: u32 = 60;
pub const FRAME_COUNTER_STORE_FORCE_INTERVAL: u32 = 72_000;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SlotCounter {
    /// Key the counter belongs to.
    gtk: Option<[u8; GTK_LEN]>,
    current: u32,
    stored: u32,
    max_jump: u32,
}

impl SlotCounter {
    pub fn gtk(&self) -> Option<&[u8; GTK_LEN]> {
        self.gtk.as_ref()
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn stored(&self) -> u32 {
        self.stored
    }

    pub fn max_jump(&self) -> u32 {
        self.max_jump
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadState {
    NotRead,
    Read,
}

/// What the store timers ask for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Store only slots past their threshold.
    Periodic,
    Forced,
}

#[derive(Debug, Clone)]
pub struct FrameCounters {
    state: ReadState,
    restart_count: u32,
    reference_time: u64,
    pan_version: u16,
    slots: [SlotCounter; GTK_NUM],
    /// Active index at the time of the last store.
    stored_active: Option<u8>,
    store_timer: u32,
    force_timer: u32,
}

impl Default for FrameCounters {
    fn default() -> Self {
        FrameCounters {
            state: ReadState::NotRead,
            restart_count: 0,
            reference_time: 0,
            pan_version: 0,
            slots: Default::default(),
            stored_active: None,
            store_timer: 0,
            force_timer: 0,
        }
    }
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn reference_time(&self) -> u64 {
        self.reference_time
    }

    pub fn pan_version(&self) -> u16 {
        self.pan_version
    }

    pub fn set_pan_version(&mut self, pan_version: u16) {
        self.pan_version = pan_version;
    }

    pub fn slot(&self, index: u8) -> Option<&SlotCounter> {
        self.slots.get(index as usize)
    }

    /// Loads the persisted counters. Only the first call per controller touches NVM; the
    /// table is `Read` afterwards even when loading failed.
    pub fn read(&mut self, nvm: &mut NvmStore, now: u64) -> Result<(), Error> {
        if self.state == ReadState::Read {
            return Ok(());
        }
        self.state = ReadState::Read;
        let record = nvm.load::<FrameCounterRecord>(FRAME_COUNTER_FILE_NAME)?;

        self.reference_time = time::select_reference_time(record.reference_time, now);
        self.restart_count = record.restart_count.wrapping_add(1);
        self.pan_version = record.pan_version;
        for (slot, entry) in self.slots.iter_mut().zip(record.entries.iter()) {
            if !entry.set {
                *slot = SlotCounter::default();
                continue;
            }
            if entry.counter > u32::MAX - FRAME_COUNTER_INCREMENT {
                warn!("frame counter margin exhausted, saturating at {}", u32::MAX);
            }
            let current = entry.counter.saturating_add(FRAME_COUNTER_INCREMENT);
            *slot =
                SlotCounter { gtk: Some(entry.gtk), current, stored: current, max_jump: entry.max_jump };
        }
        info!("frame counters read, restart count {}", self.restart_count);
        Ok(())
    }

    /// Counter persisted for `gtk` in slot `index`, if the slot still belongs to that key.
    pub fn persisted_counter(&self, index: u8, gtk: &[u8; GTK_LEN]) -> Option<u32> {
        self.slots.get(index as usize).filter(|s| s.gtk.as_ref() == Some(gtk)).map(|s| s.current)
    }

    pub fn slot_reset(&mut self, index: u8) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = SlotCounter::default();
        }
    }

    /// Feeds the live counter of an installed slot. Returns true when the table must be stored.
    pub fn update_slot(
        &mut self,
        index: u8,
        gtk: &[u8; GTK_LEN],
        live: u32,
        is_active: bool,
        use_threshold: bool,
    ) -> bool {
        let slot = match self.slots.get_mut(index as usize) {
            Some(slot) => slot,
            None => return false,
        };
        if slot.gtk.as_ref() != Some(gtk) {
            info!("frame counter of GTK {} seen first time at {}", index, live);
            *slot = SlotCounter { gtk: Some(*gtk), current: live, stored: 0, max_jump: 0 };
            return true;
        }

        if live > slot.current {
            slot.max_jump = slot.max_jump.max(live - slot.current);
            slot.current = live;
        }
        let limit = slot.stored as u64 + FRAME_COUNTER_STORE_THRESHOLD as u64;
        let crossed = slot.current as u64 > limit
            || slot.current as u64 + slot.max_jump as u64 > limit;
        let newly_active = is_active && self.stored_active != Some(index);
        !use_threshold || crossed || newly_active
    }

    /// Builds the record persisting the current counters.
    pub fn record(&self, reference_time: u64) -> FrameCounterRecord {
        let mut record = FrameCounterRecord {
            restart_count: self.restart_count,
            reference_time,
            pan_version: self.pan_version,
            ..Default::default()
        };
        for (entry, slot) in record.entries.iter_mut().zip(self.slots.iter()) {
            if let Some(gtk) = slot.gtk {
                *entry = FrameCounterEntry {
                    set: true,
                    gtk,
                    counter: slot.current,
                    max_jump: slot.max_jump,
                };
            }
        }
        record
    }

    /// Marks the counters of `record` as durable.
    pub fn commit(&mut self, active: Option<u8>) {
        for slot in self.slots.iter_mut().filter(|s| s.gtk.is_some()) {
            slot.stored = slot.current;
        }
        self.stored_active = active;
    }

    /// Writes the counters to NVM and commits them on success.
    pub fn store(&mut self, nvm: &mut NvmStore, now: u64, active: Option<u8>) -> Result<(), Error> {
        nvm.store(FRAME_COUNTER_FILE_NAME, &self.record(now))?;
        self.reference_time = now;
        self.commit(active);
        Ok(())
    }

    /// Advances the store timers.
    pub fn timer(&mut self, seconds: u32) -> Option<StoreKind> {
        self.force_timer = self.force_timer.saturating_add(seconds);
        self.store_timer = self.store_timer.saturating_add(seconds);
        if self.force_timer >= FRAME_COUNTER_STORE_FORCE_INTERVAL {
            self.force_timer = 0;
            self.store_timer = 0;
            return Some(StoreKind::Forced);
        }
        if self.store_timer >= FRAME_COUNTER_STORE_INTERVAL {
            self.store_timer = 0;
            return Some(StoreKind::Periodic);
        }
        None
    }

    /// Forgets the counters but keeps the read state.
    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.stored_active = None;
        self.restart_count = 0;
        self.store_timer = 0;
        self.force_timer = 0;
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::PersistenceError, test_utils::MemFileService},
        assert_matches::assert_matches,
    };

    const K1: [u8; GTK_LEN] = [0x11; GTK_LEN];
    const K2: [u8; GTK_LEN] = [0x22; GTK_LEN];
    const NOW: u64 = 1_700_000_000;

    fn nvm(files: &MemFileService) -> NvmStore {
        NvmStore::new("root", Box::new(files.clone()))
    }

    #[test]
    fn read_without_record_fails_and_leaves_defaults() {
        let files = MemFileService::new();
        let mut counters = FrameCounters::new();
        assert_matches!(
            counters.read(&mut nvm(&files), NOW),
            Err(Error::Persistence(PersistenceError::Io { .. }))
        );
        assert_eq!(counters.state(), ReadState::Read);
        assert_eq!(counters.restart_count(), 0);
        assert!((0..GTK_NUM as u8).all(|i| counters.slot(i).unwrap().gtk().is_none()));
    }

    #[test]
    fn corrupted_record_is_rejected() {
        let files = MemFileService::new();
        let mut store = nvm(&files);
        let mut counters = FrameCounters::new();
        counters.update_slot(0, &K1, 10, false, true);
        counters.store(&mut store, NOW, None).expect("error storing counters");

        // Flag octet of slot 0 is neither 0 nor 1.
        let mut raw = files.get("root/pae_frame_counter").expect("record missing");
        raw[4 + 14] = 0x02;
        files.put("root/pae_frame_counter", raw);

        let mut restarted = FrameCounters::new();
        assert_matches!(
            restarted.read(&mut store, NOW),
            Err(Error::Persistence(PersistenceError::InvalidValue(_)))
        );
        assert_eq!(restarted.restart_count(), 0);
        assert!(restarted.slot(0).unwrap().gtk().is_none());
    }

    #[test]
    fn counters_never_go_backwards_across_restarts() {
        let files = MemFileService::new();
        let mut live = 0u32;
        let mut restart_count = 0;
        for restart in 0..5u32 {
            let mut store = nvm(&files);
            let mut counters = FrameCounters::new();
            if counters.read(&mut store, NOW).is_ok() {
                counters.store(&mut store, NOW, None).expect("error writing counters back");
            }
            let resumed = counters.persisted_counter(0, &K1);
            if restart > 0 {
                let resumed = resumed.expect("counter must survive restart");
                assert!(resumed >= live + FRAME_COUNTER_INCREMENT - FRAME_COUNTER_STORE_THRESHOLD);
                assert!(resumed > live);
                assert_eq!(counters.restart_count(), restart_count + 1);
                live = resumed;
            }
            restart_count = counters.restart_count();
            store_after_restart(&mut counters, &mut store, &mut live);
        }
    }

    // Sends frames until the counter crosses the threshold once, then "loses power" after
    // some more frames that were never stored.
    fn store_after_restart(counters: &mut FrameCounters, store: &mut NvmStore, live: &mut u32) {
        if counters.update_slot(0, &K1, *live, false, true) {
            counters.store(store, NOW, None).expect("error storing counters");
        }
        for _ in 0..10 {
            *live += 100_000;
            if counters.update_slot(0, &K1, *live, false, true) {
                counters.store(store, NOW, None).expect("error storing counters");
            }
        }
        *live += 50_000;
    }

    #[test]
    fn restart_adds_increment_and_saturates() {
        let files = MemFileService::new();
        let mut store = nvm(&files);
        let mut record = FrameCounterRecord { restart_count: 7, reference_time: NOW, ..Default::default() };
        record.entries[0] = FrameCounterEntry { set: true, gtk: K1, counter: 5000, max_jump: 0 };
        record.entries[1] =
            FrameCounterEntry { set: true, gtk: K2, counter: u32::MAX - 10, max_jump: 0 };
        store.store(FRAME_COUNTER_FILE_NAME, &record).expect("error storing");

        let mut counters = FrameCounters::new();
        counters.read(&mut store, NOW).expect("error reading counters");
        assert_eq!(counters.restart_count(), 8);
        assert_eq!(counters.persisted_counter(0, &K1), Some(5000 + FRAME_COUNTER_INCREMENT));
        assert_eq!(counters.persisted_counter(1, &K2), Some(u32::MAX));
        // Counter belongs to another key.
        assert_eq!(counters.persisted_counter(0, &K2), None);

        // Second read does not touch NVM again.
        store.remove(FRAME_COUNTER_FILE_NAME);
        counters.read(&mut store, NOW).expect("second read is a no-op");
        assert_eq!(counters.restart_count(), 8);
    }

    #[test]
    fn store_decisions() {
        let mut counters = FrameCounters::new();
        // First sighting of a key forces a store.
        assert!(counters.update_slot(0, &K1, 100, false, true));
        counters.commit(None);
        assert!(!counters.update_slot(0, &K1, 200, false, true));
        // Without thresholds everything is stored.
        assert!(counters.update_slot(0, &K1, 200, false, false));
        // Becoming active stores once.
        assert!(counters.update_slot(0, &K1, 300, true, true));
        counters.commit(Some(0));
        assert!(!counters.update_slot(0, &K1, 400, true, true));
        // Threshold crossed.
        assert!(counters.update_slot(0, &K1, 400 + FRAME_COUNTER_STORE_THRESHOLD + 1, true, true));
        // Different key in the slot is a first sighting again.
        assert!(counters.update_slot(0, &K2, 0, true, true));
    }

    #[test]
    fn large_jumps_store_before_crossing() {
        let mut counters = FrameCounters::new();
        assert!(counters.update_slot(0, &K1, 0, false, true));
        counters.commit(None);
        assert!(!counters.update_slot(0, &K1, 350_000, false, true));
        // The next jump of the same size would cross the threshold.
        assert!(counters.update_slot(0, &K1, 700_000, false, true));
        let slot = counters.slot(0).unwrap();
        assert_eq!(slot.max_jump(), 350_000);
        assert!(slot.stored() <= slot.current());
    }

    #[test]
    fn timers() {
        let mut counters = FrameCounters::new();
        assert_eq!(counters.timer(FRAME_COUNTER_STORE_INTERVAL - 1), None);
        assert_eq!(counters.timer(1), Some(StoreKind::Periodic));
        let mut forced = 0;
        for _ in 0..(FRAME_COUNTER_STORE_FORCE_INTERVAL / FRAME_COUNTER_STORE_INTERVAL) {
            if counters.timer(FRAME_COUNTER_STORE_INTERVAL) == Some(StoreKind::Forced) {
                forced += 1;
            }
        }
        assert_eq!(forced, 1);
    }
}
