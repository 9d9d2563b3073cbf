// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{Eui64, PMK_LEN, PTK_LEN},
    log::info,
    std::fmt,
};

/// PMK and PTK shared with one peer, plus the replay counter of the PMK.
#[derive(Default, Clone, PartialEq)]
pub struct PairwiseKeys {
    peer: Option<Eui64>,
    pmk: Option<[u8; PMK_LEN]>,
    pmk_lifetime: u32,
    pmk_replay_counter: u64,
    ptk: Option<[u8; PTK_LEN]>,
    ptk_lifetime: u32,
    updated: bool,
}

impl fmt::Debug for PairwiseKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairwiseKeys")
            .field("peer", &self.peer)
            .field("pmk_set", &self.pmk.is_some())
            .field("pmk_lifetime", &self.pmk_lifetime)
            .field("pmk_replay_counter", &self.pmk_replay_counter)
            .field("ptk_set", &self.ptk.is_some())
            .field("ptk_lifetime", &self.ptk_lifetime)
            .finish()
    }
}

impl PairwiseKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> Option<Eui64> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: Eui64) {
        if self.peer != Some(peer) {
            self.peer = Some(peer);
            self.updated = true;
        }
    }

    pub fn pmk(&self) -> Option<&[u8; PMK_LEN]> {
        self.pmk.as_ref()
    }

    pub fn pmk_lifetime(&self) -> u32 {
        self.pmk_lifetime
    }

    pub fn pmk_set(&mut self, pmk: &[u8; PMK_LEN], lifetime: u32) {
        self.pmk = Some(*pmk);
        self.pmk_lifetime = lifetime;
        self.pmk_replay_counter = 0;
        self.updated = true;
    }

    /// Deleting the PMK invalidates the PTK derived from it.
    pub fn pmk_delete(&mut self) {
        if self.pmk.take().is_some() {
            self.updated = true;
        }
        self.pmk_lifetime = 0;
        self.pmk_replay_counter = 0;
        self.ptk_delete();
    }

    pub fn pmk_replay_counter(&self) -> u64 {
        self.pmk_replay_counter
    }

    pub fn pmk_replay_counter_set(&mut self, counter: u64) {
        if counter != self.pmk_replay_counter {
            self.pmk_replay_counter = counter;
            self.updated = true;
        }
    }

    pub fn ptk(&self) -> Option<&[u8; PTK_LEN]> {
        self.ptk.as_ref()
    }

    pub fn ptk_lifetime(&self) -> u32 {
        self.ptk_lifetime
    }

    pub fn ptk_set(&mut self, ptk: &[u8; PTK_LEN], lifetime: u32) {
        self.ptk = Some(*ptk);
        self.ptk_lifetime = lifetime;
        self.updated = true;
    }

    pub fn ptk_delete(&mut self) {
        if self.ptk.take().is_some() {
            self.updated = true;
        }
        self.ptk_lifetime = 0;
    }

    /// True when both PMK and PTK are held for `peer`.
    pub fn is_complete_for(&self, peer: Eui64) -> bool {
        self.peer == Some(peer) && self.pmk.is_some() && self.ptk.is_some()
    }

    /// Decrements both lifetimes, deleting expired keys. Returns true if a key expired.
    pub fn lifetime_decrement(&mut self, seconds: u32) -> bool {
        let mut expired = false;
        if self.ptk.is_some() {
            self.ptk_lifetime = self.ptk_lifetime.saturating_sub(seconds);
            if self.ptk_lifetime == 0 {
                info!("PTK expired");
                self.ptk_delete();
                expired = true;
            }
        }
        if self.pmk.is_some() {
            self.pmk_lifetime = self.pmk_lifetime.saturating_sub(seconds);
            if self.pmk_lifetime == 0 {
                info!("PMK expired");
                self.pmk_delete();
                expired = true;
            }
        }
        expired
    }

    pub fn clear(&mut self) {
        let was_set = self.peer.is_some() || self.pmk.is_some() || self.ptk.is_some();
        *self = PairwiseKeys::default();
        self.updated = was_set;
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }
}
