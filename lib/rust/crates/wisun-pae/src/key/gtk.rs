// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::KeyStoreError, Error, GAK_LEN, GTKS_HASH_LEN, GTK_HASH_LEN, GTK_LEN, GTK_NUM,
    },
    log::{info, warn},
    sha2::{Digest, Sha256},
    std::fmt,
};

/// A key whose remaining lifetime drops below this many seconds while the authenticator still
/// announces no successor is treated as a lifetime mismatch.
pub const GTK_EXPIRE_MISMATCH_TIME: u32 = 60;

/// Lifecycle of a GTK slot. Transitions only move forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GtkStatus {
    New = 0,
    Fresh = 1,
    Active = 2,
    Old = 3,
}

impl Default for GtkStatus {
    fn default() -> Self {
        GtkStatus::New
    }
}

impl GtkStatus {
    pub fn from_u8(value: u8) -> Option<GtkStatus> {
        match value {
            0 => Some(GtkStatus::New),
            1 => Some(GtkStatus::Fresh),
            2 => Some(GtkStatus::Active),
            3 => Some(GtkStatus::Old),
            _ => None,
        }
    }
}

/// Result of comparing a remote GTK hash announcement against the local keys.
/// Ordered by priority: a hash mismatch outranks a lifetime-only mismatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GtkMismatch {
    NoMismatch,
    LifetimeMismatch,
    HashMismatch,
}

#[derive(Default, Clone, PartialEq)]
pub struct GtkSlot {
    key: [u8; GTK_LEN],
    set: bool,
    status: GtkStatus,
    install_order: u8,
    lifetime: u32,
}

impl GtkSlot {
    pub fn key(&self) -> &[u8; GTK_LEN] {
        &self.key
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn status(&self) -> GtkStatus {
        self.status
    }

    pub fn install_order(&self) -> u8 {
        self.install_order
    }

    /// Remaining lifetime in seconds.
    pub fn lifetime(&self) -> u32 {
        self.lifetime
    }
}

impl fmt::Debug for GtkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.set {
            return write!(f, "GtkSlot(empty)");
        }
        write!(
            f,
            "GtkSlot({}, {:?}, order {}, {} s)",
            hex::encode(&self.key[..]),
            self.status,
            self.install_order,
            self.lifetime
        )
    }
}

/// Holds the GTKs of one network.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GtkStore {
    slots: [GtkSlot; GTK_NUM],
    updated: bool,
}

fn check_index(index: u8) -> Result<usize, KeyStoreError> {
    if (index as usize) < GTK_NUM {
        Ok(index as usize)
    } else {
        Err(KeyStoreError::InvalidIndex(index))
    }
}

impl GtkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `key` in slot `index` as the last key in install order. Storing the key already
    /// held by the slot only refreshes its lifetime.
    pub fn set(&mut self, index: u8, key: &[u8; GTK_LEN], lifetime: u32) -> Result<(), KeyStoreError> {
        let i = check_index(index)?;
        if self.slots[i].set {
            if &self.slots[i].key != key {
                return Err(KeyStoreError::SlotOccupied(index));
            }
            self.slots[i].lifetime = lifetime;
            return Ok(());
        }
        let install_order = self.set_count() as u8;
        self.slots[i] =
            GtkSlot { key: *key, set: true, status: GtkStatus::New, install_order, lifetime };
        self.updated = true;
        Ok(())
    }

    /// Restores a slot read from NVM as-is.
    pub(crate) fn restore(
        &mut self,
        index: u8,
        key: &[u8; GTK_LEN],
        status: GtkStatus,
        install_order: u8,
        lifetime: u32,
    ) -> Result<(), KeyStoreError> {
        let i = check_index(index)?;
        self.slots[i] = GtkSlot { key: *key, set: true, status, install_order, lifetime };
        Ok(())
    }

    /// Renumbers install orders to 0..n keeping their relative order.
    pub(crate) fn compact_install_order(&mut self) {
        let mut indexes: Vec<usize> = (0..GTK_NUM).filter(|i| self.slots[*i].set).collect();
        indexes.sort_by_key(|i| (self.slots[*i].install_order, *i));
        for (order, i) in indexes.into_iter().enumerate() {
            self.slots[i].install_order = order as u8;
        }
    }

    pub fn clear(&mut self, index: u8) -> Result<(), KeyStoreError> {
        let i = check_index(index)?;
        self.clear_slot(i);
        Ok(())
    }

    fn clear_slot(&mut self, i: usize) {
        if !self.slots[i].set {
            return;
        }
        let removed_order = self.slots[i].install_order;
        self.slots[i] = GtkSlot::default();
        for slot in self.slots.iter_mut().filter(|s| s.set && s.install_order > removed_order) {
            slot.install_order -= 1;
        }
        self.updated = true;
    }

    pub fn clear_all(&mut self) {
        let was_set = self.set_count() > 0;
        self.slots = Default::default();
        self.updated |= was_set;
    }

    pub fn slot(&self, index: u8) -> Option<&GtkSlot> {
        self.slots.get(index as usize)
    }

    pub fn get(&self, index: u8) -> Option<&[u8; GTK_LEN]> {
        self.slots.get(index as usize).filter(|s| s.set).map(|s| &s.key)
    }

    pub fn is_set(&self, index: u8) -> bool {
        self.get(index).is_some()
    }

    pub fn set_count(&self) -> usize {
        self.slots.iter().filter(|s| s.set).count()
    }

    pub fn is_empty(&self) -> bool {
        self.set_count() == 0
    }

    pub fn status(&self, index: u8) -> Option<GtkStatus> {
        self.slots.get(index as usize).filter(|s| s.set).map(|s| s.status)
    }

    pub fn lifetime(&self, index: u8) -> Option<u32> {
        self.slots.get(index as usize).filter(|s| s.set).map(|s| s.lifetime)
    }

    pub fn status_set_fresh(&mut self, index: u8) -> Result<(), KeyStoreError> {
        let i = check_index(index)?;
        let slot = &mut self.slots[i];
        match (slot.set, slot.status) {
            (false, _) => Err(KeyStoreError::SlotEmpty(index)),
            (true, GtkStatus::New) => {
                slot.status = GtkStatus::Fresh;
                self.updated = true;
                Ok(())
            }
            (true, GtkStatus::Fresh) => Ok(()),
            (true, from) => {
                Err(KeyStoreError::IllegalTransition { index, from, to: GtkStatus::Fresh })
            }
        }
    }

    pub fn status_set_all_fresh(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.set && s.status == GtkStatus::New) {
            slot.status = GtkStatus::Fresh;
            self.updated = true;
        }
    }

    /// Promotes a Fresh slot to Active and demotes the previously Active slot to Old.
    pub fn status_set_active(&mut self, index: u8) -> Result<(), KeyStoreError> {
        let i = check_index(index)?;
        if !self.slots[i].set {
            return Err(KeyStoreError::SlotEmpty(index));
        }
        match self.slots[i].status {
            GtkStatus::Fresh => {}
            GtkStatus::Active => return Ok(()),
            from => {
                return Err(KeyStoreError::IllegalTransition { index, from, to: GtkStatus::Active })
            }
        }
        for slot in self.slots.iter_mut().filter(|s| s.set && s.status == GtkStatus::Active) {
            slot.status = GtkStatus::Old;
        }
        self.slots[i].status = GtkStatus::Active;
        self.updated = true;
        Ok(())
    }

    pub fn active_index(&self) -> Option<u8> {
        self.slots.iter().position(|s| s.set && s.status == GtkStatus::Active).map(|i| i as u8)
    }

    fn index_with_install_order(&self, order: u8) -> Option<u8> {
        self.slots.iter().position(|s| s.set && s.install_order == order).map(|i| i as u8)
    }

    pub fn install_order_first_index_get(&self) -> Option<u8> {
        self.index_with_install_order(0)
    }

    pub fn install_order_second_index_get(&self) -> Option<u8> {
        self.index_with_install_order(1)
    }

    pub fn install_order_last_index_get(&self) -> Option<u8> {
        match self.set_count() {
            0 => None,
            n => self.index_with_install_order(n as u8 - 1),
        }
    }

    /// First slot not holding a key.
    pub fn free_index_get(&self) -> Option<u8> {
        self.slots.iter().position(|s| !s.set).map(|i| i as u8)
    }

    /// Decrements all lifetimes and clears expired slots. Returns true if a slot expired.
    pub fn lifetime_decrement(&mut self, seconds: u32) -> bool {
        let mut expired = vec![];
        for (i, slot) in self.slots.iter_mut().enumerate().filter(|(_, s)| s.set) {
            slot.lifetime = slot.lifetime.saturating_sub(seconds);
            if slot.lifetime == 0 {
                expired.push(i);
            }
        }
        for index in &expired {
            info!("GTK {} expired", index);
            self.clear_slot(*index);
        }
        !expired.is_empty()
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    /// Concatenated hashes of all slots; empty slots hash to zero.
    pub fn gtks_hash(&self) -> [u8; GTKS_HASH_LEN] {
        let mut hash = [0u8; GTKS_HASH_LEN];
        for (i, slot) in self.slots.iter().enumerate().filter(|(_, s)| s.set) {
            hash[i * GTK_HASH_LEN..(i + 1) * GTK_HASH_LEN].copy_from_slice(&hash_generate(&slot.key));
        }
        hash
    }

    /// Compares the authenticator's announced GTK hashes against the local keys. Keys the
    /// authenticator no longer announces are removed.
    pub fn hash_compare(
        &mut self,
        remote: &[u8; GTKS_HASH_LEN],
        delete_on_mismatch: bool,
    ) -> GtkMismatch {
        let mut mismatch = GtkMismatch::NoMismatch;
        for i in 0..GTK_NUM {
            let remote_hash = &remote[i * GTK_HASH_LEN..(i + 1) * GTK_HASH_LEN];
            let remote_set = remote_hash.iter().any(|b| *b != 0);
            match (self.slots[i].set, remote_set) {
                (true, false) => {
                    info!("GTK {} removed by authenticator", i);
                    self.clear_slot(i);
                }
                (false, true) => mismatch = GtkMismatch::HashMismatch,
                (true, true) => {
                    if &hash_generate(&self.slots[i].key)[..] != remote_hash {
                        warn!("GTK {} hash mismatch", i);
                        mismatch = GtkMismatch::HashMismatch;
                        if delete_on_mismatch {
                            self.clear_slot(i);
                        }
                    }
                }
                (false, false) => {}
            }
        }
        if mismatch == GtkMismatch::NoMismatch {
            if let Some(last) = self.install_order_last_index_get() {
                if self.slots[last as usize].lifetime < GTK_EXPIRE_MISMATCH_TIME {
                    info!("GTK {} about to expire without successor", last);
                    mismatch = GtkMismatch::LifetimeMismatch;
                }
            }
        }
        mismatch
    }
}

/// Short hash of a GTK used in the PAN configuration announcement.
pub fn hash_generate(key: &[u8; GTK_LEN]) -> [u8; GTK_HASH_LEN] {
    let digest = Sha256::digest(&key[..]);
    let mut hash = [0u8; GTK_HASH_LEN];
    hash.copy_from_slice(&digest[..GTK_HASH_LEN]);
    hash
}

/// Derives the group authentication key installed on the MAC: the first 128 bits of
/// SHA-256(network name || GTK).
pub fn gak_derive(key: &[u8; GTK_LEN], network_name: &str) -> Result<[u8; GAK_LEN], Error> {
    if network_name.is_empty() {
        return Err(Error::Crypto("GAK derivation requires a network name"));
    }
    let mut hasher = Sha256::new();
    hasher.update(network_name.as_bytes());
    hasher.update(&key[..]);
    let digest = hasher.finalize();
    let mut gak = [0u8; GAK_LEN];
    gak.copy_from_slice(&digest[..GAK_LEN]);
    Ok(gak)
}
