// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Border router side of the PAE. Owns the desired GTK set of the network, rotates it, and
//! keeps the pairwise keys of every authenticated node in NVM.

use {
    crate::{
        config::{KeyLifetimes, RadiusConfig},
        controller::{Role, RoleContext, RoleEvent},
        key::gtk::{GtkStatus, GtkStore},
        key::pairwise::PairwiseKeys,
        nvm::{
            data::{KeyStorageIndexRecord, KeysRecord},
            key_storage_file_name, NvmStore, KEY_STORAGE_INDEX_FILE_NAME,
        },
        Eui64, Error, GTK_LEN, GTK_NUM,
    },
    log::{debug, info, warn},
    rand::{rngs::SmallRng, Rng, SeedableRng},
    std::{collections::HashMap, net::SocketAddr},
};

/// Number of nodes whose keys fit the storage index.
pub const KEY_STORAGE_MAX: usize = 64;

#[derive(Debug)]
struct NodeKeys {
    storage: u8,
    keys: PairwiseKeys,
}

#[derive(Debug)]
pub struct Authenticator {
    lifetimes: KeyLifetimes,
    radius: RadiusConfig,
    nodes: HashMap<Eui64, NodeKeys>,
    storage_index: u64,
    index_dirty: bool,
    removed: Vec<u8>,
    rng: SmallRng,
}

impl Authenticator {
    pub fn new(lifetimes: KeyLifetimes, radius: Option<RadiusConfig>) -> Self {
        Self::with_rng(lifetimes, radius, SmallRng::from_entropy())
    }

    pub fn with_rng(lifetimes: KeyLifetimes, radius: Option<RadiusConfig>, rng: SmallRng) -> Self {
        Authenticator {
            lifetimes,
            radius: radius.unwrap_or_default(),
            nodes: HashMap::new(),
            storage_index: 0,
            index_dirty: false,
            removed: vec![],
            rng,
        }
    }

    pub fn radius(&self) -> &RadiusConfig {
        &self.radius
    }

    pub fn radius_address_set(&mut self, address: Option<SocketAddr>) {
        self.radius.address = address;
    }

    pub fn radius_shared_secret_set(&mut self, secret: &[u8]) -> Result<(), Error> {
        if secret.is_empty() {
            return Err(Error::Config("empty RADIUS shared secret"));
        }
        self.radius.shared_secret = secret.to_vec();
        Ok(())
    }

    /// Inserts a new GTK into the first free slot. Returns the slot index.
    pub fn gtk_insert(
        &mut self,
        gtks: &mut GtkStore,
        key: &[u8; GTK_LEN],
        lifetime: u32,
    ) -> Result<u8, Error> {
        if (0..GTK_NUM as u8).any(|i| gtks.get(i) == Some(key)) {
            return Err(Error::Config("GTK already inserted"));
        }
        let index = gtks.free_index_get().ok_or(Error::Config("all GTK slots in use"))?;
        gtks.set(index, key, lifetime)?;
        gtks.status_set_fresh(index)?;
        info!("GTK inserted at {}", index);
        Ok(index)
    }

    /// Makes the key of slot `index` the one used for sending.
    pub fn active_key_update(&mut self, gtks: &mut GtkStore, index: u8) -> Result<(), Error> {
        if gtks.status(index) == Some(GtkStatus::Active) {
            return Ok(());
        }
        gtks.status_set_fresh(index)?;
        gtks.status_set_active(index)?;
        info!("GTK {} active", index);
        Ok(())
    }

    pub fn node_keys(&self, eui64: &Eui64) -> Option<&PairwiseKeys> {
        self.nodes.get(eui64).map(|n| &n.keys)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Stores the keys of a node. Returns its storage slot.
    pub fn node_keys_set(&mut self, eui64: Eui64, mut keys: PairwiseKeys) -> Result<u8, Error> {
        keys.set_peer(eui64);
        if let Some(node) = self.nodes.get_mut(&eui64) {
            node.keys = keys;
            node.keys.set_peer(eui64);
            return Ok(node.storage);
        }
        let storage = (0..KEY_STORAGE_MAX as u8)
            .find(|n| self.storage_index & (1u64 << n) == 0)
            .ok_or(Error::Config("node key storage full"))?;
        self.storage_index |= 1u64 << storage;
        self.index_dirty = true;
        self.removed.retain(|n| *n != storage);
        self.nodes.insert(eui64, NodeKeys { storage, keys });
        Ok(storage)
    }

    pub fn node_keys_remove(&mut self, eui64: &Eui64) -> Result<(), Error> {
        let node = self.nodes.remove(eui64).ok_or(Error::Config("unknown node"))?;
        info!("removing keys of {}", eui64);
        self.storage_index &= !(1u64 << node.storage);
        self.index_dirty = true;
        self.removed.push(node.storage);
        Ok(())
    }

    /// Revocation of a single node is not supported; this always fails.
    pub fn node_access_revoke_start(&mut self, eui64: &Eui64) -> Result<(), Error> {
        warn!("cannot revoke access of {}", eui64);
        Err(Error::Protocol("node access revocation is not supported".to_string()))
    }

    /// Installs a successor of the active GTK and activates it as the active one runs out.
    fn gtk_rotation(&mut self, gtks: &mut GtkStore, events: &mut Vec<RoleEvent>) {
        let active = match gtks.active_index() {
            Some(active) => active,
            None => {
                if let Some(first) = gtks.install_order_first_index_get() {
                    match self.active_key_update(gtks, first) {
                        Ok(()) => events.push(RoleEvent::GtksUpdated),
                        Err(e) => warn!("cannot activate GTK {}: {}", first, e),
                    }
                }
                return;
            }
        };
        let remaining = gtks.lifetime(active).unwrap_or(0) as u64;
        let lifetime = self.lifetimes.gtk as u64;
        let successor = (0..GTK_NUM as u8)
            .find(|i| matches!(gtks.status(*i), Some(GtkStatus::New) | Some(GtkStatus::Fresh)));

        match successor {
            None => {
                let install_at = lifetime * (100 - self.lifetimes.gtk_new_install_required as u64) / 100;
                if remaining > install_at {
                    return;
                }
                if gtks.free_index_get().is_none() {
                    if let Some(oldest) = gtks.install_order_first_index_get() {
                        if oldest != active {
                            debug!("dropping oldest GTK {}", oldest);
                            if let Err(e) = gtks.clear(oldest) {
                                warn!("cannot drop GTK {}: {}", oldest, e);
                            }
                        }
                    }
                }
                let mut key = [0u8; GTK_LEN];
                self.rng.fill(&mut key[..]);
                match self.gtk_insert(gtks, &key, self.lifetimes.gtk) {
                    Ok(_) => events.push(RoleEvent::GtksUpdated),
                    Err(e) => warn!("cannot insert successor GTK: {}", e),
                }
            }
            Some(next) => {
                let activate_at = lifetime / self.lifetimes.gtk_new_activation_time.max(1) as u64;
                if remaining <= activate_at {
                    match self.active_key_update(gtks, next) {
                        Ok(()) => events.push(RoleEvent::GtksUpdated),
                        Err(e) => warn!("cannot activate GTK {}: {}", next, e),
                    }
                }
            }
        }
    }

    pub fn slow_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>) {
        if ctx.gtks.lifetime_decrement(seconds) {
            ctx.events.push(RoleEvent::GtksUpdated);
        }
        if !ctx.gtks.is_empty() {
            self.gtk_rotation(ctx.gtks, ctx.events);
        }
        let mut expired = false;
        for node in self.nodes.values_mut() {
            expired |= node.keys.lifetime_decrement(seconds);
        }
        if expired {
            ctx.events.push(RoleEvent::KeysUpdated);
        }
    }
}

impl Role for Authenticator {
    fn as_authenticator(&self) -> Option<&Authenticator> {
        Some(self)
    }

    fn as_authenticator_mut(&mut self) -> Option<&mut Authenticator> {
        Some(self)
    }

    fn fast_tick(&mut self, _ticks: u16, _ctx: &mut RoleContext<'_>) {}

    fn slow_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>) {
        Authenticator::slow_tick(self, seconds, ctx)
    }

    fn load(&mut self, nvm: &mut NvmStore) {
        let index = match nvm.load::<KeyStorageIndexRecord>(KEY_STORAGE_INDEX_FILE_NAME) {
            Ok(record) => record.bitfield,
            Err(e) => {
                debug!("no node key storage: {}", e);
                return;
            }
        };
        for n in (0..KEY_STORAGE_MAX as u8).filter(|n| index & (1u64 << n) != 0) {
            let record = match nvm.load::<KeysRecord>(&key_storage_file_name(n)) {
                Ok(record) => record,
                Err(e) => {
                    warn!("dropping node key storage {}: {}", n, e);
                    self.index_dirty = true;
                    continue;
                }
            };
            let peer = match record.peer {
                Some(peer) => peer,
                None => {
                    self.index_dirty = true;
                    continue;
                }
            };
            self.storage_index |= 1u64 << n;
            self.nodes.insert(peer, NodeKeys { storage: n, keys: record.to_keys() });
        }
        info!("restored keys of {} nodes", self.nodes.len());
    }

    fn persist(&mut self, nvm: &mut NvmStore) {
        for node in self.nodes.values_mut().filter(|n| n.keys.is_updated()) {
            match nvm.store(&key_storage_file_name(node.storage), &KeysRecord::from_keys(&node.keys)) {
                Ok(()) => node.keys.clear_updated(),
                Err(e) => warn!("cannot store node keys: {}", e),
            }
        }
        for n in self.removed.drain(..) {
            nvm.remove(&key_storage_file_name(n));
        }
        if self.index_dirty {
            let record = KeyStorageIndexRecord { bitfield: self.storage_index };
            match nvm.store(KEY_STORAGE_INDEX_FILE_NAME, &record) {
                Ok(()) => self.index_dirty = false,
                Err(e) => warn!("cannot store key storage index: {}", e),
            }
        }
    }

    fn stop(&mut self) {}
}
