// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-interface PAE controller.
//!
//! The controller is the only component talking to the MAC. It reconciles the GTKs the role
//! wants installed against the keys currently installed, keeps the frame counters durable,
//! and batches network info writes.

pub mod context;

use {
    crate::{
        authenticator::Authenticator,
        certs::CertificateBundle,
        config::SecurityConfig,
        frame_counter::{FrameCounters, ReadState, StoreKind},
        key::{
            gtk::{gak_derive, GtkMismatch, GtkStore},
            pairwise::PairwiseKeys,
        },
        kmp::{CryptoRequestId, KmpFactory, KmpType},
        nvm::{
            data::{NwInfoRecord, NwInfoSlot},
            NvmStore, KEYS_FILE_NAME, NW_INFO_FILE_NAME,
        },
        supplicant::{AuthenticateOutcome, Supplicant},
        time::{self, Clock},
        Eui64, Error, InterfaceId, GAK_LEN, GTKS_HASH_LEN, GTK_LEN, GTK_NUM,
        NETWORK_NAME_MAX_LEN,
    },
    log::{debug, error, info, warn},
    std::{convert::TryFrom, fmt, net::SocketAddr},
};

/// PAN id persisted while the network is not known yet.
const PAN_ID_UNKNOWN: u16 = 0xffff;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Ok,
    ErrUnspecified,
    ErrTxFailure,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// At least one slot was newly installed.
    Installed,
    NoChange,
    NothingToInstall,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Initialized,
    SupplicantReady,
    AuthenticatorReady,
    Stopped,
}

/// Services of the MAC and of the bootstrap layer.
pub trait PaeCallbacks: fmt::Debug {
    fn nw_key_set(&mut self, index: u8, key_id: u8, key: &[u8; GAK_LEN]);
    fn nw_key_clear(&mut self, index: u8);
    fn nw_send_key_index_set(&mut self, index: u8);
    fn nw_frame_counter_set(&mut self, index: u8, counter: u32);
    fn nw_frame_counter_read(&mut self, index: u8) -> u32;
    fn auth_completed(&mut self, result: AuthResult, peer: Option<Eui64>);
    fn nw_info_updated(&mut self, pan_id: u16, pan_version: u16, network_name: &str);
    /// Current routing parent.
    fn parent_get(&mut self) -> Option<Eui64> {
        None
    }
}

/// What a role reports back to its controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleEvent {
    GtksUpdated,
    KeysUpdated,
    AuthCompleted { result: AuthResult, peer: Option<Eui64> },
}

/// Controller state a role may touch while handling a call.
#[derive(Debug)]
pub struct RoleContext<'a> {
    pub gtks: &'a mut GtkStore,
    pub parent: Option<Eui64>,
    pub events: &'a mut Vec<RoleEvent>,
}

/// The supplicant or authenticator side of a controller.
pub trait Role: fmt::Debug {
    fn as_supplicant(&self) -> Option<&Supplicant> {
        None
    }

    fn as_supplicant_mut(&mut self) -> Option<&mut Supplicant> {
        None
    }

    fn as_authenticator(&self) -> Option<&Authenticator> {
        None
    }

    fn as_authenticator_mut(&mut self) -> Option<&mut Authenticator> {
        None
    }

    fn fast_tick(&mut self, ticks: u16, ctx: &mut RoleContext<'_>);
    fn slow_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>);
    /// Restores the role's own records.
    fn load(&mut self, nvm: &mut NvmStore);
    /// Writes the role's records that changed.
    fn persist(&mut self, nvm: &mut NvmStore);
    fn stop(&mut self);
}

/// Identity and desired keys of the network the interface belongs to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetworkInfo {
    pub pan_id: Option<u16>,
    pub pan_version: u16,
    pub network_name: String,
    pub gtks: GtkStore,
}

/// Snapshot of what was pushed to the MAC for one slot.
#[derive(Debug, Default, Clone, PartialEq)]
struct InstalledKey {
    key: [u8; GTK_LEN],
    set: bool,
    installed: bool,
}

#[derive(Debug)]
pub struct PaeController {
    interface: InterfaceId,
    own_eui64: Eui64,
    state: LifecycleState,
    config: SecurityConfig,
    nw_info: NetworkInfo,
    nw_keys: [InstalledKey; GTK_NUM],
    send_key_index: Option<u8>,
    frame_counters: FrameCounters,
    nvm: NvmStore,
    certs: CertificateBundle,
    border_router: Option<Eui64>,
    role: Option<Box<dyn Role>>,
    callbacks: Box<dyn PaeCallbacks>,
    clock: Box<dyn Clock>,
    /// Seconds until pending network info is written; zero when nothing is pending.
    nw_info_write_timer: u32,
    /// Persisted time was trusted over the clock when network info was restored.
    time_changed: bool,
}

fn supplicant(role: &mut Option<Box<dyn Role>>) -> Result<&mut Supplicant, Error> {
    role.as_mut()
        .and_then(|r| r.as_supplicant_mut())
        .ok_or(Error::Config("supplicant not initialized"))
}

fn authenticator(role: &mut Option<Box<dyn Role>>) -> Result<&mut Authenticator, Error> {
    role.as_mut()
        .and_then(|r| r.as_authenticator_mut())
        .ok_or(Error::Config("authenticator not initialized"))
}

impl PaeController {
    pub fn new(
        interface: InterfaceId,
        own_eui64: Eui64,
        config: SecurityConfig,
        nvm: NvmStore,
        callbacks: Box<dyn PaeCallbacks>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if !nvm.root_path_valid() {
            return Err(Error::Config("NVM root path"));
        }
        Ok(PaeController {
            interface,
            own_eui64,
            state: LifecycleState::Initialized,
            config,
            nw_info: NetworkInfo::default(),
            nw_keys: Default::default(),
            send_key_index: None,
            frame_counters: FrameCounters::new(),
            nvm,
            certs: CertificateBundle::new(),
            border_router: None,
            role: None,
            callbacks,
            clock,
            nw_info_write_timer: 0,
            time_changed: false,
        })
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn own_eui64(&self) -> Eui64 {
        self.own_eui64
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn nw_info(&self) -> &NetworkInfo {
        &self.nw_info
    }

    pub fn frame_counters(&self) -> &FrameCounters {
        &self.frame_counters
    }

    pub fn role(&self) -> Option<&dyn Role> {
        self.role.as_deref()
    }

    pub fn certs(&self) -> &CertificateBundle {
        &self.certs
    }

    pub fn certs_mut(&mut self) -> &mut CertificateBundle {
        &mut self.certs
    }

    pub fn supplicant_init(&mut self, factory: Box<dyn KmpFactory>) -> Result<(), Error> {
        self.check_state(LifecycleState::Initialized)?;
        self.restore();
        let mut supplicant = Supplicant::new(self.config.timing.clone(), factory);
        if let Some(pan_id) = self.nw_info.pan_id {
            supplicant.set_network(pan_id, &self.nw_info.network_name);
        }
        supplicant.load(&mut self.nvm);
        self.role = Some(Box::new(supplicant));
        self.state = LifecycleState::SupplicantReady;
        info!("{}: supplicant ready", self.interface);
        Ok(())
    }

    pub fn authenticator_init(&mut self) -> Result<(), Error> {
        self.check_state(LifecycleState::Initialized)?;
        self.restore();
        let mut authenticator =
            Authenticator::new(self.config.key_lifetimes.clone(), self.config.radius.clone());
        authenticator.load(&mut self.nvm);
        self.role = Some(Box::new(authenticator));
        self.state = LifecycleState::AuthenticatorReady;
        info!("{}: authenticator ready", self.interface);
        self.reconcile_keys(false);
        Ok(())
    }

    fn check_state(&self, expected: LifecycleState) -> Result<(), Error> {
        if self.state != expected {
            warn!("{}: operation not allowed in {:?}", self.interface, self.state);
            return Err(Error::Config("controller in wrong lifecycle state"));
        }
        Ok(())
    }

    fn check_running(&self) -> Result<(), Error> {
        match self.state {
            LifecycleState::SupplicantReady | LifecycleState::AuthenticatorReady => Ok(()),
            _ => Err(Error::Config("controller not running")),
        }
    }

    /// Loads frame counters first, then the network info they protect.
    fn restore(&mut self) {
        let now = self.clock.now();
        if self.frame_counters.state() == ReadState::NotRead {
            match self.frame_counters.read(&mut self.nvm, now) {
                Ok(()) => self.frame_counters_write(),
                Err(e) => {
                    warn!("{}: no usable frame counters, discarding keys: {}", self.interface, e);
                    self.nvm.remove(NW_INFO_FILE_NAME);
                    self.nvm.remove(KEYS_FILE_NAME);
                    self.nw_info.gtks.clear_all();
                    return;
                }
            }
        }
        self.nw_info_load(now);
    }

    fn nw_info_load(&mut self, now: u64) {
        let record = match self.nvm.load::<NwInfoRecord>(NW_INFO_FILE_NAME) {
            Ok(record) => record,
            Err(e) => {
                debug!("{}: no network info: {}", self.interface, e);
                return;
            }
        };
        if record.owner != self.own_eui64 {
            let e = Error::IdentityMismatch { stored: record.owner, own: self.own_eui64 };
            warn!("{}: {}", self.interface, e);
            self.nvm.remove(NW_INFO_FILE_NAME);
            self.nvm.remove(KEYS_FILE_NAME);
            return;
        }

        if record.time_changed {
            info!("{}: clock was found wrong before the last shutdown", self.interface);
        }
        let reference = time::select_reference_time(record.reference_time, now);
        self.time_changed = reference != now;
        if record.pan_id != PAN_ID_UNKNOWN {
            self.nw_info.pan_id = Some(record.pan_id);
        }
        self.nw_info.pan_version = self.frame_counters.pan_version();
        self.nw_info.network_name = record.network_name;
        self.nw_info.gtks.clear_all();
        for (index, slot) in record.slots.iter().enumerate().filter(|(_, s)| s.set) {
            let remaining = slot.expiry.saturating_sub(reference);
            if remaining == 0 {
                info!("{}: persisted GTK {} expired", self.interface, index);
                continue;
            }
            let lifetime = u32::try_from(remaining).unwrap_or(u32::MAX);
            if let Err(e) = self.nw_info.gtks.restore(
                index as u8,
                &slot.key,
                slot.status,
                slot.install_order,
                lifetime,
            ) {
                warn!("{}: dropping persisted GTK {}: {}", self.interface, index, e);
            }
        }
        self.nw_info.gtks.compact_install_order();
        self.nw_info.gtks.clear_updated();
        info!(
            "{}: network info restored, {} GTKs",
            self.interface,
            self.nw_info.gtks.set_count()
        );
    }

    fn nw_info_record(&self, now: u64) -> NwInfoRecord {
        let mut record = NwInfoRecord {
            pan_id: self.nw_info.pan_id.unwrap_or(PAN_ID_UNKNOWN),
            network_name: self.nw_info.network_name.clone(),
            owner: self.own_eui64,
            time_changed: self.time_changed,
            reference_time: now,
            slots: Default::default(),
        };
        for (index, slot) in record.slots.iter_mut().enumerate() {
            if let Some(gtk) = self.nw_info.gtks.slot(index as u8).filter(|s| s.is_set()) {
                *slot = NwInfoSlot {
                    set: true,
                    expiry: now + gtk.lifetime() as u64,
                    status: gtk.status(),
                    install_order: gtk.install_order(),
                    key: *gtk.key(),
                };
            }
        }
        record
    }

    fn nw_info_store(&mut self) {
        let record = self.nw_info_record(self.clock.now());
        match self.nvm.store(NW_INFO_FILE_NAME, &record) {
            Ok(()) => {
                self.nw_info_write_timer = 0;
                self.nw_info.gtks.clear_updated();
            }
            Err(e) => {
                warn!("{}: cannot store network info: {}", self.interface, e);
                self.nw_info_write_timer = self.config.nw_info_write_delay.max(1);
            }
        }
    }

    /// Schedules a network info write unless one is pending already.
    fn nw_info_changed(&mut self) {
        if self.nw_info_write_timer == 0 {
            self.nw_info_write_timer = self.config.nw_info_write_delay.max(1);
        }
    }

    fn nw_info_notify(&mut self) {
        let pan_id = self.nw_info.pan_id.unwrap_or(PAN_ID_UNKNOWN);
        self.callbacks.nw_info_updated(pan_id, self.nw_info.pan_version, &self.nw_info.network_name);
    }

    fn frame_counters_write(&mut self) {
        let now = self.clock.now();
        let active = self.nw_info.gtks.active_index();
        if let Err(e) = self.frame_counters.store(&mut self.nvm, now, active) {
            warn!("{}: cannot store frame counters: {}", self.interface, e);
        }
    }

    /// Samples the counters of the installed slots and stores them when needed.
    fn frame_counters_store(&mut self, use_threshold: bool) {
        let active = self.nw_info.gtks.active_index();
        let mut needed = false;
        for index in 0..GTK_NUM as u8 {
            let nw_key = &self.nw_keys[index as usize];
            if !nw_key.installed {
                continue;
            }
            let key = nw_key.key;
            let live = self.callbacks.nw_frame_counter_read(index);
            needed |= self.frame_counters.update_slot(
                index,
                &key,
                live,
                active == Some(index),
                use_threshold,
            );
        }
        if needed {
            self.frame_counters_write();
        }
    }

    /// Brings the MAC in line with the desired GTKs.
    pub fn reconcile_keys(&mut self, force_install: bool) -> ReconcileOutcome {
        let network_name = self.nw_info.network_name.clone();
        let active = self.nw_info.gtks.active_index();
        let mut installed = false;
        let mut store_counters = false;

        for index in 0..GTK_NUM as u8 {
            let i = index as usize;
            let desired = self.nw_info.gtks.get(index).copied();

            if self.nw_keys[i].installed && desired != Some(self.nw_keys[i].key) {
                debug!("{}: removing GTK {} from MAC", self.interface, index);
                self.callbacks.nw_key_clear(index);
                self.nw_keys[i] = InstalledKey::default();
            }
            if force_install {
                self.nw_keys[i].installed = false;
                self.frame_counters.slot_reset(index);
            }
            let key = match desired {
                Some(key) => key,
                None => continue,
            };
            let nw_key = &self.nw_keys[i];
            if nw_key.set && nw_key.installed && nw_key.key == key {
                continue;
            }

            self.nw_keys[i] = InstalledKey { key, set: true, installed: false };
            let gak = match gak_derive(&key, &network_name) {
                Ok(gak) => gak,
                Err(e) => {
                    error!("{}: cannot install GTK {}: {}", self.interface, index, e);
                    continue;
                }
            };
            self.callbacks.nw_key_set(index, index, &gak);
            self.nw_keys[i].installed = true;
            installed = true;

            let live = self.callbacks.nw_frame_counter_read(index);
            let resumed = match self.frame_counters.persisted_counter(index, &key) {
                Some(persisted) if persisted > live => {
                    info!("{}: GTK {} frame counter resumes at {}", self.interface, index, persisted);
                    self.callbacks.nw_frame_counter_set(index, persisted);
                    persisted
                }
                _ => live,
            };
            store_counters |=
                self.frame_counters.update_slot(index, &key, resumed, active == Some(index), true);
        }
        if store_counters {
            self.frame_counters_write();
        }

        if let Some(active) = active {
            if self.nw_keys[active as usize].installed && self.send_key_index != Some(active) {
                self.callbacks.nw_send_key_index_set(active);
                self.send_key_index = Some(active);
            }
        }

        if installed {
            ReconcileOutcome::Installed
        } else if self.nw_info.gtks.is_empty() {
            ReconcileOutcome::NothingToInstall
        } else {
            ReconcileOutcome::NoChange
        }
    }

    /// Runs `f` on the role and handles what it reported.
    fn with_role<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut dyn Role, &mut RoleContext<'_>) -> T,
    {
        let parent = self.callbacks.parent_get();
        let mut events = vec![];
        let result = match self.role.as_mut() {
            Some(role) => {
                let mut ctx =
                    RoleContext { gtks: &mut self.nw_info.gtks, parent, events: &mut events };
                Some(f(&mut **role, &mut ctx))
            }
            None => None,
        };
        self.handle_role_events(events);
        result
    }

    fn handle_role_events(&mut self, events: Vec<RoleEvent>) {
        for event in events {
            match event {
                RoleEvent::GtksUpdated => {
                    self.nw_info_changed();
                    self.reconcile_keys(false);
                }
                RoleEvent::KeysUpdated => {
                    if let Some(role) = self.role.as_mut() {
                        role.persist(&mut self.nvm);
                    }
                }
                RoleEvent::AuthCompleted { result, peer } => {
                    if result == AuthResult::Ok {
                        self.reconcile_keys(false);
                    }
                    info!("{}: authentication completed: {:?}", self.interface, result);
                    self.callbacks.auth_completed(result, peer);
                }
            }
        }
    }

    /// Records the network being joined. A new identity invalidates the GTKs of the old one.
    fn network_identity_set(&mut self, pan_id: u16, network_name: &str) {
        if self.nw_info.pan_id == Some(pan_id) && self.nw_info.network_name == network_name {
            return;
        }
        info!("{}: joining PAN {:04x} \"{}\"", self.interface, pan_id, network_name);
        if self.nw_info.pan_id.is_some() {
            self.nw_info.gtks.clear_all();
        }
        self.nw_info.pan_id = Some(pan_id);
        self.nw_info.network_name = network_name.to_string();
        self.nw_info_changed();
        self.nw_info_notify();
        self.reconcile_keys(false);
    }

    pub fn authenticate(
        &mut self,
        pan_id: u16,
        target: Eui64,
        network_name: &str,
    ) -> Result<AuthenticateOutcome, Error> {
        self.check_running()?;
        supplicant(&mut self.role)?;
        if network_name.is_empty() || network_name.len() > NETWORK_NAME_MAX_LEN {
            return Err(Error::Config("network name length"));
        }
        self.network_identity_set(pan_id, network_name);
        self.border_router = Some(target);
        self.with_role(|role, ctx| {
            role.as_supplicant_mut().map(|s| s.authenticate(pan_id, target, network_name, ctx))
        })
        .flatten()
        .ok_or(Error::Config("supplicant not initialized"))
    }

    pub fn gtk_hash_update(
        &mut self,
        remote: &[u8; GTKS_HASH_LEN],
        delete_on_mismatch: bool,
    ) -> Result<GtkMismatch, Error> {
        self.check_running()?;
        supplicant(&mut self.role)?;
        self.with_role(|role, ctx| {
            role.as_supplicant_mut().map(|s| s.gtk_hash_update(remote, delete_on_mismatch, ctx))
        })
        .flatten()
        .ok_or(Error::Config("supplicant not initialized"))
    }

    /// Hands an EAPOL message to the engine of `kmp_type`.
    pub fn kmp_message_received(
        &mut self,
        kmp_type: KmpType,
        src: Eui64,
        msg: &[u8],
    ) -> Result<(), Error> {
        self.check_running()?;
        supplicant(&mut self.role)?;
        self.with_role(|role, ctx| {
            role.as_supplicant_mut().map(|s| s.on_message(kmp_type, src, msg, ctx))
        })
        .flatten()
        .unwrap_or(Err(Error::Config("supplicant not initialized")))
    }

    pub fn crypto_completed(
        &mut self,
        session_id: u32,
        request: CryptoRequestId,
        result: &[u8],
    ) -> Result<bool, Error> {
        self.check_running()?;
        supplicant(&mut self.role)?;
        self.with_role(|role, ctx| {
            role.as_supplicant_mut().map(|s| s.crypto_completed(session_id, request, result, ctx))
        })
        .flatten()
        .ok_or(Error::Config("supplicant not initialized"))
    }

    pub fn supplicant_session_id(&self) -> Option<u32> {
        self.role.as_ref().and_then(|r| r.as_supplicant()).map(|s| s.session_id())
    }

    pub fn fast_tick(&mut self, ticks: u16) {
        if self.check_running().is_err() {
            return;
        }
        self.with_role(|role, ctx| role.fast_tick(ticks, ctx));
    }

    pub fn slow_tick(&mut self, seconds: u32) {
        if self.check_running().is_err() {
            return;
        }
        self.with_role(|role, ctx| role.slow_tick(seconds, ctx));

        if self.nw_info_write_timer > 0 {
            self.nw_info_write_timer = self.nw_info_write_timer.saturating_sub(seconds);
            if self.nw_info_write_timer == 0 {
                self.nw_info_store();
            }
        }
        match self.frame_counters.timer(seconds) {
            Some(StoreKind::Periodic) => self.frame_counters_store(true),
            Some(StoreKind::Forced) => self.frame_counters_store(false),
            None => {}
        }
    }

    pub fn network_name_set(&mut self, network_name: &str) -> Result<(), Error> {
        if network_name.len() > NETWORK_NAME_MAX_LEN {
            return Err(Error::Config("network name length"));
        }
        if self.nw_info.network_name == network_name {
            return Ok(());
        }
        self.nw_info.network_name = network_name.to_string();
        self.nw_info_changed();
        self.nw_info_notify();
        if let Some(pan_id) = self.nw_info.pan_id {
            if let Some(supplicant) = self.role.as_mut().and_then(|r| r.as_supplicant_mut()) {
                supplicant.set_network(pan_id, network_name);
            }
        }
        // The GAK depends on the name.
        if self.nw_keys.iter().any(|k| k.installed) {
            self.reconcile_keys(true);
        }
        Ok(())
    }

    pub fn pan_version(&self) -> u16 {
        self.nw_info.pan_version
    }

    pub fn pan_version_set(&mut self, pan_version: u16) {
        if self.nw_info.pan_version == pan_version {
            return;
        }
        self.nw_info.pan_version = pan_version;
        self.frame_counters.set_pan_version(pan_version);
        self.nw_info_notify();
    }

    pub fn gtks_hash_get(&self) -> [u8; GTKS_HASH_LEN] {
        self.nw_info.gtks.gtks_hash()
    }

    pub fn border_router_addr_get(&self) -> Option<Eui64> {
        self.border_router
    }

    pub fn border_router_addr_set(&mut self, eui64: Eui64) {
        self.border_router = Some(eui64);
    }

    pub fn radius_address_set(&mut self, address: Option<SocketAddr>) -> Result<(), Error> {
        self.check_running()?;
        authenticator(&mut self.role)?.radius_address_set(address);
        Ok(())
    }

    pub fn radius_shared_secret_set(&mut self, secret: &[u8]) -> Result<(), Error> {
        self.check_running()?;
        authenticator(&mut self.role)?.radius_shared_secret_set(secret)
    }

    pub fn gtk_insert(&mut self, key: &[u8; GTK_LEN], lifetime: u32) -> Result<u8, Error> {
        self.check_running()?;
        let index = authenticator(&mut self.role)?.gtk_insert(&mut self.nw_info.gtks, key, lifetime)?;
        self.nw_info_changed();
        self.reconcile_keys(false);
        Ok(index)
    }

    pub fn active_key_update(&mut self, index: u8) -> Result<(), Error> {
        self.check_running()?;
        authenticator(&mut self.role)?.active_key_update(&mut self.nw_info.gtks, index)?;
        self.nw_info_changed();
        self.reconcile_keys(false);
        Ok(())
    }

    /// Stores the keys negotiated with `eui64` and persists them. Returns the storage slot.
    pub fn node_keys_set(&mut self, eui64: Eui64, keys: PairwiseKeys) -> Result<u8, Error> {
        self.check_running()?;
        let storage = authenticator(&mut self.role)?.node_keys_set(eui64, keys)?;
        if let Some(role) = self.role.as_mut() {
            role.persist(&mut self.nvm);
        }
        Ok(storage)
    }

    pub fn node_keys(&self, eui64: &Eui64) -> Option<&PairwiseKeys> {
        self.role.as_ref().and_then(|r| r.as_authenticator()).and_then(|a| a.node_keys(eui64))
    }

    pub fn node_keys_remove(&mut self, eui64: &Eui64) -> Result<(), Error> {
        self.check_running()?;
        authenticator(&mut self.role)?.node_keys_remove(eui64)?;
        if let Some(role) = self.role.as_mut() {
            role.persist(&mut self.nvm);
        }
        Ok(())
    }

    pub fn node_access_revoke_start(&mut self, eui64: &Eui64) -> Result<(), Error> {
        self.check_running()?;
        authenticator(&mut self.role)?.node_access_revoke_start(eui64)
    }

    /// Flushes pending stores and wipes the in-memory key state.
    pub fn stop(&mut self) {
        if self.state == LifecycleState::Stopped {
            return;
        }
        self.frame_counters_store(false);
        if self.nw_info_write_timer > 0 {
            self.nw_info_store();
        }
        if let Some(role) = self.role.as_mut() {
            role.persist(&mut self.nvm);
            role.stop();
        }
        self.nw_info.gtks.clear_all();
        self.nw_keys = Default::default();
        self.send_key_index = None;
        self.frame_counters.clear();
        self.state = LifecycleState::Stopped;
        info!("{}: stopped", self.interface);
    }
}
