// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    super::{PaeCallbacks, PaeController},
    crate::{
        config::SecurityConfig,
        key::{gtk::GtkMismatch, pairwise::PairwiseKeys},
        kmp::{CryptoRequestId, KmpFactory, KmpType},
        nvm::NvmStore,
        supplicant::AuthenticateOutcome,
        time::Clock,
        Eui64, Error, InterfaceId, GTKS_HASH_LEN, GTK_LEN,
    },
    log::{info, warn},
    std::collections::HashMap,
};

/// Controllers of all interfaces, owned by the application.
#[derive(Debug, Default)]
pub struct PaeContext {
    controllers: HashMap<InterfaceId, PaeController>,
}

impl PaeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the controller of `interface`.
    pub fn init(
        &mut self,
        interface: InterfaceId,
        own_eui64: Eui64,
        config: SecurityConfig,
        nvm: NvmStore,
        callbacks: Box<dyn PaeCallbacks>,
        clock: Box<dyn Clock>,
    ) -> Result<(), Error> {
        if self.controllers.contains_key(&interface) {
            return Err(Error::Config("interface already initialized"));
        }
        let controller = PaeController::new(interface, own_eui64, config, nvm, callbacks, clock)?;
        self.controllers.insert(interface, controller);
        info!("{}: PAE controller created", interface);
        Ok(())
    }

    /// Stops the controller of `interface` and forgets it.
    pub fn delete(&mut self, interface: InterfaceId) -> Result<(), Error> {
        let mut controller =
            self.controllers.remove(&interface).ok_or(Error::UnknownInterface(interface))?;
        controller.stop();
        info!("{}: PAE controller deleted", interface);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn controller(&self, interface: InterfaceId) -> Result<&PaeController, Error> {
        self.controllers.get(&interface).ok_or(Error::UnknownInterface(interface))
    }

    pub fn controller_mut(&mut self, interface: InterfaceId) -> Result<&mut PaeController, Error> {
        self.controllers.get_mut(&interface).ok_or(Error::UnknownInterface(interface))
    }

    pub fn supplicant_init(
        &mut self,
        interface: InterfaceId,
        factory: Box<dyn KmpFactory>,
    ) -> Result<(), Error> {
        self.controller_mut(interface)?.supplicant_init(factory)
    }

    pub fn authenticator_init(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.controller_mut(interface)?.authenticator_init()
    }

    pub fn authenticate(
        &mut self,
        interface: InterfaceId,
        pan_id: u16,
        target: Eui64,
        network_name: &str,
    ) -> Result<AuthenticateOutcome, Error> {
        self.controller_mut(interface)?.authenticate(pan_id, target, network_name)
    }

    pub fn gtk_hash_update(
        &mut self,
        interface: InterfaceId,
        remote: &[u8; GTKS_HASH_LEN],
        delete_on_mismatch: bool,
    ) -> Result<GtkMismatch, Error> {
        self.controller_mut(interface)?.gtk_hash_update(remote, delete_on_mismatch)
    }

    pub fn gtks_hash_get(&self, interface: InterfaceId) -> Result<[u8; GTKS_HASH_LEN], Error> {
        Ok(self.controller(interface)?.gtks_hash_get())
    }

    pub fn network_name_set(
        &mut self,
        interface: InterfaceId,
        network_name: &str,
    ) -> Result<(), Error> {
        self.controller_mut(interface)?.network_name_set(network_name)
    }

    pub fn border_router_addr_get(&self, interface: InterfaceId) -> Result<Option<Eui64>, Error> {
        Ok(self.controller(interface)?.border_router_addr_get())
    }

    pub fn border_router_addr_set(
        &mut self,
        interface: InterfaceId,
        eui64: Eui64,
    ) -> Result<(), Error> {
        self.controller_mut(interface)?.border_router_addr_set(eui64);
        Ok(())
    }

    pub fn kmp_message_received(
        &mut self,
        interface: InterfaceId,
        kmp_type: KmpType,
        src: Eui64,
        msg: &[u8],
    ) -> Result<(), Error> {
        self.controller_mut(interface)?.kmp_message_received(kmp_type, src, msg)
    }

    /// Delivers an asynchronous crypto result. Results for interfaces that are gone, or for
    /// sessions that ended, are discarded.
    pub fn crypto_completed(
        &mut self,
        interface: InterfaceId,
        session_id: u32,
        request: CryptoRequestId,
        result: &[u8],
    ) -> Result<bool, Error> {
        let controller = match self.controllers.get_mut(&interface) {
            Some(controller) => controller,
            None => {
                warn!("{}: discarding crypto result, interface is gone", interface);
                return Err(Error::UnknownInterface(interface));
            }
        };
        controller.crypto_completed(session_id, request, result)
    }

    pub fn gtk_insert(
        &mut self,
        interface: InterfaceId,
        key: &[u8; GTK_LEN],
        lifetime: u32,
    ) -> Result<u8, Error> {
        self.controller_mut(interface)?.gtk_insert(key, lifetime)
    }

    pub fn active_key_update(&mut self, interface: InterfaceId, index: u8) -> Result<(), Error> {
        self.controller_mut(interface)?.active_key_update(index)
    }

    pub fn node_keys_set(
        &mut self,
        interface: InterfaceId,
        eui64: Eui64,
        keys: PairwiseKeys,
    ) -> Result<u8, Error> {
        self.controller_mut(interface)?.node_keys_set(eui64, keys)
    }

    pub fn node_keys_remove(&mut self, interface: InterfaceId, eui64: &Eui64) -> Result<(), Error> {
        self.controller_mut(interface)?.node_keys_remove(eui64)
    }

    pub fn node_access_revoke_start(
        &mut self,
        interface: InterfaceId,
        eui64: &Eui64,
    ) -> Result<(), Error> {
        self.controller_mut(interface)?.node_access_revoke_start(eui64)
    }

    pub fn stop(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.controller_mut(interface)?.stop();
        Ok(())
    }

    /// Fast tick of 100 ms for every interface.
    pub fn fast_tick(&mut self, ticks: u16) {
        for controller in self.controllers.values_mut() {
            controller.fast_tick(ticks);
        }
    }

    /// Slow tick of one second for every interface.
    pub fn slow_tick(&mut self, seconds: u32) {
        for controller in self.controllers.values_mut() {
            controller.slow_tick(seconds);
        }
    }
}
