// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Port Access Entity for Wi-SUN mesh interfaces.
//!
//! The crate owns the link-layer group keys of a node, drives the supplicant side of the key
//! exchange, and keeps the anti-replay frame counters durable across restarts. Everything is
//! single-threaded and tick driven: the application owns a [`PaeContext`] and feeds it fast
//! (100 ms) and slow (1 s) ticks.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod authenticator;
pub mod certs;
pub mod config;
pub mod controller;
mod error;
pub mod frame_counter;
pub mod key;
pub mod kmp;
pub mod nvm;
mod state_machine;
pub mod supplicant;
pub mod time;
pub mod trickle;

#[cfg(test)]
mod test_utils;

use std::fmt;

pub use crate::controller::{
    context::PaeContext, AuthResult, PaeCallbacks, PaeController, ReconcileOutcome, Role,
};
pub use crate::error::{Error, KeyStoreError, PersistenceError};

pub type Result<T> = std::result::Result<T, Error>;

/// Number of GTK slots per network.
pub const GTK_NUM: usize = 4;
pub const GTK_LEN: usize = 16;
pub const GTK_HASH_LEN: usize = 8;
/// Length of the announced hash of all GTK slots.
pub const GTKS_HASH_LEN: usize = GTK_NUM * GTK_HASH_LEN;
pub const GAK_LEN: usize = 16;
pub const PMK_LEN: usize = 32;
pub const PTK_LEN: usize = 48;
/// Longest network name, not counting the NUL terminator kept in NVM.
pub const NETWORK_NAME_MAX_LEN: usize = 32;

/// An IEEE EUI-64 hardware address.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Eui64(pub [u8; 8]);

impl Eui64 {
    pub const ZERO: Eui64 = Eui64([0; 8]);

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 8]
    }
}

impl From<[u8; 8]> for Eui64 {
    fn from(addr: [u8; 8]) -> Self {
        Eui64(addr)
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self.0.iter().map(|b| hex::encode([*b])).collect();
        write!(f, "{}", octets.join(":"))
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({})", self)
    }
}

/// Identifies the network interface a controller belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub u32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}
