// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Security parameters of a PAE controller. All structs deserialize from partial JSON; absent
//! fields take their defaults.

use {
    crate::Error,
    serde::{Deserialize, Serialize},
    std::net::SocketAddr,
};

/// Supplicant timers. Fast ticks are 100 ms, everything else is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub initial_key_jitter_min_ticks: u16,
    pub initial_key_jitter_max_ticks: u16,
    pub initial_key_retry_min: u32,
    pub initial_key_retry_max: u32,
    pub initial_key_retry_cap: u32,
    pub initial_key_retry_count: u8,
    pub wait_for_authenticator: u32,
    pub final_wait: u32,
    pub gtk_request_imin: u32,
    pub gtk_request_imax: u32,
    pub gtk_hash_mismatch_retries: u8,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            initial_key_jitter_min_ticks: 1,
            initial_key_jitter_max_ticks: 30,
            initial_key_retry_min: 360,
            initial_key_retry_max: 720,
            initial_key_retry_cap: 900,
            initial_key_retry_count: 4,
            wait_for_authenticator: 120,
            final_wait: 60,
            gtk_request_imin: 60,
            gtk_request_imax: 300,
            gtk_hash_mismatch_retries: 3,
        }
    }
}

/// Lifetimes the authenticator hands out, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyLifetimes {
    pub gtk: u32,
    pub pmk: u32,
    pub ptk: u32,
    /// Percentage of the active GTK lifetime after which a successor is installed.
    pub gtk_new_install_required: u8,
    /// The successor is activated when the active GTK has `gtk / gtk_new_activation_time`
    /// seconds left.
    pub gtk_new_activation_time: u32,
}

impl Default for KeyLifetimes {
    fn default() -> Self {
        KeyLifetimes {
            gtk: 30 * 24 * 60 * 60,
            pmk: 120 * 24 * 60 * 60,
            ptk: 60 * 24 * 60 * 60,
            gtk_new_install_required: 80,
            gtk_new_activation_time: 720,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusConfig {
    pub address: Option<SocketAddr>,
    pub shared_secret: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub timing: TimingConfig,
    pub key_lifetimes: KeyLifetimes,
    pub radius: Option<RadiusConfig>,
    /// Delay batching network info writes.
    pub nw_info_write_delay: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            timing: TimingConfig::default(),
            key_lifetimes: KeyLifetimes::default(),
            radius: None,
            nw_info_write_delay: 5,
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.timing;
        if t.initial_key_jitter_min_ticks == 0
            || t.initial_key_jitter_min_ticks > t.initial_key_jitter_max_ticks
        {
            return Err(Error::Config("initial key jitter range"));
        }
        if t.initial_key_retry_min == 0
            || t.initial_key_retry_min > t.initial_key_retry_max
            || t.initial_key_retry_max > t.initial_key_retry_cap
        {
            return Err(Error::Config("initial key retry intervals"));
        }
        if t.gtk_request_imin == 0 || t.gtk_request_imin > t.gtk_request_imax {
            return Err(Error::Config("GTK request trickle intervals"));
        }
        if t.gtk_hash_mismatch_retries == 0 {
            return Err(Error::Config("GTK hash mismatch retries"));
        }
        let l = &self.key_lifetimes;
        if l.gtk == 0 || l.gtk_new_install_required > 100 || l.gtk_new_activation_time == 0 {
            return Err(Error::Config("key lifetimes"));
        }
        Ok(())
    }
}
