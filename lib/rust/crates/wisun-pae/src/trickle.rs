// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Trickle timer (RFC 6206) counted in seconds.

use rand::Rng;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrickleParams {
    pub imin: u32,
    pub imax: u32,
    /// Intervals after which the timer stops; zero runs forever.
    pub timer_expirations: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trickle {
    params: TrickleParams,
    running: bool,
    interval: u32,
    t: u32,
    now: u32,
    fired: bool,
    expirations: u8,
}

impl Trickle {
    pub fn new(params: TrickleParams) -> Self {
        Trickle {
            params,
            running: false,
            interval: 0,
            t: 0,
            now: 0,
            fired: false,
            expirations: 0,
        }
    }

    pub fn params(&self) -> &TrickleParams {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Intervals left before the timer stops, if bounded.
    pub fn expirations_left(&self) -> Option<u8> {
        match self.params.timer_expirations {
            0 => None,
            n => Some(n.saturating_sub(self.expirations)),
        }
    }

    pub fn start<R: Rng + ?Sized>(&mut self, params: TrickleParams, rng: &mut R) {
        self.params = params;
        self.running = true;
        self.expirations = 0;
        self.interval = params.imin.max(1);
        self.begin_interval(rng);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    fn begin_interval<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let half = self.interval / 2;
        self.t = if half < self.interval { rng.gen_range(half..self.interval) } else { half };
        self.now = 0;
        self.fired = false;
    }

    /// Advances the timer. Returns true when a transmission is due.
    pub fn timer<R: Rng + ?Sized>(&mut self, seconds: u32, rng: &mut R) -> bool {
        if !self.running {
            return false;
        }
        self.now = self.now.saturating_add(seconds);
        let mut transmit = false;
        if !self.fired && self.now >= self.t {
            self.fired = true;
            transmit = true;
        }
        if self.now >= self.interval {
            self.expirations = self.expirations.saturating_add(1);
            if self.params.timer_expirations != 0
                && self.expirations >= self.params.timer_expirations
            {
                self.running = false;
            } else {
                self.interval = self.interval.saturating_mul(2).min(self.params.imax.max(1));
                self.begin_interval(rng);
            }
        }
        transmit
    }
}
