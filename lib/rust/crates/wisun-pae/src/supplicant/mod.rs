// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Supplicant side of the PAE: requests keys from the authenticator with the initial EAPOL-key
//! message, retries with backoff, and re-requests keys through a trickle timer when the
//! announced GTK hashes differ from the local ones.

mod state;

pub use self::state::SuppState;

use {
    crate::{
        config::TimingConfig,
        controller::{AuthResult, Role, RoleContext, RoleEvent},
        key::gtk::{GtkMismatch, GtkStatus, GtkStore},
        key::pairwise::PairwiseKeys,
        kmp::{CryptoRequestId, KmpEvent, KmpFactory, KmpInstances, KmpResult, KmpType, KmpUpdate},
        nvm::{data::KeysRecord, NvmStore, KEYS_FILE_NAME},
        state_machine::StateMachine,
        trickle::{Trickle, TrickleParams},
        Eui64, Error, KeyStoreError, GTKS_HASH_LEN, GTK_LEN,
    },
    log::{debug, error, info, warn},
    rand::{rngs::SmallRng, Rng, SeedableRng},
};

/// How many times cached keys may complete an authentication before a full one is forced.
pub const NW_KEYS_USED_MAX: u8 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthenticateOutcome {
    Initiated,
    CompletedFromCache,
}

#[derive(Debug)]
pub struct Supplicant {
    state: StateMachine<SuppState>,
    timing: TimingConfig,
    factory: Box<dyn KmpFactory>,
    kmps: KmpInstances,
    pairwise: PairwiseKeys,
    pan_id: Option<u16>,
    network_name: String,
    /// Target given to the current attempt.
    border_router: Option<Eui64>,
    target: Option<Eui64>,
    last_successful_target: Option<Eui64>,
    tx_failed: bool,
    retry_count: u8,
    retry_interval: u32,
    trickle: Trickle,
    mismatch: GtkMismatch,
    nw_keys_used: u8,
    session_id: u32,
    /// An attempt is outstanding and owes exactly one completion.
    auth_pending: bool,
    rng: SmallRng,
}

fn install_gtk(
    gtks: &mut GtkStore,
    index: u8,
    key: &[u8; GTK_LEN],
    lifetime: u32,
    activate: bool,
) -> Result<(), KeyStoreError> {
    if gtks.get(index).map_or(false, |k| k != key) {
        gtks.clear(index)?;
    }
    gtks.set(index, key, lifetime)?;
    if gtks.status(index) == Some(GtkStatus::New) {
        gtks.status_set_fresh(index)?;
    }
    if activate {
        gtks.status_set_active(index)?;
    }
    Ok(())
}

impl Supplicant {
    pub fn new(timing: TimingConfig, factory: Box<dyn KmpFactory>) -> Self {
        Self::with_rng(timing, factory, SmallRng::from_entropy())
    }

    pub fn with_rng(timing: TimingConfig, factory: Box<dyn KmpFactory>, rng: SmallRng) -> Self {
        let trickle = Trickle::new(TrickleParams {
            imin: timing.gtk_request_imin,
            imax: timing.gtk_request_imax,
            timer_expirations: timing.gtk_hash_mismatch_retries,
        });
        Supplicant {
            state: StateMachine::new(SuppState::Idle),
            timing,
            factory,
            kmps: KmpInstances::new(),
            pairwise: PairwiseKeys::new(),
            pan_id: None,
            network_name: String::new(),
            border_router: None,
            target: None,
            last_successful_target: None,
            tx_failed: false,
            retry_count: 0,
            retry_interval: 0,
            trickle,
            mismatch: GtkMismatch::NoMismatch,
            nw_keys_used: 0,
            session_id: 0,
            auth_pending: false,
            rng,
        }
    }

    pub fn state(&self) -> &SuppState {
        self.state.state()
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn target(&self) -> Option<Eui64> {
        self.target
    }

    pub fn nw_keys_used(&self) -> u8 {
        self.nw_keys_used
    }

    pub fn trickle(&self) -> &Trickle {
        &self.trickle
    }

    pub fn pairwise(&self) -> &PairwiseKeys {
        &self.pairwise
    }

    pub fn pairwise_mut(&mut self) -> &mut PairwiseKeys {
        &mut self.pairwise
    }

    /// Network the cached keys belong to.
    pub fn set_network(&mut self, pan_id: u16, network_name: &str) {
        self.pan_id = Some(pan_id);
        self.network_name = network_name.to_string();
    }

    fn set_state(&mut self, state: SuppState) {
        self.state.replace_state(|_| state);
    }

    pub fn authenticate(
        &mut self,
        pan_id: u16,
        target: Eui64,
        network_name: &str,
        ctx: &mut RoleContext<'_>,
    ) -> AuthenticateOutcome {
        let same_network = self.pan_id == Some(pan_id) && self.network_name == network_name;
        if same_network
            && !ctx.gtks.is_empty()
            && self.pairwise.is_complete_for(target)
            && self.nw_keys_used < NW_KEYS_USED_MAX
        {
            self.nw_keys_used += 1;
            info!("authenticated with cached keys ({} of {})", self.nw_keys_used, NW_KEYS_USED_MAX);
            self.target = Some(target);
            self.last_successful_target = Some(target);
            ctx.events.push(RoleEvent::AuthCompleted { result: AuthResult::Ok, peer: Some(target) });
            return AuthenticateOutcome::CompletedFromCache;
        }

        if !same_network {
            if self.pairwise.peer().is_some() || self.pairwise.pmk().is_some() {
                info!("network changed, deleting pairwise keys");
                self.pairwise.clear();
                ctx.events.push(RoleEvent::KeysUpdated);
            }
            self.pan_id = Some(pan_id);
            self.network_name = network_name.to_string();
        }
        self.border_router = Some(target);
        self.target = Some(target);
        self.new_session();
        self.auth_pending = true;
        let jitter_ticks = self.rng.gen_range(
            self.timing.initial_key_jitter_min_ticks..=self.timing.initial_key_jitter_max_ticks,
        );
        info!("authentication requested towards {}, session {}", target, self.session_id);
        self.set_state(SuppState::AuthRequested { jitter_ticks });
        AuthenticateOutcome::Initiated
    }

    fn new_session(&mut self) {
        self.session_id = self.session_id.wrapping_add(1);
        self.kmps.clear();
        self.trickle.stop();
        self.mismatch = GtkMismatch::NoMismatch;
        self.tx_failed = false;
        self.retry_count = 0;
        self.retry_interval = 0;
    }

    /// Compares the announced GTK hashes and starts re-requesting keys on a mismatch.
    pub fn gtk_hash_update(
        &mut self,
        remote: &[u8; GTKS_HASH_LEN],
        delete_on_mismatch: bool,
        ctx: &mut RoleContext<'_>,
    ) -> GtkMismatch {
        let before = ctx.gtks.gtks_hash();
        let mismatch = ctx.gtks.hash_compare(remote, delete_on_mismatch);
        if ctx.gtks.gtks_hash() != before {
            ctx.events.push(RoleEvent::GtksUpdated);
        }

        if self.state.state().is_authenticating() {
            debug!("authentication in progress, ignoring {:?}", mismatch);
            return mismatch;
        }
        if *self.state.state() == SuppState::GtkUpdateTrickle {
            if mismatch == GtkMismatch::NoMismatch {
                info!("GTKs in sync again");
                self.trickle.stop();
                self.mismatch = GtkMismatch::NoMismatch;
                self.set_state(SuppState::Idle);
                let peer = self.target;
                self.complete(AuthResult::Ok, peer, ctx);
                return mismatch;
            }
            if self.mismatch >= mismatch && self.trickle.is_running() {
                debug!("{:?} trickle already running", self.mismatch);
                return mismatch;
            }
        }
        if mismatch == GtkMismatch::NoMismatch {
            return mismatch;
        }

        let timer_expirations = match mismatch {
            GtkMismatch::HashMismatch => self.timing.gtk_hash_mismatch_retries,
            _ => 1,
        };
        let params = TrickleParams {
            imin: self.timing.gtk_request_imin,
            imax: self.timing.gtk_request_imax,
            timer_expirations,
        };
        info!("{:?}, requesting keys", mismatch);
        self.trickle.start(params, &mut self.rng);
        self.mismatch = mismatch;
        self.tx_failed = false;
        self.auth_pending = true;
        self.set_state(SuppState::GtkUpdateTrickle);
        mismatch
    }

    pub fn fast_tick(&mut self, ticks: u16, ctx: &mut RoleContext<'_>) {
        let mut due = false;
        self.state.replace_state(|state| {
            let (next, expired) = state.fast_countdown(ticks);
            due = expired;
            next
        });
        if due {
            match self.target {
                Some(target) => {
                    self.send_initial_key(target, ctx);
                    self.enter_wait();
                }
                None => self.fail(ctx),
            }
        }
        let mut events = vec![];
        self.kmps.timer(ticks, &mut events);
        self.process(events, ctx);
    }

    pub fn slow_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>) {
        if ctx.gtks.lifetime_decrement(seconds) {
            ctx.events.push(RoleEvent::GtksUpdated);
        }
        if self.pairwise.lifetime_decrement(seconds) {
            ctx.events.push(RoleEvent::KeysUpdated);
        }

        if *self.state.state() == SuppState::GtkUpdateTrickle {
            self.trickle_tick(seconds, ctx);
            return;
        }
        let mut expired = None;
        self.state.replace_state(|state| {
            let (next, done) = state.countdown(seconds);
            if done {
                expired = Some(next.clone());
            }
            next
        });
        match expired {
            Some(SuppState::WaitingForAuthenticator { .. }) => {
                self.retry_count = self.retry_count.saturating_add(1);
                self.retry_interval = match self.retry_interval {
                    0 => self
                        .rng
                        .gen_range(self.timing.initial_key_retry_min..=self.timing.initial_key_retry_max),
                    interval => interval.saturating_mul(2).min(self.timing.initial_key_retry_cap),
                };
                info!("no answer, retry {} in {} s", self.retry_count, self.retry_interval);
                let remaining = self.retry_interval;
                self.set_state(SuppState::RetryBackoff { remaining });
            }
            Some(SuppState::RetryBackoff { .. }) => match self.select_target(ctx.parent) {
                Some(target) => {
                    self.send_initial_key(target, ctx);
                    self.enter_wait();
                }
                None => {
                    warn!("no target for the initial key");
                    self.fail(ctx);
                }
            },
            Some(SuppState::FinalWait { .. }) => {
                warn!("authentication timed out");
                self.fail(ctx);
            }
            _ => {}
        }
    }

    fn trickle_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>) {
        if self.trickle.timer(seconds, &mut self.rng) {
            match self.select_target(ctx.parent) {
                Some(target) => self.send_initial_key(target, ctx),
                None => {
                    warn!("no target for the GTK request");
                    self.fail(ctx);
                    return;
                }
            }
        }
        if !self.trickle.is_running() && *self.state.state() == SuppState::GtkUpdateTrickle {
            warn!("GTK update failed after {:?}", self.mismatch);
            self.fail(ctx);
        }
    }

    /// Non-initial sends go to the routing parent, then the last successful target. After a
    /// failed transmission the failed target is not reused.
    fn select_target(&self, parent: Option<Eui64>) -> Option<Eui64> {
        let current = self.target;
        let candidates = [parent, self.last_successful_target, current];
        candidates
            .iter()
            .filter_map(|c| *c)
            .find(|c| !self.tx_failed || Some(*c) != current)
    }

    fn enter_wait(&mut self) {
        let state = if self.retry_count >= self.timing.initial_key_retry_count {
            SuppState::FinalWait { remaining: self.timing.final_wait }
        } else {
            SuppState::WaitingForAuthenticator { remaining: self.timing.wait_for_authenticator }
        };
        self.set_state(state);
    }

    fn send_initial_key(&mut self, target: Eui64, ctx: &mut RoleContext<'_>) {
        if self.target != Some(target) {
            info!("EAPOL target now {}", target);
        }
        self.target = Some(target);
        self.tx_failed = false;
        let mut events = vec![];
        if let Err(e) = self.kmps.start(KmpType::Key, target, self.factory.as_mut(), &mut events) {
            warn!("cannot send initial key: {}", e);
            self.tx_failed = true;
        }
        self.process(events, ctx);
    }

    /// Extends the wait after progress from the authenticator.
    fn extend_wait(&mut self) {
        let wait = self.timing.wait_for_authenticator;
        self.state.replace_state(|state| match state {
            SuppState::WaitingForAuthenticator { .. } | SuppState::RetryBackoff { .. } => {
                SuppState::WaitingForAuthenticator { remaining: wait }
            }
            SuppState::FinalWait { remaining } => {
                SuppState::FinalWait { remaining: remaining.max(wait) }
            }
            other => other,
        });
    }

    fn process(&mut self, events: Vec<KmpEvent>, ctx: &mut RoleContext<'_>) {
        for KmpEvent { kmp_type, update } in events {
            match update {
                KmpUpdate::Activity => {
                    self.tx_failed = false;
                    self.extend_wait();
                }
                KmpUpdate::TxFailed => {
                    warn!("{:?} transmission failed", kmp_type);
                    self.tx_failed = true;
                }
                KmpUpdate::CryptoPending(request) => {
                    debug!("{:?} waits for crypto request {}", kmp_type, request);
                }
                KmpUpdate::Pmk { key, lifetime } => {
                    if let Some(peer) = self.border_router {
                        self.pairwise.set_peer(peer);
                    }
                    self.pairwise.pmk_set(&key, lifetime);
                    ctx.events.push(RoleEvent::KeysUpdated);
                }
                KmpUpdate::Ptk { key, lifetime } => {
                    if let Some(peer) = self.border_router {
                        self.pairwise.set_peer(peer);
                    }
                    self.pairwise.ptk_set(&key, lifetime);
                    ctx.events.push(RoleEvent::KeysUpdated);
                }
                KmpUpdate::Gtk { index, key, lifetime, activate } => {
                    match install_gtk(ctx.gtks, index, &key, lifetime, activate) {
                        Ok(()) => ctx.events.push(RoleEvent::GtksUpdated),
                        Err(e) => error!("cannot store received GTK {}: {}", index, e),
                    }
                }
                KmpUpdate::Finished(result) => self.kmp_finished(kmp_type, result, ctx),
            }
        }
    }

    fn kmp_finished(&mut self, kmp_type: KmpType, result: KmpResult, ctx: &mut RoleContext<'_>) {
        match (kmp_type, result) {
            (KmpType::FourWayHandshake, KmpResult::Success)
            | (KmpType::GroupKeyHandshake, KmpResult::Success) => {
                let peer = self.target;
                info!("{:?} completed with {:?}", kmp_type, peer);
                self.last_successful_target = peer;
                self.nw_keys_used = 0;
                self.trickle.stop();
                self.mismatch = GtkMismatch::NoMismatch;
                self.retry_count = 0;
                self.retry_interval = 0;
                self.set_state(SuppState::Idle);
                self.complete(AuthResult::Ok, peer, ctx);
            }
            (_, KmpResult::Success) => {}
            (t, r) => warn!("{:?} ended with {:?}", t, r),
        }
    }

    fn fail(&mut self, ctx: &mut RoleContext<'_>) {
        let result =
            if self.tx_failed { AuthResult::ErrTxFailure } else { AuthResult::ErrUnspecified };
        self.kmps.clear();
        self.trickle.stop();
        self.mismatch = GtkMismatch::NoMismatch;
        self.set_state(SuppState::Idle);
        let peer = self.target;
        self.complete(result, peer, ctx);
    }

    fn complete(&mut self, result: AuthResult, peer: Option<Eui64>, ctx: &mut RoleContext<'_>) {
        if !self.auth_pending {
            debug!("no attempt outstanding, dropping {:?}", result);
            return;
        }
        self.auth_pending = false;
        ctx.events.push(RoleEvent::AuthCompleted { result, peer });
    }

    pub fn on_message(
        &mut self,
        kmp_type: KmpType,
        peer: Eui64,
        msg: &[u8],
        ctx: &mut RoleContext<'_>,
    ) -> Result<(), Error> {
        let mut events = vec![];
        let result = self.kmps.deliver(kmp_type, peer, msg, self.factory.as_mut(), &mut events);
        self.process(events, ctx);
        result
    }

    /// Delivers the result of a crypto operation. Results of other sessions or of unknown
    /// requests are discarded and false is returned.
    pub fn crypto_completed(
        &mut self,
        session_id: u32,
        request: CryptoRequestId,
        result: &[u8],
        ctx: &mut RoleContext<'_>,
    ) -> bool {
        if session_id != self.session_id {
            warn!("discarding crypto result of session {}, current {}", session_id, self.session_id);
            return false;
        }
        let mut events = vec![];
        let delivered = self.kmps.crypto_completed(request, result, &mut events);
        self.process(events, ctx);
        delivered
    }

    /// Cancels timers and instances. Results still in flight are dropped.
    pub fn stop(&mut self) {
        self.new_session();
        self.auth_pending = false;
        self.set_state(SuppState::Idle);
    }
}

impl Role for Supplicant {
    fn as_supplicant(&self) -> Option<&Supplicant> {
        Some(self)
    }

    fn as_supplicant_mut(&mut self) -> Option<&mut Supplicant> {
        Some(self)
    }

    fn fast_tick(&mut self, ticks: u16, ctx: &mut RoleContext<'_>) {
        Supplicant::fast_tick(self, ticks, ctx)
    }

    fn slow_tick(&mut self, seconds: u32, ctx: &mut RoleContext<'_>) {
        Supplicant::slow_tick(self, seconds, ctx)
    }

    fn load(&mut self, nvm: &mut NvmStore) {
        match nvm.load::<KeysRecord>(KEYS_FILE_NAME) {
            Ok(record) => {
                self.pairwise = record.to_keys();
                info!("pairwise keys restored for {:?}", self.pairwise.peer());
            }
            Err(e) => debug!("no pairwise keys: {}", e),
        }
    }

    fn persist(&mut self, nvm: &mut NvmStore) {
        if !self.pairwise.is_updated() {
            return;
        }
        match nvm.store(KEYS_FILE_NAME, &KeysRecord::from_keys(&self.pairwise)) {
            Ok(()) => self.pairwise.clear_updated(),
            Err(e) => warn!("cannot store pairwise keys: {}", e),
        }
    }

    fn stop(&mut self) {
        Supplicant::stop(self)
    }
}
