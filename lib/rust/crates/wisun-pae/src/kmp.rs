// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Seam to the key management protocol engines (EAPOL key, EAP-TLS, TLS, 4-way and group key
//! handshakes). Engines are black boxes; they report progress by pushing `KmpUpdate`s.

use {
    crate::{Eui64, Error, GTK_LEN, PMK_LEN, PTK_LEN},
    log::{debug, info, warn},
    std::fmt,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KmpType {
    /// Initial EAPOL-key message.
    Key,
    EapTls,
    Tls,
    FourWayHandshake,
    GroupKeyHandshake,
}

impl KmpType {
    /// One-shot instances live only for a single message.
    pub fn is_one_shot(&self) -> bool {
        *self == KmpType::Key
    }

    /// Type of the instance that always runs alongside this one.
    pub fn paired(&self) -> Option<KmpType> {
        match self {
            KmpType::EapTls => Some(KmpType::Tls),
            KmpType::Tls => Some(KmpType::EapTls),
            _ => None,
        }
    }
}

pub type CryptoRequestId = u32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KmpResult {
    Success,
    Failure,
    Timeout,
}

#[derive(Clone, PartialEq)]
pub enum KmpUpdate {
    /// A valid message was received from the authenticator.
    Activity,
    TxFailed,
    /// The engine waits for a long-running crypto operation.
    CryptoPending(CryptoRequestId),
    Pmk { key: [u8; PMK_LEN], lifetime: u32 },
    Ptk { key: [u8; PTK_LEN], lifetime: u32 },
    Gtk { index: u8, key: [u8; GTK_LEN], lifetime: u32, activate: bool },
    Finished(KmpResult),
}

impl fmt::Debug for KmpUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KmpUpdate::Activity => write!(f, "Activity"),
            KmpUpdate::TxFailed => write!(f, "TxFailed"),
            KmpUpdate::CryptoPending(id) => write!(f, "CryptoPending({})", id),
            KmpUpdate::Pmk { lifetime, .. } => write!(f, "Pmk {{ lifetime: {} }}", lifetime),
            KmpUpdate::Ptk { lifetime, .. } => write!(f, "Ptk {{ lifetime: {} }}", lifetime),
            KmpUpdate::Gtk { index, lifetime, activate, .. } => write!(
                f,
                "Gtk {{ index: {}, lifetime: {}, activate: {} }}",
                index, lifetime, activate
            ),
            KmpUpdate::Finished(result) => write!(f, "Finished({:?})", result),
        }
    }
}

pub type UpdateSink = Vec<KmpUpdate>;

/// An update tagged with the engine that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct KmpEvent {
    pub kmp_type: KmpType,
    pub update: KmpUpdate,
}

pub trait KmpProtocol: fmt::Debug {
    fn start(&mut self, peer: Eui64, update_sink: &mut UpdateSink) -> Result<(), Error>;
    fn on_message(&mut self, peer: Eui64, msg: &[u8], update_sink: &mut UpdateSink)
        -> Result<(), Error>;
    /// Fast tick of 100 ms.
    fn on_timer(&mut self, ticks: u16, update_sink: &mut UpdateSink);
    fn on_crypto_result(
        &mut self,
        request: CryptoRequestId,
        result: &[u8],
        update_sink: &mut UpdateSink,
    );
}

pub trait KmpFactory: fmt::Debug {
    fn create(&mut self, kmp_type: KmpType) -> Result<Box<dyn KmpProtocol>, Error>;
}

#[derive(Debug)]
struct KmpInstance {
    kmp_type: KmpType,
    protocol: Box<dyn KmpProtocol>,
    pending_crypto: Option<CryptoRequestId>,
    finished: bool,
}

/// Active engines of one supplicant, at most one per type.
#[derive(Debug, Default)]
pub struct KmpInstances {
    instances: Vec<KmpInstance>,
}

impl KmpInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, kmp_type: KmpType) -> bool {
        self.instances.iter().any(|i| i.kmp_type == kmp_type)
    }

    pub fn clear(&mut self) {
        if !self.instances.is_empty() {
            debug!("deleting {} KMP instances", self.instances.len());
        }
        self.instances.clear();
    }

    fn position(&self, kmp_type: KmpType) -> Option<usize> {
        self.instances.iter().position(|i| i.kmp_type == kmp_type)
    }

    /// Creates the instance of `kmp_type` and its pair, unless already present. When either
    /// of a pair cannot be created both are torn down.
    fn create(&mut self, kmp_type: KmpType, factory: &mut dyn KmpFactory) -> Result<(), Error> {
        let types = match kmp_type.paired() {
            Some(pair) => vec![kmp_type, pair],
            None => vec![kmp_type],
        };
        for t in &types {
            if self.contains(*t) {
                continue;
            }
            match factory.create(*t) {
                Ok(protocol) => self.instances.push(KmpInstance {
                    kmp_type: *t,
                    protocol,
                    pending_crypto: None,
                    finished: false,
                }),
                Err(e) => {
                    warn!("cannot create {:?} instance: {}", t, e);
                    self.instances.retain(|i| !types.contains(&i.kmp_type));
                    return Err(Error::Protocol(format!("cannot create {:?} instance", t)));
                }
            }
        }
        Ok(())
    }

    /// Moves the updates of one engine into `events` and bookkeeps crypto and completion.
    fn collect(&mut self, kmp_type: KmpType, sink: UpdateSink, events: &mut Vec<KmpEvent>) {
        for update in sink {
            match &update {
                KmpUpdate::CryptoPending(id) => {
                    if let Some(i) = self.position(kmp_type) {
                        self.instances[i].pending_crypto = Some(*id);
                    }
                }
                KmpUpdate::Finished(result) => {
                    info!("{:?} finished: {:?}", kmp_type, result);
                    for t in std::iter::once(kmp_type).chain(kmp_type.paired()) {
                        if let Some(i) = self.position(t) {
                            self.instances[i].finished = true;
                        }
                    }
                }
                _ => {}
            }
            events.push(KmpEvent { kmp_type, update });
        }
        self.instances.retain(|i| !i.finished);
    }

    /// Starts an exchange towards `peer`. One-shot engines are dropped right after.
    pub fn start(
        &mut self,
        kmp_type: KmpType,
        peer: Eui64,
        factory: &mut dyn KmpFactory,
        events: &mut Vec<KmpEvent>,
    ) -> Result<(), Error> {
        let mut sink = UpdateSink::default();
        if kmp_type.is_one_shot() {
            let mut protocol = factory.create(kmp_type)?;
            let result = protocol.start(peer, &mut sink);
            self.collect(kmp_type, sink, events);
            return result;
        }
        self.create(kmp_type, factory)?;
        let result = match self.position(kmp_type) {
            Some(i) => self.instances[i].protocol.start(peer, &mut sink),
            None => Err(Error::Protocol(format!("{:?} instance missing", kmp_type))),
        };
        self.collect(kmp_type, sink, events);
        result
    }

    /// Routes a received message to the instance of its type, creating one when none runs.
    pub fn deliver(
        &mut self,
        kmp_type: KmpType,
        peer: Eui64,
        msg: &[u8],
        factory: &mut dyn KmpFactory,
        events: &mut Vec<KmpEvent>,
    ) -> Result<(), Error> {
        let mut sink = UpdateSink::default();
        if kmp_type.is_one_shot() && !self.contains(kmp_type) {
            let mut protocol = factory.create(kmp_type)?;
            let result = protocol.on_message(peer, msg, &mut sink);
            self.collect(kmp_type, sink, events);
            return result;
        }
        self.create(kmp_type, factory)?;
        let result = match self.position(kmp_type) {
            Some(i) => self.instances[i].protocol.on_message(peer, msg, &mut sink),
            None => Err(Error::Protocol(format!("{:?} instance missing", kmp_type))),
        };
        self.collect(kmp_type, sink, events);
        result
    }

    /// Runs the timers of all instances not waiting for crypto.
    pub fn timer(&mut self, ticks: u16, events: &mut Vec<KmpEvent>) {
        let mut collected = vec![];
        for instance in self.instances.iter_mut().filter(|i| i.pending_crypto.is_none()) {
            let mut sink = UpdateSink::default();
            instance.protocol.on_timer(ticks, &mut sink);
            collected.push((instance.kmp_type, sink));
        }
        for (kmp_type, sink) in collected {
            self.collect(kmp_type, sink, events);
        }
    }

    /// Hands a crypto result to the instance waiting for it. Returns false when no instance
    /// waits for `request`.
    pub fn crypto_completed(
        &mut self,
        request: CryptoRequestId,
        result: &[u8],
        events: &mut Vec<KmpEvent>,
    ) -> bool {
        let i = match self.instances.iter().position(|i| i.pending_crypto == Some(request)) {
            Some(i) => i,
            None => {
                warn!("discarding crypto result of unknown request {}", request);
                return false;
            }
        };
        let instance = &mut self.instances[i];
        instance.pending_crypto = None;
        let kmp_type = instance.kmp_type;
        let mut sink = UpdateSink::default();
        instance.protocol.on_crypto_result(request, result, &mut sink);
        self.collect(kmp_type, sink, events);
        true
    }
}
