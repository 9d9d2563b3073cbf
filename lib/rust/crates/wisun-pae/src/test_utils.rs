// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        controller::{AuthResult, PaeCallbacks},
        kmp::{CryptoRequestId, KmpFactory, KmpProtocol, KmpType, KmpUpdate, UpdateSink},
        nvm::{FileHandle, FileService, OpenMode},
        time::Clock,
        Eui64, Error, GAK_LEN, GTK_NUM,
    },
    std::{
        cell::{Cell, RefCell},
        collections::{HashMap, VecDeque},
        io,
        path::{Path, PathBuf},
        rc::Rc,
    },
};

pub const PEER: Eui64 = Eui64([0x70; 8]);
pub const BR: Eui64 = Eui64([0xb0; 8]);
pub const PARENT: Eui64 = Eui64([0xa0; 8]);

#[derive(Debug, Default)]
struct MemFiles {
    files: HashMap<PathBuf, Vec<u8>>,
    write_limit: Option<usize>,
}

/// In-memory `FileService`. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemFileService(Rc<RefCell<MemFiles>>);

impl MemFileService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, content: Vec<u8>) {
        self.0.borrow_mut().files.insert(PathBuf::from(path), content);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.0.borrow().files.get(Path::new(path)).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.borrow().files.contains_key(Path::new(path))
    }

    /// Every later write stores at most `limit` bytes.
    pub fn limit_writes(&self, limit: usize) {
        self.0.borrow_mut().write_limit = Some(limit);
    }
}

struct MemReadHandle {
    content: Vec<u8>,
    pos: usize,
}

impl FileHandle for MemReadHandle {
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let end = (self.pos + len).min(self.content.len());
        let chunk = self.content[self.pos..end].to_vec();
        self.pos = end;
        Ok(chunk)
    }

    fn write(&mut self, _bytes: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "opened for reading"))
    }
}

struct MemWriteHandle {
    files: Rc<RefCell<MemFiles>>,
    path: PathBuf,
}

impl FileHandle for MemWriteHandle {
    fn read(&mut self, _len: usize) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "opened for writing"))
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut files = self.files.borrow_mut();
        let len = files.write_limit.map_or(bytes.len(), |limit| limit.min(bytes.len()));
        files.files.entry(self.path.clone()).or_default().extend_from_slice(&bytes[..len]);
        Ok(len)
    }
}

impl FileService for MemFileService {
    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        match mode {
            OpenMode::Read => {
                let content = self
                    .0
                    .borrow()
                    .files
                    .get(path)
                    .cloned()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
                Ok(Box::new(MemReadHandle { content, pos: 0 }))
            }
            OpenMode::Write => {
                self.0.borrow_mut().files.insert(path.to_path_buf(), vec![]);
                Ok(Box::new(MemWriteHandle { files: self.0.clone(), path: path.to_path_buf() }))
            }
        }
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        self.0
            .borrow_mut()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}

#[derive(Debug, Default)]
struct KmpLog {
    created: Vec<KmpType>,
    fail_create: Vec<KmpType>,
    started: HashMap<KmpType, Vec<Eui64>>,
    received: HashMap<KmpType, Vec<Vec<u8>>>,
    start_updates: HashMap<KmpType, Vec<KmpUpdate>>,
    message_updates: HashMap<KmpType, VecDeque<Vec<KmpUpdate>>>,
    crypto_updates: HashMap<KmpType, VecDeque<Vec<KmpUpdate>>>,
}

/// Creates scripted engines. Clones share the script and the log.
#[derive(Debug, Clone, Default)]
pub struct FakeKmpFactory(Rc<RefCell<KmpLog>>);

impl FakeKmpFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<KmpType> {
        self.0.borrow().created.clone()
    }

    pub fn started(&self, kmp_type: KmpType) -> Vec<Eui64> {
        self.0.borrow().started.get(&kmp_type).cloned().unwrap_or_default()
    }

    pub fn received(&self, kmp_type: KmpType) -> Vec<Vec<u8>> {
        self.0.borrow().received.get(&kmp_type).cloned().unwrap_or_default()
    }

    pub fn fail_create(&self, kmp_type: KmpType) {
        self.0.borrow_mut().fail_create.push(kmp_type);
    }

    /// Every start of `kmp_type` reports `updates`.
    pub fn respond_start(&self, kmp_type: KmpType, updates: Vec<KmpUpdate>) {
        self.0.borrow_mut().start_updates.insert(kmp_type, updates);
    }

    /// The next message to `kmp_type` reports `updates`.
    pub fn respond(&self, kmp_type: KmpType, updates: Vec<KmpUpdate>) {
        self.0.borrow_mut().message_updates.entry(kmp_type).or_default().push_back(updates);
    }

    /// The next crypto result handed to `kmp_type` reports `updates`.
    pub fn respond_crypto(&self, kmp_type: KmpType, updates: Vec<KmpUpdate>) {
        self.0.borrow_mut().crypto_updates.entry(kmp_type).or_default().push_back(updates);
    }
}

impl KmpFactory for FakeKmpFactory {
    fn create(&mut self, kmp_type: KmpType) -> Result<Box<dyn KmpProtocol>, Error> {
        let mut log = self.0.borrow_mut();
        if log.fail_create.contains(&kmp_type) {
            return Err(Error::Protocol(format!("{:?} unavailable", kmp_type)));
        }
        log.created.push(kmp_type);
        Ok(Box::new(FakeKmp { kmp_type, log: self.0.clone() }))
    }
}

#[derive(Debug)]
struct FakeKmp {
    kmp_type: KmpType,
    log: Rc<RefCell<KmpLog>>,
}

impl KmpProtocol for FakeKmp {
    fn start(&mut self, peer: Eui64, update_sink: &mut UpdateSink) -> Result<(), Error> {
        let mut log = self.log.borrow_mut();
        log.started.entry(self.kmp_type).or_default().push(peer);
        if let Some(updates) = log.start_updates.get(&self.kmp_type) {
            update_sink.extend(updates.iter().cloned());
        }
        Ok(())
    }

    fn on_message(
        &mut self,
        _peer: Eui64,
        msg: &[u8],
        update_sink: &mut UpdateSink,
    ) -> Result<(), Error> {
        let mut log = self.log.borrow_mut();
        log.received.entry(self.kmp_type).or_default().push(msg.to_vec());
        if let Some(updates) =
            log.message_updates.get_mut(&self.kmp_type).and_then(|q| q.pop_front())
        {
            update_sink.extend(updates);
        }
        Ok(())
    }

    fn on_timer(&mut self, _ticks: u16, _update_sink: &mut UpdateSink) {}

    fn on_crypto_result(
        &mut self,
        _request: CryptoRequestId,
        _result: &[u8],
        update_sink: &mut UpdateSink,
    ) {
        let mut log = self.log.borrow_mut();
        if let Some(updates) =
            log.crypto_updates.get_mut(&self.kmp_type).and_then(|q| q.pop_front())
        {
            update_sink.extend(updates);
        }
    }
}

/// A callback as seen by the MAC and bootstrap layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    KeySet(u8, u8, [u8; GAK_LEN]),
    KeyClear(u8),
    SendKeyIndex(u8),
    CounterSet(u8, u32),
    CounterRead(u8),
    AuthCompleted(AuthResult, Option<Eui64>),
    NwInfoUpdated(u16, u16, String),
}

#[derive(Debug, Default)]
struct CallLog {
    calls: Vec<Call>,
    counters: [u32; GTK_NUM],
}

/// Records callbacks and simulates the MAC frame counters.
#[derive(Debug, Clone, Default)]
pub struct FakeCallbacks(Rc<RefCell<CallLog>>);

impl FakeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.0.borrow_mut().calls)
    }

    pub fn set_counter(&self, index: u8, counter: u32) {
        self.0.borrow_mut().counters[index as usize] = counter;
    }

    fn record(&self, call: Call) {
        self.0.borrow_mut().calls.push(call);
    }
}

impl PaeCallbacks for FakeCallbacks {
    fn nw_key_set(&mut self, index: u8, key_id: u8, key: &[u8; GAK_LEN]) {
        self.record(Call::KeySet(index, key_id, *key));
    }

    fn nw_key_clear(&mut self, index: u8) {
        self.record(Call::KeyClear(index));
    }

    fn nw_send_key_index_set(&mut self, index: u8) {
        self.record(Call::SendKeyIndex(index));
    }

    fn nw_frame_counter_set(&mut self, index: u8, counter: u32) {
        self.set_counter(index, counter);
        self.record(Call::CounterSet(index, counter));
    }

    fn nw_frame_counter_read(&mut self, index: u8) -> u32 {
        self.record(Call::CounterRead(index));
        self.0.borrow().counters[index as usize]
    }

    fn auth_completed(&mut self, result: AuthResult, peer: Option<Eui64>) {
        self.record(Call::AuthCompleted(result, peer));
    }

    fn nw_info_updated(&mut self, pan_id: u16, pan_version: u16, network_name: &str) {
        self.record(Call::NwInfoUpdated(pan_id, pan_version, network_name.to_string()));
    }
}

#[derive(Debug, Clone)]
pub struct FakeClock(Rc<Cell<u64>>);

impl FakeClock {
    pub fn new(now: u64) -> Self {
        FakeClock(Rc::new(Cell::new(now)))
    }

    pub fn set(&self, now: u64) {
        self.0.set(now);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.0.get()
    }
}
