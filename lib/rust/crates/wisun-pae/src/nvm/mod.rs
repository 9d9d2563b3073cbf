// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Tag-length-value records kept in whole-file replacements under an application chosen root.

pub mod cursor;
pub mod data;

use {
    crate::error::PersistenceError,
    cursor::{Reader, Writer},
    log::{debug, warn},
    std::{
        fmt,
        fs::{self, File, OpenOptions},
        io::{self, Read, Write},
        path::{Path, PathBuf},
    },
};

pub const NW_INFO_TAG: u16 = 1;
pub const KEYS_TAG: u16 = 2;
pub const FRAME_COUNTER_TAG: u16 = 3;
pub const KEY_STORAGE_INDEX_TAG: u16 = 4;

pub const NW_INFO_FILE_NAME: &str = "pae_nw_info";
pub const KEYS_FILE_NAME: &str = "pae_keys";
pub const FRAME_COUNTER_FILE_NAME: &str = "pae_frame_counter";
pub const KEY_STORAGE_INDEX_FILE_NAME: &str = "pae_key_storage_index";

/// Tag and length octets preceding every payload.
pub const TLV_HEADER_LEN: usize = 4;
pub const ROOT_PATH_MAX_LEN: usize = 200;

/// File holding the keys of the `n`th authenticated node.
pub fn key_storage_file_name(n: u8) -> String {
    format!("pae_key_storage_{}", n)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Creates or truncates.
    Write,
}

pub trait FileHandle {
    /// Reads up to `len` bytes; fewer are returned at end of file.
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>>;
    /// Returns the number of bytes written.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

/// Raw file primitives the store is built on.
pub trait FileService: fmt::Debug {
    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>>;
    fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// `FileService` on top of the host file system.
#[derive(Debug, Default)]
pub struct StdFileService;

struct StdFileHandle(File);

impl FileHandle for StdFileHandle {
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len);
        (&mut self.0).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < bytes.len() {
            match self.0.write(&bytes[written..])? {
                0 => break,
                n => written += n,
            }
        }
        self.0.flush()?;
        Ok(written)
    }
}

impl FileService for StdFileService {
    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => {
                OpenOptions::new().write(true).create(true).truncate(true).open(path)?
            }
        };
        Ok(Box::new(StdFileHandle(file)))
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// A raw record as kept on NVM.
#[derive(Debug, Clone, PartialEq)]
pub struct TlvRecord {
    pub tag: u16,
    pub payload: Vec<u8>,
}

/// A record type with a fixed tag and payload length.
pub trait NvmRecord: Sized {
    const TAG: u16;
    const LEN: u16;

    fn encode(&self, w: &mut Writer<'_>);
    fn decode(r: &mut Reader<'_>) -> cursor::Result<Self>;
}

/// TLV store of one controller. The scratch buffer is reused by every encode and decode.
#[derive(Debug)]
pub struct NvmStore {
    root: String,
    files: Box<dyn FileService>,
    buf: Vec<u8>,
}

impl NvmStore {
    pub fn new(root: impl Into<String>, files: Box<dyn FileService>) -> Self {
        NvmStore { root: root.into(), files, buf: Vec::with_capacity(256) }
    }

    pub fn root_path_valid(&self) -> bool {
        !self.root.is_empty() && self.root.chars().count() <= ROOT_PATH_MAX_LEN
    }

    fn path(&self, file_name: &str) -> Result<PathBuf, PersistenceError> {
        if !self.root_path_valid() {
            return Err(PersistenceError::InvalidRootPath);
        }
        Ok(Path::new(&self.root).join(file_name))
    }

    fn io_error(file_name: &str, source: io::Error) -> PersistenceError {
        PersistenceError::Io { file: file_name.to_string(), source }
    }

    /// Replaces `file_name` with the scratch buffer contents.
    fn flush_buf(&mut self, file_name: &str) -> Result<(), PersistenceError> {
        let path = self.path(file_name)?;
        let mut handle =
            self.files.open(&path, OpenMode::Write).map_err(|e| Self::io_error(file_name, e))?;
        let written = handle.write(&self.buf[..]).map_err(|e| Self::io_error(file_name, e))?;
        if written != self.buf.len() {
            return Err(PersistenceError::ShortWrite {
                file: file_name.to_string(),
                expected: self.buf.len(),
                written,
            });
        }
        debug!("wrote {} bytes to {}", written, file_name);
        Ok(())
    }

    /// Reads header and payload of `file_name` into the scratch buffer.
    fn fill_buf(
        &mut self,
        file_name: &str,
        expected_tag: u16,
        expected_len: u16,
    ) -> Result<(), PersistenceError> {
        let path = self.path(file_name)?;
        let mut handle =
            self.files.open(&path, OpenMode::Read).map_err(|e| Self::io_error(file_name, e))?;
        let header = handle.read(TLV_HEADER_LEN).map_err(|e| Self::io_error(file_name, e))?;
        let mut rdr = Reader::new(&header[..]);
        let tag = rdr.read_u16()?;
        let len = rdr.read_u16()?;
        if tag != expected_tag {
            return Err(PersistenceError::TagMismatch { expected: expected_tag, found: tag });
        }
        if len != expected_len {
            return Err(PersistenceError::LengthMismatch { expected: expected_len, found: len });
        }
        let payload = handle.read(len as usize).map_err(|e| Self::io_error(file_name, e))?;
        if payload.len() != len as usize {
            return Err(PersistenceError::Truncated {
                needed: len as usize,
                remaining: payload.len(),
            });
        }
        self.buf.clear();
        self.buf.extend_from_slice(&payload[..]);
        Ok(())
    }

    fn put_header(&mut self, tag: u16, len: u16) {
        self.buf.clear();
        let mut w = Writer::new(&mut self.buf);
        w.put_u16(tag);
        w.put_u16(len);
    }

    pub fn write(&mut self, file_name: &str, record: &TlvRecord) -> Result<(), PersistenceError> {
        if record.payload.len() > u16::MAX as usize {
            return Err(PersistenceError::InvalidValue("payload length"));
        }
        self.put_header(record.tag, record.payload.len() as u16);
        self.buf.extend_from_slice(&record.payload[..]);
        self.flush_buf(file_name)
    }

    /// Reads a record, failing unless it carries exactly the expected tag and length.
    pub fn read(
        &mut self,
        file_name: &str,
        expected_tag: u16,
        expected_len: u16,
    ) -> Result<TlvRecord, PersistenceError> {
        self.fill_buf(file_name, expected_tag, expected_len)?;
        Ok(TlvRecord { tag: expected_tag, payload: self.buf.clone() })
    }

    /// Removes `file_name`. A missing file is not an error.
    pub fn remove(&mut self, file_name: &str) {
        let path = match self.path(file_name) {
            Ok(path) => path,
            Err(e) => {
                warn!("cannot remove {}: {}", file_name, e);
                return;
            }
        };
        match self.files.remove(&path) {
            Ok(()) => debug!("removed {}", file_name),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot remove {}: {}", file_name, e),
        }
    }

    pub fn store<R: NvmRecord>(&mut self, file_name: &str, record: &R) -> Result<(), PersistenceError> {
        self.put_header(R::TAG, R::LEN);
        record.encode(&mut Writer::new(&mut self.buf));
        if self.buf.len() != TLV_HEADER_LEN + R::LEN as usize {
            return Err(PersistenceError::LengthMismatch {
                expected: R::LEN,
                found: (self.buf.len() - TLV_HEADER_LEN) as u16,
            });
        }
        self.flush_buf(file_name)
    }

    pub fn load<R: NvmRecord>(&mut self, file_name: &str) -> Result<R, PersistenceError> {
        self.fill_buf(file_name, R::TAG, R::LEN)?;
        let mut rdr = Reader::new(&self.buf[..]);
        let record = R::decode(&mut rdr)?;
        rdr.finish()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_utils::MemFileService,
        assert_matches::assert_matches,
        tempfile::TempDir,
    };

    fn std_store(dir: &TempDir) -> NvmStore {
        NvmStore::new(dir.path().to_string_lossy().to_string(), Box::new(StdFileService))
    }

    #[test]
    fn write_then_read_on_host_fs() {
        let dir = TempDir::new().expect("error creating temp dir");
        let mut store = std_store(&dir);
        let record = TlvRecord { tag: KEY_STORAGE_INDEX_TAG, payload: vec![1, 2, 3, 4, 5, 6, 7, 8] };
        store.write(KEY_STORAGE_INDEX_FILE_NAME, &record).expect("error writing record");

        let raw = fs::read(dir.path().join(KEY_STORAGE_INDEX_FILE_NAME)).expect("file missing");
        assert_eq!(&raw[..4], &[0x00, 0x04, 0x00, 0x08]);

        let read =
            store.read(KEY_STORAGE_INDEX_FILE_NAME, KEY_STORAGE_INDEX_TAG, 8).expect("read failed");
        assert_eq!(read, record);
    }

    #[test]
    fn write_replaces_whole_file() {
        let dir = TempDir::new().expect("error creating temp dir");
        let mut store = std_store(&dir);
        store.write("f", &TlvRecord { tag: 9, payload: vec![0xAA; 32] }).expect("write failed");
        store.write("f", &TlvRecord { tag: 9, payload: vec![0xBB; 2] }).expect("write failed");
        let raw = fs::read(dir.path().join("f")).expect("file missing");
        assert_eq!(raw, vec![0x00, 0x09, 0x00, 0x02, 0xBB, 0xBB]);
    }

    #[test]
    fn read_rejects_foreign_tag_and_length() {
        let dir = TempDir::new().expect("error creating temp dir");
        let mut store = std_store(&dir);
        store.write("f", &TlvRecord { tag: 2, payload: vec![0; 8] }).expect("write failed");
        assert_matches!(
            store.read("f", 3, 8),
            Err(PersistenceError::TagMismatch { expected: 3, found: 2 })
        );
        assert_matches!(
            store.read("f", 2, 9),
            Err(PersistenceError::LengthMismatch { expected: 9, found: 8 })
        );
    }

    #[test]
    fn read_of_missing_file_fails() {
        let dir = TempDir::new().expect("error creating temp dir");
        let mut store = std_store(&dir);
        assert_matches!(store.read("missing", 1, 1), Err(PersistenceError::Io { .. }));
        // Removing a missing file is fine.
        store.remove("missing");
    }

    #[test]
    fn truncated_payload_fails() {
        let files = MemFileService::new();
        files.put("root/f", vec![0x00, 0x01, 0x00, 0x08, 1, 2, 3]);
        let mut store = NvmStore::new("root", Box::new(files.clone()));
        assert_matches!(
            store.read("f", 1, 8),
            Err(PersistenceError::Truncated { needed: 8, remaining: 3 })
        );
    }

    #[test]
    fn invalid_root_path_is_rejected() {
        let files = MemFileService::new();
        let record = TlvRecord { tag: 1, payload: vec![] };

        let mut store = NvmStore::new("", Box::new(files.clone()));
        assert_matches!(store.write("f", &record), Err(PersistenceError::InvalidRootPath));

        let mut store = NvmStore::new("r".repeat(ROOT_PATH_MAX_LEN + 1), Box::new(files.clone()));
        assert_matches!(store.write("f", &record), Err(PersistenceError::InvalidRootPath));
        assert_matches!(store.read("f", 1, 0), Err(PersistenceError::InvalidRootPath));

        let mut store = NvmStore::new("r".repeat(ROOT_PATH_MAX_LEN), Box::new(files.clone()));
        store.write("f", &record).expect("root path at the limit is valid");
    }

    #[test]
    fn short_write_is_reported() {
        let files = MemFileService::new();
        files.limit_writes(3);
        let mut store = NvmStore::new("root", Box::new(files.clone()));
        assert_matches!(
            store.write("f", &TlvRecord { tag: 1, payload: vec![0; 4] }),
            Err(PersistenceError::ShortWrite { expected: 8, written: 3, .. })
        );
    }
}
