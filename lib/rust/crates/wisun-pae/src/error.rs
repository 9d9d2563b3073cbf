// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{Eui64, InterfaceId},
    std::io,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no PAE controller registered for interface {0}")]
    UnknownInterface(InterfaceId),
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error("key derivation failed: {0}")]
    Crypto(&'static str),
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("key management protocol failure: {0}")]
    Protocol(String),
    #[error("persisted owner {stored} does not match interface address {own}")]
    IdentityMismatch { stored: Eui64, own: Eui64 },
    #[error("implausible clock skew; stored time {stored}, current time {current}")]
    Time { stored: u64, current: u64 },
    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),
}

/// Failures of the NVM TLV store and of the record codecs built on it.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid NVM root path")]
    InvalidRootPath,
    #[error("i/o error on {file}: {source}")]
    Io { file: String, source: io::Error },
    #[error("short write on {file}; wrote {written} of {expected} bytes")]
    ShortWrite { file: String, expected: usize, written: usize },
    #[error("unexpected record tag {found}, expected {expected}")]
    TagMismatch { expected: u16, found: u16 },
    #[error("unexpected record length {found}, expected {expected}")]
    LengthMismatch { expected: u16, found: u16 },
    #[error("record truncated; needed {needed} bytes but {remaining} remain")]
    Truncated { needed: usize, remaining: usize },
    #[error("invalid value in field {0}")]
    InvalidValue(&'static str),
}

#[derive(Debug, Error, PartialEq)]
pub enum KeyStoreError {
    #[error("GTK index {0} out of range")]
    InvalidIndex(u8),
    #[error("GTK slot {0} already holds a different key")]
    SlotOccupied(u8),
    #[error("GTK slot {0} is not set")]
    SlotEmpty(u8),
    #[error("GTK slot {index} cannot move from {from:?} to {to:?}")]
    IllegalTransition { index: u8, from: crate::key::gtk::GtkStatus, to: crate::key::gtk::GtkStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_error_converts_into_error() {
        let e: Error = PersistenceError::InvalidRootPath.into();
        assert!(matches!(e, Error::Persistence(PersistenceError::InvalidRootPath)));
        assert_eq!(e.to_string(), "persistence failure: invalid NVM root path");
    }

    #[test]
    fn identity_mismatch_display() {
        let e = Error::IdentityMismatch { stored: Eui64([1; 8]), own: Eui64([2; 8]) };
        assert_eq!(
            e.to_string(),
            "persisted owner 01:01:01:01:01:01:01:01 does not match interface address \
             02:02:02:02:02:02:02:02"
        );
    }
}
