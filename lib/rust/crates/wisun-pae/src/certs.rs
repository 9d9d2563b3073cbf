// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Certificates and revocation lists handed to the TLS engine. Entries are opaque DER blobs.

use {crate::Error, log::info};

/// Longest own certificate chain, leaf included.
pub const CERT_CHAIN_MAX_DEPTH: usize = 4;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CertificateBundle {
    own_chain: Vec<Vec<u8>>,
    trusted: Vec<Vec<u8>>,
    crls: Vec<Vec<u8>>,
}

fn remove_entry(list: &mut Vec<Vec<u8>>, entry: &[u8], what: &'static str) -> Result<(), Error> {
    match list.iter().position(|e| &e[..] == entry) {
        Some(i) => {
            list.remove(i);
            Ok(())
        }
        None => Err(Error::Config(what)),
    }
}

impl CertificateBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next certificate of the own chain, leaf first.
    pub fn own_certificate_add(&mut self, cert: &[u8]) -> Result<(), Error> {
        if cert.is_empty() {
            return Err(Error::Config("empty certificate"));
        }
        if self.own_chain.len() >= CERT_CHAIN_MAX_DEPTH {
            return Err(Error::Config("certificate chain too long"));
        }
        self.own_chain.push(cert.to_vec());
        Ok(())
    }

    pub fn certificate_chain_remove_all(&mut self) {
        info!("removing own certificate chain ({} entries)", self.own_chain.len());
        self.own_chain.clear();
    }

    /// Adding a certificate already trusted is a no-op.
    pub fn trusted_certificate_add(&mut self, cert: &[u8]) -> Result<(), Error> {
        if cert.is_empty() {
            return Err(Error::Config("empty certificate"));
        }
        if !self.trusted.iter().any(|c| &c[..] == cert) {
            self.trusted.push(cert.to_vec());
        }
        Ok(())
    }

    pub fn trusted_certificate_remove(&mut self, cert: &[u8]) -> Result<(), Error> {
        remove_entry(&mut self.trusted, cert, "trusted certificate not found")
    }

    pub fn certificate_revocation_list_add(&mut self, crl: &[u8]) -> Result<(), Error> {
        if crl.is_empty() {
            return Err(Error::Config("empty revocation list"));
        }
        if !self.crls.iter().any(|c| &c[..] == crl) {
            self.crls.push(crl.to_vec());
        }
        Ok(())
    }

    pub fn certificate_revocation_list_remove(&mut self, crl: &[u8]) -> Result<(), Error> {
        remove_entry(&mut self.crls, crl, "revocation list not found")
    }

    pub fn own_chain(&self) -> &[Vec<u8>] {
        &self.own_chain[..]
    }

    pub fn trusted(&self) -> &[Vec<u8>] {
        &self.trusted[..]
    }

    pub fn revocation_lists(&self) -> &[Vec<u8>] {
        &self.crls[..]
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn own_chain_is_bounded() {
        let mut bundle = CertificateBundle::new();
        for i in 0..CERT_CHAIN_MAX_DEPTH {
            bundle.own_certificate_add(&[i as u8 + 1; 10]).expect("error adding certificate");
        }
        assert_matches!(bundle.own_certificate_add(&[9; 10]), Err(Error::Config(_)));
        assert_eq!(bundle.own_chain()[0], vec![1; 10]);

        bundle.certificate_chain_remove_all();
        assert!(bundle.own_chain().is_empty());
        bundle.own_certificate_add(&[9; 10]).expect("chain accepts certificates again");
    }

    #[test]
    fn trusted_certificates_are_deduplicated() {
        let mut bundle = CertificateBundle::new();
        bundle.trusted_certificate_add(b"root-ca").expect("error adding certificate");
        bundle.trusted_certificate_add(b"root-ca").expect("error adding certificate");
        assert_eq!(bundle.trusted().len(), 1);
        bundle.trusted_certificate_remove(b"root-ca").expect("error removing certificate");
        assert_matches!(bundle.trusted_certificate_remove(b"root-ca"), Err(Error::Config(_)));
        assert_matches!(bundle.trusted_certificate_add(b""), Err(Error::Config(_)));
    }

    #[test]
    fn revocation_lists() {
        let mut bundle = CertificateBundle::new();
        bundle.certificate_revocation_list_add(b"crl-1").expect("error adding CRL");
        bundle.certificate_revocation_list_add(b"crl-2").expect("error adding CRL");
        bundle.certificate_revocation_list_remove(b"crl-1").expect("error removing CRL");
        assert_eq!(bundle.revocation_lists(), &[b"crl-2".to_vec()][..]);
    }
}
