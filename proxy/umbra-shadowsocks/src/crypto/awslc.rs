// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::open;
use aws_lc_rs::{
    aead::{Aad, Algorithm, LessSafeKey, Nonce, UnboundKey},
    hkdf,
};

pub use aws_lc_rs::aead::NONCE_LEN;

pub const MAX_KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

// Protocol constant: the HKDF info label every Shadowsocks AEAD peer uses to
// expand (master key, salt) into the per-message subkey.
const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Derives the per-message subkey for an observed salt.
///
/// HKDF-SHA1 with salt = the message IV, IKM = the account master key. `out`
/// must be sized to the suite's key length.
#[inline]
pub(crate) fn derive_subkey(master_key: &[u8], salt: &[u8], out: &mut [u8]) {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA1_FOR_LEGACY_USE_ONLY, salt);
    salt.extract(master_key)
        .expand(&[SUBKEY_INFO], OutLen(out.len()))
        .unwrap()
        .fill(out)
        .unwrap();
}

#[derive(Clone, Copy)]
pub(crate) struct OutLen(pub usize);

impl hkdf::KeyType for OutLen {
    #[inline]
    fn len(&self) -> usize {
        self.0
    }
}

/// Decryption context bound to one derived subkey.
///
/// On a successful match this is handed to the caller to open the remainder
/// of the stream or datagram; the validator keeps nothing about it.
#[derive(Debug)]
pub struct Opener {
    key: LessSafeKey,
}

impl Opener {
    pub(crate) fn new(algorithm: &'static Algorithm, subkey: &[u8]) -> Option<Self> {
        let key = UnboundKey::new(algorithm, subkey).ok()?;
        Some(Self {
            key: LessSafeKey::new(key),
        })
    }

    #[inline]
    pub fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    #[inline]
    pub fn tag_len(&self) -> usize {
        debug_assert_eq!(TAG_LEN, self.key.algorithm().tag_len());
        TAG_LEN
    }

    /// Opens `in_out` (ciphertext followed by tag) and returns the plaintext
    /// prefix of the buffer.
    #[inline]
    pub fn open_in_place<'a>(
        &self,
        nonce: [u8; NONCE_LEN],
        in_out: &'a mut [u8],
    ) -> open::Result<&'a mut [u8]> {
        self.key
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), in_out)
            .map_err(|_| open::Error::InvalidTag)
    }
}

/// Mirror image of [`Opener`] for building honest client bytes in tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct Sealer {
    key: LessSafeKey,
}

#[cfg(any(test, feature = "testing"))]
impl Sealer {
    pub fn new(algorithm: &'static Algorithm, subkey: &[u8]) -> Option<Self> {
        let key = UnboundKey::new(algorithm, subkey).ok()?;
        Some(Self {
            key: LessSafeKey::new(key),
        })
    }

    pub fn seal_append(&self, nonce: [u8; NONCE_LEN], in_out: &mut Vec<u8>) {
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), in_out)
            .unwrap();
    }
}
