// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::cipher::CipherSuite;
use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod replay;

pub use replay::IvReplayed;

/// A provisioned account.
///
/// Records are immutable once registered and shared as `Arc<User>`; the
/// control plane replaces a user by re-adding under the same email. The only
/// interior state is the replay filter, which tolerates concurrent lookups.
pub struct User {
    email: String,
    key: MasterKey,
    cipher: CipherSuite,
    replay: replay::Filter,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey(Vec<u8>);

impl User {
    pub fn new(email: impl Into<String>, key: impl Into<Vec<u8>>, cipher: CipherSuite) -> Self {
        Self {
            email: email.into(),
            key: MasterKey(key.into()),
            cipher,
            replay: replay::Filter::default(),
        }
    }

    /// The email as provided at registration. Identity is case-insensitive;
    /// see [`registry_key`](Self::registry_key).
    #[inline]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[inline]
    pub fn cipher(&self) -> CipherSuite {
        self.cipher
    }

    #[inline]
    pub(crate) fn registry_key(&self) -> String {
        self.email.to_lowercase()
    }

    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        &self.key.0
    }

    /// Asks the account's IV history whether `iv` may authenticate a new
    /// request.
    #[inline]
    pub(crate) fn check_iv(&self, iv: &[u8]) -> Result<(), IvReplayed> {
        self.replay.check(iv)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("User")
            .field("email", &self.email)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}
