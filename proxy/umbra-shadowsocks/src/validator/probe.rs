// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer,
    crypto::awslc::{self, Opener, NONCE_LEN, TAG_LEN},
    user::User,
    validator::Command,
};
use std::sync::Arc;
use zeroize::Zeroizing;

// AEAD ciphers with shorter salts don't participate in matching.
const MIN_IV_LEN: usize = 8;

// Encrypted 2-byte length field plus its tag: the cheapest slice of a stream
// request that proves key knowledge.
const LEN_FRAME: usize = 2 + TAG_LEN;

pub(crate) struct Probe {
    pub(crate) opener: Opener,
    pub(crate) payload: Vec<u8>,
    pub(crate) iv_len: usize,
}

/// Attempts to authenticate `prefix` as coming from `user`.
///
/// Pure: no registry or tier state is consulted or written. `None` covers
/// both "not the sender" (the tag fails to verify) and "cannot apply" (the
/// suite is not AEAD, its salt is shorter than 8 bytes, or the prefix is too
/// short for this suite); neither distinction matters to the search. All
/// slicing is checked, so arbitrary input cannot panic.
pub(crate) fn probe(
    user: &User,
    prefix: &[u8],
    command: Command,
    scratch: &Arc<buffer::Pool>,
) -> Option<Probe> {
    let suite = user.cipher();
    let algorithm = suite.algorithm()?;
    let iv_len = suite.iv_len();
    if iv_len < MIN_IV_LEN {
        return None;
    }
    let iv = prefix.get(..iv_len)?;

    let mut subkey = Zeroizing::new([0u8; awslc::MAX_KEY_LEN]);
    let subkey = &mut subkey[..suite.key_len()];
    awslc::derive_subkey(user.key(), iv, subkey);
    let opener = Opener::new(algorithm, subkey)?;

    match command {
        Command::Tcp => {
            let sealed = prefix.get(iv_len..iv_len + LEN_FRAME)?;
            let mut frame = [0u8; LEN_FRAME];
            frame.copy_from_slice(sealed);
            let payload = opener.open_in_place([0; NONCE_LEN], &mut frame).ok()?.to_vec();
            Some(Probe {
                opener,
                payload,
                iv_len,
            })
        }
        Command::Udp => {
            let sealed = prefix.get(iv_len..)?;
            if sealed.len() < TAG_LEN {
                return None;
            }
            let mut buf = scratch.acquire();
            buf.extend_from_slice(sealed);
            let payload = opener.open_in_place([0; NONCE_LEN], &mut buf).ok()?.to_vec();
            Some(Probe {
                opener,
                payload,
                iv_len,
            })
        }
    }
}
