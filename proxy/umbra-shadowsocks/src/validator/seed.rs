// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use aws_lc_rs::hmac;
use crc::Crc;

// Matches the accumulation every peer implementation performs: each AEAD
// key is HMAC'd under a fixed label and folded into a running CRC64 (the
// reflected ECMA polynomial).
const SEED_KDF_LABEL: &[u8] = b"SSBSKDF";
const CRC64: Crc<u64> = Crc::<u64>::new(&crc::CRC_64_XZ);

/// The behaviour seed: a 64-bit digest of the registered AEAD keys, consumed
/// by upstream traffic-shape randomization.
///
/// Accumulates while unfused; the first read fuses it, after which the value
/// is stable for the validator's lifetime. A still-zero seed is replaced with
/// a random value at fuse time so consumers never observe an all-zero seed.
#[derive(Debug)]
pub(crate) struct Seed {
    value: u64,
    fused: bool,
}

impl Seed {
    pub(crate) const fn new() -> Self {
        Self {
            value: 0,
            fused: false,
        }
    }

    pub(crate) fn fold(&mut self, master_key: &[u8]) {
        if self.fused {
            return;
        }
        let key = hmac::Key::new(hmac::HMAC_SHA256, SEED_KDF_LABEL);
        let tag = hmac::sign(&key, master_key);
        let mut digest = CRC64.digest_with_initial(self.value);
        digest.update(tag.as_ref());
        self.value = digest.finalize();
    }

    pub(crate) fn fuse(&mut self) -> u64 {
        if !self.fused {
            self.fused = true;
            if self.value == 0 {
                let mut bytes = [0u8; 8];
                aws_lc_rs::rand::fill(&mut bytes).unwrap();
                self.value = u64::from_ne_bytes(bytes);
            }
        }
        self.value
    }
}
