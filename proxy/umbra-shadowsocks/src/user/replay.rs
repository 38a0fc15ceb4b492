// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex;
use std::{collections::HashSet, mem, time::Duration};
use tokio::time::Instant;

/// Soft failure: the IV was already seen for this account inside the replay
/// window. The request still identifies its sender; the caller is expected to
/// reject it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("initialization vector was seen recently")]
pub struct IvReplayed;

const REPLAY_WINDOW: Duration = Duration::from_secs(120);

/// Per-account IV history.
///
/// Two hashed-fingerprint generations rotated on a fixed window: an IV is
/// rejected while its fingerprint lives in either generation, so a duplicate
/// is caught for at least `window` and at most `2 * window`. Checks are O(1)
/// amortized; memory is bounded by the account's request rate over two
/// windows.
pub struct Filter {
    hasher: ahash::RandomState,
    window: Duration,
    generations: Mutex<Generations>,
}

struct Generations {
    current: HashSet<u64>,
    previous: HashSet<u64>,
    rotated_at: Instant,
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(REPLAY_WINDOW)
    }
}

impl Filter {
    pub fn new(window: Duration) -> Self {
        Self {
            hasher: ahash::RandomState::new(),
            window,
            generations: Mutex::new(Generations {
                current: HashSet::new(),
                previous: HashSet::new(),
                rotated_at: Instant::now(),
            }),
        }
    }

    pub(crate) fn check(&self, iv: &[u8]) -> Result<(), IvReplayed> {
        let fingerprint = self.hasher.hash_one(iv);
        let now = Instant::now();

        let mut guard = self.generations.lock();
        let generations = &mut *guard;
        if now.duration_since(generations.rotated_at) >= self.window {
            generations.previous = mem::take(&mut generations.current);
            generations.rotated_at = now;
        }
        if generations.current.contains(&fingerprint)
            || generations.previous.contains(&fingerprint)
        {
            return Err(IvReplayed);
        }
        generations.current.insert(fingerprint);
        Ok(())
    }
}

impl core::fmt::Debug for Filter {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Filter")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
