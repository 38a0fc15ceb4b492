// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Maps the first bytes of an inbound encrypted flow to the account that sent
//! them.
//!
//! There is no in-band user identifier: a candidate matches when a trial
//! decryption of the prefix succeeds under the subkey derived from its master
//! key. The search is ordered by three recency tiers so populations in the
//! tens of thousands stay sub-millisecond for active users.

use crate::{
    buffer,
    crypto::Opener,
    metrics::{Metrics, Snapshot},
    user::{IvReplayed, User},
};
use core::fmt;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Instant};

mod lookup;
mod probe;
mod seed;
mod tiers;


use seed::Seed;
use tiers::Tiers;

const UDP_SCRATCH_LEN: usize = 8 * 1024;

/// Transport of the request being validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Tcp,
    Udp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No registered user matched the request prefix. The caller terminates
    /// the connection.
    #[error("no user matched the request prefix")]
    NotFound,
    /// `del` requires a non-empty email.
    #[error("email must not be empty")]
    EmptyEmail,
}

/// A successful lookup.
#[derive(Debug)]
pub struct Match {
    pub user: Arc<User>,
    /// Context for decrypting the remainder of the flow. `None` on the
    /// legacy fallback path.
    pub opener: Option<Opener>,
    /// Plaintext recovered by the probe: the 2-byte length frame for TCP,
    /// the whole payload for UDP. Empty on the legacy path.
    pub payload: Vec<u8>,
    pub iv_len: usize,
    /// Soft replay verdict. `Err` still identifies the sender; the caller is
    /// expected to log the attribution and reject the request.
    pub iv_check: Result<(), IvReplayed>,
}

struct Schema {
    user_count: u64,
    seed: Seed,
}

/// The validator for one Shadowsocks inbound.
///
/// Shared across every connection of the inbound. The rw-lock guards the
/// schema (user count, behaviour seed) and serializes mutations and the
/// sweep against lookups; the registries and tiers are concurrent maps, so
/// parallel lookups under the read lock may still promote users.
pub struct Validator {
    users: DashMap<String, Arc<User>>,
    legacy: DashMap<String, Arc<User>>,
    tiers: Tiers,
    schema: RwLock<Schema>,
    metrics: Metrics,
    scratch: Arc<buffer::Pool>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            legacy: DashMap::new(),
            tiers: Tiers::default(),
            schema: RwLock::new(Schema {
                user_count: 0,
                seed: Seed::new(),
            }),
            metrics: Metrics::default(),
            scratch: Arc::new(buffer::Pool::new(
                lookup::worker_limit() * 4,
                UDP_SCRATCH_LEN,
            )),
        }
    }

    /// Registers a user, replacing any record under the same email
    /// (case-insensitive). AEAD keys are folded into the behaviour seed until
    /// it fuses.
    pub async fn add(&self, user: User) -> Arc<User> {
        let mut schema = self.schema.write().await;

        let user = Arc::new(user);
        let email = user.registry_key();
        let (registry, other) = if user.cipher().is_aead() {
            (&self.users, &self.legacy)
        } else {
            (&self.legacy, &self.users)
        };
        let displaced = other.remove(&email).is_some();
        let replaced = registry.insert(email, Arc::clone(&user)).is_some();
        if !replaced && !displaced {
            schema.user_count += 1;
        }

        if user.cipher().is_aead() {
            schema.seed.fold(user.key());
        }

        user
    }

    /// Unregisters `email` from both registries and every tier. Removing an
    /// absent user succeeds silently.
    pub async fn del(&self, email: &str) -> Result<(), Error> {
        if email.is_empty() {
            return Err(Error::EmptyEmail);
        }

        let mut schema = self.schema.write().await;

        let email = email.to_lowercase();
        self.tiers.remove(&email);
        let removed = self.users.remove(&email).is_some() | self.legacy.remove(&email).is_some();
        if removed {
            schema.user_count -= 1;
        }
        Ok(())
    }

    /// Case-insensitive user fetch; legacy accounts shadow AEAD accounts.
    pub async fn get_by_email(&self, email: &str) -> Option<Arc<User>> {
        if email.is_empty() {
            return None;
        }

        let _schema = self.schema.read().await;

        let email = email.to_lowercase();
        let entry = self.legacy.get(&email).or_else(|| self.users.get(&email));
        entry.map(|user| Arc::clone(user.value()))
    }

    /// Point-in-time snapshot of every registered user. Iteration order is
    /// unspecified.
    pub async fn get_all(&self) -> Vec<Arc<User>> {
        let _schema = self.schema.read().await;

        self.users
            .iter()
            .chain(self.legacy.iter())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub async fn count(&self) -> u64 {
        self.schema.read().await.user_count
    }

    /// Reads the behaviour seed, fusing it: later additions no longer change
    /// the value, and a still-zero accumulator is replaced with a random one.
    pub async fn behavior_seed(&self) -> u64 {
        self.schema.write().await.seed.fuse()
    }

    /// Evicts stale tier entries. Driven by an external scheduler, typically
    /// every minute.
    pub async fn sweep(&self) {
        let _schema = self.schema.write().await;

        let (minute, hour, day) = self.tiers.sweep(Instant::now());
        self.metrics.set_tier_sizes(minute, hour, day);
        tracing::debug!(minute, hour, day, "swept recency tiers");
    }

    pub fn metrics(&self) -> Snapshot {
        self.metrics.snapshot()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Validator")
            .field("aead_users", &self.users.len())
            .field("legacy_users", &self.legacy.len())
            .finish_non_exhaustive()
    }
}
