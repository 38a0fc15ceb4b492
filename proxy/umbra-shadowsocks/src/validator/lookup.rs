// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{
    probe::{probe, Probe},
    Command, Error, Match, Validator,
};
use crate::user::User;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Semaphore},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

// AEAD matching needs at least a 16-byte salt plus the 18-byte length frame;
// anything shorter can only be a legacy request.
pub(crate) const MIN_AEAD_PREFIX: usize = 32;

// At or above the pass limit the scan fans out, with the limit as the batch
// size. Test builds shrink the limits so both shapes run against small
// populations.
pub(crate) const SCAN_LIMITS: [usize; 4] = if cfg!(test) {
    [4, 6, 8, 12]
} else {
    [3000, 5000, 7000, 14000]
};

const MAX_SCAN_WORKERS: usize = 8;

pub(crate) fn worker_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_SCAN_WORKERS)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Minute,
    Hour,
    Day,
    Full,
}

impl Pass {
    const ALL: [Pass; 4] = [Pass::Minute, Pass::Hour, Pass::Day, Pass::Full];

    #[inline]
    fn scan_limit(self) -> usize {
        SCAN_LIMITS[self as usize]
    }
}

impl Validator {
    /// Identifies the sender of `prefix` and returns the context needed to
    /// decrypt the rest of the stream or datagram.
    ///
    /// Candidates are tried hottest tier first (minute, hour, day, then the
    /// remaining population), each user at most once per lookup. A match is
    /// promoted into all three tiers. A replayed IV does not hide the match:
    /// it is reported in [`Match::iv_check`] so the caller can attribute the
    /// replay before rejecting the request.
    ///
    /// Prefixes under 32 bytes cannot carry an AEAD salt and length frame and
    /// fall back to the first legacy (non-AEAD) user, with no IV
    /// verification.
    pub async fn lookup(&self, prefix: &[u8], command: Command) -> Result<Match, Error> {
        let _schema = self.schema.read().await;

        if prefix.len() < MIN_AEAD_PREFIX {
            return self.legacy_fallback();
        }

        for pass in Pass::ALL {
            let candidates = self.candidates(pass);
            let found = if candidates.len() < pass.scan_limit() {
                self.scan_sequential(&candidates, prefix, command)
            } else {
                self.scan_parallel(candidates, prefix, command, pass.scan_limit())
                    .await
            };

            let Some((user, probe)) = found else {
                continue;
            };

            let iv_check = user.check_iv(&prefix[..probe.iv_len]);
            if iv_check.is_err() {
                self.metrics.record_replay();
                tracing::warn!(user = %user.email(), "matched user presented a replayed IV");
            }
            self.tiers.touch(&user.registry_key(), Instant::now());
            match pass {
                Pass::Minute => self.metrics.record_minute_hit(),
                Pass::Hour => self.metrics.record_hour_hit(),
                Pass::Day => self.metrics.record_day_hit(),
                Pass::Full => self.metrics.record_full_scan_hit(),
            }

            return Ok(Match {
                iv_len: probe.iv_len,
                opener: Some(probe.opener),
                payload: probe.payload,
                iv_check,
                user,
            });
        }

        self.metrics.record_miss();
        Err(Error::NotFound)
    }

    // Legacy accounts carry no authenticator, so any of them "matches"; IV
    // validation is left to the caller. Kept for null-cipher support and
    // logged because it is security-sensitive.
    fn legacy_fallback(&self) -> Result<Match, Error> {
        let Some(user) = self
            .legacy
            .iter()
            .next()
            .map(|entry| Arc::clone(entry.value()))
        else {
            self.metrics.record_miss();
            return Err(Error::NotFound);
        };

        self.metrics.record_legacy_fallback();
        tracing::warn!(
            user = %user.email(),
            "short prefix matched by legacy fallback without IV verification"
        );

        Ok(Match {
            iv_len: user.cipher().iv_len(),
            opener: None,
            payload: Vec::new(),
            iv_check: Ok(()),
            user,
        })
    }

    // Snapshots the candidate set for a pass. Users already covered by a
    // hotter tier are excluded, bounding a whole lookup at one trial
    // decryption per AEAD user.
    fn candidates(&self, pass: Pass) -> Vec<Arc<User>> {
        let load = |email: &String| self.users.get(email).map(|user| Arc::clone(user.value()));
        match pass {
            Pass::Minute => self
                .tiers
                .minute
                .iter()
                .filter_map(|entry| load(entry.key()))
                .collect(),
            Pass::Hour => self
                .tiers
                .hour
                .iter()
                .filter(|entry| !self.tiers.minute.contains_key(entry.key()))
                .filter_map(|entry| load(entry.key()))
                .collect(),
            Pass::Day => self
                .tiers
                .day
                .iter()
                .filter(|entry| !self.tiers.hour.contains_key(entry.key()))
                .filter_map(|entry| load(entry.key()))
                .collect(),
            Pass::Full => self
                .users
                .iter()
                .filter(|entry| !self.tiers.day.contains_key(entry.key()))
                .map(|entry| Arc::clone(entry.value()))
                .collect(),
        }
    }

    fn scan_sequential(
        &self,
        candidates: &[Arc<User>],
        prefix: &[u8],
        command: Command,
    ) -> Option<(Arc<User>, Probe)> {
        candidates.iter().find_map(|user| {
            probe(user, prefix, command, &self.scratch).map(|found| (Arc::clone(user), found))
        })
    }

    // Fans the candidate set out to batch workers. One cancellation token and
    // a single-slot mailbox give exactly-once delivery: the first worker to
    // match delivers and cancels; everyone else backs off at the next
    // candidate boundary.
    async fn scan_parallel(
        &self,
        candidates: Vec<Arc<User>>,
        prefix: &[u8],
        command: Command,
        batch_size: usize,
    ) -> Option<(Arc<User>, Probe)> {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(Arc<User>, Probe)>(1);
        let permits = Arc::new(Semaphore::new(worker_limit()));
        let prefix: Arc<[u8]> = Arc::from(prefix);

        for chunk in candidates.chunks(batch_size) {
            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let batch = chunk.to_vec();
            let tx = tx.clone();
            let token = token.clone();
            let prefix = prefix.clone();
            let scratch = self.scratch.clone();
            tokio::spawn(async move {
                let _permit = permit;
                for user in batch {
                    if token.is_cancelled() {
                        return;
                    }
                    if let Some(found) = probe(&user, &prefix, command, &scratch) {
                        // a full slot means another worker already delivered
                        if tx.try_send((user, found)).is_ok() {
                            token.cancel();
                        }
                        return;
                    }
                }
            });
        }
        drop(tx);

        // `None` here means every worker hung up without delivering
        let result = rx.recv().await;
        token.cancel();
        result
    }
}
