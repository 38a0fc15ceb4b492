// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

pub(crate) const MINUTE_TTL: Duration = Duration::from_secs(11 * 60);
pub(crate) const HOUR_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub(crate) const DAY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Last-seen timestamps at three granularities, keyed by lowercase email.
///
/// The tiers order candidates during lookup; they never decide a match, so a
/// momentarily stale entry only costs wasted trial decryptions. Writes happen
/// under the validator's read lock (cells are individually concurrent-safe);
/// the sweep runs under the write lock.
///
/// Invariant: minute ⊆ hour ⊆ day. Promotion inserts into all three and the
/// sweep evicts colder tiers transitively, so the inclusion holds after any
/// single sweep.
#[derive(Debug, Default)]
pub(crate) struct Tiers {
    pub(crate) minute: DashMap<String, Instant>,
    pub(crate) hour: DashMap<String, Instant>,
    pub(crate) day: DashMap<String, Instant>,
}

impl Tiers {
    /// Promotes `email` into all three tiers. Last write wins; concurrent
    /// promotions of the same user are idempotent.
    pub(crate) fn touch(&self, email: &str, now: Instant) {
        self.minute.insert(email.to_owned(), now);
        self.hour.insert(email.to_owned(), now);
        self.day.insert(email.to_owned(), now);
    }

    pub(crate) fn remove(&self, email: &str) {
        self.minute.remove(email);
        self.hour.remove(email);
        self.day.remove(email);
    }

    /// Evicts expired entries and returns the tier sizes after the pass.
    pub(crate) fn sweep(&self, now: Instant) -> (usize, usize, usize) {
        self.day.retain(|email, seen| {
            let keep = now.duration_since(*seen) <= DAY_TTL;
            if !keep {
                self.hour.remove(email);
                self.minute.remove(email);
            }
            keep
        });
        self.hour.retain(|email, seen| {
            let keep = now.duration_since(*seen) <= HOUR_TTL;
            if !keep {
                self.minute.remove(email);
            }
            keep
        });
        self.minute
            .retain(|_, seen| now.duration_since(*seen) <= MINUTE_TTL);

        (self.minute.len(), self.hour.len(), self.day.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_tier_by_tier() {
        let tiers = Tiers::default();
        tiers.touch("bob@example.com", Instant::now());

        tokio::time::advance(MINUTE_TTL + Duration::from_secs(60)).await;
        tiers.sweep(Instant::now());
        assert!(!tiers.minute.contains_key("bob@example.com"));
        assert!(tiers.hour.contains_key("bob@example.com"));
        assert!(tiers.day.contains_key("bob@example.com"));

        tokio::time::advance(HOUR_TTL).await;
        tiers.sweep(Instant::now());
        assert!(!tiers.hour.contains_key("bob@example.com"));
        assert!(tiers.day.contains_key("bob@example.com"));

        tokio::time::advance(DAY_TTL).await;
        let sizes = tiers.sweep(Instant::now());
        assert!(!tiers.day.contains_key("bob@example.com"));
        assert_eq!(sizes, (0, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn single_sweep_preserves_inclusion() {
        let tiers = Tiers::default();
        tiers.touch("idle@example.com", Instant::now());

        // one sweep after a long idle period must not leave the entry in a
        // hotter tier than a colder one
        tokio::time::advance(DAY_TTL + Duration::from_secs(1)).await;
        tiers.sweep(Instant::now());

        for tier in [&tiers.minute, &tiers.hour, &tiers.day] {
            assert!(tier.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_entries_survive() {
        let tiers = Tiers::default();
        tiers.touch("bob@example.com", Instant::now());

        tokio::time::advance(MINUTE_TTL).await;
        tiers.touch("bob@example.com", Instant::now());

        tokio::time::advance(Duration::from_secs(60)).await;
        tiers.sweep(Instant::now());
        assert!(tiers.minute.contains_key("bob@example.com"));
    }
}
