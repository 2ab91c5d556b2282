//! The experiment ledger: one mutable counter row per (user, variant).
//!
//! Rows are the only frequently-contended shared mutable state in the core,
//! so every mutation is an atomic increment-and-recompute scoped to one row:
//! the counter bump and the derived-rate refresh happen inside the map
//! entry's lock, never as a read-modify-write across two round trips.
//!
//! Lock order is ledger row first, then the event store's read lock. The
//! store never takes a ledger lock, so the order cannot invert.

use dashmap::DashMap;
use event_store::{now_ts, Algorithm, EventStore, UserId};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Counters and synchronously-derived rates for one (user, variant) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRow {
    pub shown: u64,
    pub clicked: u64,
    pub rated: u64,
    /// clicked / shown x 100; 0 when nothing was shown.
    pub ctr: f64,
    /// rated / shown x 100; 0 when nothing was shown.
    pub conversion_rate: f64,
    /// Mean of the user's ratings attributed to this variant.
    pub avg_rating_given: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ExperimentRow {
    fn new() -> Self {
        let ts = now_ts();
        Self {
            shown: 0,
            clicked: 0,
            rated: 0,
            ctr: 0.0,
            conversion_rate: 0.0,
            avg_rating_given: 0.0,
            created_at: ts,
            updated_at: ts,
        }
    }
}

/// Per-user per-variant counter store backing the A/B metrics.
pub struct ExperimentLedger {
    rows: DashMap<(UserId, Algorithm), ExperimentRow>,
    store: Arc<RwLock<EventStore>>,
}

impl ExperimentLedger {
    pub fn new(store: Arc<RwLock<EventStore>>) -> Self {
        Self {
            rows: DashMap::new(),
            store,
        }
    }

    /// Record that `count` recommendations were shown to the user under the
    /// variant. First touch creates the row with zero counters.
    pub fn record_shown(&self, user_id: UserId, variant: Algorithm, count: u64) {
        self.mutate(user_id, variant, |row| row.shown += count);
    }

    /// Record a click on a recommended item.
    pub fn record_clicked(&self, user_id: UserId, variant: Algorithm) {
        self.mutate(user_id, variant, |row| row.clicked += 1);
    }

    /// Record that the user rated a recommended item.
    pub fn record_rated(&self, user_id: UserId, variant: Algorithm) {
        self.mutate(user_id, variant, |row| row.rated += 1);
    }

    /// Refresh a row's derived fields without bumping any counter (used
    /// when a re-rate changes the attributed ratings but not the counts).
    pub fn touch(&self, user_id: UserId, variant: Algorithm) {
        self.mutate(user_id, variant, |_| {});
    }

    fn mutate<F: FnOnce(&mut ExperimentRow)>(&self, user_id: UserId, variant: Algorithm, f: F) {
        let mut row = self
            .rows
            .entry((user_id, variant))
            .or_insert_with(ExperimentRow::new);
        f(&mut row);
        self.recompute(user_id, variant, &mut row);
        debug!(
            user_id,
            variant = %variant,
            shown = row.shown,
            clicked = row.clicked,
            rated = row.rated,
            "ledger row updated"
        );
    }

    /// Refresh the derived fields from the current counters and the
    /// authoritative rating records. Derived values are never settable and
    /// never stored stale.
    fn recompute(&self, user_id: UserId, variant: Algorithm, row: &mut ExperimentRow) {
        if row.shown > 0 {
            row.ctr = row.clicked as f64 / row.shown as f64 * 100.0;
            row.conversion_rate = row.rated as f64 / row.shown as f64 * 100.0;
        } else {
            row.ctr = 0.0;
            row.conversion_rate = 0.0;
        }

        // Re-derived from the rating store every time, not incrementally
        // maintained, so re-rates and tag changes can never drift it.
        let ratings = {
            let store = self.store.read().expect("event store lock poisoned");
            store.ratings_for_variant(user_id, variant)
        };
        row.avg_rating_given = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|&r| r as f64).sum::<f64>() / ratings.len() as f64
        };

        row.updated_at = now_ts();
    }

    /// Snapshot of one row, if the pair has ever been touched.
    pub fn row(&self, user_id: UserId, variant: Algorithm) -> Option<ExperimentRow> {
        self.rows
            .get(&(user_id, variant))
            .map(|r| r.value().clone())
    }

    /// Snapshot of every row, sorted by (user, variant) for stable output.
    pub fn all_rows(&self) -> Vec<((UserId, Algorithm), ExperimentRow)> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        rows.sort_by_key(|(key, _)| *key);
        rows
    }
}
