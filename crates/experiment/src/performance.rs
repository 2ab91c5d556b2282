//! Per-serve performance samples and the dashboard aggregation over them.

use event_store::{now_ts, Algorithm, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// One recommendation-serving measurement.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    pub algorithm: Algorithm,
    pub user_id: UserId,
    pub num_recommendations: usize,
    /// Mean catalog rating of the recommended movies.
    pub average_rating: f64,
    /// Serving latency in seconds.
    pub response_time: f64,
    pub diversity_score: f64,
    pub recorded_at: i64,
}

impl PerformanceSample {
    pub fn new(
        algorithm: Algorithm,
        user_id: UserId,
        num_recommendations: usize,
        average_rating: f64,
        response_time: f64,
        diversity_score: f64,
    ) -> Self {
        Self {
            algorithm,
            user_id,
            num_recommendations,
            average_rating,
            response_time,
            diversity_score,
            recorded_at: now_ts(),
        }
    }
}

/// Aggregated per-algorithm statistics for the performance dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlgorithmStats {
    pub avg_rating: f64,
    pub avg_response_time: f64,
    pub avg_diversity: f64,
    pub distinct_users: usize,
    pub total_tests: usize,
}

/// Append-only log of serving measurements.
#[derive(Default)]
pub struct PerformanceLog {
    samples: Mutex<Vec<PerformanceSample>>,
}

impl PerformanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: PerformanceSample) {
        self.samples
            .lock()
            .expect("performance log lock poisoned")
            .push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().expect("performance log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate every sample per algorithm. Algorithms with no samples get
    /// a zeroed entry so the dashboard always shows the full variant set.
    pub fn aggregate(&self) -> BTreeMap<Algorithm, AlgorithmStats> {
        let samples = self.samples.lock().expect("performance log lock poisoned");

        let mut stats: BTreeMap<Algorithm, AlgorithmStats> = Algorithm::ALL
            .into_iter()
            .map(|a| (a, AlgorithmStats::default()))
            .collect();
        let mut users: BTreeMap<Algorithm, HashSet<UserId>> = BTreeMap::new();

        for sample in samples.iter() {
            let entry = stats.entry(sample.algorithm).or_default();
            entry.avg_rating += sample.average_rating;
            entry.avg_response_time += sample.response_time;
            entry.avg_diversity += sample.diversity_score;
            entry.total_tests += 1;
            users
                .entry(sample.algorithm)
                .or_default()
                .insert(sample.user_id);
        }

        for (algorithm, entry) in stats.iter_mut() {
            if entry.total_tests > 0 {
                let n = entry.total_tests as f64;
                entry.avg_rating /= n;
                entry.avg_response_time /= n;
                entry.avg_diversity /= n;
            }
            entry.distinct_users = users.get(algorithm).map(|u| u.len()).unwrap_or(0);
        }
        stats
    }
}
