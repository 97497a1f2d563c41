/// Lightweight per (cluster, table) query statistics
///
/// Purely observational: recording never fails and growth is bounded by
/// the number of distinct (cluster, table) pairs actually exercised.
/// Writers and snapshot readers may run concurrently; the map is guarded
/// by a mutex whose critical sections never await.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Point-in-time statistics for one (cluster, table) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStat {
    pub cluster: String,
    pub table: String,
    pub count: u64,
    pub total_duration: Duration,
}

#[derive(Debug, Default, Clone)]
struct Entry {
    count: u64,
    total_duration: Duration,
}

/// Concurrent call-count and duration aggregator
#[derive(Debug, Default)]
pub struct StatAggregator {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl StatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one query: count increments, duration accumulates; the
    /// entry is created on first observation.
    pub fn inc_query(&self, cluster: &str, table: &str, elapsed: Duration) {
        let mut entries = self.lock();
        let entry = entries
            .entry((cluster.to_string(), table.to_string()))
            .or_default();
        entry.count += 1;
        entry.total_duration += elapsed;
    }

    /// Point-in-time snapshot, order unspecified
    pub fn snapshot(&self) -> Vec<QueryStat> {
        self.lock()
            .iter()
            .map(|((cluster, table), entry)| QueryStat {
                cluster: cluster.clone(),
                table: table.clone(),
                count: entry.count,
                total_duration: entry.total_duration,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Entry>> {
        // A poisoned map is still a valid map; keep counting.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
