//! Process-local counters backing `GET /health`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

/// Shared request/error/cache-hit counters. Cheap atomic increments.
pub struct ProxyStats {
    started: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_minutes(&self) -> u64 {
        self.started.elapsed().as_secs() / 60
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn cache_hit_count(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory footprint of the current process.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct MemoryReport {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

/// Sample the current process memory. Zeroes when the process cannot be
/// inspected.
pub fn memory_report() -> MemoryReport {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return MemoryReport::default();
    };
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => MemoryReport {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => MemoryReport::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ProxyStats::new();
        stats.record_request();
        stats.record_request();
        stats.record_error();
        stats.record_cache_hit();
        assert_eq!(stats.request_count(), 2);
        assert_eq!(stats.error_count(), 1);
        assert_eq!(stats.cache_hit_count(), 1);
    }

    #[test]
    fn test_memory_report_sees_this_process() {
        let report = memory_report();
        assert!(report.rss_bytes > 0);
    }
}
