//! Thread-safe metrics collection
//!
//! Atomic counters for high-frequency dispatch events and mutex-protected
//! collections for per-stage timings. A single global collector is shared by
//! every dispatcher in the process.

use crate::protocol::messages::TicketStatus;
use crate::protocol::stages::StageId;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Ticket outcomes
    tickets_received: AtomicU64,
    tickets_in_flight: AtomicU64,
    tickets_resolved: AtomicU64,
    tickets_needing_review: AtomicU64,
    tickets_escalated: AtomicU64,
    tickets_failed: AtomicU64,

    // Routing activity
    hops: AtomicU64,
    route_mutations: AtomicU64,
    refinements: AtomicU64,
    stage_fallbacks: AtomicU64,
    contract_violations: AtomicU64,

    ticket_durations: Mutex<Vec<u64>>, // milliseconds
    stage_stats: Mutex<HashMap<StageId, StageStats>>,
    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tickets_received: AtomicU64::new(0),
            tickets_in_flight: AtomicU64::new(0),
            tickets_resolved: AtomicU64::new(0),
            tickets_needing_review: AtomicU64::new(0),
            tickets_escalated: AtomicU64::new(0),
            tickets_failed: AtomicU64::new(0),
            hops: AtomicU64::new(0),
            route_mutations: AtomicU64::new(0),
            refinements: AtomicU64::new(0),
            stage_fallbacks: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
            ticket_durations: Mutex::new(Vec::new()),
            stage_stats: Mutex::new(HashMap::new()),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn ticket_received(&self) {
        self.tickets_received.fetch_add(1, Ordering::Relaxed);
        self.tickets_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a ticket that reached the end of its route
    pub fn ticket_finished(&self, status: TicketStatus, duration: Duration) {
        let counter = match status {
            TicketStatus::Resolved => &self.tickets_resolved,
            TicketStatus::NeedsReview => &self.tickets_needing_review,
            TicketStatus::Escalated => &self.tickets_escalated,
            TicketStatus::Failed => &self.tickets_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.leave_flight();
        self.record_duration(duration);
    }

    /// Record a ticket aborted by a structural error
    pub fn ticket_failed(&self, duration: Duration) {
        self.ticket_finished(TicketStatus::Failed, duration);
    }

    fn leave_flight(&self) {
        // Never wraps below zero, even after a reset with tickets in flight
        let _ = self
            .tickets_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    fn record_duration(&self, duration: Duration) {
        if let Ok(mut durations) = self.ticket_durations.lock() {
            push_bounded(&mut durations, duration.as_millis() as u64);
        }
    }

    pub fn hop(&self) {
        self.hops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_mutated(&self) {
        self.route_mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refinement(&self) {
        self.refinements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contract_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one stage invocation
    pub fn stage_invoked(&self, stage: StageId, duration: Duration, outcome: StageOutcome) {
        if outcome == StageOutcome::Fallback {
            self.stage_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut stats) = self.stage_stats.lock() {
            let entry = stats.entry(stage).or_default();
            entry.invocations += 1;
            match outcome {
                StageOutcome::Ok => {}
                StageOutcome::Fallback => entry.fallbacks += 1,
                StageOutcome::Failed => entry.failures += 1,
            }
            entry.last_invocation = current_timestamp();
            push_bounded(&mut entry.durations, duration.as_millis() as u64);
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.tickets_received,
            &self.tickets_in_flight,
            &self.tickets_resolved,
            &self.tickets_needing_review,
            &self.tickets_escalated,
            &self.tickets_failed,
            &self.hops,
            &self.route_mutations,
            &self.refinements,
            &self.stage_fallbacks,
            &self.contract_violations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.started_at.store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut durations) = self.ticket_durations.lock() {
            durations.clear();
        }
        if let Ok(mut stats) = self.stage_stats.lock() {
            stats.clear();
        }
    }

    fn duration_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(durations) = self.ticket_durations.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if durations.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }
        let mut sorted = durations.clone();
        sorted.sort_unstable();

        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    fn stage_snapshots(&self) -> HashMap<String, StageStatsSnapshot> {
        let Ok(stats) = self.stage_stats.lock() else {
            return HashMap::new();
        };
        stats
            .iter()
            .map(|(stage, s)| (stage.as_str().to_string(), s.snapshot()))
            .collect()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.duration_statistics();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            tickets: TicketMetrics {
                received: load(&self.tickets_received),
                in_flight: load(&self.tickets_in_flight),
                resolved: load(&self.tickets_resolved),
                needs_review: load(&self.tickets_needing_review),
                escalated: load(&self.tickets_escalated),
                failed: load(&self.tickets_failed),
                avg_duration_ms: avg,
                duration_p50_ms: p50,
                duration_p95_ms: p95,
                duration_p99_ms: p99,
            },
            routing: RoutingMetrics {
                hops: load(&self.hops),
                route_mutations: load(&self.route_mutations),
                refinements: load(&self.refinements),
                stage_fallbacks: load(&self.stage_fallbacks),
                contract_violations: load(&self.contract_violations),
            },
            stages: self.stage_snapshots(),
            uptime_seconds: now.saturating_sub(load(&self.started_at)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// How a stage invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    /// Recoverable failure replaced by the stage's fallback
    Fallback,
    /// Fatal failure or contract violation
    Failed,
}

#[derive(Debug, Default)]
struct StageStats {
    invocations: u64,
    fallbacks: u64,
    failures: u64,
    durations: Vec<u64>, // milliseconds
    last_invocation: u64,
}

impl StageStats {
    fn snapshot(&self) -> StageStatsSnapshot {
        let avg_duration_ms = if self.durations.is_empty() {
            0.0
        } else {
            self.durations.iter().sum::<u64>() as f64 / self.durations.len() as f64
        };
        let success_rate = if self.invocations == 0 {
            0.0
        } else {
            (self.invocations - self.fallbacks - self.failures) as f64 / self.invocations as f64
        };
        StageStatsSnapshot {
            invocations: self.invocations,
            fallbacks: self.fallbacks,
            failures: self.failures,
            avg_duration_ms,
            success_rate,
            last_invocation: self.last_invocation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tickets: TicketMetrics,
    pub routing: RoutingMetrics,
    pub stages: HashMap<String, StageStatsSnapshot>,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TicketMetrics {
    pub received: u64,
    pub in_flight: u64,
    pub resolved: u64,
    pub needs_review: u64,
    pub escalated: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub duration_p50_ms: f64,
    pub duration_p95_ms: f64,
    pub duration_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct RoutingMetrics {
    pub hops: u64,
    pub route_mutations: u64,
    pub refinements: u64,
    pub stage_fallbacks: u64,
    pub contract_violations: u64,
}

#[derive(Debug, Serialize)]
pub struct StageStatsSnapshot {
    pub invocations: u64,
    pub fallbacks: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    pub last_invocation: u64,
}

fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;

    lower + (upper - lower) * index.fract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ticket_metrics() {
        let collector = MetricsCollector::new();

        collector.ticket_received();
        collector.ticket_received();
        collector.ticket_finished(TicketStatus::Escalated, Duration::from_millis(40));
        collector.ticket_failed(Duration::from_millis(20));

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tickets.received, 2);
        assert_eq!(metrics.tickets.in_flight, 0);
        assert_eq!(metrics.tickets.escalated, 1);
        assert_eq!(metrics.tickets.failed, 1);
        assert!((metrics.tickets.avg_duration_ms - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stage_metrics() {
        let collector = MetricsCollector::new();

        collector.stage_invoked(StageId::SentimentAnalyzer, Duration::from_millis(4), StageOutcome::Ok);
        collector.stage_invoked(
            StageId::SentimentAnalyzer,
            Duration::from_millis(6),
            StageOutcome::Fallback,
        );

        let metrics = collector.get_metrics();
        let stats = &metrics.stages["sentiment-analyzer"];
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(metrics.routing.stage_fallbacks, 1);
    }

    #[test]
    fn test_in_flight_never_underflows() {
        let collector = MetricsCollector::new();
        collector.ticket_failed(Duration::ZERO);
        assert_eq!(collector.get_metrics().tickets.in_flight, 0);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.hop();
                        collector.route_mutated();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.routing.hops, 1000);
        assert_eq!(metrics.routing.route_mutations, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 95.0) - 9.55).abs() < 0.1);
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_duration_samples_are_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..1500 {
            collector.ticket_finished(TicketStatus::Resolved, Duration::from_millis(i));
        }
        let len = collector.ticket_durations.lock().unwrap().len();
        assert_eq!(len, MAX_SAMPLES);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.ticket_received();
        collector.refinement();
        collector.stage_invoked(StageId::ResponseRefiner, Duration::ZERO, StageOutcome::Ok);

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tickets.received, 0);
        assert_eq!(metrics.routing.refinements, 0);
        assert!(metrics.stages.is_empty());
    }
}
