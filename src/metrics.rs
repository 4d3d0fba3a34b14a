use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const HIGHEST_TRACKABLE_MICROS: u64 = 60_000_000; // one minute
const SIGNIFICANT_FIGURES: u8 = 3;

/// Engine-wide metrics: counters plus an action-latency histogram.
#[derive(Debug)]
pub struct EngineMetrics {
    // Session lifecycle
    pub sessions_started: AtomicU64,
    pub sessions_finished: AtomicU64,

    // Action handling
    pub actions_accepted: AtomicU64,
    pub actions_invalid: AtomicU64,
    pub actions_phase_closed: AtomicU64,
    pub actions_busy: AtomicU64,
    pub actions_conflict: AtomicU64,
    pub actions_failed_internal: AtomicU64,

    // Phase transitions, by trigger
    pub transitions_timer: AtomicU64,
    pub transitions_sweep: AtomicU64,
    pub transitions_early: AtomicU64,
    pub transitions_recovered: AtomicU64,
    pub transition_failures: AtomicU64,

    // Push layer
    pub events_published: AtomicU64,
    pub pushes_sent: AtomicU64,
    pub pushes_dropped: AtomicU64,
    pub active_subscriptions: AtomicU64,

    // Rate limiting
    pub rate_limit_rejections: AtomicU64,

    /// Wall time of action handling before the constant-time floor is
    /// applied.
    action_latency: Mutex<Option<Histogram<u64>>>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(
            LOWEST_DISCERNIBLE_MICROS,
            HIGHEST_TRACKABLE_MICROS,
            SIGNIFICANT_FIGURES,
        )
        .ok();
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_finished: AtomicU64::new(0),
            actions_accepted: AtomicU64::new(0),
            actions_invalid: AtomicU64::new(0),
            actions_phase_closed: AtomicU64::new(0),
            actions_busy: AtomicU64::new(0),
            actions_conflict: AtomicU64::new(0),
            actions_failed_internal: AtomicU64::new(0),
            transitions_timer: AtomicU64::new(0),
            transitions_sweep: AtomicU64::new(0),
            transitions_early: AtomicU64::new(0),
            transitions_recovered: AtomicU64::new(0),
            transition_failures: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            pushes_sent: AtomicU64::new(0),
            pushes_dropped: AtomicU64::new(0),
            active_subscriptions: AtomicU64::new(0),
            rate_limit_rejections: AtomicU64::new(0),
            action_latency: Mutex::new(histogram),
        }
    }

    pub fn record_action_latency(&self, elapsed: Duration) {
        let micros = (elapsed.as_micros() as u64).clamp(1, HIGHEST_TRACKABLE_MICROS);
        if let Ok(mut guard) = self.action_latency.lock() {
            if let Some(histogram) = guard.as_mut() {
                // Saturating record; the clamp above keeps values in range.
                let _ = histogram.record(micros);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self
            .action_latency
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(LatencyPercentiles::from_histogram));

        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            sessions: SessionMetrics {
                started: self.sessions_started.load(Ordering::Relaxed),
                finished: self.sessions_finished.load(Ordering::Relaxed),
            },
            actions: ActionMetrics {
                accepted: self.actions_accepted.load(Ordering::Relaxed),
                invalid: self.actions_invalid.load(Ordering::Relaxed),
                phase_closed: self.actions_phase_closed.load(Ordering::Relaxed),
                busy: self.actions_busy.load(Ordering::Relaxed),
                conflict: self.actions_conflict.load(Ordering::Relaxed),
                failed_internal: self.actions_failed_internal.load(Ordering::Relaxed),
                latency_micros: latency,
            },
            transitions: TransitionMetrics {
                timer: self.transitions_timer.load(Ordering::Relaxed),
                sweep: self.transitions_sweep.load(Ordering::Relaxed),
                early: self.transitions_early.load(Ordering::Relaxed),
                recovered: self.transitions_recovered.load(Ordering::Relaxed),
                failures: self.transition_failures.load(Ordering::Relaxed),
            },
            push: PushMetrics {
                events_published: self.events_published.load(Ordering::Relaxed),
                sent: self.pushes_sent.load(Ordering::Relaxed),
                dropped: self.pushes_dropped.load(Ordering::Relaxed),
                active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            },
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub sessions: SessionMetrics,
    pub actions: ActionMetrics,
    pub transitions: TransitionMetrics,
    pub push: PushMetrics,
    pub rate_limit_rejections: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionMetrics {
    pub started: u64,
    pub finished: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ActionMetrics {
    pub accepted: u64,
    pub invalid: u64,
    pub phase_closed: u64,
    pub busy: u64,
    pub conflict: u64,
    pub failed_internal: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_micros: Option<LatencyPercentiles>,
}

#[derive(Debug, Serialize, Clone)]
pub struct TransitionMetrics {
    pub timer: u64,
    pub sweep: u64,
    pub early: u64,
    pub recovered: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct PushMetrics {
    pub events_published: u64,
    pub sent: u64,
    pub dropped: u64,
    pub active_subscriptions: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct LatencyPercentiles {
    pub count: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

impl LatencyPercentiles {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        Self {
            count: histogram.len(),
            p50: histogram.value_at_quantile(0.50),
            p95: histogram.value_at_quantile(0.95),
            p99: histogram.value_at_quantile(0.99),
            max: histogram.max(),
        }
    }
}
