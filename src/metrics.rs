use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::ExecutionStatus;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    submitted_total: AtomicU64,
    overloaded_total: AtomicU64,
    started_total: AtomicU64,
    succeeded_total: AtomicU64,
    user_failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    resource_exceeded_total: AtomicU64,
    cancelled_total: AtomicU64,
    engine_faults_total: AtomicU64,
    queue_depth: AtomicU64,
    running: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overloaded(&self) {
        self.overloaded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) {
        self.started_total.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::Relaxed);
        decrement(&self.queue_depth);
    }

    pub fn finished(&self, status: ExecutionStatus) {
        decrement(&self.running);
        match status {
            ExecutionStatus::Succeeded => {
                self.succeeded_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::CompilationFailed | ExecutionStatus::RuntimeFailed => {
                self.user_failed_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::TimedOut => {
                self.timed_out_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::ResourceExceeded => {
                self.resource_exceeded_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::Cancelled => {
                self.cancelled_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::UnsupportedLanguage => {
                self.user_failed_total.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::InternalError => {
                self.engine_faults_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE engine_submitted_total counter\n",
                "engine_submitted_total {}\n",
                "# TYPE engine_overloaded_total counter\n",
                "engine_overloaded_total {}\n",
                "# TYPE engine_started_total counter\n",
                "engine_started_total {}\n",
                "# TYPE engine_succeeded_total counter\n",
                "engine_succeeded_total {}\n",
                "# TYPE engine_user_failed_total counter\n",
                "engine_user_failed_total {}\n",
                "# TYPE engine_timed_out_total counter\n",
                "engine_timed_out_total {}\n",
                "# TYPE engine_resource_exceeded_total counter\n",
                "engine_resource_exceeded_total {}\n",
                "# TYPE engine_cancelled_total counter\n",
                "engine_cancelled_total {}\n",
                "# TYPE engine_faults_total counter\n",
                "engine_faults_total {}\n",
                "# TYPE engine_queue_depth gauge\n",
                "engine_queue_depth {}\n",
                "# TYPE engine_running gauge\n",
                "engine_running {}\n"
            ),
            self.submitted_total.load(Ordering::Relaxed),
            self.overloaded_total.load(Ordering::Relaxed),
            self.started_total.load(Ordering::Relaxed),
            self.succeeded_total.load(Ordering::Relaxed),
            self.user_failed_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.resource_exceeded_total.load(Ordering::Relaxed),
            self.cancelled_total.load(Ordering::Relaxed),
            self.engine_faults_total.load(Ordering::Relaxed),
            self.queue_depth.load(Ordering::Relaxed),
            self.running.load(Ordering::Relaxed),
        )
    }
}

fn decrement(gauge: &AtomicU64) {
    let mut current = gauge.load(Ordering::Relaxed);
    while current > 0 {
        match gauge.compare_exchange_weak(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}
