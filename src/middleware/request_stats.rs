use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window for the recent server-error count
pub const ERROR_WINDOW: Duration = Duration::from_secs(60 * 60);

/// In-process request counters read by the system health report.
pub struct RequestStats {
    started: Instant,
    requests: AtomicU64,
    server_errors: AtomicU64,
    recent_errors: Mutex<VecDeque<Instant>>,
}

static STATS: Lazy<RequestStats> = Lazy::new(RequestStats::new);

impl RequestStats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            recent_errors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn global() -> &'static RequestStats {
        &STATS
    }

    pub fn record(&self, status: u16) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
            let now = Instant::now();
            if let Ok(mut recent) = self.recent_errors.lock() {
                recent.push_back(now);
                prune(&mut recent, now);
            }
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// 5xx responses since startup
    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// 5xx responses within the last hour
    pub fn recent_server_errors(&self) -> u64 {
        match self.recent_errors.lock() {
            Ok(mut recent) => {
                prune(&mut recent, Instant::now());
                recent.len() as u64
            }
            Err(_) => 0,
        }
    }

    /// Requests per minute averaged over the process lifetime
    pub fn requests_per_minute(&self) -> f64 {
        per_minute(self.total_requests(), self.uptime_secs())
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = recent.front() {
        if now.duration_since(*front) > ERROR_WINDOW {
            recent.pop_front();
        } else {
            break;
        }
    }
}

fn per_minute(count: u64, uptime_secs: u64) -> f64 {
    let minutes = (uptime_secs as f64 / 60.0).max(1.0);
    ((count as f64 / minutes) * 100.0).round() / 100.0
}

pub async fn request_stats_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    RequestStats::global().record(response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_uses_at_least_one_minute() {
        assert_eq!(per_minute(30, 10), 30.0);
        assert_eq!(per_minute(120, 120), 60.0);
        assert_eq!(per_minute(10, 180), 3.33);
    }

    #[test]
    fn counts_server_errors() {
        let stats = RequestStats::new();
        stats.record(503);
        stats.record(200);
        stats.record(404);
        assert_eq!(stats.total_requests(), 3);
        assert_eq!(stats.server_errors(), 1);
        assert_eq!(stats.recent_server_errors(), 1);
    }

    #[test]
    fn old_errors_fall_out_of_the_window() {
        let now = Instant::now();
        let mut recent = VecDeque::new();
        if let Some(old) = now.checked_sub(ERROR_WINDOW + Duration::from_secs(5)) {
            recent.push_back(old);
        }
        recent.push_back(now);
        prune(&mut recent, now);
        assert_eq!(recent.len(), 1);
    }
}
