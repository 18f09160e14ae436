use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::session::SessionRegistry;
use crate::storage::Storage;

/// Simple per-IP rate limiter
pub struct RateLimiter {
    /// Maps IP → (request count, window start)
    limits: DashMap<String, (u32, Instant)>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            limits: DashMap::new(),
            max_requests,
            window_secs,
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    pub fn check(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.limits.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();
        if now.duration_since(*window_start).as_secs() >= self.window_secs {
            // Reset window
            *count = 1;
            *window_start = now;
            true
        } else if *count < self.max_requests {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Periodically clean up old entries (call from a background task)
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.limits.retain(|_, (_, start)| {
            now.duration_since(*start).as_secs() < self.window_secs * 2
        });
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub sessions: SessionRegistry,
    /// Rate limiter for admin login and setup
    pub auth_rate_limiter: Arc<RateLimiter>,
    /// Required in setup requests when configured
    pub setup_key: Option<Arc<str>>,
    /// Held for the whole check-then-create of the first admin
    pub setup_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        sessions: SessionRegistry,
        auth_requests_per_minute: u32,
        setup_key: Option<String>,
    ) -> Self {
        Self {
            storage,
            sessions,
            auth_rate_limiter: Arc::new(RateLimiter::new(auth_requests_per_minute, 60)),
            setup_key: setup_key.map(Arc::from),
            setup_lock: Arc::new(Mutex::new(())),
        }
    }
}
