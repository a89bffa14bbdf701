use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::authz::RateLimits;

/// Bucket shared by anonymous callers when they are not keyed by origin.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// How anonymous callers are grouped into rate-limit buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymousKey {
    /// Every anonymous caller shares one bucket per action.
    #[default]
    Shared,
    /// Anonymous callers are bucketed by client address, falling back to the
    /// shared bucket when the address is unknown.
    Origin,
}

/// Bucket key for a caller: `user:<id>` when authenticated, otherwise an anonymous key.
pub fn identity_key(user_id: Option<i32>, origin: Option<&str>, mode: AnonymousKey) -> String {
    match (user_id, mode, origin) {
        (Some(id), _, _) => format!("user:{id}"),
        (None, AnonymousKey::Origin, Some(addr)) => format!("{ANONYMOUS_KEY}:{addr}"),
        (None, _, _) => ANONYMOUS_KEY.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    identity: String,
    resource: String,
    action: String,
}

impl WindowKey {
    fn new(identity: &str, resource: &str, action: &str) -> Self {
        Self {
            identity: identity.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: Instant,
}

/// Fixed-window request counter per (identity, resource, action).
///
/// Each check-and-increment runs under the map entry's shard lock, so
/// concurrent checks on one key never lose or double count, while unrelated
/// keys usually land on different shards.
pub struct RateLimiter {
    windows: DashMap<WindowKey, Window>,
    limits: RateLimits,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limits: RateLimits, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limits,
            window,
        }
    }

    /// Count this request and report whether it fits in the current window.
    /// Actions without a configured limit are always allowed and leave no state.
    pub fn is_allowed(&self, identity: &str, resource: &str, action: &str) -> bool {
        let Some(limit) = self.limits.limit(resource, action) else {
            return true;
        };

        let now = Instant::now();
        let mut window = self
            .windows
            .entry(WindowKey::new(identity, resource, action))
            .or_insert(Window {
                count: 0,
                started_at: now,
            });

        if now.duration_since(window.started_at) >= self.window {
            window.count = 0;
            window.started_at = now;
        }
        window.count = window.count.saturating_add(1);

        window.count <= limit
    }

    /// Requests counted in the key's current window record.
    pub fn count(&self, identity: &str, resource: &str, action: &str) -> u32 {
        self.windows
            .get(&WindowKey::new(identity, resource, action))
            .map(|w| w.count)
            .unwrap_or(0)
    }

    /// Drop windows whose period has elapsed. They would be reset on next use anyway.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let live = now.duration_since(window.started_at) < self.window;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimits::new().with_limit("auth", "login", limit), MINUTE)
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_window_reset() {
        let limiter = limiter(3);

        for _ in 0..3 {
            assert!(limiter.is_allowed("anonymous", "auth", "login"));
        }
        assert!(!limiter.is_allowed("anonymous", "auth", "login"));
        assert_eq!(limiter.count("anonymous", "auth", "login"), 4);

        tokio::time::advance(MINUTE).await;

        assert!(limiter.is_allowed("anonymous", "auth", "login"));
        assert_eq!(limiter.count("anonymous", "auth", "login"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_fixed_not_sliding() {
        let limiter = limiter(2);

        assert!(limiter.is_allowed("user:1", "auth", "login"));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(limiter.is_allowed("user:1", "auth", "login"));
        assert!(!limiter.is_allowed("user:1", "auth", "login"));

        // The window opened by the first call ends here, not 60s after the last call
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.is_allowed("user:1", "auth", "login"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1);

        assert!(limiter.is_allowed("user:1", "auth", "login"));
        assert!(!limiter.is_allowed("user:1", "auth", "login"));
        assert!(limiter.is_allowed("user:2", "auth", "login"));
        assert!(limiter.is_allowed("anonymous", "auth", "login"));
    }

    #[test]
    fn test_unlimited_action_leaves_no_state() {
        let limiter = limiter(1);

        for _ in 0..10 {
            assert!(limiter.is_allowed("user:1", "product", "getProductByCode"));
        }
        assert_eq!(limiter.count("user:1", "product", "getProductByCode"), 0);
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        const LIMIT: u32 = 10;
        const CALLS: usize = 64;

        let limiter = Arc::new(limiter(LIMIT));
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLS));

        let handles: Vec<_> = (0..CALLS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    limiter.is_allowed("anonymous", "auth", "login")
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, LIMIT as usize);
        assert_eq!(limiter.count("anonymous", "auth", "login"), CALLS as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_elapsed_windows() {
        let limiter = limiter(5);

        limiter.is_allowed("user:1", "auth", "login");
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.is_allowed("user:2", "auth", "login");
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_windows(), 1);
        assert_eq!(limiter.count("user:1", "auth", "login"), 0);
        assert_eq!(limiter.count("user:2", "auth", "login"), 1);
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key(Some(7), Some("10.0.0.1"), AnonymousKey::Origin), "user:7");
        assert_eq!(identity_key(None, Some("10.0.0.1"), AnonymousKey::Shared), "anonymous");
        assert_eq!(
            identity_key(None, Some("10.0.0.1"), AnonymousKey::Origin),
            "anonymous:10.0.0.1"
        );
        assert_eq!(identity_key(None, None, AnonymousKey::Origin), "anonymous");
    }
}
