//! Fixed-window rate limiting keyed by client address
//!
//! Two endpoint classes with independent budgets: `Auth` covers login and
//! the password-reset flow, `Register` covers registration and its OTP
//! request. Windows are fixed, not sliding: the first request from an
//! address opens a window, and the counter resets when it elapses.
//! Expired windows are swept lazily on each check.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Auth,
    Register,
}

impl EndpointClass {
    pub fn label(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Register => "register",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub max: u32,
    pub window: Duration,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    auth: Policy,
    register: Policy,
    windows: Mutex<HashMap<(String, EndpointClass), Window>>,
}

impl RateLimiter {
    pub fn new(auth: Policy, register: Policy) -> Self {
        Self {
            auth,
            register,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn policy(&self, class: EndpointClass) -> Policy {
        match class {
            EndpointClass::Auth => self.auth,
            EndpointClass::Register => self.register,
        }
    }

    /// Record a request from `addr` and report whether it is allowed.
    ///
    /// Denied requests do not extend the window; an address that keeps
    /// hammering a closed window is allowed again as soon as it elapses.
    pub async fn check(&self, addr: &str, class: EndpointClass) -> bool {
        let policy = self.policy(class);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        windows.retain(|(_, c), w| now.duration_since(w.started) < self.policy(*c).window);

        let window = windows
            .entry((addr.to_string(), class))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= policy.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= policy.max {
            debug!(addr, class = class.label(), "rate limit exceeded");
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window: Duration) -> RateLimiter {
        let policy = Policy { max, window };
        RateLimiter::new(policy, policy)
    }

    #[tokio::test]
    async fn allows_up_to_max_then_denies() {
        let limiter = limiter(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
        }
        assert!(!limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(!limiter.check("1.2.3.4", EndpointClass::Auth).await);
    }

    #[tokio::test]
    async fn addresses_have_independent_budgets() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(!limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(limiter.check("5.6.7.8", EndpointClass::Auth).await);
    }

    #[tokio::test]
    async fn classes_have_independent_budgets() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(!limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(limiter.check("1.2.3.4", EndpointClass::Register).await);
    }

    #[tokio::test]
    async fn window_elapse_resets_budget() {
        let limiter = limiter(1, Duration::from_millis(50));
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
        assert!(!limiter.check("1.2.3.4", EndpointClass::Auth).await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
    }

    #[tokio::test]
    async fn denied_requests_do_not_extend_window() {
        let limiter = limiter(1, Duration::from_millis(80));
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);

        // keep hitting the closed window; denials must not push it out
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            limiter.check("1.2.3.4", EndpointClass::Auth).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("1.2.3.4", EndpointClass::Auth).await);
    }
}
