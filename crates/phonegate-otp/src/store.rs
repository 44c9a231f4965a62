//! In-memory challenge store with lazy expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Challenge lifetime.
pub const OTP_TTL: Duration = Duration::from_secs(5 * 60);

/// What a challenge authorizes once verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Register,
    Forgot,
}

impl Purpose {
    pub fn label(&self) -> &'static str {
        match self {
            Purpose::Register => "register",
            Purpose::Forgot => "forgot",
        }
    }
}

/// Registration details held until the phone number is verified.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub phone: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
}

/// Result of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Code matched; the challenge has been consumed.
    Ok,
    /// No live challenge, purpose mismatch, or wrong code.
    Invalid,
    /// A challenge existed but its window had closed; it has been removed.
    Expired,
}

#[derive(Debug)]
struct Challenge {
    code: String,
    purpose: Purpose,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    /// Keyed by phone; at most one live challenge per number.
    challenges: HashMap<String, Challenge>,
    /// Keyed by phone; present only while a register challenge is live.
    pending: HashMap<String, PendingRegistration>,
}

/// Challenge and pending-registration state for the whole process.
///
/// Expired entries are swept lazily on issue, so the maps stay bounded by
/// the number of phones that requested a code within one TTL window.
pub struct ChallengeStore {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(OTP_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Issue a fresh challenge for `phone`, replacing any existing one.
    ///
    /// A forgot-password challenge also discards any pending registration
    /// for the number, since its register challenge no longer exists.
    pub async fn issue(&self, phone: &str, purpose: Purpose) -> String {
        let code = generate_code();
        let mut inner = self.inner.lock().await;
        sweep(&mut inner);
        if purpose == Purpose::Forgot {
            inner.pending.remove(phone);
        }
        inner.challenges.insert(
            phone.to_string(),
            Challenge {
                code: code.clone(),
                purpose,
                expires_at: Instant::now() + self.ttl,
            },
        );
        debug!(phone, purpose = purpose.label(), "issued challenge");
        code
    }

    /// Issue a register challenge and stash the registration alongside it.
    pub async fn issue_registration(&self, registration: PendingRegistration) -> String {
        let code = generate_code();
        let phone = registration.phone.clone();
        let mut inner = self.inner.lock().await;
        sweep(&mut inner);
        inner.challenges.insert(
            phone.clone(),
            Challenge {
                code: code.clone(),
                purpose: Purpose::Register,
                expires_at: Instant::now() + self.ttl,
            },
        );
        inner.pending.insert(phone.clone(), registration);
        debug!(phone, "issued registration challenge");
        code
    }

    /// Check a submitted code against the live challenge for `phone`.
    ///
    /// A matching code consumes the challenge. A wrong code leaves it in
    /// place for another attempt. An expired challenge is removed together
    /// with any pending registration it guarded.
    pub async fn verify(&self, phone: &str, purpose: Purpose, code: &str) -> VerifyOutcome {
        let mut inner = self.inner.lock().await;
        let Some(challenge) = inner.challenges.get(phone) else {
            return VerifyOutcome::Invalid;
        };
        if challenge.purpose != purpose {
            return VerifyOutcome::Invalid;
        }
        if challenge.expires_at <= Instant::now() {
            inner.challenges.remove(phone);
            inner.pending.remove(phone);
            debug!(phone, "challenge expired");
            return VerifyOutcome::Expired;
        }
        if challenge.code != code {
            return VerifyOutcome::Invalid;
        }
        inner.challenges.remove(phone);
        debug!(phone, purpose = purpose.label(), "challenge verified");
        VerifyOutcome::Ok
    }

    /// Remove and return the pending registration for `phone`, if any.
    pub async fn take_pending(&self, phone: &str) -> Option<PendingRegistration> {
        self.inner.lock().await.pending.remove(phone)
    }

    /// Number of live challenges, counting expired-but-unswept ones out.
    pub async fn active_challenges(&self) -> usize {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        inner
            .challenges
            .values()
            .filter(|c| c.expires_at > now)
            .count()
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop expired challenges and any pending registration whose register
/// challenge is gone.
fn sweep(inner: &mut Inner) {
    let now = Instant::now();
    let Inner {
        challenges,
        pending,
    } = inner;
    challenges.retain(|_, c| c.expires_at > now);
    pending.retain(|phone, _| {
        challenges
            .get(phone)
            .is_some_and(|c| c.purpose == Purpose::Register)
    });
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(phone: &str) -> PendingRegistration {
        PendingRegistration {
            phone: phone.to_string(),
            password: "secret1".into(),
            name: "Alice".into(),
            email: None,
        }
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }

    #[tokio::test]
    async fn verify_consumes_challenge() {
        let store = ChallengeStore::new();
        let code = store.issue("0911111111", Purpose::Forgot).await;

        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Ok
        );
        // consumed; a replay of the same code fails
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn wrong_code_leaves_challenge_live() {
        let store = ChallengeStore::new();
        let code = store.issue("0911111111", Purpose::Forgot).await;

        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, "000000").await,
            VerifyOutcome::Invalid
        );
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Ok
        );
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_code() {
        let store = ChallengeStore::new();
        let first = store.issue("0911111111", Purpose::Forgot).await;
        let second = store.issue("0911111111", Purpose::Forgot).await;

        if first != second {
            assert_eq!(
                store.verify("0911111111", Purpose::Forgot, &first).await,
                VerifyOutcome::Invalid
            );
        }
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &second).await,
            VerifyOutcome::Ok
        );
    }

    #[tokio::test]
    async fn purpose_mismatch_is_invalid() {
        let store = ChallengeStore::new();
        let code = store.issue_registration(registration("0911111111")).await;

        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Invalid
        );
        // challenge survives the mismatch
        assert_eq!(
            store.verify("0911111111", Purpose::Register, &code).await,
            VerifyOutcome::Ok
        );
    }

    #[tokio::test]
    async fn expired_challenge_reports_expired_once() {
        let store = ChallengeStore::with_ttl(Duration::from_millis(50));
        let code = store.issue("0911111111", Purpose::Forgot).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Expired
        );
        // removed on the expired report; later attempts see no challenge
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn pending_registration_follows_challenge_lifetime() {
        let store = ChallengeStore::with_ttl(Duration::from_millis(50));
        let code = store.issue_registration(registration("0911111111")).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            store.verify("0911111111", Purpose::Register, &code).await,
            VerifyOutcome::Expired
        );
        assert!(store.take_pending("0911111111").await.is_none());
    }

    #[tokio::test]
    async fn take_pending_is_destructive() {
        let store = ChallengeStore::new();
        let code = store.issue_registration(registration("0911111111")).await;

        assert_eq!(
            store.verify("0911111111", Purpose::Register, &code).await,
            VerifyOutcome::Ok
        );
        let pending = store.take_pending("0911111111").await;
        assert_eq!(pending.map(|p| p.name), Some("Alice".to_string()));
        assert!(store.take_pending("0911111111").await.is_none());
    }

    #[tokio::test]
    async fn forgot_challenge_discards_pending_registration() {
        let store = ChallengeStore::new();
        store.issue_registration(registration("0911111111")).await;

        let code = store.issue("0911111111", Purpose::Forgot).await;
        assert!(store.take_pending("0911111111").await.is_none());
        assert_eq!(
            store.verify("0911111111", Purpose::Forgot, &code).await,
            VerifyOutcome::Ok
        );
    }

    #[tokio::test]
    async fn reissue_sweep_drops_other_expired_entries() {
        let store = ChallengeStore::with_ttl(Duration::from_millis(50));
        store.issue_registration(registration("0911111111")).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.issue("0922222222", Purpose::Forgot).await;

        assert_eq!(store.active_challenges().await, 1);
        assert!(store.take_pending("0911111111").await.is_none());
    }

    #[tokio::test]
    async fn active_challenges_excludes_expired() {
        let store = ChallengeStore::with_ttl(Duration::from_millis(50));
        store.issue("0911111111", Purpose::Forgot).await;
        assert_eq!(store.active_challenges().await, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.active_challenges().await, 0);
    }
}
