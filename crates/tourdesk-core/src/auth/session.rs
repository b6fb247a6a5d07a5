//! The session manager: the one place that reads or writes the session record.
//!
//! Startup trusts the stored expiry without asking the server, so a token
//! revoked server-side stays usable locally until a request fails or a
//! refresh is refused.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::CredentialValidator;
use crate::cache::CacheManager;
use crate::models::{Role, User};

use super::error::AuthError;
use super::record::{SessionRecord, LONG_SESSION_DAYS, SHORT_SESSION_DAYS};
use super::{Clock, SystemClock, TokenStore};

/// How often the background task re-checks expiry.
pub const DEFAULT_CHECK_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session-affecting events, for whatever presents notices to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoginSucceeded(User),
    LoginFailed(String),
    LoggedOut,
    SessionExpired,
}

pub struct SessionOptions {
    pub check_interval: StdDuration,
    pub clock: Arc<dyn Clock>,
    /// Purged on logout.
    pub cache: Option<Arc<CacheManager>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            clock: Arc::new(SystemClock),
            cache: None,
        }
    }
}

impl SessionOptions {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_check_interval(mut self, interval: StdDuration) -> Self {
        self.check_interval = interval;
        self
    }
}

struct Inner {
    store: Arc<dyn TokenStore>,
    validator: Arc<dyn CredentialValidator>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<CacheManager>>,
    user: watch::Sender<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
    /// Held while the store and the published user are changed together.
    /// Never held across an await.
    write_lock: Mutex<()>,
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn check_session(&self) -> bool {
        let now = self.clock.now_ms();
        self.store
            .load()
            .is_some_and(|record| record.is_valid_at(now))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session store");
        }
    }

    fn enforce_expiry(&self) -> bool {
        let expired = {
            let _guard = self.lock_writes();
            // Only the evaluation that takes the user out reports the expiry
            let expired = self.user.send_if_modified(|user| {
                if user.is_none() || self.check_session() {
                    return false;
                }
                *user = None;
                true
            });
            if expired {
                self.clear_store();
            }
            expired
        };

        if expired {
            info!("Session expired");
            self.emit(SessionEvent::SessionExpired);
        }
        expired
    }
}

/// Owns the session record and the in-memory view of the current user.
///
/// Must be started inside a Tokio runtime. Dropping the manager, or calling
/// [`SessionManager::shutdown`], stops the periodic expiry check.
pub struct SessionManager {
    inner: Arc<Inner>,
    checker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Restore any stored session and start the periodic expiry check.
    pub fn start(
        store: Arc<dyn TokenStore>,
        validator: Arc<dyn CredentialValidator>,
        options: SessionOptions,
    ) -> Self {
        let now = options.clock.now_ms();
        let restored = match store.load() {
            Some(record) if record.is_valid_at(now) => {
                debug!(
                    user_id = record.user.id,
                    minutes_left = record.minutes_until_expiry(now),
                    "Restored stored session"
                );
                Some(record.user)
            }
            Some(record) => {
                debug!(expires_at = record.expires_at, "Stored session already expired");
                None
            }
            None => {
                debug!("No stored session");
                None
            }
        };

        let (user, _) = watch::channel(restored.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            store,
            validator,
            clock: options.clock,
            cache: options.cache,
            user,
            events,
            write_lock: Mutex::new(()),
        });

        if restored.is_none() {
            inner.clear_store();
        }

        let period = if options.check_interval.is_zero() {
            warn!("Zero session check interval, using the default");
            DEFAULT_CHECK_INTERVAL
        } else {
            options.check_interval
        };
        let checker = tokio::spawn(run_expiry_checks(Arc::downgrade(&inner), period));

        Self {
            inner,
            checker: Mutex::new(Some(checker)),
        }
    }

    /// Authenticate and persist a new session.
    ///
    /// The session lasts one day, or seven when `remember_me` is set. Nothing
    /// is written to the store unless the server accepts the credentials.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<User, AuthError> {
        let inner = &self.inner;

        if email.trim().is_empty() || password.is_empty() {
            let err = AuthError::Rejected("Email and password required".to_string());
            inner.emit(SessionEvent::LoginFailed(err.user_message()));
            return Err(err);
        }

        let response = match inner.validator.login(email.trim(), password).await {
            Ok(response) => response,
            Err(e) => {
                let err = AuthError::from(e);
                error!(error = %err, "Login failed");
                inner.emit(SessionEvent::LoginFailed(err.user_message()));
                return Err(err);
            }
        };

        let days = if remember_me {
            LONG_SESSION_DAYS
        } else {
            SHORT_SESSION_DAYS
        };
        let record = SessionRecord::issue(
            response.token,
            response.user,
            inner.clock.now_ms(),
            Duration::days(days),
        );

        let saved = {
            let _guard = inner.lock_writes();
            let saved = inner.store.save(&record);
            if saved.is_ok() {
                inner.user.send_replace(Some(record.user.clone()));
            }
            saved
        };
        if let Err(e) = saved {
            let err = AuthError::Storage(e.to_string());
            error!(error = %e, "Failed to save session");
            inner.emit(SessionEvent::LoginFailed(err.user_message()));
            return Err(err);
        }

        let user = record.user;
        info!(user_id = user.id, role = %user.role, remember_me, "Login successful");
        inner.emit(SessionEvent::LoginSucceeded(user.clone()));
        Ok(user)
    }

    /// End the session. Always leaves the client logged out.
    ///
    /// The server is told to invalidate the token if there is one; that call
    /// failing is only logged. Cached responses are purged.
    pub async fn logout(&self) {
        let inner = &self.inner;

        if let Some(record) = inner.store.load() {
            if let Err(e) = inner.validator.logout(&record.token).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }

        {
            let _guard = inner.lock_writes();
            inner.clear_store();
            inner.user.send_replace(None);
        }

        if let Some(ref cache) = inner.cache {
            if let Err(e) = cache.clear_all() {
                warn!(error = %e, "Failed to clear response cache");
            }
        }

        info!("Logged out");
        inner.emit(SessionEvent::LoggedOut);
    }

    /// Whether a stored session exists and has not yet expired.
    pub fn check_session(&self) -> bool {
        self.inner.check_session()
    }

    /// Trade the current token for a new one and extend the session to seven
    /// days from now, whatever its original lifetime.
    ///
    /// Returns false without touching the record when there is no session,
    /// the server refuses, or the session was replaced or ended while the
    /// server was answering.
    pub async fn refresh_session(&self) -> bool {
        let inner = &self.inner;

        let Some(original) = inner.store.load() else {
            debug!("No session to refresh");
            return false;
        };

        let token = match inner.validator.refresh(&original.token).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                return false;
            }
        };

        let _guard = inner.lock_writes();
        let mut record = match inner.store.load() {
            Some(current) if current.token == original.token => current,
            _ => {
                debug!("Session changed during refresh, discarding new token");
                return false;
            }
        };

        let now = inner.clock.now_ms();
        record.token = token;
        record.expires_at = now + Duration::days(LONG_SESSION_DAYS).num_milliseconds();

        if let Err(e) = inner.store.save(&record) {
            warn!(error = %e, "Failed to save refreshed session");
            return false;
        }

        debug!(user_id = record.user.id, expires_at = record.expires_at, "Session refreshed");
        true
    }

    /// Run one expiry check. Returns true if this call ended the session.
    pub fn enforce_expiry(&self) -> bool {
        self.inner.enforce_expiry()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.user.borrow().clone()
    }

    /// Follow changes of the current user.
    pub fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.inner.user.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Token for `Authorization: Bearer`, while the session is valid.
    pub fn bearer_token(&self) -> Option<String> {
        let now = self.inner.clock.now_ms();
        self.inner
            .store
            .load()
            .filter(|record| record.is_valid_at(now))
            .map(|record| record.token)
    }

    /// Expiry of the stored session in epoch milliseconds.
    pub fn expires_at(&self) -> Option<i64> {
        self.inner.store.load().map(|record| record.expires_at)
    }

    /// The current user, if their role satisfies `required`.
    pub fn require_role(&self, required: Role) -> Result<User, AuthError> {
        let user = self.current_user().ok_or(AuthError::NotAuthenticated)?;
        if user.role.grants(required) {
            Ok(user)
        } else {
            Err(AuthError::Forbidden {
                required,
                actual: user.role,
            })
        }
    }

    /// Stop the periodic expiry check.
    pub fn shutdown(&self) {
        let handle = self
            .checker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Session expiry check stopped");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_expiry_checks(inner: Weak<Inner>, period: StdDuration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(manager) = inner.upgrade() else {
            break;
        };
        manager.enforce_expiry();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::{ApiError, LoginResponse};
    use crate::auth::record::tests::sample_user;
    use crate::auth::{ManualClock, MemoryTokenStore};

    const DAY_MS: i64 = 86_400_000;
    const START_MS: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct FakeValidator {
        unreachable: bool,
        fail_logout: bool,
        fail_refresh: bool,
        /// Park refresh calls until `refresh_release` is notified
        hold_refresh: bool,
        refresh_started: Notify,
        refresh_release: Notify,
        login_calls: AtomicUsize,
        logout_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialValidator for FakeValidator {
        async fn login(&self, _email: &str, password: &str) -> Result<LoginResponse, ApiError> {
            let n = self.login_calls.fetch_add(1, Ordering::SeqCst);
            if self.unreachable {
                return Err(ApiError::InvalidResponse("connection reset".to_string()));
            }
            if password != "secret" {
                return Err(ApiError::Rejected("Invalid email or password".to_string()));
            }
            Ok(LoginResponse {
                token: format!("tok-{}", n + 1),
                user: sample_user(),
            })
        }

        async fn logout(&self, _token: &str) -> Result<(), ApiError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(ApiError::ServerError("unavailable".to_string()));
            }
            Ok(())
        }

        async fn refresh(&self, _token: &str) -> Result<String, ApiError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.hold_refresh {
                self.refresh_started.notify_one();
                self.refresh_release.notified().await;
            }
            if self.fail_refresh {
                return Err(ApiError::Unauthorized);
            }
            Ok(format!("tok-refreshed-{}", n + 1))
        }
    }

    struct Harness {
        store: Arc<MemoryTokenStore>,
        validator: Arc<FakeValidator>,
        clock: Arc<ManualClock>,
        manager: SessionManager,
    }

    fn harness(validator: FakeValidator, store: MemoryTokenStore) -> Harness {
        let store = Arc::new(store);
        let validator = Arc::new(validator);
        let clock = Arc::new(ManualClock::new(START_MS));
        let manager = SessionManager::start(
            store.clone(),
            validator.clone(),
            SessionOptions::default().with_clock(clock.clone()),
        );
        Harness {
            store,
            validator,
            clock,
            manager,
        }
    }

    fn stored(h: &Harness) -> Option<SessionRecord> {
        h.store.load()
    }

    #[tokio::test]
    async fn test_login_creates_one_day_session() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        let mut events = h.manager.subscribe();

        let user = h.manager.login("desk@harbor-cruises.example", "secret", false).await.unwrap();

        assert_eq!(user, sample_user());
        assert_eq!(h.manager.current_user(), Some(sample_user()));
        assert!(h.manager.check_session());
        let record = stored(&h).unwrap();
        assert_eq!(record.token, "tok-1");
        assert_eq!(record.expires_at, START_MS + DAY_MS);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoginSucceeded(sample_user()));
    }

    #[tokio::test]
    async fn test_remember_me_creates_seven_day_session() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("desk@harbor-cruises.example", "secret", true).await.unwrap();
        assert_eq!(h.manager.expires_at(), Some(START_MS + 7 * DAY_MS));
    }

    #[tokio::test]
    async fn test_rejected_login_leaves_store_untouched() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("desk@harbor-cruises.example", "secret", false).await.unwrap();
        let before = stored(&h);
        let mut events = h.manager.subscribe();

        let err = h.manager.login("other@x.example", "wrong", true).await.unwrap_err();

        assert_eq!(err, AuthError::Rejected("Invalid email or password".to_string()));
        assert_eq!(stored(&h), before);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::LoginFailed("Invalid email or password".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejected_login_on_empty_store() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        assert!(h.manager.login("a@b.c", "wrong", false).await.is_err());
        assert!(h.store.is_empty());
        assert!(!h.manager.check_session());
        assert_eq!(h.manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let validator = FakeValidator {
            unreachable: true,
            ..Default::default()
        };
        let h = harness(validator, MemoryTokenStore::new());
        let err = h.manager.login("a@b.c", "secret", false).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_blank_credentials_skip_the_server() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        assert!(h.manager.login("  ", "secret", false).await.is_err());
        assert!(h.manager.login("a@b.c", "", false).await.is_err());
        assert_eq!(h.validator.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let validator = FakeValidator {
            fail_logout: true,
            ..Default::default()
        };
        let h = harness(validator, MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", true).await.unwrap();
        let mut events = h.manager.subscribe();

        h.manager.logout().await;

        assert!(!h.manager.check_session());
        assert!(h.store.is_empty());
        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.validator.logout_calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_logout_twice_is_harmless() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();

        h.manager.logout().await;
        h.manager.logout().await;

        assert!(h.store.is_empty());
        assert_eq!(h.manager.current_user(), None);
        // Second logout had no token to invalidate
        assert_eq!(h.validator.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_purges_cache_but_login_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheManager::new(dir.path().to_path_buf()).unwrap());
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let manager = SessionManager::start(
            store.clone(),
            Arc::new(FakeValidator::default()),
            SessionOptions::default()
                .with_clock(clock)
                .with_cache(cache.clone()),
        );

        cache.save("bookings", &vec![1, 2]).unwrap();
        manager.login("a@b.c", "secret", false).await.unwrap();
        assert!(cache.load::<Vec<i32>>("bookings").unwrap().is_some());

        manager.logout().await;
        assert!(cache.load::<Vec<i32>>("bookings").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_session_without_record() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        assert!(!h.manager.check_session());
        assert_eq!(h.manager.bearer_token(), None);
    }

    #[tokio::test]
    async fn test_check_session_false_once_expired() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();

        h.clock.advance(Duration::days(1));
        assert!(!h.manager.check_session());
        // The check alone never clears anything
        assert!(stored(&h).is_some());
        assert!(h.manager.current_user().is_some());
    }

    #[tokio::test]
    async fn test_refresh_extends_to_seven_days_and_keeps_user() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        h.clock.advance(Duration::hours(20));

        assert!(h.manager.refresh_session().await);

        let record = stored(&h).unwrap();
        assert_eq!(record.token, "tok-refreshed-1");
        assert_eq!(record.expires_at, h.clock.now_ms() + 7 * DAY_MS);
        assert_eq!(record.user, sample_user());
        assert_eq!(h.manager.bearer_token().as_deref(), Some("tok-refreshed-1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_record() {
        let validator = FakeValidator {
            fail_refresh: true,
            ..Default::default()
        };
        let h = harness(validator, MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        let before = stored(&h);

        assert!(!h.manager.refresh_session().await);
        assert_eq!(stored(&h), before);
        assert!(h.manager.current_user().is_some());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_stays_logged_out() {
        let validator = FakeValidator {
            hold_refresh: true,
            ..Default::default()
        };
        let h = harness(validator, MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();

        let (refreshed, ()) = tokio::join!(h.manager.refresh_session(), async {
            h.validator.refresh_started.notified().await;
            h.manager.logout().await;
            h.validator.refresh_release.notify_one();
        });

        assert!(!refreshed);
        assert!(!h.manager.check_session());
        assert_eq!(h.manager.bearer_token(), None);
        assert_eq!(h.manager.current_user(), None);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_login_during_refresh_keeps_new_session() {
        let validator = FakeValidator {
            hold_refresh: true,
            ..Default::default()
        };
        let h = harness(validator, MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();

        let (refreshed, relogin) = tokio::join!(h.manager.refresh_session(), async {
            h.validator.refresh_started.notified().await;
            let relogin = h.manager.login("a@b.c", "secret", true).await;
            h.validator.refresh_release.notify_one();
            relogin
        });

        assert!(relogin.is_ok());
        assert!(!refreshed);
        let record = stored(&h).unwrap();
        assert_eq!(record.token, "tok-2");
        assert_eq!(record.expires_at, START_MS + 7 * DAY_MS);
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        assert!(!h.manager.refresh_session().await);
        assert_eq!(h.validator.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_startup_clears_expired_record() {
        let store = MemoryTokenStore::new();
        let mut record = SessionRecord::issue(
            "old".to_string(),
            sample_user(),
            START_MS,
            Duration::days(SHORT_SESSION_DAYS),
        );
        record.expires_at = START_MS - 1000;
        store.save(&record).unwrap();

        let h = harness(FakeValidator::default(), store);

        assert_eq!(h.manager.current_user(), None);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_startup_restores_valid_record_offline() {
        let store = MemoryTokenStore::new();
        let record = SessionRecord::issue(
            "kept".to_string(),
            sample_user(),
            START_MS,
            Duration::days(SHORT_SESSION_DAYS),
        );
        store.save(&record).unwrap();

        let h = harness(FakeValidator::default(), store);

        assert_eq!(h.manager.current_user(), Some(sample_user()));
        assert_eq!(h.manager.bearer_token().as_deref(), Some("kept"));
        assert_eq!(h.validator.login_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.validator.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_startup_discards_corrupt_record() {
        let store = MemoryTokenStore::new();
        store.put_raw("garbage");
        let h = harness(FakeValidator::default(), store);
        assert_eq!(h.manager.current_user(), None);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_is_reported_once() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        let mut events = h.manager.subscribe();

        assert!(!h.manager.enforce_expiry());
        h.clock.advance(Duration::days(2));

        assert!(h.manager.enforce_expiry());
        assert!(!h.manager.enforce_expiry());

        assert_eq!(h.manager.current_user(), None);
        assert!(h.store.is_empty());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SessionExpired);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_expires_session() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        let mut events = h.manager.subscribe();
        let mut user_rx = h.manager.watch_user();

        tokio::time::sleep(StdDuration::from_secs(61)).await;
        assert!(h.manager.current_user().is_some());

        h.clock.advance(Duration::days(1) + Duration::seconds(1));
        tokio::time::sleep(StdDuration::from_secs(60)).await;

        assert!(user_rx.has_changed().unwrap());
        assert_eq!(*user_rx.borrow_and_update(), None);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SessionExpired);

        tokio::time::sleep(StdDuration::from_secs(300)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expiry_check_keeps_renewed_login() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        h.clock.advance(Duration::days(2));
        h.manager.login("a@b.c", "secret", false).await.unwrap();
        let mut events = h.manager.subscribe();

        assert!(!h.manager.enforce_expiry());
        assert!(h.manager.current_user().is_some());
        assert_eq!(stored(&h).unwrap().token, "tok-2");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_check_interval_falls_back_to_default() {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let manager = SessionManager::start(
            store.clone(),
            Arc::new(FakeValidator::default()),
            SessionOptions::default()
                .with_clock(clock.clone())
                .with_check_interval(StdDuration::ZERO),
        );
        manager.login("a@b.c", "secret", false).await.unwrap();

        clock.advance(Duration::days(2));
        tokio::time::sleep(StdDuration::from_secs(61)).await;

        assert_eq!(manager.current_user(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_periodic_check() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        h.manager.login("a@b.c", "secret", false).await.unwrap();

        h.manager.shutdown();
        h.clock.advance(Duration::days(3));
        tokio::time::sleep(StdDuration::from_secs(180)).await;

        assert!(h.manager.current_user().is_some());
        assert!(!h.manager.check_session());
    }

    #[tokio::test]
    async fn test_require_role() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        assert_eq!(h.manager.require_role(Role::Vendor), Err(AuthError::NotAuthenticated));

        h.manager.login("a@b.c", "secret", false).await.unwrap();
        assert_eq!(h.manager.require_role(Role::Vendor).unwrap(), sample_user());
        assert_eq!(
            h.manager.require_role(Role::Admin),
            Err(AuthError::Forbidden {
                required: Role::Admin,
                actual: Role::Vendor,
            })
        );
    }

    #[tokio::test]
    async fn test_events_reach_every_subscriber() {
        let h = harness(FakeValidator::default(), MemoryTokenStore::new());
        let mut first = h.manager.subscribe();
        let mut second = h.manager.subscribe();

        h.manager.logout().await;

        assert_eq!(first.try_recv().unwrap(), SessionEvent::LoggedOut);
        assert_eq!(second.try_recv().unwrap(), SessionEvent::LoggedOut);
    }
}
