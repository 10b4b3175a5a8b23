//! Email/password authentication service.
//!
//! Credentials live in the reserved `auth_credentials` collection of the
//! same document store the clinic uses, so both store implementations get
//! authentication for free. Sessions are process-local, keyed by the
//! SHA-256 hash of their bearer token, and expire after `SESSION_TTL`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use zeroize::Zeroizing;

use super::{to_fields, DocumentStore, StoreError, StoreErrorCode};

pub const CREDENTIALS_COLLECTION: &str = "auth_credentials";
pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const MIN_PASSWORD_LENGTH: usize = 6;
/// Failed sign-ins tolerated per email inside `LOCKOUT_WINDOW`.
pub const MAX_FAILED_SIGN_INS: usize = 5;
pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(60);
/// Lifetime of a session from sign-in.
pub const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

/// A signed-in user plus the bearer token that identifies the session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    #[error("Email already in use: {0}")]
    EmailAlreadyInUse(String),
    #[error("No user record for {0}")]
    UserNotFound(String),
    #[error("Wrong password")]
    WrongPassword,
    #[error("Too many failed sign-in attempts for {0}")]
    TooManyRequests(String),
    #[error("Network request failed: {0}")]
    NetworkRequestFailed(String),
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Authentication store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Text shown to the person at the login form.
    pub fn user_message(&self) -> String {
        match self {
            Self::UserNotFound(_) => "No user found with this email.".into(),
            Self::WrongPassword => "Incorrect password.".into(),
            Self::EmailAlreadyInUse(_) => "Email is already in use.".into(),
            Self::InvalidEmail(_) => "Invalid email format.".into(),
            Self::NetworkRequestFailed(_) => {
                "Network error. Please check your connection and try again.".into()
            }
            Self::TooManyRequests(_) => "Too many failed attempts. Please try again later.".into(),
            other => format!("Authentication error: {other}"),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkRequestFailed(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err.code {
            Some(
                StoreErrorCode::Unavailable
                | StoreErrorCode::DeadlineExceeded
                | StoreErrorCode::ResourceExhausted
                | StoreErrorCode::Aborted,
            )
            | None => {
                AuthError::NetworkRequestFailed(err.message)
            }
            _ => AuthError::Store(err.message),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialRecord {
    email: String,
    salt: String,
    password_hash: String,
    iterations: u32,
    created_at: chrono::DateTime<chrono::Utc>,
}

struct SessionEntry {
    user: AuthUser,
    expires_at: Instant,
}

/// Live sessions by token hash.
#[derive(Default)]
struct SessionTable {
    entries: HashMap<[u8; 32], SessionEntry>,
}

impl SessionTable {
    fn insert(&mut self, token_hash: [u8; 32], user: AuthUser, ttl: Duration) {
        self.cleanup();
        self.entries.insert(
            token_hash,
            SessionEntry {
                user,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn lookup(&self, token_hash: &[u8; 32]) -> Option<AuthUser> {
        self.entries
            .get(token_hash)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.user.clone())
    }

    fn remove(&mut self, token_hash: &[u8; 32]) -> bool {
        self.entries.remove(token_hash).is_some()
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Sliding-window count of failed sign-ins per email.
#[derive(Default)]
struct FailedSignIns {
    windows: HashMap<String, Vec<Instant>>,
}

impl FailedSignIns {
    fn is_locked(&mut self, email: &str) -> bool {
        let now = Instant::now();
        // Stale emails are dropped so the table only holds recent failures
        self.windows.retain(|_, entries| {
            entries.retain(|ts| now.duration_since(*ts) < LOCKOUT_WINDOW);
            !entries.is_empty()
        });
        self.windows
            .get(email)
            .is_some_and(|entries| entries.len() >= MAX_FAILED_SIGN_INS)
    }

    fn record(&mut self, email: &str) {
        self.windows
            .entry(email.to_string())
            .or_default()
            .push(Instant::now());
    }

    fn clear(&mut self, email: &str) {
        self.windows.remove(email);
    }
}

pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    iterations: u32,
    session_ttl: Duration,
    sessions: RwLock<SessionTable>,
    failures: Mutex<FailedSignIns>,
    events: watch::Sender<Option<AuthUser>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_iterations(store, PBKDF2_ITERATIONS)
    }

    /// Service with a custom PBKDF2 work factor (tests use a small one).
    pub fn with_iterations(store: Arc<dyn DocumentStore>, iterations: u32) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            store,
            iterations: iterations.max(1),
            session_ttl: SESSION_TTL,
            sessions: RwLock::new(SessionTable::default()),
            failures: Mutex::new(FailedSignIns::default()),
            events,
        }
    }

    /// Override how long new sessions live.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sessions currently held, expired ones included until the next sign-in.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Receive the user of every sign-in (`Some`) and sign-out (`None`).
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.events.subscribe()
    }

    pub fn create_user(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(AuthError::InvalidEmail(email));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        if self.find_credentials(&email)?.is_some() {
            return Err(AuthError::EmailAlreadyInUse(email));
        }

        let salt: [u8; SALT_LENGTH] = rand::random();
        let hash = derive_hash(password, &salt, self.iterations);
        let record = CredentialRecord {
            email: email.clone(),
            salt: STANDARD.encode(salt),
            password_hash: STANDARD.encode(&hash[..]),
            iterations: self.iterations,
            created_at: chrono::Utc::now(),
        };

        let uid = uuid::Uuid::new_v4().simple().to_string();
        self.store
            .create(CREDENTIALS_COLLECTION, &uid, to_fields(&record)?)?;
        tracing::info!(uid = %uid, "Created user account");

        Ok(self.start_session(AuthUser { uid, email }))
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(AuthError::InvalidEmail(email));
        }
        if self.lock_failures()?.is_locked(&email) {
            tracing::warn!("Sign-in rejected: too many failed attempts");
            return Err(AuthError::TooManyRequests(email));
        }

        let (uid, record) = self
            .find_credentials(&email)?
            .ok_or_else(|| AuthError::UserNotFound(email.clone()))?;

        let salt = STANDARD
            .decode(&record.salt)
            .map_err(|e| AuthError::Store(format!("Corrupt credential salt: {e}")))?;
        let expected = STANDARD
            .decode(&record.password_hash)
            .map_err(|e| AuthError::Store(format!("Corrupt credential hash: {e}")))?;
        let actual = derive_hash(password, &salt, record.iterations);

        if actual[..].ct_eq(&expected[..]).unwrap_u8() == 0 {
            self.lock_failures()?.record(&email);
            return Err(AuthError::WrongPassword);
        }

        self.lock_failures()?.clear(&email);
        Ok(self.start_session(AuthUser { uid, email }))
    }

    /// End the session identified by `token`. Unknown tokens are ignored.
    pub fn sign_out(&self, token: &str) {
        let hash = hash_token(token);
        let removed = match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(&hash),
            Err(_) => false,
        };
        if removed {
            self.events.send_replace(None);
        }
    }

    /// The user owning `token`, if the session is live. An expired session
    /// is dropped on the spot.
    pub fn current_user(&self, token: &str) -> Option<AuthUser> {
        let hash = hash_token(token);
        let found = self.sessions.read().ok()?.lookup(&hash);
        if found.is_none() {
            if let Ok(mut sessions) = self.sessions.write() {
                sessions.remove(&hash);
            }
        }
        found
    }

    fn start_session(&self, user: AuthUser) -> AuthSession {
        let token = generate_token();
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(hash_token(&token), user.clone(), self.session_ttl);
        }
        self.events.send_replace(Some(user.clone()));
        AuthSession { user, token }
    }

    fn find_credentials(&self, email: &str) -> Result<Option<(String, CredentialRecord)>, AuthError> {
        for doc in self.store.list(CREDENTIALS_COLLECTION)? {
            let record: CredentialRecord = doc.decode()?;
            if record.email == email {
                return Ok(Some((doc.id, record)));
            }
        }
        Ok(None)
    }

    fn lock_failures(&self) -> Result<std::sync::MutexGuard<'_, FailedSignIns>, AuthError> {
        self.failures
            .lock()
            .map_err(|_| AuthError::Store("sign-in failure table poisoned".into()))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn derive_hash(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; HASH_LENGTH]> {
    let mut out = Zeroizing::new([0u8; HASH_LENGTH]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out[..]);
    out
}

/// Hash a bearer token with SHA-256 (for storage/comparison).
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    fn service() -> (Arc<MemoryStore>, AuthService) {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthService::with_iterations(store.clone(), 10);
        (store, auth)
    }

    #[test]
    fn create_user_then_sign_in() {
        let (_store, auth) = service();
        let created = auth.create_user("Doc@Clinic.org", "secret1").unwrap();
        assert_eq!(created.user.email, "doc@clinic.org");

        let session = auth.sign_in("doc@clinic.org", "secret1").unwrap();
        assert_eq!(session.user.uid, created.user.uid);
        assert_ne!(session.token, created.token);
    }

    #[test]
    fn credentials_are_not_stored_in_plain_text() {
        let (store, auth) = service();
        let created = auth.create_user("a@b.co", "hunter22").unwrap();
        let doc = store
            .get(CREDENTIALS_COLLECTION, &created.user.uid)
            .unwrap()
            .unwrap();
        let raw = serde_json::to_string(&doc.data).unwrap();
        assert!(!raw.contains("hunter22"));
    }

    #[test]
    fn rejects_invalid_email_and_short_password() {
        let (_store, auth) = service();
        assert!(matches!(
            auth.create_user("not-an-email", "secret1"),
            Err(AuthError::InvalidEmail(_))
        ));
        assert_eq!(
            auth.create_user("a@b.co", "12345").unwrap_err(),
            AuthError::WeakPassword
        );
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let (_store, auth) = service();
        auth.create_user("a@b.co", "secret1").unwrap();
        let err = auth.create_user("A@B.CO", "other12").unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyInUse(_)));
        assert_eq!(err.user_message(), "Email is already in use.");
    }

    #[test]
    fn unknown_user_and_wrong_password() {
        let (_store, auth) = service();
        auth.create_user("a@b.co", "secret1").unwrap();

        let err = auth.sign_in("x@b.co", "secret1").unwrap_err();
        assert_eq!(err.user_message(), "No user found with this email.");

        let err = auth.sign_in("a@b.co", "wrong-one").unwrap_err();
        assert_eq!(err, AuthError::WrongPassword);
        assert_eq!(err.user_message(), "Incorrect password.");
    }

    #[test]
    fn repeated_failures_lock_the_email() {
        let (_store, auth) = service();
        auth.create_user("a@b.co", "secret1").unwrap();
        for _ in 0..MAX_FAILED_SIGN_INS {
            assert_eq!(auth.sign_in("a@b.co", "nope-nope").unwrap_err(), AuthError::WrongPassword);
        }
        let err = auth.sign_in("a@b.co", "secret1").unwrap_err();
        assert!(matches!(err, AuthError::TooManyRequests(_)));
        assert_eq!(err.user_message(), "Too many failed attempts. Please try again later.");
    }

    #[test]
    fn success_clears_failure_count() {
        let (_store, auth) = service();
        auth.create_user("a@b.co", "secret1").unwrap();
        for _ in 0..MAX_FAILED_SIGN_INS - 1 {
            let _ = auth.sign_in("a@b.co", "nope-nope");
        }
        auth.sign_in("a@b.co", "secret1").unwrap();
        for _ in 0..MAX_FAILED_SIGN_INS - 1 {
            let _ = auth.sign_in("a@b.co", "nope-nope");
        }
        assert!(auth.sign_in("a@b.co", "secret1").is_ok());
    }

    #[test]
    fn offline_store_is_a_network_failure() {
        let (store, auth) = service();
        store.disable_network().unwrap();
        let err = auth.sign_in("a@b.co", "secret1").unwrap_err();
        assert!(err.is_network());
        assert_eq!(
            err.user_message(),
            "Network error. Please check your connection and try again."
        );
    }

    #[test]
    fn sign_out_ends_session() {
        let (_store, auth) = service();
        let session = auth.create_user("a@b.co", "secret1").unwrap();
        assert_eq!(auth.current_user(&session.token), Some(session.user.clone()));

        auth.sign_out(&session.token);
        assert!(auth.current_user(&session.token).is_none());
        assert!(auth.current_user("garbage").is_none());
    }

    #[test]
    fn expired_sessions_are_rejected_and_pruned() {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthService::with_iterations(store, 10).with_session_ttl(Duration::ZERO);
        let first = auth.create_user("a@b.co", "secret1").unwrap();
        assert!(auth.current_user(&first.token).is_none());
        assert_eq!(auth.session_count(), 0);

        for _ in 0..20 {
            auth.sign_in("a@b.co", "secret1").unwrap();
        }
        assert!(auth.session_count() <= 1);
    }

    #[test]
    fn live_sessions_are_kept_per_token() {
        let (_store, auth) = service();
        let first = auth.create_user("a@b.co", "secret1").unwrap();
        let second = auth.sign_in("a@b.co", "secret1").unwrap();
        assert_eq!(auth.session_count(), 2);
        assert!(auth.current_user(&first.token).is_some());

        auth.sign_out(&first.token);
        assert_eq!(auth.session_count(), 1);
        assert!(auth.current_user(&second.token).is_some());
    }

    #[test]
    fn lockout_table_forgets_stale_emails() {
        let mut failures = FailedSignIns::default();
        failures
            .windows
            .insert("old@b.co".into(), vec![Instant::now() - LOCKOUT_WINDOW * 2]);
        failures.record("new@b.co");

        assert!(!failures.is_locked("old@b.co"));
        assert!(!failures.windows.contains_key("old@b.co"));
        assert!(failures.windows.contains_key("new@b.co"));
    }

    #[test]
    fn subscribers_see_sign_in_and_sign_out() {
        let (_store, auth) = service();
        let rx = auth.subscribe();
        assert!(rx.borrow().is_none());

        let session = auth.create_user("a@b.co", "secret1").unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.uid.clone()), Some(session.user.uid.clone()));

        auth.sign_out(&session.token);
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn token_helpers() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, generate_token());
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}
