//! Identity provider: registration, login, and bearer credential resolution.
//!
//! Credentials are opaque random tokens. The store only keeps their SHA-256
//! digest, so a leaked database does not leak usable tokens. Password secrets
//! are salted and iterated SHA-256, encoded as
//! `sha256$<iterations>$<salt hex>$<digest hex>`.

use std::sync::Arc;

use chrono::Duration;
use kanban_proto::ids::UserId;
use kanban_proto::user::{AuthResponse, LoginRequest, RegisterRequest, User};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::BoardError;
use crate::store::{self, SqliteStore, StoreTx, UserRecord};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Default number of hash rounds applied to password secrets.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 10_000;

const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
const HASH_SCHEME: &str = "sha256";

/// Resolves a request credential to the acting user.
///
/// The board engine and the HTTP layer depend on this trait only, never on
/// how credentials are issued.
pub trait IdentityProvider: Send + Sync {
    /// Maps a bearer credential to a user id.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Unauthenticated`] for unknown or expired
    /// credentials.
    fn resolve_caller(&self, credential: &str) -> Result<UserId, BoardError>;
}

/// Session-token identity provider backed by the `users` and `sessions` tables.
pub struct SessionAuth {
    store: Arc<SqliteStore>,
    session_ttl: Duration,
    password_iterations: u32,
}

impl SessionAuth {
    /// Creates a provider with the default session lifetime and hash cost.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self::with_config(
            store,
            DEFAULT_SESSION_TTL_HOURS,
            DEFAULT_PASSWORD_ITERATIONS,
        )
    }

    /// Creates a provider with a custom session lifetime and hash cost.
    #[must_use]
    pub fn with_config(
        store: Arc<SqliteStore>,
        session_ttl_hours: i64,
        password_iterations: u32,
    ) -> Self {
        Self {
            store,
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
            password_iterations: password_iterations.max(1),
        }
    }

    /// Registers a new user and opens a session for them.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for malformed input and
    /// [`BoardError::Conflict`] if the email is already registered.
    pub fn register(&self, req: RegisterRequest) -> Result<AuthResponse, BoardError> {
        req.validate()?;
        let email = normalize_email(&req.email);
        let password_hash = hash_password(&req.password, self.password_iterations);

        self.store.write(|tx| {
            if tx.find_user_by_email(&email)?.is_some() {
                tracing::warn!(email = %email, "registration with taken email");
                return Err(BoardError::Conflict("Email already registered".to_string()));
            }
            let at = store::now();
            let user = User {
                id: UserId::new(),
                email,
                name: req.name.filter(|n| !n.trim().is_empty()),
                created_at: at,
                updated_at: at,
            };
            tx.insert_user(&UserRecord {
                user: user.clone(),
                password_hash,
            })?;
            let access_token = self.open_session(tx, user.id)?;
            tracing::info!(user_id = %user.id, "user registered");
            Ok(AuthResponse { access_token, user })
        })
    }

    /// Verifies email and password and opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Unauthenticated`] if the email is unknown or the
    /// password does not match; the two cases are indistinguishable.
    pub fn login(&self, req: LoginRequest) -> Result<AuthResponse, BoardError> {
        let email = normalize_email(&req.email);
        self.store.write(|tx| {
            let record = tx
                .find_user_by_email(&email)?
                .filter(|r| verify_password(&req.password, &r.password_hash));
            let Some(record) = record else {
                tracing::warn!(email = %email, "failed login");
                return Err(BoardError::Unauthenticated("Invalid email or password"));
            };
            let purged = tx.purge_expired_sessions(store::now())?;
            if purged > 0 {
                tracing::debug!(count = purged, "purged expired sessions");
            }
            let access_token = self.open_session(tx, record.user.id)?;
            tracing::info!(user_id = %record.user.id, "user logged in");
            Ok(AuthResponse {
                access_token,
                user: record.user,
            })
        })
    }

    /// Returns the public profile of a user.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the user no longer exists.
    pub fn profile(&self, user: UserId) -> Result<User, BoardError> {
        self.store
            .read(|tx| tx.find_user(user))?
            .ok_or(BoardError::NotFound("User"))
    }

    fn open_session(&self, tx: &StoreTx<'_>, user: UserId) -> Result<String, BoardError> {
        let token = generate_token();
        let at = store::now();
        tx.insert_session(&digest_token(&token), user, at, at + self.session_ttl)?;
        Ok(token)
    }
}

impl IdentityProvider for SessionAuth {
    fn resolve_caller(&self, credential: &str) -> Result<UserId, BoardError> {
        let digest = digest_token(credential.trim());
        self.store
            .read(|tx| tx.find_session_user(&digest, store::now()))?
            .ok_or(BoardError::Unauthenticated("Invalid or expired token"))
    }
}

// ---------------------------------------------------------------------------
// Credential helpers
// ---------------------------------------------------------------------------

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::new().chain_update(salt).chain_update(password).finalize());
    for _ in 1..iterations {
        let next = Sha256::new().chain_update(salt).chain_update(digest).finalize();
        digest.copy_from_slice(&next);
    }
    digest
}

/// Hashes a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill(&mut salt);
    let digest = derive(password, &salt, iterations);
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

/// Checks a password against a stored hash. Malformed hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let (Ok(iterations), Ok(salt), Ok(expected)) =
        (iterations.parse::<u32>(), hex::decode(salt), hex::decode(expected))
    else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    // Length mismatches compare unequal.
    bool::from(derive(password, &salt, iterations)[..].ct_eq(expected.as_slice()))
}
