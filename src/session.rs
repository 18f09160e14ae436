//! Admin sessions: opaque bearer tokens mapped to an admin user id until they expire.
//!
//! Routes only talk to [`SessionRegistry`]. Where the sessions live is behind
//! [`SessionStore`]; the default [`MemorySessionStore`] keeps them in process, so a
//! restart logs every admin out.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use rand::{rngs::OsRng, RngCore};

pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Bytes of OS randomness behind each token.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub token: String,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Backing store for sessions.
pub trait SessionStore: Send + Sync {
    /// Returns false, leaving the store untouched, if the token is already present.
    fn put(&self, session: AdminSession) -> BoxFuture<'_, bool>;

    fn get<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<AdminSession>>;

    fn expire<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ()>;

    /// Drop every session expired at `now`; returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, usize>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, AdminSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, session: AdminSession) -> BoxFuture<'_, bool> {
        let inserted = match self.sessions.entry(session.token.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        };
        futures::future::ready(inserted).boxed()
    }

    fn get<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<AdminSession>> {
        let found = self.sessions.get(token).map(|s| s.value().clone());
        futures::future::ready(found).boxed()
    }

    fn expire<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ()> {
        self.sessions.remove(token);
        futures::future::ready(()).boxed()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        let removed = before.saturating_sub(self.sessions.len());
        futures::future::ready(removed).boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("missing, unknown or expired session token")]
pub struct Unauthorized;

/// Mints and checks admin session tokens.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemorySessionStore::new()), ttl)
    }

    pub async fn create_session(&self, user_id: i32) -> AdminSession {
        loop {
            let session = AdminSession {
                token: generate_token(),
                user_id,
                expires_at: Utc::now() + self.ttl,
            };
            if self.store.put(session.clone()).await {
                return session;
            }
            tracing::warn!("Session token collision, regenerating");
        }
    }

    /// Resolve a token to the admin user id it was issued for.
    pub async fn authenticate(&self, token: &str) -> Result<i32, Unauthorized> {
        let session = self.store.get(token).await.ok_or(Unauthorized)?;
        if session.is_expired(Utc::now()) {
            self.store.expire(token).await;
            return Err(Unauthorized);
        }
        Ok(session.user_id)
    }

    pub async fn revoke(&self, token: &str) {
        self.store.expire(token).await;
    }

    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired(Utc::now()).await
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
