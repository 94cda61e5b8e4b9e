use std::{collections::{BTreeMap, HashMap}, sync::Arc};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tower_cookies::{Cookie, Cookies, Key};

pub const SESSION_COOKIE: &str = "sid";

/// Identity of the logged-in user, copied into the session at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Anti-forgery material for an authorization waiting on its provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAuthorization {
    OAuth2 { state: String },
    /// The request token is the value round-tripped through the provider.
    OAuth1 { request_token: String, request_secret: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<SessionUser>,
    /// Keyed by service name; at most one attempt per service.
    pub pending: BTreeMap<String, PendingAuthorization>,
    pub flashes: Vec<Flash>,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn new(ttl: Duration) -> Self {
        Self {
            user: None,
            pending: BTreeMap::new(),
            flashes: Vec::new(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.pending.is_empty() && self.flashes.is_empty()
    }

    pub fn login(&mut self, user: SessionUser) {
        self.user = Some(user);
        self.pending.clear();
    }

    pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
        self.flashes.push(Flash { level, message: message.into() });
    }

    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }

    /// Replaces any earlier attempt for the same service.
    pub fn set_pending(&mut self, service: &str, pending: PendingAuthorization) {
        self.pending.insert(service.to_string(), pending);
    }

    /// Removes the pending value so it can only be presented once.
    pub fn take_pending(&mut self, service: &str) -> Option<PendingAuthorization> {
        self.pending.remove(service)
    }
}

/// Server-side session storage keyed by the id carried in the `sid` cookie.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.ttl)
    }

    pub async fn load(&self, id: &str) -> Option<Session> {
        {
            let map = self.inner.read().await;
            match map.get(id) {
                Some(s) if !s.is_expired() => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().await.remove(id);
        None
    }

    /// Stores the session under a new id and extends its lifetime.
    pub async fn save(&self, id: &str, mut session: Session) {
        session.expires_at = OffsetDateTime::now_utc() + self.ttl;
        let mut map = self.inner.write().await;
        map.retain(|_, s| !s.is_expired());
        map.insert(id.to_string(), session);
    }

    /// Updates a session that is still live; returns `false` without
    /// writing when it was destroyed or expired since it was loaded.
    pub async fn save_existing(&self, id: &str, mut session: Session) -> bool {
        let mut map = self.inner.write().await;
        map.retain(|_, s| !s.is_expired());
        match map.get_mut(id) {
            Some(slot) => {
                session.expires_at = OffsetDateTime::now_utc() + self.ttl;
                *slot = session;
                true
            }
            None => false,
        }
    }

    pub async fn destroy(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

pub fn new_session_id() -> String {
    crate::security::random_token(32)
}

pub fn get_session_id(cookies: &Cookies, key: &Key) -> Option<String> {
    cookies
        .private(key)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub fn set_session_cookie(cookies: &Cookies, key: &Key, id: &str, ttl: Duration, secure: bool) {
    let mut cookie = Cookie::new(SESSION_COOKIE, id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_secure(secure);
    cookie.set_max_age(ttl);
    cookies.private(key).add(cookie);
}
