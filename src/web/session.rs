use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use std::future::Future;
use tower_cookies::{Cookies, Key};

use crate::app::AppState;
use crate::auth::session::{self as store, FlashLevel, Session, SessionStore, SessionUser};
use crate::error::AuthError;

/// The caller's server-side session, loaded from the `sid` cookie.
///
/// A fresh session is created when the cookie is missing, unknown or
/// expired. Changes are only persisted by [`CurrentSession::commit`].
///
/// ```ignore
/// async fn handler(mut session: CurrentSession) -> impl IntoResponse {
///     session.data.flash(FlashLevel::Info, "hello");
///     session.commit().await;
///     Redirect::to("/")
/// }
/// ```
pub struct CurrentSession {
    cookies: Cookies,
    key: Key,
    store: SessionStore,
    id: Option<String>,
    secure: bool,
    pub data: Session,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let cookies = Cookies::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "Failed to extract cookies");
                    e.into_response()
                })?;

            let loaded = match store::get_session_id(&cookies, &state.cookie_key) {
                Some(id) => state.sessions.load(&id).await.map(|s| (id, s)),
                None => None,
            };
            let (id, data) = match loaded {
                Some((id, s)) => (Some(id), s),
                None => (None, state.sessions.new_session()),
            };

            Ok(CurrentSession {
                cookies,
                key: state.cookie_key.clone(),
                store: state.sessions.clone(),
                id,
                secure: state.config.server.secure_cookies(),
                data,
            })
        }
    }
}

impl CurrentSession {
    pub fn user(&self) -> Option<&SessionUser> {
        self.data.user.as_ref()
    }

    /// Writes the session back and refreshes the cookie.
    ///
    /// Anonymous sessions with nothing in them are not stored. A session
    /// destroyed by a concurrent request (logout) stays destroyed.
    pub async fn commit(self) {
        match self.id {
            Some(id) => {
                if self.store.save_existing(&id, self.data).await {
                    store::set_session_cookie(&self.cookies, &self.key, &id, self.store.ttl(), self.secure);
                } else {
                    tracing::debug!("session ended before commit; dropping changes");
                }
            }
            None if self.data.is_empty() => {}
            None => {
                let id = store::new_session_id();
                self.store.save(&id, self.data).await;
                store::set_session_cookie(&self.cookies, &self.key, &id, self.store.ttl(), self.secure);
            }
        }
    }

    /// Drops the stored session and starts an empty one under a new id.
    pub async fn rotate(&mut self) {
        if let Some(old) = self.id.take() {
            self.store.destroy(&old).await;
        }
        self.data = self.store.new_session();
    }

    /// Flashes the error's user message, logging internal detail.
    pub fn flash_error(&mut self, err: &AuthError) {
        if err.is_internal() {
            tracing::error!(error = ?err, "request failed");
        }
        self.data.flash(FlashLevel::Error, err.user_message());
    }
}

/// The logged-in user, placed in request extensions by
/// [`require_authenticated`](crate::web::middleware::require_authenticated).
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionUser);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user = parts.extensions.get::<AuthenticatedUser>().cloned();
        async move {
            user.ok_or_else(|| {
                tracing::warn!("AuthenticatedUser requested on an unguarded route");
                Redirect::to("/login").into_response()
            })
        }
    }
}
