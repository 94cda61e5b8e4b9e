use std::sync::Arc;

use time::{format_description::well_known::Rfc3339, macros::datetime, Duration, OffsetDateTime};

use crate::{
    auth::session::SessionUser,
    error::AuthError,
    models::token::{NewToken, StoredToken},
    repos::AccountsRepo,
};

/// Expiration recorded when the provider does not say.
pub const FAR_FUTURE: OffsetDateTime = datetime!(9999-12-31 23:59:59 UTC);

/// A credential as returned by a provider, before it is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub token_type: String,
    /// OAuth1 token secret
    pub secret: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct TokenStore {
    accounts: Arc<dyn AccountsRepo>,
}

impl TokenStore {
    pub fn new(accounts: Arc<dyn AccountsRepo>) -> Self {
        Self { accounts }
    }

    /// Persists `token` as the user's current token for `service`.
    pub async fn store(
        &self,
        user: Option<&SessionUser>,
        service: &str,
        token: IssuedToken,
    ) -> Result<StoredToken, AuthError> {
        let user = user.ok_or(AuthError::NotAuthenticated)?;

        let now = OffsetDateTime::now_utc();
        let expiration = token
            .expires_in
            .and_then(|d| now.checked_add(d))
            .unwrap_or(FAR_FUTURE);

        let mut scopes = token.scopes;
        scopes.sort();
        scopes.dedup();

        let row = NewToken {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            service: service.to_string(),
            value: token.value,
            token_type: token.token_type,
            secret: token.secret,
            refresh_token: token.refresh_token,
            expiration: expiration.format(&Rfc3339).map_err(anyhow::Error::from)?,
            created_at: now.format(&Rfc3339).map_err(anyhow::Error::from)?,
        };
        let stored = self.accounts.replace_token(row, scopes).await?;
        tracing::info!(user_id = %user.id, %service, token_id = %stored.token.id, "stored token");
        Ok(stored)
    }

    pub async fn tokens_for(&self, user_id: &str) -> Result<Vec<StoredToken>, AuthError> {
        Ok(self.accounts.list_tokens(user_id).await?)
    }
}
