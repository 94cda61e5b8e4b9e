use std::sync::Arc;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RequestTokenError,
    Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use url::Url;

use crate::{
    auth::{
        oauth1,
        services::{ServiceConfig, ServiceRegistry},
        session::{PendingAuthorization, Session},
        tokens::{IssuedToken, TokenStore},
    },
    config::{AppConfig, OAuthVariant},
    error::AuthError,
    models::token::StoredToken,
    security::constant_time_eq,
};

/// Query parameters a provider may append when redirecting back.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    // OAuth1
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub denied: Option<String>,
}

/// Runs the redirect / callback / exchange dance for configured services.
///
/// An attempt is `awaiting_callback` while its pending value sits in the
/// session; the callback consumes that value and ends the attempt as either
/// `exchanged` (token stored) or `failed`.
#[derive(Clone)]
pub struct AuthorizationBroker {
    registry: Arc<ServiceRegistry>,
    tokens: TokenStore,
    http: reqwest::Client,
    public_url: String,
}

impl AuthorizationBroker {
    pub fn new(config: &AppConfig, registry: Arc<ServiceRegistry>, tokens: TokenStore) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("idioticio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            registry,
            tokens,
            http,
            public_url: config.server.public_url.clone(),
        })
    }

    pub fn redirect_url(&self, service: &str) -> String {
        format!("{}/callback/{}", self.public_url.trim_end_matches('/'), service)
    }

    /// Returns the provider URL to send the user to and records the
    /// anti-forgery value for `service` in the session.
    pub async fn begin_authorization(&self, session: &mut Session, service: &str) -> Result<Url, AuthError> {
        let user_id = session
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or(AuthError::NotAuthenticated)?;
        let svc = self.registry.find_service(service)?;

        let (url, pending) = match svc.variant {
            OAuthVariant::OAuth2 => {
                let client = self.oauth2_client(&svc)?;
                let (url, csrf) = client
                    .authorize_url(CsrfToken::new_random)
                    .add_scopes(svc.scopes.iter().map(|s| Scope::new(s.clone())))
                    .url();
                (url, PendingAuthorization::OAuth2 { state: csrf.secret().to_string() })
            }
            OAuthVariant::OAuth1 => {
                let request = oauth1::request_token(&self.http, &svc, &self.redirect_url(service)).await?;
                let url = oauth1::authorize_url(&svc, &request.token)?;
                (
                    url,
                    PendingAuthorization::OAuth1 {
                        request_token: request.token,
                        request_secret: request.secret,
                    },
                )
            }
        };

        session.set_pending(service, pending);
        tracing::info!(%user_id, %service, state = "awaiting_callback", "authorization started");
        Ok(url)
    }

    /// Validates the callback against the session and stores the resulting token.
    pub async fn complete_authorization(
        &self,
        session: &mut Session,
        service: &str,
        params: CallbackParams,
    ) -> Result<StoredToken, AuthError> {
        // Consumed whatever the outcome so a state value is never accepted twice.
        let pending = session.take_pending(service);
        let user_id = session.user.as_ref().map(|u| u.id.clone()).unwrap_or_default();

        let result = match self.exchange(service, pending, params).await {
            Ok(issued) => self.tokens.store(session.user.as_ref(), service, issued).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(stored) => {
                tracing::info!(%user_id, %service, token_id = %stored.token.id, state = "exchanged", "authorization completed");
            }
            Err(e) => {
                tracing::warn!(%user_id, %service, error = %e, state = "failed", "authorization failed");
            }
        }
        result
    }

    async fn exchange(
        &self,
        service: &str,
        pending: Option<PendingAuthorization>,
        params: CallbackParams,
    ) -> Result<IssuedToken, AuthError> {
        if let Some(code) = params.error {
            return Err(AuthError::Provider { code, description: params.error_description });
        }
        if params.denied.is_some() {
            return Err(AuthError::Provider {
                code: "access_denied".to_string(),
                description: None,
            });
        }

        let svc = self.registry.find_service(service)?;
        let pending = pending.ok_or(AuthError::MissingState)?;

        match (svc.variant, pending) {
            (OAuthVariant::OAuth2, PendingAuthorization::OAuth2 { state }) => {
                let returned = params.state.ok_or(AuthError::StateMismatch)?;
                if !constant_time_eq(&returned, &state) {
                    return Err(AuthError::StateMismatch);
                }
                let code = params.code.filter(|c| !c.is_empty()).ok_or(AuthError::MissingCode)?;
                self.exchange_oauth2(&svc, code).await
            }
            (OAuthVariant::OAuth1, PendingAuthorization::OAuth1 { request_token, request_secret }) => {
                let returned = params.oauth_token.ok_or(AuthError::StateMismatch)?;
                if !constant_time_eq(&returned, &request_token) {
                    return Err(AuthError::StateMismatch);
                }
                let verifier = params.oauth_verifier.ok_or(AuthError::MissingCode)?;
                let request = oauth1::RequestToken { token: request_token, secret: request_secret };
                oauth1::access_token(&self.http, &svc, &request, &verifier).await
            }
            // Variant changed between redirect and callback.
            _ => Err(AuthError::StateMismatch),
        }
    }

    async fn exchange_oauth2(&self, svc: &ServiceConfig, code: String) -> Result<IssuedToken, AuthError> {
        let client = self.oauth2_client(svc)?;
        let resp = client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await;

        match resp {
            Ok(token) => Ok(issued_from_oauth2(&token, &svc.scopes)),
            Err(RequestTokenError::ServerResponse(err)) => Err(provider_error(&err)),
            // Some providers answer errors with 200 and an error body.
            Err(RequestTokenError::Parse(e, body)) => match serde_json::from_slice::<BasicErrorResponse>(&body) {
                Ok(err) => Err(provider_error(&err)),
                Err(_) => Err(AuthError::Exchange(format!("unparseable token response: {}", e))),
            },
            Err(e) => Err(AuthError::Exchange(e.to_string())),
        }
    }

    fn oauth2_client(&self, svc: &ServiceConfig) -> Result<BasicClient, AuthError> {
        let invalid = |e: url::ParseError| AuthError::InvalidServiceConfig(format!("{}: {}", svc.name, e));
        let auth_url = AuthUrl::new(svc.authorization_url.clone()).map_err(invalid)?;
        let token_url = TokenUrl::new(svc.token_url.clone()).map_err(invalid)?;
        let redirect = RedirectUrl::new(self.redirect_url(&svc.name)).map_err(invalid)?;
        Ok(BasicClient::new(
            ClientId::new(svc.client_id.clone()),
            Some(ClientSecret::new(svc.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect))
    }
}

fn provider_error(err: &BasicErrorResponse) -> AuthError {
    AuthError::Provider {
        code: err.error().to_string(),
        description: err.error_description().cloned(),
    }
}

fn issued_from_oauth2(token: &BasicTokenResponse, requested: &[String]) -> IssuedToken {
    // Omitted scope means the requested scope was granted (RFC 6749 section 5.1).
    let scopes = match token.scopes() {
        Some(granted) => granted.iter().map(|s| s.as_str().to_string()).collect(),
        None => requested.to_vec(),
    };
    IssuedToken {
        value: token.access_token().secret().clone(),
        token_type: token.token_type().as_ref().to_string(),
        secret: None,
        refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        expires_in: token.expires_in().and_then(|d| time::Duration::try_from(d).ok()),
        scopes,
    }
}
