use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    app::AppState,
    auth::{broker::CallbackParams, session::FlashLevel},
    models::token::{OAuthToken, StoredToken},
    web::session::{AuthenticatedUser, CurrentSession},
};

// Starts the authorization flow for a configured service.
pub async fn authorize(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut session: CurrentSession,
    Path(service): Path<String>,
) -> Response {
    match state.broker.begin_authorization(&mut session.data, &service).await {
        Ok(url) => {
            session.commit().await;
            Redirect::to(url.as_str()).into_response()
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, %service, error = %e, "could not start authorization");
            session.flash_error(&e);
            session.commit().await;
            Redirect::to("/").into_response()
        }
    }
}

// Provider redirect target.
pub async fn callback(
    State(state): State<AppState>,
    mut session: CurrentSession,
    Path(service): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state
        .broker
        .complete_authorization(&mut session.data, &service, params)
        .await
    {
        Ok(_) => session
            .data
            .flash(FlashLevel::Info, format!("{} authorized", service)),
        Err(e) => session.flash_error(&e),
    }
    session.commit().await;
    Redirect::to("/").into_response()
}

#[derive(Debug, Serialize)]
pub struct TokenItem {
    pub service: String,
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub token: OAuthToken,
}

impl From<&StoredToken> for TokenItem {
    fn from(t: &StoredToken) -> Self {
        Self {
            service: t.token.service.clone(),
            scopes: t.scope_names().map(str::to_string).collect(),
            token: t.to_oauth_token(),
        }
    }
}

// Current tokens of the logged-in user, for clients acting on their behalf.
pub async fn api_tokens(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> impl IntoResponse {
    match state.tokens.tokens_for(&user.id).await {
        Ok(list) => {
            let items: Vec<TokenItem> = list.iter().map(TokenItem::from).collect();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = ?e, user_id = %user.id, "failed to list tokens");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.user_message() })),
            )
                .into_response()
        }
    }
}
