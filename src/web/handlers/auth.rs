use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use crate::{
    app::AppState,
    auth::session::{FlashLevel, SessionUser},
    error::AuthError,
    models::user::User,
    web::{middleware::safe_next, session::CurrentSession, views},
};

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

pub async fn login_form(mut session: CurrentSession, Query(q): Query<NextQuery>) -> Response {
    if session.user().is_some() {
        return already(session, "Already logged in", safe_next(q.next.as_deref())).await;
    }
    let flashes = session.data.take_flashes();
    session.commit().await;
    views::login_page(&flashes, "", q.next.as_deref()).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    mut session: CurrentSession,
    Query(q): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(q.next.as_deref()).to_string();
    if session.user().is_some() {
        return already(session, "Already logged in", &next).await;
    }

    match state.credentials.authenticate(&form.email, &form.password).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "login succeeded");
            start_authenticated_session(&mut session, user).await;
            session.data.flash(FlashLevel::Info, "Login succeeded");
            session.commit().await;
            Redirect::to(&next).into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "login rejected");
            session.flash_error(&e);
            let flashes = session.data.take_flashes();
            session.commit().await;
            views::login_page(&flashes, &form.email, q.next.as_deref()).into_response()
        }
    }
}

pub async fn register_form(mut session: CurrentSession) -> Response {
    if session.user().is_some() {
        return already(session, "Already registered", "/").await;
    }
    let flashes = session.data.take_flashes();
    session.commit().await;
    views::register_page(&flashes, "", "").into_response()
}

pub async fn register(
    State(state): State<AppState>,
    mut session: CurrentSession,
    Form(form): Form<RegisterForm>,
) -> Response {
    if session.user().is_some() {
        return already(session, "Already registered", "/").await;
    }

    let result = if form.password1 != form.password2 {
        Err(AuthError::PasswordMismatch)
    } else {
        state
            .credentials
            .register(&form.name, &form.email, &form.password1)
            .await
    };

    match result {
        Ok(user) => {
            start_authenticated_session(&mut session, user).await;
            session.data.flash(FlashLevel::Info, "Account created");
            session.commit().await;
            Redirect::to("/").into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "registration rejected");
            session.flash_error(&e);
            let flashes = session.data.take_flashes();
            session.commit().await;
            views::register_page(&flashes, &form.name, &form.email).into_response()
        }
    }
}

pub async fn logout(mut session: CurrentSession) -> Response {
    if let Some(user) = session.user() {
        tracing::info!(user_id = %user.id, "logged out");
        session.rotate().await;
        session.data.flash(FlashLevel::Info, "Successfully logged out");
        session.commit().await;
    }
    Redirect::to("/").into_response()
}

// New id on every privilege change.
async fn start_authenticated_session(session: &mut CurrentSession, user: User) {
    session.rotate().await;
    session.data.login(SessionUser {
        id: user.id,
        email: user.email,
        name: user.name,
    });
}

async fn already(mut session: CurrentSession, message: &str, to: &str) -> Response {
    session.data.flash(FlashLevel::Info, message);
    session.commit().await;
    Redirect::to(to).into_response()
}
