use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::{
    app::AppState,
    web::{session::CurrentSession, views},
};

pub async fn dashboard(State(state): State<AppState>, mut session: CurrentSession) -> Response {
    let services = state.services.services();
    let tokens = match session.user().map(|u| u.id.clone()) {
        Some(user_id) => match state.tokens.tokens_for(&user_id).await {
            Ok(list) => list,
            Err(e) => {
                session.flash_error(&e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let flashes = session.data.take_flashes();
    let user = session.data.user.clone();
    session.commit().await;
    views::dashboard(user.as_ref(), &flashes, &services, &tokens).into_response()
}

pub async fn healthz() -> &'static str {
    "ok"
}
