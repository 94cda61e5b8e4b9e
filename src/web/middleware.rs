use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::error::AuthError;
use crate::web::session::{AuthenticatedUser, CurrentSession};

/// Guards protected routes.
///
/// Anonymous browser requests are sent to the login page with the requested
/// path preserved in `next`; anonymous `/api/` requests get a JSON 401.
pub async fn require_authenticated(mut session: CurrentSession, mut request: Request, next: Next) -> Response {
    if let Some(user) = session.user().cloned() {
        request.extensions_mut().insert(AuthenticatedUser(user));
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if path.starts_with("/api/") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": AuthError::NotAuthenticated.user_message() })),
        )
            .into_response();
    }

    // The query may carry a provider code and state; keep it out of the log.
    tracing::info!(%path, "unauthenticated request redirected to login");
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or(path);
    session.flash_error(&AuthError::NotAuthenticated);
    session.commit().await;
    Redirect::to(&login_redirect(&target)).into_response()
}

pub fn login_redirect(next: &str) -> String {
    format!("/login?next={}", urlencoding::encode(next))
}

/// Accepts only same-site absolute paths as a post-login destination.
///
/// URL parsers drop tabs and newlines and treat `\\` as `/`, so any of
/// those could turn `/x/host` into `//host`.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n)
            if n.starts_with('/')
                && !n.starts_with("//")
                && !n.chars().any(|c| c == '\\' || c.is_control() || c.is_whitespace()) =>
        {
            n
        }
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next(Some("/callback/github?code=1")), "/callback/github?code=1");
        assert_eq!(safe_next(Some("//evil.example/")), "/");
        assert_eq!(safe_next(Some("/\\evil.example/")), "/");
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(Some("/\t/evil.example/")), "/");
        assert_eq!(safe_next(Some("/\n/evil.example/")), "/");
        assert_eq!(safe_next(Some("/\r\n/evil.example/")), "/");
        assert_eq!(safe_next(Some("/ /evil.example/")), "/");
        assert_eq!(safe_next(Some("/a\\evil.example/")), "/");
        assert_eq!(safe_next(Some("/api/tokens?x=%0A")), "/api/tokens?x=%0A");
        assert_eq!(safe_next(Some("")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn login_redirect_encodes_target() {
        assert_eq!(
            login_redirect("/authorize/github?x=1"),
            "/login?next=%2Fauthorize%2Fgithub%3Fx%3D1"
        );
    }
}
