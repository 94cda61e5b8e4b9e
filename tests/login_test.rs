use std::io;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;

#[path = "common.rs"]
mod common;

async fn registered(app: &common::TestApp) {
    let mut b = common::Browser::new(app);
    let res = b.register("Alice", "alice@example.com", "password123").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn login_succeeds_and_honours_next() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    registered(&app).await;
    let mut browser = common::Browser::new(&app);

    let res = browser
        .post_form(
            "/login?next=%2Fapi%2Ftokens",
            &[("email", "alice@example.com"), ("password", "password123")],
        )
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&res), "/api/tokens");

    let res = browser.get("/api/tokens").await;
    assert_eq!(res.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&common::body_string(res).await).unwrap();
    assert_eq!(v["items"], serde_json::json!([]));
}

#[tokio::test]
async fn foreign_next_falls_back_to_dashboard() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    registered(&app).await;
    let mut browser = common::Browser::new(&app);

    let res = browser
        .post_form(
            "/login?next=https%3A%2F%2Fevil.example%2F",
            &[("email", "alice@example.com"), ("password", "password123")],
        )
        .await;
    assert_eq!(common::location(&res), "/");
    assert!(common::body_string(browser.get("/").await).await.contains("Login succeeded"));
}

#[tokio::test]
async fn bad_credentials_rerender_form() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    registered(&app).await;
    let mut browser = common::Browser::new(&app);

    for (email, password) in [("alice@example.com", "wrong-password"), ("nobody@example.com", "password123")] {
        let res = browser.post_form("/login", &[("email", email), ("password", password)]).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = common::body_string(res).await;
        assert!(body.contains("Invalid credentials"), "{}", body);
    }

    let res = browser.get("/api/tokens").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_redirect_to_login() {
    let app = common::spawn_app(vec![("github", common::oauth2_service("https://github.example"))])
        .expect("spawn app");
    let mut browser = common::Browser::new(&app);

    for path in ["/authorize/github", "/callback/github?code=abc&state=xyz"] {
        let res = browser.get(path).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let loc = common::location(&res);
        assert_eq!(loc, format!("/login?next={}", urlencoding::encode(path)));
    }

    let body = common::body_string(browser.get("/login?next=%2Fauthorize%2Fgithub").await).await;
    assert!(body.contains("You must be logged in"), "{}", body);
    assert!(body.contains("action=\"/login?next=%2Fauthorize%2Fgithub\""), "{}", body);
}

#[tokio::test]
async fn login_page_while_logged_in_redirects() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    let mut browser = common::Browser::new(&app);
    browser.register("Alice", "alice@example.com", "password123").await;

    let res = browser.get("/login").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&res), "/");
    assert!(common::body_string(browser.get("/").await).await.contains("Already logged in"));
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    let mut browser = common::Browser::new(&app);
    browser.register("Alice", "alice@example.com", "password123").await;
    let old_cookie = browser.cookie.clone();

    let res = browser.get("/logout").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_ne!(browser.cookie, old_cookie);

    let body = common::body_string(browser.get("/").await).await;
    assert!(body.contains("Successfully logged out"), "{}", body);
    assert!(body.contains("href=\"/login\""));

    // The previous session id is gone server-side.
    let mut replay = common::Browser::new(&app);
    replay.cookie = old_cookie;
    assert_eq!(replay.get("/api/tokens").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn next_with_control_characters_falls_back_to_dashboard() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    registered(&app).await;

    for next in ["%2F%09%2Fevil.example%2F", "%2F%0A%2Fevil.example%2F", "%2F%5C%2Fevil.example%2F"] {
        let mut browser = common::Browser::new(&app);
        let res = browser
            .post_form(
                &format!("/login?next={}", next),
                &[("email", "alice@example.com"), ("password", "password123")],
            )
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "next={}", next);
        assert_eq!(common::location(&res), "/", "next={}", next);
    }
}

#[derive(Clone, Default)]
struct LogBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn redirect_logging_omits_callback_query() {
    let logs = LogBuf::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = common::spawn_app(vec![("github", common::oauth2_service("https://github.example"))])
        .expect("spawn app");
    let mut browser = common::Browser::new(&app);
    let res = browser.get("/callback/github?code=secretcode&state=secretstate").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(out.contains("unauthenticated request redirected to login"), "{}", out);
    assert!(out.contains("/callback/github"), "{}", out);
    assert!(!out.contains("secretcode"), "{}", out);
    assert!(!out.contains("secretstate"), "{}", out);
}

#[tokio::test]
async fn session_cookie_is_secure_only_for_https_deployments() {
    let form = [
        ("name", "Alice"),
        ("email", "alice@example.com"),
        ("password1", "password123"),
        ("password2", "password123"),
    ];

    let app = common::spawn_app_with(vec![], |cfg| cfg.server.public_url = "https://broker.example".into())
        .expect("spawn app");
    let res = common::Browser::new(&app).post_form("/register", &form).await;
    let cookie = set_cookie(&res);
    assert!(cookie.contains("Secure"), "{}", cookie);

    let app = common::spawn_app(vec![]).expect("spawn app");
    let res = common::Browser::new(&app).post_form("/register", &form).await;
    let cookie = set_cookie(&res);
    assert!(!cookie.contains("Secure"), "{}", cookie);
}

fn set_cookie(res: &axum::http::Response<axum::body::Body>) -> String {
    res.headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sid="))
        .expect("session cookie")
        .to_string()
}
