use axum::http::StatusCode;

#[path = "common.rs"]
mod common;

#[tokio::test]
async fn health_ok() {
    let app = common::spawn_app(vec![]).expect("spawn app");
    let mut browser = common::Browser::new(&app);

    let res = browser.get("/healthz").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(common::session_cookie(&res).is_none());
    assert_eq!(common::body_string(res).await, "ok");
}

#[tokio::test]
async fn anonymous_dashboard_lists_services() {
    let app = common::spawn_app(vec![
        ("github", common::oauth2_service("https://github.example")),
        ("broken", idioticio::config::ServiceCfg::default()),
    ])
    .expect("spawn app");
    let mut browser = common::Browser::new(&app);

    let res = browser.get("/").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = common::body_string(res).await;
    assert!(body.contains("github - Source hosting"), "{}", body);
    assert!(body.contains("broken (unavailable)"), "{}", body);
    assert!(body.contains("href=\"/login\""));
    assert!(!body.contains("/authorize/github"));
}
