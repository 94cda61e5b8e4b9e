#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use idioticio::{
    app::{build_router, AppState},
    config::{generate_cookie_key, AppConfig, OAuthVariant, ServiceCfg},
    db::SqlitePool,
};
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot

pub const PUBLIC_URL: &str = "http://localhost";

pub struct TestApp {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub router: Router,
}

pub fn spawn_app(services: Vec<(&str, ServiceCfg)>) -> anyhow::Result<TestApp> {
    spawn_app_with(services, |_| {})
}

/// Like `spawn_app`, with a hook to adjust the configuration first.
pub fn spawn_app_with(
    services: Vec<(&str, ServiceCfg)>,
    configure: impl FnOnce(&mut AppConfig),
) -> anyhow::Result<TestApp> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.sqlite").display().to_string();

    let mut config = AppConfig::default();
    config.server.public_url = PUBLIC_URL.into();
    config.server.cookie_key_base64 = generate_cookie_key();
    config.db.url = db_path.clone();
    for (name, svc) in services {
        config.services.insert(name.to_string(), svc);
    }
    configure(&mut config);

    let pool = idioticio::db::init(&db_path)?;
    let router = build_router(AppState::new(config, pool.clone())?);
    Ok(TestApp { _dir: dir, pool, router })
}

pub fn oauth2_service(provider: &str) -> ServiceCfg {
    ServiceCfg {
        variant: OAuthVariant::OAuth2,
        client_id: Some("CLIENT".into()),
        client_secret: Some("SECRET".into()),
        authorization_url: format!("{}/authorize", provider),
        token_url: format!("{}/token", provider),
        scopes: vec!["repo".into(), "read:user".into()],
        description: Some("Source hosting".into()),
        ..Default::default()
    }
}

pub fn oauth1_service(provider: &str) -> ServiceCfg {
    ServiceCfg {
        variant: OAuthVariant::OAuth1,
        client_id: Some("consumer-key".into()),
        client_secret: Some("consumer-secret".into()),
        authorization_url: format!("{}/oauth/authorize", provider),
        token_url: format!("{}/oauth/access_token", provider),
        request_token_url: Some(format!("{}/oauth/request_token", provider)),
        ..Default::default()
    }
}

/// Drives the router like a browser: keeps the session cookie between requests.
pub struct Browser {
    app: Router,
    pub cookie: Option<String>,
}

impl Browser {
    pub fn new(app: &TestApp) -> Self {
        Self { app: app.router.clone(), cookie: None }
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let req = Request::get(uri);
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &[(&str, &str)]) -> Response<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let req = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(req.body(Body::from(body)).unwrap()).await
    }

    async fn send(&mut self, mut req: Request<Body>) -> Response<Body> {
        if let Some(c) = &self.cookie {
            req.headers_mut().insert(header::COOKIE, c.parse().unwrap());
        }
        let res = self.app.clone().oneshot(req).await.unwrap();
        if let Some(c) = session_cookie(&res) {
            self.cookie = if c == "sid=" { None } else { Some(c) };
        }
        res
    }

    pub async fn register(&mut self, name: &str, email: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/register",
            &[("name", name), ("email", email), ("password1", password), ("password2", password)],
        )
        .await
    }
}

/// `sid=...` from the response's Set-Cookie headers.
pub fn session_cookie(res: &Response<Body>) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sid="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

pub fn location(res: &Response<Body>) -> String {
    res.headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub async fn body_string(res: Response<Body>) -> String {
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
