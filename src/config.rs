use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine as _;
use rand::RngCore;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerCfg {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Base64-encoded 32 or 64 byte key used to encrypt the session cookie
    #[serde(default)]
    pub cookie_key_base64: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,
}

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

impl ServerCfg {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Cookies are marked `Secure` when the app is served over https.
    pub fn secure_cookies(&self) -> bool {
        url::Url::parse(&self.public_url)
            .map(|u| u.scheme() == "https")
            .unwrap_or(false)
    }
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            cookie_key_base64: String::new(),
            session_ttl_minutes: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbCfg {
    /// Path of the SQLite database file
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DbCfg {
    fn default() -> Self {
        Self { url: default_db_url() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OAuthVariant {
    #[serde(alias = "oauth1a")]
    OAuth1,
    #[default]
    OAuth2,
}

/// One third-party service users can authorize.
#[derive(Clone, Deserialize, Default)]
pub struct ServiceCfg {
    #[serde(default)]
    pub variant: OAuthVariant,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub authorization_url: String,
    #[serde(default)]
    pub token_url: String,
    /// OAuth1 temporary credential endpoint
    pub request_token_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub description: Option<String>,
}

// Keep client secrets out of `?config` log lines.
impl std::fmt::Debug for ServiceCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCfg")
            .field("variant", &self.variant)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("request_token_url", &self.request_token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerCfg,
    #[serde(default)]
    pub db: DbCfg,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceCfg>,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_public_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_session_ttl() -> i64 { 60 }
fn default_db_url() -> String { "idioticio.db".to_string() }

impl AppConfig {
    /// Defaults, then the optional YAML file, then `IDIOTICIO__*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("IDIOTICIO").separator("__"))
            .build()?;

        let mut cfg: AppConfig = settings.try_deserialize()?;

        // Flat names kept for convenience: DATABASE_URL, COOKIE_KEY_BASE64
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.db.url = url;
        }
        if cfg.server.cookie_key_base64.is_empty() {
            if let Ok(v) = std::env::var("COOKIE_KEY_BASE64") {
                cfg.server.cookie_key_base64 = v;
            } else {
                cfg.server.cookie_key_base64 = generate_cookie_key();
                tracing::warn!(
                    "no cookie key configured; generated a temporary one. Sessions will be invalidated on restart."
                );
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let ttl = self.server.session_ttl_minutes;
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&ttl) {
            anyhow::bail!(
                "server.session_ttl_minutes must be between 1 and {}, got {}",
                MAX_SESSION_TTL_MINUTES,
                ttl
            );
        }
        url::Url::parse(&self.server.public_url)
            .map_err(|e| anyhow::anyhow!("invalid server.public_url {:?}: {}", self.server.public_url, e))?;
        Ok(())
    }
}

pub fn generate_cookie_key() -> String {
    let mut key = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

pub fn decode_cookie_key(b64: &str) -> anyhow::Result<[u8; 64]> {
    // tower-cookies expects a 64 byte master key for private cookies
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid cookie key: {}", e))?;
    let mut out = [0u8; 64];
    match bytes.len() {
        32 => {
            out[..32].copy_from_slice(&bytes);
            out[32..].copy_from_slice(&bytes);
        }
        64 => out.copy_from_slice(&bytes),
        n => {
            return Err(anyhow::anyhow!(
                "cookie key must decode to 32 or 64 bytes, got {}",
                n
            ))
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn decode_cookie_key_accepts_32_and_64_bytes() {
        let short = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let key = decode_cookie_key(&short).unwrap();
        assert_eq!(&key[..32], &key[32..]);

        let long = generate_cookie_key();
        assert!(decode_cookie_key(&long).is_ok());
    }

    #[test]
    fn decode_cookie_key_rejects_other_lengths() {
        let odd = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(decode_cookie_key(&odd).is_err());
        assert!(decode_cookie_key("not base64!").is_err());
    }

    #[test]
    fn load_reads_services_from_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
server:
  port: 9090
  cookie_key_base64: "{}"
db:
  url: /tmp/idioticio-test.db
services:
  github:
    client_id: abc
    client_secret: def
    authorization_url: https://github.com/login/oauth/authorize
    token_url: https://github.com/login/oauth/access_token
    scopes: [repo, "read:user"]
    description: Source hosting
  twitter:
    variant: oauth1
    client_id: ck
    client_secret: cs
    request_token_url: https://api.twitter.com/oauth/request_token
    authorization_url: https://api.twitter.com/oauth/authorize
    token_url: https://api.twitter.com/oauth/access_token
"#,
            generate_cookie_key()
        )
        .unwrap();

        let cfg = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "127.0.0.1");
        let github = &cfg.services["github"];
        assert_eq!(github.variant, OAuthVariant::OAuth2);
        assert_eq!(github.scopes, vec!["repo".to_string(), "read:user".to_string()]);
        assert_eq!(cfg.services["twitter"].variant, OAuthVariant::OAuth1);
    }

    #[test]
    fn session_ttl_must_be_in_range() {
        for ttl in [0, -5, MAX_SESSION_TTL_MINUTES + 1, i64::MAX] {
            let mut cfg = AppConfig::default();
            cfg.server.session_ttl_minutes = ttl;
            assert!(cfg.validate().is_err(), "ttl {} accepted", ttl);
        }
        let mut cfg = AppConfig::default();
        cfg.server.session_ttl_minutes = MAX_SESSION_TTL_MINUTES;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_rejects_zero_ttl() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "server:\n  session_ttl_minutes: 0\n  cookie_key_base64: \"{}\"\n",
            generate_cookie_key()
        )
        .unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("session_ttl_minutes"), "{}", err);
    }

    #[test]
    fn secure_cookies_follow_public_url_scheme() {
        let mut server = ServerCfg::default();
        assert!(!server.secure_cookies());
        server.public_url = "https://idiotic.example".into();
        assert!(server.secure_cookies());
        server.public_url = "not a url".into();
        assert!(!server.secure_cookies());
    }
}
