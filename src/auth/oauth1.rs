//! OAuth 1.0a client side (RFC 5849) with HMAC-SHA1 signatures.
//!
//! Only the pieces needed for the three-legged flow: obtaining temporary
//! credentials, building the user redirect, and trading the verifier for
//! token credentials.

use std::collections::BTreeMap;

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

use crate::{auth::services::ServiceConfig, auth::tokens::IssuedToken, error::AuthError};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved-set encoding, as section 3.6 requires.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Section 3.4.1: `METHOD&base-uri&normalized-params`.
pub fn signature_base_string(method: &str, base_url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(base_url),
        percent_encode(&normalized)
    )
}

pub fn sign_hmac_sha1(base_string: &str, consumer_secret: &str, token_secret: &str) -> Result<String, AuthError> {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| AuthError::Exchange(e.to_string()))?;
    mac.update(base_string.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Per-request protocol parameters; nonce and timestamp are injectable for tests.
#[derive(Debug, Clone)]
pub struct SigningParams<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: Option<&'a str>,
    pub token_secret: &'a str,
    pub nonce: String,
    pub timestamp: i64,
}

impl<'a> SigningParams<'a> {
    pub fn new(consumer_key: &'a str, consumer_secret: &'a str) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            token: None,
            token_secret: "",
            nonce: crate::security::random_token(24),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn with_token(mut self, token: &'a str, token_secret: &'a str) -> Self {
        self.token = Some(token);
        self.token_secret = token_secret;
        self
    }
}

/// Builds the `Authorization: OAuth ...` header value for a request to `url`.
///
/// `extra_oauth` carries protocol parameters such as `oauth_callback` or
/// `oauth_verifier`; `request_params` are query/form parameters that are
/// signed but not placed in the header.
pub fn authorization_header(
    method: &str,
    url: &str,
    signing: &SigningParams<'_>,
    extra_oauth: &[(&str, &str)],
    request_params: &[(String, String)],
) -> Result<String, AuthError> {
    let parsed = Url::parse(url)
        .map_err(|e| AuthError::InvalidServiceConfig(format!("{}: {}", url, e)))?;
    let mut base_url = parsed.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    let mut oauth: BTreeMap<String, String> = BTreeMap::new();
    oauth.insert("oauth_consumer_key".into(), signing.consumer_key.into());
    oauth.insert("oauth_nonce".into(), signing.nonce.clone());
    oauth.insert("oauth_signature_method".into(), "HMAC-SHA1".into());
    oauth.insert("oauth_timestamp".into(), signing.timestamp.to_string());
    oauth.insert("oauth_version".into(), "1.0".into());
    if let Some(token) = signing.token {
        oauth.insert("oauth_token".into(), token.into());
    }
    for (k, v) in extra_oauth {
        oauth.insert((*k).to_string(), (*v).to_string());
    }

    let mut all: Vec<(String, String)> = oauth.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    all.extend(parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));
    all.extend(request_params.iter().cloned());

    let base = signature_base_string(method, base_url.as_str(), &all);
    let signature = sign_hmac_sha1(&base, signing.consumer_secret, signing.token_secret)?;
    oauth.insert("oauth_signature".into(), signature);

    let fields = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {}", fields))
}

/// Temporary credentials from the request-token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

pub async fn request_token(
    http: &reqwest::Client,
    service: &ServiceConfig,
    callback_url: &str,
) -> Result<RequestToken, AuthError> {
    let endpoint = service.request_token_url.as_deref().ok_or_else(|| {
        AuthError::InvalidServiceConfig(format!("{} has no request_token_url", service.name))
    })?;
    let signing = SigningParams::new(&service.client_id, &service.client_secret);
    let header = authorization_header(
        "POST",
        endpoint,
        &signing,
        &[("oauth_callback", callback_url)],
        &[],
    )?;

    let body = post_signed(http, endpoint, header).await?;
    let fields = parse_form(&body);
    if fields.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
        tracing::warn!(service = %service.name, "provider did not confirm oauth_callback");
    }
    let token = fields
        .get("oauth_token")
        .cloned()
        .ok_or_else(|| AuthError::Exchange("request token response missing oauth_token".into()))?;
    let secret = fields.get("oauth_token_secret").cloned().unwrap_or_default();
    Ok(RequestToken { token, secret })
}

/// URL the user is sent to in order to approve the request token.
pub fn authorize_url(service: &ServiceConfig, request_token: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(&service.authorization_url).map_err(|e| {
        AuthError::InvalidServiceConfig(format!("{}: {}", service.name, e))
    })?;
    url.query_pairs_mut().append_pair("oauth_token", request_token);
    Ok(url)
}

pub async fn access_token(
    http: &reqwest::Client,
    service: &ServiceConfig,
    request: &RequestToken,
    verifier: &str,
) -> Result<IssuedToken, AuthError> {
    let signing = SigningParams::new(&service.client_id, &service.client_secret)
        .with_token(&request.token, &request.secret);
    let header = authorization_header(
        "POST",
        &service.token_url,
        &signing,
        &[("oauth_verifier", verifier)],
        &[],
    )?;

    let body = post_signed(http, &service.token_url, header).await?;
    let fields = parse_form(&body);
    let value = fields
        .get("oauth_token")
        .cloned()
        .ok_or_else(|| AuthError::Exchange("access token response missing oauth_token".into()))?;

    Ok(IssuedToken {
        value,
        token_type: "oauth1".to_string(),
        secret: fields.get("oauth_token_secret").cloned(),
        refresh_token: None,
        expires_in: None,
        scopes: service.scopes.clone(),
    })
}

async fn post_signed(http: &reqwest::Client, url: &str, header: String) -> Result<String, AuthError> {
    let resp = http
        .post(url)
        .header(reqwest::header::AUTHORIZATION, header)
        .send()
        .await
        .map_err(|e| AuthError::Exchange(e.to_string()))?;
    let status = resp.status();
    let body = resp.text().await.map_err(|e| AuthError::Exchange(e.to_string()))?;
    if !status.is_success() {
        let fields = parse_form(&body);
        if let Some(problem) = fields.get("oauth_problem") {
            return Err(AuthError::Provider {
                code: problem.clone(),
                description: fields.get("oauth_problem_advice").cloned(),
            });
        }
        return Err(AuthError::Exchange(format!("{} returned {}", url, status)));
    }
    Ok(body)
}

fn parse_form(body: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
