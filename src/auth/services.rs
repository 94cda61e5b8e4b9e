use std::collections::BTreeMap;

use crate::{
    config::{AppConfig, OAuthVariant, ServiceCfg},
    error::AuthError,
};

/// A configured service with its client credentials resolved.
#[derive(Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub variant: OAuthVariant,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    pub request_token_url: Option<String>,
    pub scopes: Vec<String>,
    pub description: Option<String>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("client_id", &self.client_id)
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// Read-only view of the services from the startup configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceCfg>,
}

/// Summary used for listings; no credentials.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: Option<String>,
    pub available: bool,
}

impl ServiceRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { services: config.services.clone() }
    }

    pub fn find_service(&self, name: &str) -> Result<ServiceConfig, AuthError> {
        let cfg = self
            .services
            .get(name)
            .ok_or_else(|| AuthError::InvalidServiceConfig(name.to_string()))?;

        let client_id = non_empty(cfg.client_id.as_deref())
            .ok_or_else(|| AuthError::InvalidServiceConfig(name.to_string()))?;
        let client_secret = non_empty(cfg.client_secret.as_deref())
            .ok_or_else(|| AuthError::InvalidServiceConfig(name.to_string()))?;

        Ok(ServiceConfig {
            name: name.to_string(),
            variant: cfg.variant,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authorization_url: cfg.authorization_url.clone(),
            token_url: cfg.token_url.clone(),
            request_token_url: cfg.request_token_url.clone(),
            scopes: cfg.scopes.clone(),
            description: cfg.description.clone(),
        })
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        self.services
            .iter()
            .map(|(name, cfg)| ServiceInfo {
                name: name.clone(),
                description: cfg.description.clone(),
                available: self.find_service(name).is_ok(),
            })
            .collect()
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
