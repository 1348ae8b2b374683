//! Runtime configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use contacthub_infra::identity::GoTrueConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_SENSITIVE_PREFIXES: &str = "/admin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid BIND_ADDR '{0}'")]
    InvalidBindAddr(String),
}

#[derive(Clone)]
pub struct AppConfig {
    /// Hosted provider; `None` selects the in-memory provider.
    pub provider: Option<GoTrueConfig>,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub sensitive_prefixes: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("jwt_secret", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("sensitive_prefixes", &self.sensitive_prefixes)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match (
            get("SUPABASE_URL"),
            get("SUPABASE_KEY"),
            get("SUPABASE_SERVICE_ROLE_KEY"),
        ) {
            (Some(url), Some(anon_key), Some(service_role_key)) => Some(GoTrueConfig {
                url,
                anon_key,
                service_role_key,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("identity provider settings incomplete; using in-memory provider");
                None
            }
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let bind = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind.clone()))?;

        let sensitive_prefixes = get("SENSITIVE_PATH_PREFIXES")
            .unwrap_or_else(|| DEFAULT_SENSITIVE_PREFIXES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|p| p.starts_with('/'))
            .map(str::to_string)
            .collect();

        Ok(Self {
            provider,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            bind_addr,
            sensitive_prefixes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_select_in_memory_backends() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.provider.is_none());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.sensitive_prefixes, vec!["/admin".to_string()]);
    }

    #[test]
    fn provider_needs_all_three_settings() {
        let partial = config(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_KEY", "anon")]).unwrap();
        assert!(partial.provider.is_none());

        let full = config(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
        ])
        .unwrap();
        assert_eq!(full.provider.unwrap().url, "https://x.supabase.co");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let cfg = config(&[
            ("JWT_SECRET", "hunter2"),
            ("DATABASE_URL", "postgres://user:pw@db/contacts"),
        ])
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pw@db"));
    }

    #[test]
    fn sensitive_prefixes_are_parsed() {
        let cfg = config(&[("SENSITIVE_PATH_PREFIXES", "/admin, /contacts/edit,bogus")]).unwrap();
        assert_eq!(cfg.sensitive_prefixes, vec!["/admin", "/contacts/edit"]);
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        assert_eq!(
            config(&[("BIND_ADDR", "localhost")]).unwrap_err(),
            ConfigError::InvalidBindAddr("localhost".to_string())
        );
    }
}
