//! Caller identity: bearer token resolution and client address.
//!
//! Token verification proper belongs to the deployment's identity
//! provider. [`StaticTokens`] is the configuration-backed stand-in.

use std::collections::{HashMap, HashSet};

use axum::http::HeaderMap;
use carebot_config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub admin: bool,
}

pub trait TokenResolver: Send + Sync {
    /// `None` for unknown tokens; the request then proceeds anonymously.
    fn resolve(&self, token: &str) -> Option<Principal>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
    admins: HashSet<String>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, String>, admins: impl IntoIterator<Item = String>) -> Self {
        Self { tokens, admins: admins.into_iter().collect() }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self::new(cfg.tokens.clone(), cfg.admin_users.iter().cloned())
    }
}

impl TokenResolver for StaticTokens {
    fn resolve(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).map(|user_id| Principal {
            admin: self.admins.contains(user_id),
            user_id: user_id.clone(),
        })
    }
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header("x-real-ip"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_static_tokens_mark_admins() {
        let tokens = StaticTokens::new(
            HashMap::from([("t-1".to_string(), "user-1".to_string()), ("t-ops".to_string(), "ops".to_string())]),
            ["ops".to_string()],
        );
        assert_eq!(tokens.resolve("t-1"), Some(Principal { user_id: "user-1".into(), admin: false }));
        assert!(tokens.resolve("t-ops").is_some_and(|p| p.admin));
        assert_eq!(tokens.resolve("nope"), None);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
