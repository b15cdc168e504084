use std::fmt;
use std::sync::Arc;

use reqwest::Url;

use crate::config::ConfigV1;
use crate::utils::http_helpers::ServiceError;

/// The logical services the gateway forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKey {
    Auth,
    Todos,
    Users,
}

impl RouteKey {
    pub const ALL: [RouteKey; 3] = [RouteKey::Auth, RouteKey::Todos, RouteKey::Users];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKey::Auth => "auth",
            RouteKey::Todos => "todos",
            RouteKey::Users => "users",
        }
    }

    /// Path prefix the gateway serves for this route, and the default mount
    /// path of the backend behind it.
    pub fn prefix(&self) -> &'static str {
        match self {
            RouteKey::Auth => "/auth",
            RouteKey::Todos => "/api/todos",
            RouteKey::Users => "/api/users",
        }
    }

    /// Whether requests need a valid token before they are forwarded.
    pub fn is_gated(&self) -> bool {
        !matches!(self, RouteKey::Auth)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks up the single upstream base URL for a route.
///
/// Resolution reads the shared config on every call and parses the URL each
/// time, so a request never reaches the proxy without a usable upstream.
#[derive(Clone)]
pub struct UpstreamResolver {
    config: Arc<ConfigV1>,
}

impl UpstreamResolver {
    pub fn new(config: Arc<ConfigV1>) -> Self {
        UpstreamResolver { config }
    }

    pub fn resolve(&self, key: RouteKey) -> Result<Url, ServiceError> {
        let services = &self.config.services;
        let raw = match key {
            RouteKey::Auth => services.auth.as_deref(),
            RouteKey::Todos => services.todos.as_deref(),
            RouteKey::Users => services.users.as_deref(),
        }
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| {
            ServiceError::Configuration(format!("no upstream configured for '{}'", key))
        })?;

        let url = Url::parse(raw).map_err(|e| {
            ServiceError::Configuration(format!("invalid upstream '{}' for '{}': {}", raw, key, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ServiceError::Configuration(format!(
                "upstream '{}' for '{}' is not an http(s) URL",
                raw, key
            )));
        }
        Ok(url)
    }

    /// Resolves every route once, failing on the first bad mapping.
    pub fn validate_all(&self) -> Result<(), ServiceError> {
        for key in RouteKey::ALL {
            self.resolve(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::extract_config;
    use figment::providers::{Format, Yaml};
    use figment::Figment;

    fn resolver(yaml: &str) -> UpstreamResolver {
        let config = extract_config(Figment::new().merge(Yaml::string(yaml))).unwrap();
        UpstreamResolver::new(Arc::new(config))
    }

    #[test]
    fn test_resolves_configured_upstreams() {
        let resolver = resolver(
            r#"
services:
  auth: http://auth:8081
  todos: http://todo:8082/base
  users: https://users.internal
"#,
        );
        assert_eq!(
            resolver.resolve(RouteKey::Auth).unwrap().as_str(),
            "http://auth:8081/"
        );
        assert_eq!(resolver.resolve(RouteKey::Todos).unwrap().path(), "/base");
        assert!(resolver.validate_all().is_ok());
    }

    #[test]
    fn test_missing_and_broken_upstreams() {
        let resolver = resolver(
            r#"
services:
  auth: "  "
  todos: "not a url"
  users: "ftp://files"
"#,
        );
        for key in RouteKey::ALL {
            assert!(matches!(
                resolver.resolve(key),
                Err(ServiceError::Configuration(_))
            ));
        }
        assert!(resolver.validate_all().is_err());
    }

    #[test]
    fn test_only_auth_is_ungated() {
        assert!(!RouteKey::Auth.is_gated());
        assert!(RouteKey::Todos.is_gated());
        assert!(RouteKey::Users.is_gated());
    }
}
