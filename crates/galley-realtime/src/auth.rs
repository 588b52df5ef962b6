//! Credentials and tenant scope for opening the socket.

use async_trait::async_trait;
use galley_core::{AuthError, TransportError};
use url::Url;

/// Supplies the bearer token used to open the connection.
///
/// Called once per connect attempt. `Ok(None)` means "no credentials"; the
/// connection is still attempted and the condition is logged.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch the current token.
    async fn token(&self) -> Result<Option<String>, AuthError>;
}

/// Supplies the current tenant.
pub trait TenantContext: Send + Sync {
    /// Restaurant the connection is scoped to.
    fn restaurant_id(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone, Debug)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, AuthError> {
        Ok(Some(self.0.clone()))
    }
}

/// No credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn token(&self) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

/// A fixed tenant, or none.
#[derive(Clone, Debug, Default)]
pub struct StaticTenant(Option<String>);

impl StaticTenant {
    /// Tenant scope from an optional id.
    pub fn new(restaurant_id: Option<String>) -> Self {
        Self(restaurant_id)
    }
}

impl TenantContext for StaticTenant {
    fn restaurant_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Build the socket URL from the configured base endpoint.
///
/// `http` becomes `ws` and `https` becomes `wss`; socket schemes are kept.
/// The path is preserved and `token` / `restaurant_id` are appended when present.
pub fn build_socket_url(
    base: &str,
    token: Option<&str>,
    restaurant_id: Option<&str>,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {other:?} in {base}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(format!("cannot use {scheme} for {base}")))?;
    if token.is_some() || restaurant_id.is_some() {
        let mut pairs = url.query_pairs_mut();
        if let Some(token) = token {
            let _ = pairs.append_pair("token", token);
        }
        if let Some(id) = restaurant_id {
            let _ = pairs.append_pair("restaurant_id", id);
        }
    }
    Ok(url)
}

/// URL with the `token` value masked, for logs.
pub fn redacted(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "[REDACTED]".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let _ = masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
