use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, StatusCode};

use crate::{
    transport::TransportError,
    types::normalize_bearer_authorization,
    HttpRequest, HttpResponse,
};

/// Decides whether an unsuccessful response can be fixed by new credentials.
///
/// When it can, the implementation attaches the new credential to `request`
/// before returning `true`; the request is then re-sent immediately. An
/// implementation must return `false` once it has nothing new to offer,
/// otherwise the request would loop on the same rejected credential.
#[async_trait]
pub trait CredentialRefresh: Send + Sync {
    async fn decide(&self, request: &mut HttpRequest, response: &HttpResponse) -> bool;
}

#[async_trait]
impl<T: CredentialRefresh + ?Sized> CredentialRefresh for Arc<T> {
    async fn decide(&self, request: &mut HttpRequest, response: &HttpResponse) -> bool {
        (**self).decide(request, response).await
    }
}

/// Never retries. For unauthenticated clients.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentialRefresh;

#[async_trait]
impl CredentialRefresh for NoCredentialRefresh {
    async fn decide(&self, _request: &mut HttpRequest, _response: &HttpResponse) -> bool {
        false
    }
}

/// Source of access tokens, e.g. an OAuth2 client.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a token, fetching a new one if the current one may be stale.
    async fn refresh_token(&self) -> Result<String, TransportError>;
}

/// Refreshes a bearer token when the server rejects the current one.
///
/// A refresh is attempted when the server sends a `Bearer` challenge with
/// `error="invalid_token"`, or, without any `Bearer` challenge, on 401.
#[derive(Clone, Debug)]
pub struct BearerTokenRefresh<S> {
    source: S,
}

impl<S: TokenSource> BearerTokenRefresh<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn refresh_warranted(response: &HttpResponse) -> bool {
        let bearer_challenge = response
            .headers
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|challenge| is_bearer_challenge(challenge));

        match bearer_challenge {
            Some(challenge) => has_invalid_token_error(challenge),
            None => response.status == StatusCode::UNAUTHORIZED,
        }
    }
}

#[async_trait]
impl<S: TokenSource> CredentialRefresh for BearerTokenRefresh<S> {
    async fn decide(&self, request: &mut HttpRequest, response: &HttpResponse) -> bool {
        if !Self::refresh_warranted(response) {
            return false;
        }

        let token = match self.source.refresh_token().await {
            Ok(token) => token,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "unable to refresh access token");
                return false;
            }
        };

        let authorization = normalize_bearer_authorization(&token);
        if request.authorization() == Some(authorization.as_str()) {
            #[cfg(feature = "tracing")]
            tracing::debug!("refreshed token was already rejected, not retrying");
            return false;
        }

        match request.set_authorization(&authorization) {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "refreshed token is not a valid header value");
                false
            }
        }
    }
}

fn is_bearer_challenge(challenge: &str) -> bool {
    let trimmed = challenge.trim_start();
    trimmed
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"))
        && trimmed[6..].chars().next().map_or(true, char::is_whitespace)
}

/// Matches `error = "invalid_token"` anywhere in the challenge, quotes optional.
fn has_invalid_token_error(challenge: &str) -> bool {
    challenge.match_indices("error").any(|(index, _)| {
        let rest = challenge[index + "error".len()..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            return false;
        };
        let rest = rest.trim_start();
        let rest = rest.strip_prefix('"').unwrap_or(rest);
        rest.starts_with("invalid_token")
    })
}
