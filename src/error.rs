use crate::{transport::TransportError, HttpResponse};

/// Error type returned by this crate.
///
/// Retry decisions never produce an error of their own: when a request gives
/// up, the failure of the final attempt is what surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure below the HTTP layer, exactly as the transport raised it.
    #[error(transparent)]
    Transport(TransportError),
    /// Non-success HTTP response from the final attempt, body included.
    #[error("http error {}", .0.status)]
    Http(Box<HttpResponse>),
    /// Rejected retry configuration.
    #[error("invalid retry config: {0}")]
    InvalidConfig(String),
    /// Request could not be built: bad URL, header value or JSON body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Response body decoding error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// HTTP status of the final response, if the request failed at the HTTP layer.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Http(response) => Some(response.status),
            _ => None,
        }
    }
}
