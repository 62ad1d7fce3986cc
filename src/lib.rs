//! `http-retry-handler` decides whether a failed HTTP attempt is retried, how
//! long to wait first, and how credential refresh fits in.
//!
//! The pieces:
//! - [`RetryConfig`] and [`BackoffPolicy`] describe the retry budget and waits.
//! - [`TransportFailureHandler`] retries transport errors with backoff.
//! - [`ResponseFailureHandler`] retries configured status codes with backoff
//!   and hands everything else to a [`CredentialRefresh`] collaborator.
//! - [`RetryHandler`] wires both to one config, exposed through the
//!   [`TransportFailureHook`] and [`UnsuccessfulResponseHook`] traits.
//! - [`RetryingClient`] is an attempt loop over any [`Transport`] that calls
//!   those hooks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use http_retry_handler::{
//!     HttpRequest, NoCredentialRefresh, ReqwestTransport, RetryConfig, RetryHandler,
//!     RetryingClient,
//! };
//!
//! # async fn run() -> http_retry_handler::Result<()> {
//! let config = RetryConfig::builder()
//!     .max_retries(4)
//!     .retry_status_codes([500, 503])
//!     .build()?;
//! let client = RetryingClient::new(ReqwestTransport::new())
//!     .with_retry_handler(RetryHandler::new(Arc::new(NoCredentialRefresh), config));
//!
//! let mut request = HttpRequest::get("https://example.com/v1/items")?;
//! let response = client.execute(&mut request).await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod attempt;
mod backoff;
mod client;
mod config;
mod credentials;
mod error;
mod retry_handler;
mod handlers;
mod sleeper;
mod transport;
mod types;

pub use attempt::AttemptState;
pub use backoff::BackoffPolicy;
pub use client::RetryingClient;
pub use config::{RetryConfig, RetryConfigBuilder};
pub use credentials::{BearerTokenRefresh, CredentialRefresh, NoCredentialRefresh, TokenSource};
pub use error::Error;
pub use retry_handler::{RetryHandler, TransportFailureHook, UnsuccessfulResponseHook};
pub use handlers::{ResponseFailureHandler, TransportFailureHandler};
pub use sleeper::{MockSleeper, Sleeper, TokioSleeper};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportOptions};
pub use types::{HttpRequest, HttpResponse};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;
