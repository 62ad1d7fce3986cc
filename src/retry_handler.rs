use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    AttemptState, BackoffPolicy, CredentialRefresh, HttpRequest, HttpResponse,
    ResponseFailureHandler, RetryConfig, Sleeper, TransportFailureHandler,
};

/// Called by the transport loop when an attempt fails before a response arrives.
#[async_trait]
pub trait TransportFailureHook: Send + Sync {
    async fn on_transport_failure(
        &self,
        error: &(dyn StdError + Send + Sync + 'static),
        state: &mut AttemptState,
    ) -> bool;
}

/// Called by the transport loop when an attempt gets a non-success response.
/// May mutate `request` before it is re-sent.
#[async_trait]
pub trait UnsuccessfulResponseHook: Send + Sync {
    async fn on_unsuccessful_response(
        &self,
        request: &mut HttpRequest,
        response: &HttpResponse,
        state: &mut AttemptState,
    ) -> bool;
}

#[async_trait]
impl TransportFailureHook for TransportFailureHandler {
    async fn on_transport_failure(
        &self,
        error: &(dyn StdError + Send + Sync + 'static),
        state: &mut AttemptState,
    ) -> bool {
        TransportFailureHandler::on_transport_failure(self, error, state).await
    }
}

#[async_trait]
impl UnsuccessfulResponseHook for ResponseFailureHandler {
    async fn on_unsuccessful_response(
        &self,
        request: &mut HttpRequest,
        response: &HttpResponse,
        state: &mut AttemptState,
    ) -> bool {
        ResponseFailureHandler::on_unsuccessful_response(self, request, response, state).await
    }
}

/// Both failure hooks wired to one retry config and one credential collaborator.
///
/// The handler itself is stateless and can serve any number of concurrent
/// requests; each request brings its own [`AttemptState`].
#[derive(Clone)]
pub struct RetryHandler {
    config: RetryConfig,
    transport: TransportFailureHandler,
    response: ResponseFailureHandler,
}

impl fmt::Debug for RetryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryHandler {
    pub fn new(credentials: Arc<dyn CredentialRefresh>, config: RetryConfig) -> Self {
        Self {
            transport: TransportFailureHandler::new(BackoffPolicy::new(&config)),
            response: ResponseFailureHandler::new(&config, credentials),
            config,
        }
    }

    /// Uses `sleeper` for the backoff waits of both hooks.
    pub fn with_sleeper(self, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport: self.transport.with_sleeper(Arc::clone(&sleeper)),
            response: self.response.with_sleeper(sleeper),
            config: self.config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn transport_handler(&self) -> &TransportFailureHandler {
        &self.transport
    }

    pub fn response_handler(&self) -> &ResponseFailureHandler {
        &self.response
    }
}

#[async_trait]
impl TransportFailureHook for RetryHandler {
    async fn on_transport_failure(
        &self,
        error: &(dyn StdError + Send + Sync + 'static),
        state: &mut AttemptState,
    ) -> bool {
        self.transport.on_transport_failure(error, state).await
    }
}

#[async_trait]
impl UnsuccessfulResponseHook for RetryHandler {
    async fn on_unsuccessful_response(
        &self,
        request: &mut HttpRequest,
        response: &HttpResponse,
        state: &mut AttemptState,
    ) -> bool {
        self.response
            .on_unsuccessful_response(request, response, state)
            .await
    }
}
