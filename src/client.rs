use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    AttemptState, Error, HttpRequest, HttpResponse, Result, RetryHandler, Transport,
    TransportFailureHook, UnsuccessfulResponseHook,
};

/// Runs the attempt loop of a logical request over a [`Transport`].
///
/// The loop asks the installed hooks whether to re-send after each failure.
/// Without hooks every failure is returned as is.
#[derive(Clone)]
pub struct RetryingClient<T> {
    transport: T,
    transport_hook: Option<Arc<dyn TransportFailureHook>>,
    response_hook: Option<Arc<dyn UnsuccessfulResponseHook>>,
}

impl<T: fmt::Debug> fmt::Debug for RetryingClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("transport", &self.transport)
            .field("transport_hook", &self.transport_hook.is_some())
            .field("response_hook", &self.response_hook.is_some())
            .finish()
    }
}

impl<T: Transport> RetryingClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            transport_hook: None,
            response_hook: None,
        }
    }

    /// Installs `handler` as both the transport-failure and the response hook.
    pub fn with_retry_handler(self, handler: RetryHandler) -> Self {
        let handler = Arc::new(handler);
        self.with_transport_failure_hook(handler.clone())
            .with_response_hook(handler)
    }

    pub fn with_transport_failure_hook(mut self, hook: Arc<dyn TransportFailureHook>) -> Self {
        self.transport_hook = Some(hook);
        self
    }

    pub fn with_response_hook(mut self, hook: Arc<dyn UnsuccessfulResponseHook>) -> Self {
        self.response_hook = Some(hook);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` until it succeeds or a hook declines to retry.
    ///
    /// `request` is updated in place by credential refresh, so after the call
    /// it holds the headers of the last attempt. On failure the error of the
    /// last attempt is returned unchanged.
    pub async fn execute(&self, request: &mut HttpRequest) -> Result<HttpResponse> {
        self.execute_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute); cancelling `token` stops any pending
    /// backoff wait and keeps the request from being re-sent. The failure of
    /// the last attempt is returned.
    pub async fn execute_with_cancellation(
        &self,
        request: &mut HttpRequest,
        token: CancellationToken,
    ) -> Result<HttpResponse> {
        let mut state = AttemptState::with_cancellation(token);
        loop {
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    let retry = match &self.response_hook {
                        Some(hook) => {
                            hook.on_unsuccessful_response(request, &response, &mut state)
                                .await
                        }
                        None => false,
                    };
                    // Credential retries don't wait, so cancellation is checked here.
                    if !retry || state.is_cancelled() {
                        return Err(Error::Http(Box::new(response)));
                    }
                }
                Err(err) => {
                    let retry = match &self.transport_hook {
                        Some(hook) => hook.on_transport_failure(&*err, &mut state).await,
                        None => false,
                    };
                    if !retry || state.is_cancelled() {
                        return Err(Error::Transport(err));
                    }
                }
            }
        }
    }
}
