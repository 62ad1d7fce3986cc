use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use http_retry_handler::{
    BearerTokenRefresh, Error, HttpRequest, MockSleeper, NoCredentialRefresh, ReqwestTransport,
    RetryConfig, RetryHandler, RetryingClient, TokenSource, TransportError, TransportOptions,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn with_header(mut self, name: header::HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
}

async fn messages_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    _body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .authorizations
        .lock()
        .expect("authorization log mutex must not be poisoned")
        .push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        );

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, response.headers, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations
            .lock()
            .expect("authorization log mutex must not be poisoned")
            .clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
        authorizations: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/v1/messages", post(messages_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        authorizations: state.authorizations,
        task,
    }
}

struct FixedToken(&'static str);

#[async_trait]
impl TokenSource for FixedToken {
    async fn refresh_token(&self) -> Result<String, TransportError> {
        Ok(self.0.to_owned())
    }
}

fn config(max_retries: u32, codes: &[u16]) -> RetryConfig {
    RetryConfig::builder()
        .max_retries(max_retries)
        .retry_status_codes(codes.iter().copied())
        .initial_interval_ms(1)
        .build()
        .expect("config must build")
}

fn client(
    handler: RetryHandler,
    sleeper: &MockSleeper,
    timeout_ms: u64,
) -> RetryingClient<ReqwestTransport> {
    let transport = ReqwestTransport::new().with_options(TransportOptions { timeout_ms });
    RetryingClient::new(transport)
        .with_retry_handler(handler.with_sleeper(Arc::new(sleeper.clone())))
}

fn post_request(url: &str, token: &str) -> HttpRequest {
    HttpRequest::post(url)
        .and_then(|request| request.bearer_auth(token))
        .and_then(|request| request.json(&json!({ "text": "hello" })))
        .expect("request must build")
}

#[tokio::test]
async fn retries_on_retryable_http_status() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
        MockResponse::json(StatusCode::OK, json!({"id": 7})),
    ])
    .await;
    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(Arc::new(NoCredentialRefresh), config(3, &[503])),
        &sleeper,
        1_000,
    );

    let response = client
        .execute(&mut post_request(&server.messages_url(), "token"))
        .await
        .expect("request must succeed after retry");

    let body: JsonValue = response.json().expect("body must be JSON");
    assert_eq!(body, json!({"id": 7}));
    assert_eq!(server.hits(), 2);
    assert_eq!(sleeper.count(), 1);
}

#[tokio::test]
async fn honors_retry_after_header() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"}))
            .with_header(header::RETRY_AFTER, "2"),
        MockResponse::json(StatusCode::OK, json!({"id": 1})),
    ])
    .await;
    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(Arc::new(NoCredentialRefresh), config(3, &[429])),
        &sleeper,
        1_000,
    );

    client
        .execute(&mut post_request(&server.messages_url(), "token"))
        .await
        .expect("request must succeed after retry");

    assert_eq!(sleeper.durations(), vec![Duration::from_secs(2)]);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn unlisted_status_surfaces_original_response() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"error": "no such message"}),
    )
    .with_header(header::HeaderName::from_static("x-request-id"), "abc")])
    .await;
    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(Arc::new(NoCredentialRefresh), config(4, &[503])),
        &sleeper,
        1_000,
    );

    let err = client
        .execute(&mut post_request(&server.messages_url(), "token"))
        .await
        .expect_err("request must fail");

    match err {
        Error::Http(response) => {
            assert_eq!(response.status, StatusCode::NOT_FOUND);
            assert_eq!(
                response.header(&header::HeaderName::from_static("x-request-id")),
                Some("abc")
            );
            assert_eq!(response.body, br#"{"error":"no such message"}"#.to_vec());
        }
        other => panic!("expected http error, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn refreshes_rejected_bearer_token() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::UNAUTHORIZED, json!({"error": "expired"}))
            .with_header(header::WWW_AUTHENTICATE, r#"Bearer error="invalid_token""#),
        MockResponse::json(StatusCode::OK, json!({"id": 3})),
    ])
    .await;
    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(
            Arc::new(BearerTokenRefresh::new(FixedToken("fresh"))),
            config(4, &[503]),
        ),
        &sleeper,
        1_000,
    );

    client
        .execute(&mut post_request(&server.messages_url(), "stale"))
        .await
        .expect("request must succeed with refreshed token");

    assert_eq!(
        server.authorizations(),
        vec![
            Some("Bearer stale".to_owned()),
            Some("Bearer fresh".to_owned())
        ]
    );
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn request_timeout_is_retried_then_surfaces_transport_error() {
    let slow = MockResponse::json(StatusCode::OK, json!({"id": 1}))
        .with_delay(Duration::from_millis(500));
    let server = spawn_server(vec![slow.clone(), slow.clone(), slow]).await;
    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(Arc::new(NoCredentialRefresh), config(2, &[])),
        &sleeper,
        100,
    );

    let err = client
        .execute(&mut post_request(&server.messages_url(), "token"))
        .await
        .expect_err("request must time out");

    match err {
        Error::Transport(inner) => {
            let inner = inner
                .downcast_ref::<reqwest::Error>()
                .expect("transport error must be a reqwest error");
            assert!(inner.is_timeout());
        }
        other => panic!("expected transport timeout error, got {other:?}"),
    }
    assert_eq!(sleeper.count(), 2);
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn connection_refused_is_retried_then_surfaces_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let sleeper = MockSleeper::new();
    let client = client(
        RetryHandler::new(Arc::new(NoCredentialRefresh), config(3, &[])),
        &sleeper,
        1_000,
    );

    let err = client
        .execute(&mut post_request(&format!("http://{address}/v1/messages"), "token"))
        .await
        .expect_err("request must fail to connect");

    match err {
        Error::Transport(inner) => {
            let inner = inner
                .downcast_ref::<reqwest::Error>()
                .expect("transport error must be a reqwest error");
            assert!(inner.is_connect());
        }
        other => panic!("expected transport connect error, got {other:?}"),
    }
    assert_eq!(sleeper.count(), 3);
}
