use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque handle to the request half of a platform HTTP exchange.
///
/// The platform hands the embedding function a request/response pair that
/// belong to the same exchange; the shared `exchange` id is what links them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HttpRequest {
    exchange: String,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Opaque handle to the response half of a platform HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HttpResponse {
    exchange: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    pub fn exchange_id(&self) -> &str {
        &self.exchange
    }

    /// True when `response` belongs to the same exchange as this request.
    pub fn is_linked(&self, response: &HttpResponse) -> bool {
        self.exchange == response.exchange
    }
}

impl HttpResponse {
    pub fn exchange_id(&self) -> &str {
        &self.exchange
    }
}

/// Build a linked request/response pair for one HTTP exchange.
pub fn http_exchange(method: &str, path: &str, body: Value) -> (HttpRequest, HttpResponse) {
    let exchange = uuid::Uuid::new_v4().to_string();
    let request = HttpRequest {
        exchange: exchange.clone(),
        method: method.to_string(),
        path: path.to_string(),
        headers: HashMap::new(),
        body,
    };
    let response = HttpResponse {
        exchange,
        status: 200,
        headers: HashMap::new(),
    };
    (request, response)
}

/// The termination callback a background/event trigger hands the function.
/// Invoking it tells the platform the event has been fully handled.
#[derive(Clone)]
pub struct CompletionCallback(Arc<dyn Fn(Result<Value, String>) + Send + Sync>);

impl CompletionCallback {
    pub fn new(f: impl Fn(Result<Value, String>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A callback that discards the outcome.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn complete(&self, outcome: Result<Value, String>) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionCallback")
    }
}

/// The normalized unit of dispatch. Exactly one variant per envelope,
/// fixed at creation; an envelope is delivered to at most one node.
#[derive(Debug)]
pub enum Envelope {
    Http {
        request: HttpRequest,
        response: HttpResponse,
    },
    Background {
        payload: Value,
        context: Value,
        done: CompletionCallback,
    },
}

impl Envelope {
    pub fn is_http(&self) -> bool {
        matches!(self, Envelope::Http { .. })
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Envelope::Background { .. })
    }
}
