//! Stub transport for offline runs and tests

use async_trait::async_trait;
use crosspost_domain::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use std::sync::Mutex;

struct StubRoute {
    method: Option<HttpMethod>,
    url_contains: String,
    response: Result<HttpResponse, TransportError>,
}

/// Transport answering from a script instead of the network
///
/// Routes are matched in insertion order by method (if given) and URL
/// substring. Unmatched requests get `200 {}`.
#[derive(Default)]
pub struct StubTransport {
    routes: Vec<StubRoute>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Option<HttpMethod>, url_contains: &str, response: HttpResponse) -> Self {
        self.routes.push(StubRoute {
            method,
            url_contains: url_contains.to_string(),
            response: Ok(response),
        });
        self
    }

    pub fn on_error(mut self, method: Option<HttpMethod>, url_contains: &str, error: TransportError) -> Self {
        self.routes.push(StubRoute {
            method,
            url_contains: url_contains.to_string(),
            response: Err(error),
        });
        self
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "Stub transport request");

        let route = self.routes.iter().find(|route| {
            route.method.is_none_or(|m| m == request.method) && request.url.contains(&route.url_contains)
        });
        let response = match route {
            Some(route) => route.response.clone(),
            None => Ok(HttpResponse::json(200, &serde_json::json!({}))),
        };

        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);

        response
    }
}
