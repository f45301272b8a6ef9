//! reqwest-backed transport carrying the user's platform sessions

use async_trait::async_trait;
use crosspost_domain::{HttpRequest, HttpResponse, PartValue, RequestBody, Transport, TransportError};
use reqwest::Client;
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("crosspost/", env!("CARGO_PKG_VERSION"));

/// HTTP transport with a cookie store and optional static session cookies
pub struct ReqwestTransport {
    client: Client,
    /// Cookie header per registrable domain
    cookies: BTreeMap<String, SecretString>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            cookies: BTreeMap::new(),
        })
    }

    /// Send `cookie` with every request to `domain` and its subdomains
    pub fn with_cookie(mut self, domain: impl Into<String>, cookie: SecretString) -> Self {
        self.cookies
            .insert(domain.into().trim_start_matches('.').to_ascii_lowercase(), cookie);
        self
    }

    fn cookie_for(&self, url: &Url) -> Option<&SecretString> {
        let host = url.host_str()?.to_ascii_lowercase();
        self.cookies
            .iter()
            .find(|(domain, _)| host == **domain || host.ends_with(&format!(".{domain}")))
            .map(|(_, cookie)| cookie)
    }
}

fn multipart_form(parts: Vec<(String, PartValue)>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in parts {
        form = match value {
            PartValue::Text(text) => form.text(name, text),
            PartValue::Blob(blob) => {
                let part = Part::bytes(blob.bytes)
                    .file_name(blob.filename)
                    .mime_str(&blob.mime)
                    .map_err(|e| TransportError::Network(format!("Invalid mime type: {e}")))?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::Network(format!("Invalid URL '{}': {e}", request.url)))?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let has_cookie_header = request
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("cookie"));
        let cookie = if has_cookie_header {
            None
        } else {
            self.cookie_for(&url)
        };

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie.expose_secret());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
