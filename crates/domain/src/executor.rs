//! Endpoint executor: runs one declarative HTTP step

use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::definition::{AdapterDefinition, BodyEncoding, EndpointDefinition, HookKind};
use crate::expr::{interpolate, interpolate_value, sole_placeholder, stringify};
use crate::ports::{
    HookError, HttpRequest, PartValue, PlatformHooks, RequestBody, Transport, TransportError,
};

const MAX_ERROR_BODY: usize = 512;

/// Errors from executing an endpoint
#[derive(Debug, Clone, Error)]
pub enum ExecuteError {
    #[error("{endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error("{endpoint} rejected by platform: {message}")]
    Rejected { endpoint: String, message: String },
    #[error("{endpoint}: hook failed: {source}")]
    Hook {
        endpoint: String,
        #[source]
        source: HookError,
    },
}

/// Parsed response and extracted outputs of a successful step
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: u16,
    pub response: Value,
    pub outputs: Map<String, Value>,
}

/// Interprets endpoint definitions against an injected transport
///
/// The executor never mutates the context; callers merge `outputs` back.
pub struct EndpointExecutor<'a> {
    transport: &'a dyn Transport,
    hooks: &'a dyn PlatformHooks,
    before_request: bool,
    prepare_body: bool,
}

impl<'a> EndpointExecutor<'a> {
    pub fn new(
        definition: &AdapterDefinition,
        transport: &'a dyn Transport,
        hooks: &'a dyn PlatformHooks,
    ) -> Self {
        let enabled =
            |hook: HookKind| definition.declares_hook(hook) && hooks.provides(hook);
        Self {
            transport,
            hooks,
            before_request: enabled(HookKind::BeforeRequest),
            prepare_body: enabled(HookKind::PrepareBody),
        }
    }

    /// Build the request for `endpoint` without running hooks
    pub fn build_request(endpoint: &EndpointDefinition, ctx: &ExecutionContext) -> HttpRequest {
        let data = ctx.as_value();
        HttpRequest {
            method: endpoint.method,
            url: interpolate(&endpoint.url, data),
            headers: endpoint
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), interpolate(value, data)))
                .collect(),
            body: build_body(endpoint, ctx),
        }
    }

    pub async fn execute(
        &self,
        endpoint: &EndpointDefinition,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecuteError> {
        let hook_error = |source: HookError| ExecuteError::Hook {
            endpoint: endpoint.name.clone(),
            source,
        };

        let mut request = Self::build_request(endpoint, ctx);

        if self.before_request {
            let dynamic = self
                .hooks
                .before_request(&request.url, ctx)
                .await
                .map_err(hook_error)?;
            // Header names are case-insensitive; the hook's value replaces any static one
            for (name, value) in dynamic {
                request.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
                request.headers.insert(name, value);
            }
        }

        if self.prepare_body && !request.body.is_empty() {
            self.hooks
                .prepare_body(&request.url, &mut request.body, ctx)
                .await
                .map_err(hook_error)?;
        }

        tracing::debug!(
            endpoint = %endpoint.name,
            method = %request.method,
            url = %request.url,
            "Sending request"
        );

        let response = self
            .transport
            .fetch(request)
            .await
            .map_err(|source| ExecuteError::Transport {
                endpoint: endpoint.name.clone(),
                source,
            })?;

        tracing::debug!(endpoint = %endpoint.name, status = response.status, "Received response");

        if !endpoint.accepts_status(response.status) {
            let mut body = response.text();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ExecuteError::Transport {
                endpoint: endpoint.name.clone(),
                source: TransportError::Status {
                    status: response.status,
                    body,
                },
            });
        }

        let text = response.text();
        let parsed = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if let Some(success) = &endpoint.response.success {
            if !success.test(&parsed) {
                let message = endpoint
                    .response
                    .error
                    .as_ref()
                    .map(|expr| stringify(expr.evaluate(&parsed).as_ref()))
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "success check failed".to_string());
                return Err(ExecuteError::Rejected {
                    endpoint: endpoint.name.clone(),
                    message,
                });
            }
        }

        let outputs = endpoint
            .response
            .extract
            .iter()
            .filter_map(|(name, expr)| expr.evaluate(&parsed).map(|v| (name.clone(), v)))
            .collect();

        Ok(ExecutionOutcome {
            status: response.status,
            response: parsed,
            outputs,
        })
    }
}

fn build_body(endpoint: &EndpointDefinition, ctx: &ExecutionContext) -> RequestBody {
    if !endpoint.method.allows_body() {
        return RequestBody::Empty;
    }
    let Some(template) = &endpoint.body else {
        return RequestBody::Empty;
    };
    let data = ctx.as_value();

    match endpoint.encoding {
        BodyEncoding::Json => RequestBody::Json(interpolate_value(template, data)),
        BodyEncoding::Form => RequestBody::Form(
            object_fields(template)
                .map(|(key, value)| {
                    let rendered = interpolate_value(value, data);
                    (key.clone(), stringify(Some(&rendered)))
                })
                .collect(),
        ),
        BodyEncoding::Multipart => RequestBody::Multipart(
            object_fields(template)
                .map(|(key, value)| {
                    let blob = value
                        .as_str()
                        .and_then(sole_placeholder)
                        .and_then(|path| ctx.blob_for(&path).cloned());
                    let part = match blob {
                        Some(blob) => PartValue::Blob(blob),
                        None => {
                            PartValue::Text(stringify(Some(&interpolate_value(value, data))))
                        }
                    };
                    (key.clone(), part)
                })
                .collect(),
        ),
    }
}

fn object_fields(template: &Value) -> impl Iterator<Item = (&String, &Value)> {
    template.as_object().into_iter().flat_map(|map| map.iter())
}
