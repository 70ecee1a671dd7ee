//! HTTP request handler driving the JSON-RPC engine

use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, error, warn};
use turul_json_rpc_engine::{
    JSON_CONTENT_TYPE, JsonRpcDispatcher, JsonRpcResponse, RequestContext, parse_request_with,
    write_responses,
};

use crate::body::{ChannelSink, HttpRequestBody, JsonRpcBody, full_body};
use crate::{CorsLayer, ServerConfig};

/// HTTP handler for JSON-RPC requests
#[derive(Clone)]
pub struct JsonRpcHttpHandler {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) dispatcher: JsonRpcDispatcher,
}

impl JsonRpcHttpHandler {
    /// Create a new handler
    pub fn new(config: ServerConfig, dispatcher: JsonRpcDispatcher) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle an HTTP request with a fresh base context
    pub async fn handle<B>(&self, req: Request<B>) -> Response<JsonRpcBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.handle_with_context(req, RequestContext::new()).await
    }

    /// Handle an HTTP request whose calls derive from `base`
    pub async fn handle_with_context<B>(
        &self,
        req: Request<B>,
        base: RequestContext,
    ) -> Response<JsonRpcBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        debug!("Handling {} {}", req.method(), req.uri().path());

        let mut response = if req.uri().path() != self.config.path {
            plain_response(StatusCode::NOT_FOUND, "Not Found")
        } else {
            match *req.method() {
                Method::POST => self.handle_json_rpc_request(req, base).await,
                Method::OPTIONS => plain_response(StatusCode::OK, ""),
                _ => {
                    let mut response =
                        plain_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                    response
                        .headers_mut()
                        .insert(ALLOW, HeaderValue::from_static("POST, OPTIONS"));
                    response
                }
            }
        };

        if self.config.enable_cors {
            match &self.config.cors_origin {
                Some(origin) => {
                    CorsLayer::apply_cors_headers_for_origin(response.headers_mut(), origin)
                }
                None => CorsLayer::apply_cors_headers(response.headers_mut()),
            }
        }
        response
    }

    /// Parse, dispatch and stream the responses of a POST body
    async fn handle_json_rpc_request<B>(
        &self,
        req: Request<B>,
        base: RequestContext,
    ) -> Response<JsonRpcBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);
        let body = HttpRequestBody::new(req.into_body(), self.config.max_body_size);

        let options = self.config.parse_options;
        let parsed = parse_request_with(content_type.as_deref(), body, options).await;
        let (responses, batch) = match parsed {
            Ok(parsed) => {
                debug!(
                    "Dispatching {} JSON-RPC request(s), batch={}",
                    parsed.requests.len(),
                    parsed.batch
                );
                let responses = self
                    .dispatcher
                    .invoke_all(&base, &parsed.requests, self.config.concurrent_batch)
                    .await;
                (responses, parsed.batch)
            }
            Err(rpc_err) => {
                warn!("Rejected JSON-RPC request: {}", rpc_err);
                (vec![JsonRpcResponse::request_failure(rpc_err)], false)
            }
        };

        self.stream_responses(responses, batch).await
    }

    /// Run the writer on its own task, streaming its output as the body.
    async fn stream_responses(
        &self,
        responses: Vec<JsonRpcResponse>,
        batch: bool,
    ) -> Response<JsonRpcBody> {
        let (mut sink, body, content_type) = ChannelSink::channel(self.config.stream_buffer);

        tokio::spawn(async move {
            if let Err(err) = write_responses(&mut sink, responses, batch).await {
                error!("Failed to deliver JSON-RPC response: {}", err);
            }
        });

        let content_type = content_type
            .await
            .ok()
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

        let mut response = Response::new(body);
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        response
    }
}

fn plain_response(status: StatusCode, text: &'static str) -> Response<JsonRpcBody> {
    let mut response = Response::new(full_body(text));
    *response.status_mut() = status;
    response
}
