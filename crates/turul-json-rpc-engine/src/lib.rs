//! # JSON-RPC 2.0 Engine
//!
//! A transport-agnostic JSON-RPC 2.0 server engine. It parses request
//! bodies (single or batch), dispatches each request to a registered
//! capability and writes the responses back, including results that are
//! produced incrementally as a stream of bytes.
//!
//! ## Features
//! - Request ids and params kept as raw JSON, never re-encoded
//! - Batch detection and order-preserving batch responses
//! - Per-call context with cancellation
//! - Streaming results interleaved into valid JSON output, also inside batches
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use serde_json::json;
//! use turul_json_rpc_engine::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let methods = MethodRepository::new();
//! methods
//!     .register("ping", handler_fn(|_ctx, _params| async { Ok(json!("pong")) }))
//!     .unwrap();
//! let dispatcher = JsonRpcDispatcher::new(Arc::new(methods));
//!
//! let body = Bytes::from_static(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#);
//! let parsed = parse_request(Some("application/json"), body).await.unwrap();
//! let responses = dispatcher
//!     .invoke_all(&RequestContext::new(), &parsed.requests, false)
//!     .await;
//!
//! let mut sink = BufferSink::new();
//! write_responses(&mut sink, responses, parsed.batch).await.unwrap();
//! assert_eq!(sink.bytes(), b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"pong\"}\n");
//! # });
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod parser;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod response;
pub mod types;
pub mod writer;

// Re-export main types
pub use context::{CallContext, CancelHandle, RequestContext};
pub use dispatch::JsonRpcDispatcher;
pub use error::{JsonRpcErrorCode, JsonRpcErrorObject, RegistryError, WriteError};
pub use handler::{
    Capability, JsonRpcHandler, JsonRpcResult, JsonRpcStreamHandler, handler_fn, parse_params,
    stream_handler_fn,
};
pub use parser::{
    BodySource, JSON_CONTENT_TYPE, ParseOptions, ParsedRequests, parse_request,
    parse_request_with,
};
pub use registry::{MethodDescription, MethodMetadata, MethodRepository, MethodResolver};
pub use request::JsonRpcRequest;
pub use response::{JsonRpcResponse, ResponsePayload, ResponseResult, ResultStream};
pub use types::RequestId;
pub use writer::{AsyncWriteSink, BufferSink, ResponseSink, write_responses};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
