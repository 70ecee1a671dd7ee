//! # JSON-RPC Engine Prelude
//!
//! This module provides convenient re-exports of the most commonly used types
//! from the JSON-RPC engine.
//!
//! ```rust
//! use turul_json_rpc_engine::prelude::*;
//! ```

// Message model
pub use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject, WriteError};
pub use crate::request::JsonRpcRequest;
pub use crate::response::{JsonRpcResponse, ResponsePayload, ResponseResult, ResultStream};
pub use crate::types::RequestId;

// Engine stages
pub use crate::context::{CallContext, CancelHandle, RequestContext};
pub use crate::dispatch::JsonRpcDispatcher;
pub use crate::handler::{
    Capability, JsonRpcHandler, JsonRpcResult, JsonRpcStreamHandler, handler_fn, parse_params,
    stream_handler_fn,
};
pub use crate::parser::{
    BodySource, ParseOptions, ParsedRequests, parse_request, parse_request_with,
};
pub use crate::registry::{MethodMetadata, MethodRepository, MethodResolver};
pub use crate::writer::{BufferSink, ResponseSink, write_responses};

// Standard error codes
pub use crate::error_codes::*;
