//! Capability traits: what a registered method does when invoked.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::value::RawValue;

use crate::context::CallContext;
use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject};
use crate::response::{ResponseResult, ResultStream};

/// Result type returned by capabilities
pub type JsonRpcResult<T> = Result<T, JsonRpcErrorObject>;

/// A capability that answers with one finished value
#[async_trait]
pub trait JsonRpcHandler: Send + Sync {
    /// Handle a call. `params` is the request's raw, unparsed `params` member.
    async fn handle(&self, ctx: &CallContext, params: Option<&RawValue>) -> JsonRpcResult<Value>;
}

/// A capability that answers with a stream of byte chunks
#[async_trait]
pub trait JsonRpcStreamHandler: Send + Sync {
    /// Start producing the result. The chunks of the returned stream must
    /// concatenate to a single JSON value. Producers should stop once
    /// `ctx.is_cancelled()`; the stream is still drained until it ends.
    async fn handle_stream(
        &self,
        ctx: &CallContext,
        params: Option<&RawValue>,
    ) -> JsonRpcResult<ResultStream>;
}

/// The implementation bound to a method name
#[derive(Clone)]
pub enum Capability {
    Unary(Arc<dyn JsonRpcHandler>),
    Streaming(Arc<dyn JsonRpcStreamHandler>),
}

impl Capability {
    pub fn unary<H>(handler: H) -> Self
    where
        H: JsonRpcHandler + 'static,
    {
        Capability::Unary(Arc::new(handler))
    }

    pub fn streaming<H>(handler: H) -> Self
    where
        H: JsonRpcStreamHandler + 'static,
    {
        Capability::Streaming(Arc::new(handler))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Capability::Streaming(_))
    }

    pub(crate) async fn invoke(
        &self,
        ctx: &CallContext,
        params: Option<&RawValue>,
    ) -> JsonRpcResult<ResponseResult> {
        match self {
            Capability::Unary(handler) => handler
                .handle(ctx, params)
                .await
                .map(ResponseResult::Finished),
            Capability::Streaming(handler) => handler
                .handle_stream(ctx, params)
                .await
                .map(ResponseResult::Streaming),
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Unary(_) => f.write_str("Capability::Unary"),
            Capability::Streaming(_) => f.write_str("Capability::Streaming"),
        }
    }
}

/// Closure-backed unary handler, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Adapt an async closure into a [`JsonRpcHandler`].
///
/// ```rust
/// use turul_json_rpc_engine::handler::{JsonRpcResult, handler_fn, parse_params};
/// use serde_json::{Value, json};
///
/// let add = handler_fn(|_ctx, params| async move {
///     let (a, b): (i64, i64) = parse_params(params.as_deref())?;
///     JsonRpcResult::<Value>::Ok(json!(a + b))
/// });
/// # let _ = add;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CallContext, Option<Box<RawValue>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JsonRpcResult<Value>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> JsonRpcHandler for HandlerFn<F>
where
    F: Fn(CallContext, Option<Box<RawValue>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JsonRpcResult<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: &CallContext, params: Option<&RawValue>) -> JsonRpcResult<Value> {
        (self.f)(ctx.clone(), params.map(ToOwned::to_owned)).await
    }
}

/// Closure-backed streaming handler, see [`stream_handler_fn`]
pub struct StreamHandlerFn<F> {
    f: F,
}

/// Adapt an async closure into a [`JsonRpcStreamHandler`].
pub fn stream_handler_fn<F, Fut>(f: F) -> StreamHandlerFn<F>
where
    F: Fn(CallContext, Option<Box<RawValue>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JsonRpcResult<ResultStream>> + Send + 'static,
{
    StreamHandlerFn { f }
}

#[async_trait]
impl<F, Fut> JsonRpcStreamHandler for StreamHandlerFn<F>
where
    F: Fn(CallContext, Option<Box<RawValue>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JsonRpcResult<ResultStream>> + Send + 'static,
{
    async fn handle_stream(
        &self,
        ctx: &CallContext,
        params: Option<&RawValue>,
    ) -> JsonRpcResult<ResultStream> {
        (self.f)(ctx.clone(), params.map(ToOwned::to_owned)).await
    }
}

/// Decode raw params into `T`. Missing params decode as `null`, so
/// `Option<_>` and `()` targets accept calls without params.
pub fn parse_params<T>(params: Option<&RawValue>) -> JsonRpcResult<T>
where
    T: DeserializeOwned,
{
    let raw = params.map_or("null", RawValue::get);
    serde_json::from_str(raw).map_err(|err| {
        JsonRpcErrorObject::new(
            JsonRpcErrorCode::InvalidParams,
            None,
            Some(Value::String(err.to_string())),
        )
    })
}
