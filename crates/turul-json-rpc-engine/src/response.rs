use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::context::CancelHandle;
use crate::error::JsonRpcErrorObject;
use crate::request::JsonRpcRequest;
use crate::types::RequestId;

/// A result produced incrementally as a sequence of byte chunks.
///
/// The chunks are copied verbatim after the `"result":` key, so the producer
/// must emit bytes that together form one JSON value. The stream ends when
/// the producer is done (for channels: when every sender is dropped).
pub struct ResultStream {
    inner: BoxStream<'static, Bytes>,
}

impl ResultStream {
    /// Create a bounded channel whose receiving end is the result.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::from_receiver(rx))
    }

    pub fn from_receiver(rx: mpsc::Receiver<Bytes>) -> Self {
        Self::from_stream(ReceiverStream::new(rx))
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A stream over chunks that are already known.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: Send + 'static,
        B: Into<Bytes> + 'static,
    {
        Self::from_stream(stream::iter(chunks.into_iter().map(Into::into)))
    }
}

impl Stream for ResultStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream").finish_non_exhaustive()
    }
}

/// The successful outcome of a call
#[derive(Debug)]
pub enum ResponseResult {
    /// A complete value, encoded in one piece
    Finished(Value),
    /// A result still being produced
    Streaming(ResultStream),
}

impl ResponseResult {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseResult::Streaming(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResponseResult::Finished(value) => Some(value),
            ResponseResult::Streaming(_) => None,
        }
    }
}

impl From<Value> for ResponseResult {
    fn from(value: Value) -> Self {
        ResponseResult::Finished(value)
    }
}

impl From<ResultStream> for ResponseResult {
    fn from(stream: ResultStream) -> Self {
        ResponseResult::Streaming(stream)
    }
}

/// Exactly one of `result` or `error`
#[derive(Debug)]
pub enum ResponsePayload {
    Result(ResponseResult),
    Error(JsonRpcErrorObject),
}

/// A JSON-RPC response on its way to the client.
#[derive(Debug)]
pub struct JsonRpcResponse {
    pub version: String,
    pub id: Option<RequestId>,
    pub payload: ResponsePayload,
    pub(crate) cancel: Option<CancelHandle>,
}

impl JsonRpcResponse {
    pub fn new(
        version: impl Into<String>,
        id: Option<RequestId>,
        payload: ResponsePayload,
    ) -> Self {
        Self {
            version: version.into(),
            id,
            payload,
            cancel: None,
        }
    }

    /// A response answering `request`, copying its version and id.
    pub fn for_request(request: &JsonRpcRequest, payload: ResponsePayload) -> Self {
        Self::new(request.version.clone(), request.id.clone(), payload)
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self::new(
            crate::JSONRPC_VERSION,
            Some(id),
            ResponsePayload::Result(ResponseResult::Finished(result)),
        )
    }

    pub fn streaming(id: RequestId, stream: ResultStream) -> Self {
        Self::new(
            crate::JSONRPC_VERSION,
            Some(id),
            ResponsePayload::Result(ResponseResult::Streaming(stream)),
        )
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self::new(crate::JSONRPC_VERSION, id, ResponsePayload::Error(error))
    }

    /// The response sent when the whole body was rejected before dispatch.
    pub fn request_failure(error: JsonRpcErrorObject) -> Self {
        Self::error(None, error)
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Abort the call that produced this response. Returns `true` only for
    /// the invocation that actually cancelled it.
    pub fn cancel(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::cancel)
    }

    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel.as_ref()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(&self.payload, ResponsePayload::Result(result) if result.is_streaming())
    }

    pub fn error_object(&self) -> Option<&JsonRpcErrorObject> {
        match &self.payload {
            ResponsePayload::Error(error) => Some(error),
            ResponsePayload::Result(_) => None,
        }
    }

    pub fn result_value(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(result) => result.as_value(),
            ResponsePayload::Error(_) => None,
        }
    }

    /// Borrowed wire view of a response whose result is finished.
    /// `None` for streaming responses, which cannot be encoded in one piece.
    pub(crate) fn envelope(&self) -> Option<Envelope<'_>> {
        let (result, error) = match &self.payload {
            ResponsePayload::Result(ResponseResult::Finished(value)) => (Some(value), None),
            ResponsePayload::Result(ResponseResult::Streaming(_)) => return None,
            ResponsePayload::Error(error) => (None, Some(error)),
        };
        Some(Envelope {
            version: &self.version,
            id: self.id.as_ref(),
            result,
            error,
        })
    }
}

#[derive(Serialize)]
pub(crate) struct Envelope<'a> {
    #[serde(rename = "jsonrpc")]
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a JsonRpcErrorObject>,
}
