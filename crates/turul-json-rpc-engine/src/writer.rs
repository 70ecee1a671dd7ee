//! Response serialization, buffered or streamed.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::context::CancelHandle;
use crate::error::{JsonRpcErrorObject, WriteError};
use crate::parser::JSON_CONTENT_TYPE;
use crate::response::{JsonRpcResponse, ResponsePayload, ResponseResult, ResultStream};
use crate::types::RequestId;

/// Destination of response bytes.
#[async_trait]
pub trait ResponseSink: Send {
    /// Announce the body's media type. Called once, before any write.
    fn set_content_type(&mut self, content_type: &str);

    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink collecting everything in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    content_type: Option<String>,
    buf: BytesMut,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

#[async_trait]
impl ResponseSink for BufferSink {
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Sink over any async byte writer (sockets, pipes, files).
///
/// Plain byte streams carry no headers, so the content type is only recorded.
pub struct AsyncWriteSink<W> {
    writer: W,
    content_type: Option<String>,
}

impl<W> AsyncWriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            content_type: None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ResponseSink for AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.writer.write_all(&chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

/// Write `responses` to `sink`.
///
/// A JSON array is written when `batch` is set or there is more than one
/// response, a single object otherwise, and nothing at all for no
/// responses. If no result is streaming the whole document is encoded and
/// written at once. Otherwise elements are written one by one and each
/// streaming result is copied chunk by chunk as it is produced.
///
/// Writing continues after a failure so every stream is drained and every
/// opened object closed; a write failure inside a streaming element cancels
/// that element's call. The first failure is returned.
pub async fn write_responses<S>(
    sink: &mut S,
    responses: Vec<JsonRpcResponse>,
    batch: bool,
) -> Result<(), WriteError>
where
    S: ResponseSink + ?Sized,
{
    sink.set_content_type(JSON_CONTENT_TYPE);
    if responses.is_empty() {
        debug!("No responses to write");
        return Ok(());
    }

    let array = batch || responses.len() > 1;
    let mut delivery = Delivery {
        sink,
        failure: None,
    };

    if responses.iter().any(JsonRpcResponse::is_streaming) {
        delivery.write_streamed(responses, array).await;
    } else {
        let document = delivery.encode_document(&responses, array);
        debug!(
            "Writing {} buffered responses ({} bytes)",
            responses.len(),
            document.len()
        );
        if delivery.put(document).await {
            delivery.flush().await;
        }
    }

    match delivery.failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

struct Delivery<'a, S: ?Sized> {
    sink: &'a mut S,
    failure: Option<WriteError>,
}

impl<S> Delivery<'_, S>
where
    S: ResponseSink + ?Sized,
{
    /// Encode all responses as one document, newline terminated.
    fn encode_document(&mut self, responses: &[JsonRpcResponse], array: bool) -> Bytes {
        let mut buf = BytesMut::new();
        if array {
            buf.extend_from_slice(b"[");
        }
        for (i, response) in responses.iter().enumerate() {
            if i > 0 {
                buf.extend_from_slice(b",");
            }
            buf.extend_from_slice(&self.encode(response));
        }
        if array {
            buf.extend_from_slice(b"]");
        }
        buf.extend_from_slice(b"\n");
        buf.freeze()
    }

    async fn write_streamed(&mut self, responses: Vec<JsonRpcResponse>, array: bool) {
        if array {
            self.put(Bytes::from_static(b"[")).await;
        }
        for (i, response) in responses.into_iter().enumerate() {
            if i > 0 {
                self.put(Bytes::from_static(b",")).await;
            }

            let JsonRpcResponse {
                version,
                id,
                payload,
                cancel,
            } = response;
            match payload {
                ResponsePayload::Result(ResponseResult::Streaming(stream)) => {
                    self.write_stream(&version, id.as_ref(), stream, cancel.as_ref())
                        .await;
                }
                payload => {
                    let finished = JsonRpcResponse::new(version, id, payload);
                    let encoded = self.encode(&finished);
                    if self.put(encoded).await {
                        self.flush().await;
                    }
                }
            }
        }
        if array {
            self.put(Bytes::from_static(b"]")).await;
        }
        self.flush().await;
    }

    async fn write_stream(
        &mut self,
        version: &str,
        id: Option<&RequestId>,
        mut stream: ResultStream,
        cancel: Option<&CancelHandle>,
    ) {
        let mut head = BytesMut::from(&b"{\"jsonrpc\":"[..]);
        match serde_json::to_vec(version) {
            Ok(encoded) => head.extend_from_slice(&encoded),
            Err(err) => {
                self.record(WriteError::Encode(err));
                head.extend_from_slice(b"\"\"");
            }
        }
        head.extend_from_slice(b",");
        if let Some(id) = id {
            head.extend_from_slice(b"\"id\":");
            head.extend_from_slice(id.as_raw().as_bytes());
            head.extend_from_slice(b",");
        }
        head.extend_from_slice(b"\"result\":");

        let mut failed = !self.put(head.freeze()).await;
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            chunks += 1;
            if !(self.put(chunk).await && self.flush().await) {
                failed = true;
            }
            if failed {
                cancel_call(cancel, id);
            }
        }
        if !self.put(Bytes::from_static(b"}")).await || failed {
            cancel_call(cancel, id);
        }
        debug!("Drained {} result chunks for id={}", chunks, display_id(id));
    }

    /// Encode a finished response, falling back to an internal error
    /// envelope so the document stays valid JSON.
    fn encode(&mut self, response: &JsonRpcResponse) -> Bytes {
        let Some(envelope) = response.envelope() else {
            return self.encode_fallback(response.id.clone());
        };
        match serde_json::to_vec(&envelope) {
            Ok(encoded) => Bytes::from(encoded),
            Err(err) => {
                error!(
                    "Failed to encode response id={}: {}",
                    display_id(response.id.as_ref()),
                    err
                );
                self.record(WriteError::Encode(err));
                self.encode_fallback(response.id.clone())
            }
        }
    }

    fn encode_fallback(&mut self, id: Option<RequestId>) -> Bytes {
        let fallback = JsonRpcResponse::error(id, JsonRpcErrorObject::internal_error(None));
        let encoded = fallback
            .envelope()
            .and_then(|envelope| serde_json::to_vec(&envelope).ok())
            .unwrap_or_default();
        Bytes::from(encoded)
    }

    async fn put(&mut self, bytes: Bytes) -> bool {
        match self.sink.write(bytes).await {
            Ok(()) => true,
            Err(err) => {
                debug!("Response write failed: {}", err);
                self.record(WriteError::Sink(err));
                false
            }
        }
    }

    async fn flush(&mut self) -> bool {
        match self.sink.flush().await {
            Ok(()) => true,
            Err(err) => {
                debug!("Response flush failed: {}", err);
                self.record(WriteError::Sink(err));
                false
            }
        }
    }

    fn record(&mut self, failure: WriteError) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

fn cancel_call(cancel: Option<&CancelHandle>, id: Option<&RequestId>) {
    if cancel.is_some_and(CancelHandle::cancel) {
        warn!("Output failed, cancelled streaming call id={}", display_id(id));
    }
}

fn display_id(id: Option<&RequestId>) -> &str {
    id.map_or("none", RequestId::as_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallContext, RequestContext};
    use crate::handler::{Capability, handler_fn};
    use crate::registry::MethodMetadata;
    use crate::request::JsonRpcRequest;
    use serde_json::{Value, json};
    use std::sync::Arc;

    /// Sink that rejects the writes at the given positions
    #[derive(Default)]
    struct FlakySink {
        written: Vec<Bytes>,
        fail_on: Vec<usize>,
        writes: usize,
    }

    impl FlakySink {
        fn failing_on(fail_on: &[usize]) -> Self {
            Self {
                fail_on: fail_on.to_vec(),
                ..Default::default()
            }
        }

        fn output(&self) -> String {
            String::from_utf8(self.written.concat()).unwrap()
        }
    }

    #[async_trait]
    impl ResponseSink for FlakySink {
        fn set_content_type(&mut self, _content_type: &str) {}

        async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
            let n = self.writes;
            self.writes += 1;
            if self.fail_on.contains(&n) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"));
            }
            self.written.push(chunk);
            Ok(())
        }
    }

    fn cancel_handle(id: i64) -> CancelHandle {
        let metadata = Arc::new(MethodMetadata::new(Capability::unary(handler_fn(
            |_ctx, _params| async { Ok(Value::Null) },
        ))));
        let request = JsonRpcRequest::new_no_params(RequestId::from(id), "stream");
        CallContext::derive(&RequestContext::new(), &request, metadata).1
    }

    async fn render(
        responses: Vec<JsonRpcResponse>,
        batch: bool,
    ) -> (BufferSink, Result<(), WriteError>) {
        let mut sink = BufferSink::new();
        let result = write_responses(&mut sink, responses, batch).await;
        (sink, result)
    }

    #[tokio::test]
    async fn test_single_response_is_an_object() {
        let (sink, result) =
            render(vec![JsonRpcResponse::success(RequestId::from(1), json!("pong"))], false).await;
        result.unwrap();
        assert_eq!(sink.content_type(), Some("application/json"));
        assert_eq!(sink.bytes(), b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"pong\"}\n");
    }

    #[tokio::test]
    async fn test_batch_of_one_is_an_array() {
        let (sink, _) =
            render(vec![JsonRpcResponse::success(RequestId::from(1), json!(1))], true).await;
        let value: Value = serde_json::from_slice(sink.bytes()).unwrap();
        assert_eq!(value, json!([{"jsonrpc": "2.0", "id": 1, "result": 1}]));
    }

    #[tokio::test]
    async fn test_several_responses_are_an_array_without_batch_flag() {
        let responses = vec![
            JsonRpcResponse::success(RequestId::from(1), json!(1)),
            JsonRpcResponse::error(
                Some(RequestId::from(2)),
                JsonRpcErrorObject::method_not_found("x"),
            ),
        ];
        let (sink, _) = render(responses, false).await;
        let value: Value = serde_json::from_slice(sink.bytes()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["error"]["code"], -32601);
        assert!(value[1].get("result").is_none());
    }

    #[tokio::test]
    async fn test_no_responses_write_nothing() {
        let (sink, result) = render(Vec::new(), true).await;
        result.unwrap();
        assert!(sink.bytes().is_empty());
        assert_eq!(sink.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_sole_streaming_response() {
        let response =
            JsonRpcResponse::streaming(RequestId::from(7), ResultStream::from_chunks(["12", "3"]));
        let (sink, result) = render(vec![response], false).await;
        result.unwrap();
        assert_eq!(sink.bytes(), b"{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":123}");
    }

    #[tokio::test]
    async fn test_mixed_batch_is_valid_json() {
        let (tx, stream) = ResultStream::channel(1);
        let producer = tokio::spawn(async move {
            for chunk in ["[", "\"a\"", ",", "\"b\"", "]"] {
                tx.send(Bytes::from_static(chunk.as_bytes())).await.unwrap();
            }
        });

        let responses = vec![
            JsonRpcResponse::success(RequestId::from(1), json!({"n": 1})),
            JsonRpcResponse::streaming(RequestId::from("s"), stream),
            JsonRpcResponse::error(
                Some(RequestId::from(3)),
                JsonRpcErrorObject::invalid_params("bad"),
            ),
        ];
        let (sink, result) = render(responses, true).await;
        result.unwrap();
        producer.await.unwrap();

        let value: Value = serde_json::from_slice(sink.bytes()).unwrap();
        assert_eq!(
            value,
            json!([
                {"jsonrpc": "2.0", "id": 1, "result": {"n": 1}},
                {"jsonrpc": "2.0", "id": "s", "result": ["a", "b"]},
                {"jsonrpc": "2.0", "id": 3, "error": {"code": -32602, "message": "bad"}}
            ])
        );
    }

    #[tokio::test]
    async fn test_large_id_round_trips_byte_for_byte() {
        let id = RequestId::from_json("123456789012345678901234567890").unwrap();
        let (direct, _) = render(vec![JsonRpcResponse::success(id.clone(), json!(0))], false).await;
        let (streamed, _) = render(
            vec![JsonRpcResponse::streaming(id, ResultStream::from_chunks(["0"]))],
            false,
        )
        .await;

        for sink in [direct, streamed] {
            let text = String::from_utf8(sink.bytes().to_vec()).unwrap();
            assert!(text.contains("\"id\":123456789012345678901234567890,"));
        }
    }

    #[tokio::test]
    async fn test_write_failure_cancels_and_keeps_draining() {
        let handle = cancel_handle(1);
        let (tx, stream) = ResultStream::channel(1);
        let producer = tokio::spawn(async move {
            let mut sent = 0;
            for chunk in ["[1", ",2", ",3]"] {
                if tx.send(Bytes::from_static(chunk.as_bytes())).await.is_ok() {
                    sent += 1;
                }
            }
            sent
        });

        let responses = vec![
            JsonRpcResponse::streaming(RequestId::from(1), stream)
                .with_cancel_handle(handle.clone()),
            JsonRpcResponse::success(RequestId::from(2), json!(true)),
        ];
        // writes: "[" head "[1" ",2" ",3]" "}" "," second "]"
        let mut sink = FlakySink::failing_on(&[3, 4]);
        let result = write_responses(&mut sink, responses, true).await;

        assert!(matches!(result, Err(WriteError::Sink(_))));
        assert_eq!(producer.await.unwrap(), 3);
        assert!(handle.is_cancelled());
        assert!(!handle.cancel(), "handle must already have fired");
        assert_eq!(
            sink.output(),
            "[{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":[1},{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":true}]"
        );
    }

    #[tokio::test]
    async fn test_successful_stream_is_not_cancelled() {
        let handle = cancel_handle(4);
        let response =
            JsonRpcResponse::streaming(RequestId::from(4), ResultStream::from_chunks(["1"]))
                .with_cancel_handle(handle.clone());
        let (_, result) = render(vec![response], false).await;
        result.unwrap();
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_direct_write_failure_is_reported() {
        let mut sink = FlakySink::failing_on(&[0]);
        let result = write_responses(
            &mut sink,
            vec![JsonRpcResponse::success(RequestId::from(1), json!(1))],
            false,
        )
        .await;
        assert!(matches!(result, Err(WriteError::Sink(_))));
    }

    #[tokio::test]
    async fn test_async_write_sink() {
        let mut sink = AsyncWriteSink::new(Vec::new());
        write_responses(
            &mut sink,
            vec![JsonRpcResponse::streaming(
                RequestId::from(1),
                ResultStream::from_chunks(["{\"ok\":", "true}"]),
            )],
            false,
        )
        .await
        .unwrap();
        assert_eq!(sink.content_type(), Some("application/json"));
        let value: Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(value["result"], json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_streaming_without_id_omits_id() {
        let mut response =
            JsonRpcResponse::streaming(RequestId::from(1), ResultStream::from_chunks(["1"]));
        response.id = None;
        let (sink, _) = render(vec![response], false).await;
        assert_eq!(sink.bytes(), b"{\"jsonrpc\":\"2.0\",\"result\":1}");
    }
}
