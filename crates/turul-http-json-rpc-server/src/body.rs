//! Adapters between hyper bodies and the engine's body/sink traits.

use std::convert::Infallible;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited, StreamBody};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use turul_json_rpc_engine::{BodySource, ResponseSink};

/// Body type of every response produced by this crate
pub type JsonRpcBody = UnsyncBoxBody<Bytes, Infallible>;

type FrameResult = Result<Frame<Bytes>, Infallible>;

/// A fixed response body
pub fn full_body(data: impl Into<Bytes>) -> JsonRpcBody {
    Full::new(data.into()).boxed_unsync()
}

/// An incoming HTTP body, read at most `max_size` bytes.
pub struct HttpRequestBody<B> {
    body: Option<B>,
    max_size: usize,
}

impl<B> HttpRequestBody<B> {
    pub fn new(body: B, max_size: usize) -> Self {
        Self {
            body: Some(body),
            max_size,
        }
    }
}

#[async_trait]
impl<B> BodySource for HttpRequestBody<B>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn size_hint(&self) -> Option<usize> {
        self.body
            .as_ref()
            .and_then(|body| body.size_hint().exact())
            .and_then(|len| usize::try_from(len).ok())
    }

    async fn read_all(&mut self) -> io::Result<Bytes> {
        let body = self
            .body
            .take()
            .ok_or_else(|| io::Error::other("request body already consumed"))?;
        let collected = Limited::new(body, self.max_size)
            .collect()
            .await
            .map_err(io::Error::other)?;
        Ok(collected.to_bytes())
    }

    async fn release(&mut self) -> io::Result<()> {
        self.body = None;
        Ok(())
    }
}

/// Response sink feeding a streaming HTTP body.
///
/// Each write becomes one body frame. Writes fail once the body has been
/// dropped, which is how a client disconnect reaches the engine.
pub struct ChannelSink {
    frames: mpsc::Sender<FrameResult>,
    content_type: Option<oneshot::Sender<String>>,
}

impl ChannelSink {
    /// Create the sink, the streaming body it feeds, and a receiver for the
    /// content type announced before the first write.
    pub fn channel(buffer: usize) -> (Self, JsonRpcBody, oneshot::Receiver<String>) {
        let (frames, rx) = mpsc::channel(buffer.max(1));
        let (content_type, content_type_rx) = oneshot::channel();
        let body = StreamBody::new(ReceiverStream::new(rx)).boxed_unsync();
        let sink = Self {
            frames,
            content_type: Some(content_type),
        };
        (sink, body, content_type_rx)
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn set_content_type(&mut self, content_type: &str) {
        if let Some(tx) = self.content_type.take() {
            let _ = tx.send(content_type.to_string());
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.frames
            .send(Ok(Frame::data(chunk)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turul_json_rpc_engine::parser::{ParseOptions, parse_request_with};

    #[tokio::test]
    async fn test_request_body_limit() {
        let body = HttpRequestBody::new(Full::new(Bytes::from_static(b"[1,2,3]")), 3);
        let err = parse_request_with(Some("application/json"), body, ParseOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[tokio::test]
    async fn test_request_body_size_hint() {
        let body = HttpRequestBody::new(Full::new(Bytes::from_static(b"{}")), 1024);
        assert_eq!(body.size_hint(), Some(2));
    }

    #[tokio::test]
    async fn test_channel_sink_streams_frames() {
        let (mut sink, body, content_type) = ChannelSink::channel(4);
        sink.set_content_type("application/json");
        sink.write(Bytes::from_static(b"[1,")).await.unwrap();
        sink.write(Bytes::from_static(b"2]")).await.unwrap();
        drop(sink);

        assert_eq!(content_type.await.unwrap(), "application/json");
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"[1,2]");
    }

    #[tokio::test]
    async fn test_channel_sink_fails_after_body_dropped() {
        let (mut sink, body, _content_type) = ChannelSink::channel(1);
        drop(body);
        let err = sink.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
