//! Request parsing: content-type check, body acquisition, batch detection.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

use crate::error::JsonRpcErrorObject;
use crate::request::JsonRpcRequest;

/// Media type accepted for request bodies and announced for responses
pub const JSON_CONTENT_TYPE: &str = "application/json";

const BATCH_OPEN: u8 = b'[';

/// A request body the parser reads once and then releases.
#[async_trait]
pub trait BodySource: Send {
    /// Expected body length, used to size the read buffer
    fn size_hint(&self) -> Option<usize> {
        None
    }

    /// Read the whole body
    async fn read_all(&mut self) -> io::Result<Bytes>;

    /// Release the underlying resource. Called once on every path after
    /// the content type has been accepted.
    async fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BodySource for Bytes {
    fn size_hint(&self) -> Option<usize> {
        Some(self.len())
    }

    async fn read_all(&mut self) -> io::Result<Bytes> {
        Ok(std::mem::take(self))
    }
}

#[async_trait]
impl BodySource for Vec<u8> {
    fn size_hint(&self) -> Option<usize> {
        Some(self.len())
    }

    async fn read_all(&mut self) -> io::Result<Bytes> {
        Ok(Bytes::from(std::mem::take(self)))
    }
}

/// Body backed by any async reader
pub struct ReaderBody<R> {
    reader: R,
    content_length: Option<usize>,
}

impl<R> ReaderBody<R> {
    pub fn new(reader: R, content_length: Option<usize>) -> Self {
        Self {
            reader,
            content_length,
        }
    }
}

#[async_trait]
impl<R> BodySource for ReaderBody<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn size_hint(&self) -> Option<usize> {
        self.content_length
    }

    async fn read_all(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0));
        self.reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// Parser policies that differ from the default wire behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip JSON whitespace before sniffing for `[`. When off, a batch with
    /// leading whitespace is decoded as a single request and fails with a
    /// parse error.
    pub skip_leading_whitespace: bool,
    /// Answer `[]` with `Invalid Request`. When off, an empty batch yields no
    /// requests and the response body stays empty.
    pub reject_empty_batch: bool,
}

/// The requests found in one body
#[derive(Debug)]
pub struct ParsedRequests {
    pub requests: Vec<JsonRpcRequest>,
    /// Whether the body was a JSON array, even of length one
    pub batch: bool,
}

/// Whether a content-type header value declares JSON
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with(JSON_CONTENT_TYPE))
}

/// Parse a request body with default options.
pub async fn parse_request<B>(
    content_type: Option<&str>,
    body: B,
) -> Result<ParsedRequests, JsonRpcErrorObject>
where
    B: BodySource,
{
    parse_request_with(content_type, body, ParseOptions::default()).await
}

/// Parse a request body.
///
/// The body is released on every path once the content type is accepted. A
/// release failure is reported as `Internal error` only if parsing itself
/// succeeded.
pub async fn parse_request_with<B>(
    content_type: Option<&str>,
    mut body: B,
    options: ParseOptions,
) -> Result<ParsedRequests, JsonRpcErrorObject>
where
    B: BodySource,
{
    if !is_json_content_type(content_type) {
        warn!("Invalid content type: {}", content_type.unwrap_or(""));
        return Err(JsonRpcErrorObject::invalid_request(None));
    }

    let parsed = match body.read_all().await {
        Ok(bytes) => decode_requests(&bytes, options),
        Err(err) => {
            error!("Failed to read request body: {}", err);
            Err(JsonRpcErrorObject::invalid_request(None))
        }
    };

    match (parsed, body.release().await) {
        (Ok(parsed), Ok(())) => Ok(parsed),
        (Ok(_), Err(err)) => {
            error!("Failed to release request body: {}", err);
            Err(JsonRpcErrorObject::internal_error(None))
        }
        (Err(rpc_err), Err(err)) => {
            warn!("Failed to release request body after {}: {}", rpc_err, err);
            Err(rpc_err)
        }
        (Err(rpc_err), Ok(())) => Err(rpc_err),
    }
}

/// Decode an in-memory body into requests.
pub fn decode_requests(
    body: &[u8],
    options: ParseOptions,
) -> Result<ParsedRequests, JsonRpcErrorObject> {
    if body.is_empty() {
        return Err(JsonRpcErrorObject::invalid_request(None));
    }

    let first = if options.skip_leading_whitespace {
        match body.iter().find(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
            Some(first) => *first,
            None => return Err(JsonRpcErrorObject::invalid_request(None)),
        }
    } else {
        body[0]
    };

    if first != BATCH_OPEN {
        let request: JsonRpcRequest = serde_json::from_slice(body).map_err(|err| {
            debug!("Failed to decode request: {}", err);
            JsonRpcErrorObject::parse_error(None)
        })?;
        return Ok(ParsedRequests {
            requests: vec![request],
            batch: false,
        });
    }

    let requests: Vec<JsonRpcRequest> = serde_json::from_slice(body).map_err(|err| {
        debug!("Failed to decode batch request: {}", err);
        JsonRpcErrorObject::parse_error(None)
    })?;

    if requests.is_empty() && options.reject_empty_batch {
        return Err(JsonRpcErrorObject::invalid_request(None));
    }

    debug!("Decoded batch of {} requests", requests.len());
    Ok(ParsedRequests {
        requests,
        batch: true,
    })
}
