//! # HTTP JSON-RPC Server
//!
//! This crate serves the turul JSON-RPC engine over HTTP/1.1 with hyper.
//! Each POST body is parsed, dispatched and answered on the same
//! connection; streamed results are forwarded to the client chunk by chunk
//! as they are produced.
//!
//! ## Features
//! - Single and batch requests, with batch shape preserved in the response
//! - Chunked streaming of incremental results, cancelled when the client goes away
//! - Request body size limit and CORS support

pub mod body;
pub mod cors;
pub mod handler;
pub mod prelude;
pub mod server;

#[cfg(test)]
mod tests;

// Re-export main types
pub use body::{ChannelSink, HttpRequestBody, JsonRpcBody};
pub use cors::CorsLayer;
pub use handler::JsonRpcHttpHandler;
pub use server::{HttpJsonRpcServer, HttpJsonRpcServerBuilder, ServerConfig};

// Re-export foundational types
pub use turul_json_rpc_engine::{JsonRpcDispatcher, JsonRpcHandler, JsonRpcStreamHandler};

/// Result type for HTTP JSON-RPC operations
pub type Result<T> = std::result::Result<T, HttpJsonRpcError>;

/// HTTP JSON-RPC server errors
#[derive(Debug, thiserror::Error)]
pub enum HttpJsonRpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Method registration error: {0}")]
    Registry(#[from] turul_json_rpc_engine::RegistryError),
}
