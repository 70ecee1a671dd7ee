//! # HTTP JSON-RPC Server Prelude
//!
//! ```rust
//! use turul_http_json_rpc_server::prelude::*;
//! ```

// Server types
pub use crate::cors::CorsLayer;
pub use crate::handler::JsonRpcHttpHandler;
pub use crate::server::{HttpJsonRpcServer, HttpJsonRpcServerBuilder, ServerConfig};

// Engine types
pub use turul_json_rpc_engine::prelude::*;

// Error types
pub use crate::{HttpJsonRpcError, Result};
