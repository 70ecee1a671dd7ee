//! # Streaming Calculator
//!
//! A JSON-RPC 2.0 server with unary arithmetic and a streamed `count` method
//! whose result array is written element by element as it is produced.
//!
//! ## Usage
//! ```bash
//! cargo run --package streaming-calculator -- --bind 127.0.0.1:8000
//! ```
//!
//! ```bash
//! curl -N -X POST http://127.0.0.1:8000/rpc \
//!   -H "Content-Type: application/json" \
//!   -d '[{"jsonrpc":"2.0","method":"add","params":{"a":2,"b":3},"id":1},
//!        {"jsonrpc":"2.0","method":"count","params":{"to":5,"delay_ms":200},"id":2}]'
//! ```
//!
//! Closing the connection while `count` is running cancels it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use turul_http_json_rpc_server::HttpJsonRpcServer;
use turul_json_rpc_engine::{
    Capability, JsonRpcErrorObject, JsonRpcResult, MethodMetadata, MethodRepository, ResultStream,
    handler_fn, parse_params, stream_handler_fn,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Path of the JSON-RPC endpoint
    #[arg(short, long, default_value = "/rpc")]
    path: String,

    /// Run the calls of a batch concurrently
    #[arg(long, default_value = "false")]
    concurrent: bool,
}

#[derive(Deserialize)]
struct Operands {
    a: f64,
    b: f64,
}

#[derive(Deserialize)]
struct CountParams {
    to: u32,
    #[serde(default)]
    delay_ms: u64,
}

/// Application error code for division by zero
const DIVISION_BY_ZERO: i64 = 1001;

fn register_methods(methods: &Arc<MethodRepository>) -> Result<()> {
    methods.register_with(
        "add",
        MethodMetadata::new(Capability::unary(handler_fn(|_ctx, params| async move {
            let Operands { a, b } = parse_params(params.as_deref())?;
            JsonRpcResult::<Value>::Ok(json!(a + b))
        })))
        .description("Add two numbers"),
    )?;

    methods.register_with(
        "divide",
        MethodMetadata::new(Capability::unary(handler_fn(|_ctx, params| async move {
            let Operands { a, b } = parse_params(params.as_deref())?;
            if b == 0.0 {
                return Err(JsonRpcErrorObject::application(
                    DIVISION_BY_ZERO,
                    "Division by zero",
                ));
            }
            Ok(json!(a / b))
        })))
        .description("Divide a by b"),
    )?;

    methods.register_with(
        "count",
        MethodMetadata::new(Capability::streaming(stream_handler_fn(|ctx, params| async move {
            let CountParams { to, delay_ms } = parse_params(params.as_deref())?;
            let delay = Duration::from_millis(delay_ms);

            let stream = async_stream::stream! {
                yield Bytes::from_static(b"[");
                for i in 1..=to {
                    if i > 1 {
                        let cancelled = tokio::select! {
                            _ = ctx.cancelled() => true,
                            _ = tokio::time::sleep(delay) => false,
                        };
                        if cancelled {
                            debug!("{} cancelled after {} values", ctx.method(), i - 1);
                            break;
                        }
                        yield Bytes::from(format!(",{i}"));
                    } else {
                        yield Bytes::from(i.to_string());
                    }
                }
                yield Bytes::from_static(b"]");
            };
            JsonRpcResult::<ResultStream>::Ok(ResultStream::from_stream(stream))
        })))
        .description("Stream the integers 1..=to"),
    )?;

    let listing = Arc::downgrade(methods);
    methods.register_with(
        "methods",
        MethodMetadata::new(Capability::unary(handler_fn(move |_ctx, _params| {
            let listed = listing
                .upgrade()
                .map(|methods| methods.methods())
                .unwrap_or_default();
            async move { JsonRpcResult::<Value>::Ok(json!(listed)) }
        })))
        .description("List the registered methods"),
    )?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let methods = Arc::new(MethodRepository::new());
    register_methods(&methods)?;

    let server = HttpJsonRpcServer::builder()
        .bind_address(args.bind)
        .path(args.path.clone())
        .concurrent_batch(args.concurrent)
        .methods(methods)
        .build()?;

    info!("Streaming calculator at http://{}{}", args.bind, args.path);
    server.run().await?;
    Ok(())
}
