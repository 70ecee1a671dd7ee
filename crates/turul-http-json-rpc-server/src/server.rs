//! HTTP JSON-RPC server: configuration, builder and accept loop

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use turul_json_rpc_engine::{
    JsonRpcDispatcher, JsonRpcHandler, JsonRpcStreamHandler, MethodMetadata, MethodRepository,
    MethodResolver, ParseOptions, RegistryError, RequestContext,
};

use crate::{JsonRpcHttpHandler, Result};

/// Configuration for the HTTP JSON-RPC server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path of the JSON-RPC endpoint
    pub path: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// Origin allowed with credentials; any origin when unset
    pub cors_origin: Option<String>,
    /// Maximum request body size
    pub max_body_size: usize,
    /// Response frames buffered ahead of the client
    pub stream_buffer: usize,
    /// Run the calls of a batch concurrently instead of one after another
    pub concurrent_batch: bool,
    /// Request parser policies
    pub parse_options: ParseOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            path: "/rpc".to_string(),
            enable_cors: true,
            cors_origin: None,
            max_body_size: 1024 * 1024, // 1MB
            stream_buffer: 16,
            concurrent_batch: false,
            parse_options: ParseOptions::default(),
        }
    }
}

/// Builder for [`HttpJsonRpcServer`]
pub struct HttpJsonRpcServerBuilder {
    config: ServerConfig,
    methods: Arc<MethodRepository>,
    resolver: Option<Arc<dyn MethodResolver>>,
    registration_error: Option<RegistryError>,
}

impl HttpJsonRpcServerBuilder {
    /// Create a new builder with an empty method repository
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            methods: Arc::new(MethodRepository::new()),
            resolver: None,
            registration_error: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the endpoint path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Enable or disable CORS
    pub fn cors(mut self, enable: bool) -> Self {
        self.config.enable_cors = enable;
        self
    }

    /// Restrict CORS to a single origin
    pub fn cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.enable_cors = true;
        self.config.cors_origin = Some(origin.into());
        self
    }

    /// Set maximum request body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set how many response frames may be buffered
    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.config.stream_buffer = frames;
        self
    }

    /// Run batch calls concurrently
    pub fn concurrent_batch(mut self, enable: bool) -> Self {
        self.config.concurrent_batch = enable;
        self
    }

    /// Set the request parser policies
    pub fn parse_options(mut self, options: ParseOptions) -> Self {
        self.config.parse_options = options;
        self
    }

    /// Use an existing method repository
    pub fn methods(mut self, methods: Arc<MethodRepository>) -> Self {
        self.methods = methods;
        self
    }

    /// Resolve methods with a custom resolver instead of the repository
    pub fn resolver(mut self, resolver: Arc<dyn MethodResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register a unary handler
    pub fn register<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: JsonRpcHandler + 'static,
    {
        let result = self.methods.register(name, handler);
        self.record(result)
    }

    /// Register a streaming handler
    pub fn register_stream<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: JsonRpcStreamHandler + 'static,
    {
        let result = self.methods.register_stream(name, handler);
        self.record(result)
    }

    /// Register a method with full metadata
    pub fn register_with(self, name: impl Into<String>, metadata: MethodMetadata) -> Self {
        let result = self.methods.register_with(name, metadata);
        self.record(result)
    }

    fn record(mut self, result: std::result::Result<(), RegistryError>) -> Self {
        if let Err(err) = result {
            error!("Method registration failed: {}", err);
            if self.registration_error.is_none() {
                self.registration_error = Some(err);
            }
        }
        self
    }

    /// Build the server, failing if any registration failed
    pub fn build(self) -> Result<HttpJsonRpcServer> {
        if let Some(err) = self.registration_error {
            return Err(err.into());
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::clone(&self.methods) as Arc<dyn MethodResolver>);
        let handler = JsonRpcHttpHandler::new(self.config, JsonRpcDispatcher::new(resolver));

        Ok(HttpJsonRpcServer {
            handler,
            methods: self.methods,
        })
    }
}

impl Default for HttpJsonRpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP JSON-RPC server
#[derive(Clone)]
pub struct HttpJsonRpcServer {
    handler: JsonRpcHttpHandler,
    methods: Arc<MethodRepository>,
}

impl HttpJsonRpcServer {
    /// Create a new builder
    pub fn builder() -> HttpJsonRpcServerBuilder {
        HttpJsonRpcServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    pub fn handler(&self) -> &JsonRpcHttpHandler {
        &self.handler
    }

    /// The repository methods are registered in
    pub fn methods(&self) -> &Arc<MethodRepository> {
        &self.methods
    }

    /// Bind the configured address and serve until an accept error
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config().bind_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            "HTTP JSON-RPC server listening on {}",
            listener.local_addr()?
        );
        info!("JSON-RPC endpoint available at: {}", self.config().path);
        info!("Registered methods: {}", self.methods.len());

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("New connection from {}", peer_addr);

            let handler = self.handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    let base = RequestContext::new()
                        .with_attribute("peer_addr", json!(peer_addr.to_string()));
                    async move {
                        Ok::<_, Infallible>(handler.handle_with_context(req, base).await)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Clients closing mid-response are routine
                    if err.is_incomplete_message() || err.is_canceled() {
                        debug!("Client disconnected: {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        }
    }
}
