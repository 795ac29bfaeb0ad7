//! Event stream server listener
//!
//! Handles the TCP accept loop and spawns a task per subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::server::config::ServerConfig;
use crate::server::http::{self, Route, EVENT_STREAM_RESPONSE};

/// Serves the event stream endpoint and registers subscribers
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a new server feeding subscribers into `registry`
    pub fn new(config: ServerConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            connection_semaphore,
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.stream_path,
            "Event stream server listening"
        );
        Ok(listener)
    }

    /// Run the server until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener) => {}
        }

        let closed = self.registry.close_all().await;
        tracing::info!(connections = closed, "Server stopped");
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    tokio::spawn(reject(socket, 503, "Service Unavailable"));
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = serve_subscriber(socket, peer_addr, &config, &registry).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        });
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

async fn serve_subscriber(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    registry: &ConnectionRegistry,
) -> Result<()> {
    let head = tokio::time::timeout(
        config.request_timeout,
        http::read_request_head(&mut socket, config.max_request_size),
    )
    .await;

    let head = match head {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => {
            reject(socket, 400, "Bad Request").await;
            return Err(e.into());
        }
        Err(_) => {
            tracing::debug!(peer = %peer_addr, "Request head timed out");
            return Ok(());
        }
    };

    match Route::for_request(&head, &config.stream_path) {
        Route::Stream => {}
        Route::NotFound => {
            reject(socket, 404, "Not Found").await;
            return Ok(());
        }
        Route::MethodNotAllowed => {
            reject(socket, 405, "Method Not Allowed").await;
            return Ok(());
        }
    }

    socket.write_all(EVENT_STREAM_RESPONSE).await?;
    socket.flush().await?;

    let (mut read_half, write_half) = socket.into_split();
    let handle = registry.register(Box::new(write_half)).await;

    tracing::debug!(
        connection_id = %handle.id(),
        peer = %peer_addr,
        "Subscriber stream opened"
    );

    // The client never sends anything meaningful after the head; EOF or an
    // error on the read side means it went away.
    let mut scratch = [0u8; 512];
    let hung_up = async {
        loop {
            match read_half.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    };

    tokio::select! {
        _ = hung_up => {
            tracing::debug!(connection_id = %handle.id(), "Client disconnected");
            registry.unregister(handle.id()).await;
        }
        _ = handle.closed() => {}
    }

    Ok(())
}

async fn reject(mut socket: TcpStream, status: u16, reason: &str) {
    let response = http::error_response(status, reason);
    let _ = socket.write_all(&response).await;
    let _ = socket.shutdown().await;
}
