//! HTTP server for the basket service.

use crate::api::router::route_request;
use crate::api::types::ServiceContext;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub struct BasketServer {
    listener: TcpListener,
    ctx: Arc<ServiceContext>,
}

impl BasketServer {
    /// Bind the configured listen address. Port 0 picks an ephemeral port.
    pub async fn bind(ctx: ServiceContext) -> Result<Self, anyhow::Error> {
        let addr = ctx.config.listen.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> Arc<ServiceContext> {
        Arc::clone(&self.ctx)
    }

    /// Serve until `shutdown` resolves, then drain open connections and
    /// in-flight forwards within the configured grace period.
    pub async fn run<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let prefix = &self.ctx.config.service.path_prefix;
        info!(
            "Request baskets service listening on http://{}{} ({} backend, {:?} mode)",
            addr,
            prefix,
            self.ctx.config.database.db_type.as_str(),
            self.ctx.config.service.mode
        );

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let ctx = Arc::clone(&self.ctx);
                    let service = service_fn(move |req| {
                        let ctx = Arc::clone(&ctx);
                        async move { route_request(req, ctx, Some(remote)).await }
                    });

                    let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("Connection error from {}: {}", remote, e);
                        }
                    });
                }
                () = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }
        drop(self.listener);

        let grace = self.ctx.config.forward.shutdown_grace();
        if tokio::time::timeout(grace, graceful.shutdown()).await.is_err() {
            warn!("Timed out waiting for open connections to close");
        }
        self.ctx.forwarder.shutdown(grace).await;
        self.ctx.db.release();

        info!("Shutdown complete");
        Ok(())
    }
}
