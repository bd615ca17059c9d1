//! Frontend listener implementation.
//!
//! Accepts incoming connections and serves session lookups and control
//! requests over HTTP/1.1.

use crate::backend::SessionRouter;
use crate::config::FrontendConfig;
use crate::frontend::handler::{HandlerContext, REQUEST_ID_HEADER, Routes, handle_request};
use crate::metrics::MetricsCollector;
use crate::util::RequestId;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Frontend listener that accepts and handles connections.
pub struct FrontendListener {
    /// Frontend configuration.
    config: FrontendConfig,
    /// TCP listener.
    listener: TcpListener,
    /// Shared request handling state.
    context: Arc<HandlerContext>,
}

impl FrontendListener {
    /// Create a new frontend listener.
    pub async fn bind(
        config: FrontendConfig,
        router: Arc<SessionRouter>,
        metrics: MetricsCollector,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;

        info!(
            listen = %config.listen,
            algorithm = router.algorithm(),
            session_header = %config.session_header,
            "frontend listener bound"
        );

        let context = Arc::new(HandlerContext {
            router,
            routes: Routes::from_config(&config),
            metrics,
        });

        Ok(Self {
            config,
            listener,
            context,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all, fields(listen = %self.config.listen))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Handle an incoming connection.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let context = Arc::clone(&self.context);
        let header_read_timeout = self.config.header_read_timeout;

        tokio::spawn(async move {
            let start_time = Instant::now();
            let result = serve_connection(stream, context, header_read_timeout).await;
            let duration = start_time.elapsed();

            if let Err(e) = result {
                warn!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection handling failed"
                );
            } else {
                debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                );
            }
        });
    }
}

/// Serve HTTP/1.1 requests on one client connection.
async fn serve_connection(
    stream: TcpStream,
    context: Arc<HandlerContext>,
    header_read_timeout: Duration,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::from_inbound)
            .unwrap_or_else(RequestId::short);
        handle_request(req, Arc::clone(&context), request_id)
    });

    http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout)
        .keep_alive(true)
        .serve_connection(io, service)
        .await
}
