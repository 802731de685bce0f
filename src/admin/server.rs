use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::AdminApi;

/// Admin server for serving the admin API
pub struct AdminServer {
    api: Arc<AdminApi>,
    address: SocketAddr,
}

impl AdminServer {
    pub fn new(api: AdminApi, address: SocketAddr) -> Self {
        Self {
            api: Arc::new(api),
            address,
        }
    }

    /// Serve until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.address).await?;
        info!("Admin API listening on http://{}", self.address);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.recv() => {
                    info!("Admin API shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let api = Arc::clone(&self.api);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let api = Arc::clone(&api);
                    async move {
                        debug!("Admin request: {} {}", req.method(), req.uri().path());
                        Ok::<_, hyper::Error>(api.handle(req).await)
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Admin connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }
}
