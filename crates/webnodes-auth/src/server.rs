//! HTTP server for the admin routes
//!
//! A minimal hyper (HTTP/1) server that passes every request to
//! [`AdminRoutes`] until the shutdown token fires.

use std::{convert::Infallible, sync::Arc};

use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    header::{CONTENT_TYPE, LOCATION},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::routes::{AdminResponse, AdminRoutes};

/// Serves [`AdminRoutes`] over HTTP
pub struct AdminServer {
    routes: Arc<AdminRoutes>,
}

impl AdminServer {
    pub fn new(routes: AdminRoutes) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Binds a listener on `addr` (e.g. `127.0.0.1:1880`)
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind admin server to {addr}"))
    }

    /// Accepts connections until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener
            .local_addr()
            .context("Failed to read listener address")?;
        info!(%addr, providers = ?self.routes.providers(), "Admin server listening");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.cancelled() => break,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept admin connection");
                    continue;
                }
            };

            let routes = self.routes.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let routes = routes.clone();
                async move {
                    let uri = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str())
                        .unwrap_or("/");
                    debug!(method = %req.method(), uri, "Admin request");
                    let response = routes.handle(req.method().as_str(), uri).await;
                    Ok::<_, Infallible>(into_hyper(response))
                }
            });

            tokio::spawn(async move {
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    warn!(%peer, error = %e, "Admin connection error");
                }
            });
        }

        info!("Admin server stopped");
        Ok(())
    }
}

fn into_hyper(response: AdminResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, response.content_type());
    if let Some(location) = &response.location {
        builder = builder.header(LOCATION, location.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build admin response");
            let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
