//! HTTP pull endpoint serving the registry on `GET /metrics`.
//!
//! Built on `hyper` directly: one task per connection, HTTP/1 only. Scrapes
//! only read gauge atomics, so they never wait on the monitors' network
//! calls.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::ExporterError;
use crate::metrics::encoding::ExpositionFormat;
use crate::metrics::prometheus::MetricsRegistry;

/// Path the registry is served on.
pub const METRICS_PATH: &str = "/metrics";

/// Binds the metrics listener.
///
/// The IPv6 wildcard `[::]` falls back to `0.0.0.0` on hosts without IPv6.
pub async fn bind_metrics_listener(addr: SocketAddr) -> Result<TcpListener, ExporterError> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(e)
            if addr.ip() == IpAddr::V6(Ipv6Addr::UNSPECIFIED)
                && e.kind() != io::ErrorKind::AddrInUse =>
        {
            let fallback = SocketAddr::from((Ipv4Addr::UNSPECIFIED, addr.port()));
            warn!(%addr, %fallback, error = %e, "IPv6 wildcard unavailable, listening on IPv4 only");
            TcpListener::bind(fallback)
                .await
                .map_err(|source| ExporterError::Bind {
                    addr: fallback,
                    source,
                })
        }
        Err(source) => Err(ExporterError::Bind { addr, source }),
    }
}

/// Runs an HTTP server that exposes Prometheus metrics until `shutdown`
/// resolves.
///
/// Serves `GET /metrics` in the classic text format, or OpenMetrics when
/// the scraper asks for it. All other paths return 404. An accept error on
/// the listener ends the server with [`ExporterError::Listener`];
/// per-connection errors are only logged.
pub async fn serve_metrics<F>(
    registry: MetricsRegistry,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), ExporterError>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!("metrics exporter listening on http://{addr}{METRICS_PATH}");
    }

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => {
                info!("metrics exporter shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted.map_err(ExporterError::Listener)?,
        };

        let io = TokioIo::new(stream);
        let registry = registry.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let registry = registry.clone();
                handle_request(req, registry)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(%peer, error = %err, "metrics connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    registry: MetricsRegistry,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, METRICS_PATH) => {
            let accept = req
                .headers()
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok());
            let format = ExpositionFormat::negotiate(accept);
            debug!(?format, "serving metrics scrape");

            match registry.encode(format) {
                Ok(body) => Ok(response(StatusCode::OK, format.content_type(), body)),
                Err(e) => {
                    error!(error = %e, "failed to encode metrics");
                    Ok(response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain; charset=utf-8",
                        format!("failed to encode metrics: {e}"),
                    ))
                }
            }
        }
        _ => Ok(response(
            StatusCode::NOT_FOUND,
            "text/plain; charset=utf-8",
            "not found",
        )),
    }
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}
