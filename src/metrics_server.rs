use crate::errors::{RateLimitError, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Start HTTP server for Prometheus metrics endpoint
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        RateLimitError::InternalError(format!("Failed to bind metrics server: {}", e))
    })?;

    info!("Metrics server listening on http://0.0.0.0:{}/metrics", port);

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("Metrics scrape from {}", peer);
                tokio::spawn(serve_connection(socket));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn serve_connection(mut socket: TcpStream) {
    let mut buffer = [0; 1024];

    let read = match socket.read(&mut buffer).await {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to read from socket: {}", e);
            return;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..read]);
    let response = route(request.lines().next().unwrap_or_default());
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        debug!("Failed to write metrics response: {}", e);
    }
}

/// Build the full HTTP response for a request line
fn route(request_line: &str) -> String {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    match (method, path) {
        ("GET", "/metrics") | ("GET", "/") => match gather_metrics() {
            Ok(metrics) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                metrics.len(),
                metrics
            ),
            Err(e) => {
                error!("Failed to gather metrics: {}", e);
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string()
            }
        },
        _ => {
            let body = "Try GET /metrics";
            format!(
                "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
        }
    }
}

/// Gather metrics with Send-safe error type
fn gather_metrics() -> std::result::Result<String, String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}
