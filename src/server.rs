use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::collector::HelmCollector;

/// Minimal HTTP/1.1 endpoint for the Prometheus scraper. Serves `/metrics`
/// and a `/health` probe; one short-lived connection per request.
pub struct MetricsServer {
    listener: TcpListener,
}

impl MetricsServer {
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics endpoint on {addr}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, collector: Arc<HelmCollector>) -> Result<()> {
        info!(addr = %self.local_addr()?, "Serving metrics");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let collector = collector.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &collector).await {
                    debug!(peer = %peer, error = %e, "Connection error");
                }
            });
        }
    }
}

async fn handle_connection(mut stream: TcpStream, collector: &HelmCollector) -> Result<()> {
    // The request line is all we route on; a scraper's GET fits in one read.
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/metrics" => match collector.render() {
            Ok(body) => ("200 OK", "text/plain; version=0.0.4; charset=utf-8", body),
            Err(e) => {
                warn!(error = %e, "Failed to encode metrics");
                (
                    "500 Internal Server Error",
                    "text/plain",
                    "encode error\n".to_string(),
                )
            }
        },
        "/health" => ("200 OK", "text/plain", "ok\n".to_string()),
        _ => ("404 Not Found", "text/plain", "not found\n".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
