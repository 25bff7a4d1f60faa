//! Health probe against the managed application's local endpoint

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers whether the managed application is accepting requests.
pub trait HealthProbe {
    fn is_healthy(&self) -> impl Future<Output = bool> + Send;
}

impl<T: HealthProbe + Sync> HealthProbe for &T {
    fn is_healthy(&self) -> impl Future<Output = bool> + Send {
        (**self).is_healthy()
    }
}

/// HTTP GET probe: healthy when the endpoint answers with a status below 400
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("Failed to build health check client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().as_u16() < 400,
            Err(e) => {
                debug!("Health check against {} failed: {}", self.url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unhealthy() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = HttpHealthProbe::new(format!("http://127.0.0.1:{port}/api/tags")).unwrap();
        assert!(!probe.is_healthy().await);
    }

    #[tokio::test]
    async fn test_status_below_400_is_healthy() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/tags", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                .await
                .unwrap();
        });

        let probe = HttpHealthProbe::new(url).unwrap();
        assert!(probe.is_healthy().await);
        server.await.unwrap();
    }
}
