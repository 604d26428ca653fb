//! Outbound test client
//!
//! Sends a payload to a raw-TCP printer the way a POS terminal would:
//! connect, write everything, close. Used to inject a test ticket into a
//! running simulator.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use crate::error::{PrinterError, PrinterResult};

/// Raw TCP print client
#[derive(Debug, Clone)]
pub struct TestPrintClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl TestPrintClient {
    /// Create a client for `host:port`
    pub fn new(host: &str, port: u16) -> PrinterResult<Self> {
        Self::from_addr(&format!("{host}:{port}"))
    }

    /// Create from a socket address string (e.g., "192.168.1.100:9100")
    pub fn from_addr(addr: &str) -> PrinterResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrinterError::InvalidConfig(format!("Invalid address: {addr}")))?;

        Ok(Self {
            addr,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connect, write `data`, flush and close
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    pub async fn send(&self, data: &[u8]) -> PrinterResult<()> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrinterError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrinterError::Connection(format!("{}: {}", self.addr, e)))?;

        stream.write_all(data).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        info!("test job sent");
        Ok(())
    }

    /// Check whether something is listening at the address
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "printer offline");
                false
            }
            Err(_) => {
                warn!("printer check timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_new() {
        let client = TestPrintClient::new("192.168.1.100", 9100).unwrap();
        assert_eq!(client.addr().port(), 9100);
    }

    #[test]
    fn test_invalid_addr() {
        assert!(matches!(
            TestPrintClient::from_addr("invalid"),
            Err(PrinterError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_send_writes_payload_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let reader = tokio::spawn(async move {
            // the online probe connects without sending anything
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut got = Vec::new();
                stream.read_to_end(&mut got).await.unwrap();
                if !got.is_empty() {
                    return got;
                }
            }
        });

        let client = TestPrintClient::from_addr(&addr.to_string()).unwrap();
        assert!(client.is_online().await);
        client.send(b"hello printer").await.unwrap();

        assert_eq!(reader.await.unwrap(), b"hello printer");
    }
}
