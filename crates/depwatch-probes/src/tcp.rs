//! TCP connect probe.

use async_trait::async_trait;
use depwatch_core::{CheckError, Checker, Endpoint};
use tokio::net::TcpStream;
use tracing::debug;

/// Healthy if a TCP connection can be established.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), CheckError> {
        let address = endpoint.address();
        let stream = TcpStream::connect(&address).await.map_err(|e| {
            debug!(error = %e, %address, "tcp connect failed");
            CheckError::Io(e)
        })?;
        drop(stream);
        Ok(())
    }
}
