//! Writes encoded records to the Logstash connection.

use std::time::Duration;

use async_trait::async_trait;

mod transport;

pub use transport::connect;

/// Fixed wait between attempts, both for writes and for the initial connect.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("could not write: {0}")]
    Write(std::io::Error),
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },
}

/// A long lived connection that accepts whole records.
#[async_trait]
pub trait Connection: Send {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

pub struct DeliveryChannel {
    conn: Box<dyn Connection>,
    retry_send: bool,
    retry_interval: Duration,
}

impl DeliveryChannel {
    pub fn new(conn: Box<dyn Connection>, retry_send: bool) -> Self {
        Self {
            conn,
            retry_send,
            retry_interval: RETRY_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Writes `bytes`. With `retry_send` a failed write is retried forever;
    /// without it the first failure is returned to the caller.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), DeliveryError> {
        loop {
            match self.conn.write(bytes).await {
                Ok(()) => return Ok(()),
                Err(e) if self.retry_send => {
                    log::warn!(
                        "Could not write to Logstash, retrying in {:?}: {e}",
                        self.retry_interval
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => return Err(DeliveryError::Write(e)),
            }
        }
    }
}
