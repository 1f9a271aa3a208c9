use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use super::{Connection, DeliveryError, RETRY_INTERVAL};
use crate::cli::Transport;

#[async_trait]
impl Connection for TcpStream {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes).await
    }
}

/// One datagram per record.
#[async_trait]
impl Connection for UdpSocket {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let sent = self.send(bytes).await?;
        if sent != bytes.len() {
            return Err(Error::new(
                ErrorKind::WriteZero,
                format!("datagram truncated: sent {sent} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }
}

async fn resolve(address: &str) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!("{address} did not resolve to any address"),
        )
    })
}

async fn dial(transport: Transport, address: &str) -> std::io::Result<Box<dyn Connection>> {
    let remote = resolve(address).await?;
    match transport {
        Transport::Tcp => Ok(Box::new(TcpStream::connect(remote).await?)),
        Transport::Udp => {
            let local: SocketAddr = if remote.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(remote).await?;
            Ok(Box::new(socket))
        }
    }
}

/// Opens the connection to Logstash. With `retry_startup` a failed attempt
/// is retried forever.
pub async fn connect(
    transport: Transport,
    address: &str,
    retry_startup: bool,
) -> Result<Box<dyn Connection>, DeliveryError> {
    let retry_interval = retry_startup.then_some(RETRY_INTERVAL);
    connect_with_retry(transport, address, retry_interval).await
}

/// Dials until it succeeds, sleeping `retry_interval` between attempts.
/// Without an interval the first failure is returned.
async fn connect_with_retry(
    transport: Transport,
    address: &str,
    retry_interval: Option<Duration>,
) -> Result<Box<dyn Connection>, DeliveryError> {
    loop {
        match dial(transport, address).await {
            Ok(conn) => {
                log::info!("Connected to {address} over {}", transport.as_ref());
                return Ok(conn);
            }
            Err(e) => match retry_interval {
                Some(interval) => {
                    log::warn!("Retrying connection to {address} in {interval:?}: {e}");
                    tokio::time::sleep(interval).await;
                }
                None => {
                    return Err(DeliveryError::Connect {
                        address: address.to_string(),
                        source: e,
                    });
                }
            },
        }
    }
}
