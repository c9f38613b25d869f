//! Socket transport for installations where the bus is behind an
//! RS-485-to-ethernet bridge (ser2net and friends).

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::info;

use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(addr: &str) -> Result<TcpStream> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Connection(format!("connect {addr}: timed out")))?
        .map_err(|e| Error::Connection(format!("connect {addr}: {e}")))?;
    stream.set_nodelay(true).ok();
    info!(addr, "socket connected");
    Ok(stream)
}
