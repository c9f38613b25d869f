//! Duplex byte stream to the bus, with framing and reconnect.
//!
//! The connection splits into a read half (inbound loop) and a write half
//! (outbound loop); only the outbound loop ever writes. Reconnection is
//! exponential backoff capped at 60 seconds, and a new attempt is only made
//! once the previously computed next-attempt time has elapsed.

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::watch,
    time::Instant,
};
use tracing::{info, warn};

pub mod framing;
#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;

use crate::{
    constants::{RECONNECT_CAP_SECS, SEND_SETTLE},
    error::{Error, Result},
    message::RawFrame,
};
use framing::FrameReader;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

type IoStream = Box<dyn AsyncReadWrite + Send + Unpin>;

/// Connectivity of the bus link. Owned exclusively by the transport; other
/// components observe it through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, next_attempt: Instant },
}

/// Where the bus lives. Selection is by pattern match on the target
/// string, not an explicit flag: `COM<n>` and `/dev/tty...` mean a local
/// serial device, anything else is `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Serial(String),
    Tcp(String),
}

impl Target {
    pub fn parse(target: &str) -> Self {
        if target.starts_with("COM") || target.starts_with("/dev/") {
            Target::Serial(target.to_string())
        } else {
            Target::Tcp(target.to_string())
        }
    }
}

/// Reconnect pacing: delay = min(2^attempt, cap) seconds, attempt starting
/// at 1 and incrementing per failed connect.
#[derive(Debug)]
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Register a failure and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let secs = 2u64
            .checked_pow(self.attempt)
            .unwrap_or(RECONNECT_CAP_SECS)
            .min(RECONNECT_CAP_SECS);
        Duration::from_secs(secs)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half: frames out of the byte stream.
pub struct FrameSource {
    reader: ReadHalf<IoStream>,
    acc: FrameReader,
}

impl FrameSource {
    /// Read the next complete frame, suspending until enough bytes arrive.
    /// A closed stream is a connection loss.
    pub async fn read_frame(&mut self) -> Result<RawFrame> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(frame) = self.acc.next_frame() {
                return Ok(frame);
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::Connection("stream closed".into()));
            }
            self.acc.extend(&chunk[..n]);
        }
    }

    /// Accumulate a raw traffic sample for generation detection. Returns
    /// what was collected even when the stream closes early; the caller
    /// decides whether the sample is large enough.
    pub async fn sniff(&mut self, window: usize) -> Vec<u8> {
        let mut sample = Vec::with_capacity(window);
        let mut chunk = [0u8; 256];
        while sample.len() < window {
            match self.reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sample.extend_from_slice(&chunk[..n]),
            }
        }
        sample
    }
}

/// Write half. Every send is followed by the inter-frame settle delay;
/// without the spacing consecutive command frames corrupt each other on
/// the physical bus.
pub struct FrameSink {
    writer: WriteHalf<IoStream>,
}

impl FrameSink {
    pub async fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.writer.write_all(packet).await?;
        self.writer.flush().await?;
        tokio::time::sleep(SEND_SETTLE).await;
        Ok(())
    }
}

/// Connection manager. One per session; hands out split read/write halves
/// on each successful connect.
pub struct Transport {
    target: Target,
    backoff: Backoff,
    state_tx: watch::Sender<ConnectionState>,
}

impl Transport {
    pub fn new(target: &str) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            target: Target::parse(target),
            backoff: Backoff::new(),
            state_tx,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    pub fn mark_disconnected(&mut self) {
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    async fn open(&self) -> Result<IoStream> {
        match &self.target {
            #[cfg(feature = "serial")]
            Target::Serial(path) => Ok(Box::new(serial::open(path).await?)),
            #[cfg(not(feature = "serial"))]
            Target::Serial(path) => Err(Error::Connection(format!(
                "serial target {path} but the serial feature is disabled"
            ))),
            Target::Tcp(addr) => Ok(Box::new(tcp::connect(addr).await?)),
        }
    }

    /// Single connection attempt.
    pub async fn connect(&mut self) -> Result<(FrameSource, FrameSink)> {
        self.state_tx.send_replace(ConnectionState::Connecting);
        match self.open().await {
            Ok(stream) => {
                self.backoff.reset();
                self.state_tx.send_replace(ConnectionState::Connected);
                let (reader, writer) = tokio::io::split(stream);
                Ok((
                    FrameSource {
                        reader,
                        acc: FrameReader::new(),
                    },
                    FrameSink { writer },
                ))
            }
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Connect, retrying with backoff until the bus answers.
    pub async fn connect_with_backoff(&mut self) -> (FrameSource, FrameSink) {
        loop {
            match self.connect().await {
                Ok(halves) => {
                    info!(target = ?self.target, "bus connected");
                    return halves;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    let next_attempt = Instant::now() + delay;
                    warn!(
                        error = %e,
                        attempt = self.backoff.attempt(),
                        delay_secs = delay.as_secs(),
                        "connect failed, backing off"
                    );
                    self.state_tx.send_replace(ConnectionState::Reconnecting {
                        attempt: self.backoff.attempt(),
                        next_attempt,
                    });
                    tokio::time::sleep_until(next_attempt).await;
                }
            }
        }
    }
}
