//! Bounded outgoing TCP pool shared across zones (spec §4.H "TCP pool").
//!
//! Grounded on heimdall's `pool.rs` buffer-pool pattern (a fixed-size
//! `Vec` of reusable resources handed out and returned under a
//! `Semaphore`) adapted from pooled byte buffers to pooled outbound TCP
//! connections, each framed with the DNS TCP length prefix (RFC 1035
//! §4.2.2).

use crate::error::{NsdError, Result};
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};
use std::sync::Arc;

/// One connection's framed read/write state.
pub struct TcpSlot {
    stream: TcpStream,
}

impl TcpSlot {
    pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NsdError::UnexpectedResponse(format!("connect timed out: {addr}")))??;
        Ok(TcpSlot { stream })
    }

    pub async fn send_message(&mut self, msg: &[u8]) -> Result<()> {
        let len = msg.len() as u16;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(msg).await?;
        Ok(())
    }

    /// Read one length-prefixed DNS message frame.
    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 2];
        self.stream.read_exact(&mut len_buf).await?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read consecutive frames until `is_complete` reports the sequence
    /// is done (caller inspects decoded RRs to detect the SOA bracket
    /// that ends an AXFR/IXFR transfer, per RFC 5936 §2.2 / RFC 1995 §4).
    pub async fn read_messages_until(
        &mut self,
        idle_timeout: Duration,
        mut is_complete: impl FnMut(&[u8]) -> bool,
    ) -> Result<Vec<Vec<u8>>> {
        let mut frames = Vec::new();
        loop {
            let frame = timeout(idle_timeout, self.read_message())
                .await
                .map_err(|_| NsdError::UnexpectedResponse("TCP transfer idle timeout".into()))??;
            let done = is_complete(&frame);
            frames.push(frame);
            if done {
                break;
            }
        }
        Ok(frames)
    }
}

/// A bounded set of outgoing TCP slots; zones needing a connection while
/// the pool is full enter a FIFO waiting queue (spec §4.H "a zone
/// needing TCP while the pool is full enters a waiting queue").
pub struct TcpPool {
    semaphore: Arc<Semaphore>,
    connect_timeout: Duration,
    waiting: VecDeque<SocketAddr>,
}

impl TcpPool {
    pub fn new(capacity: usize, connect_timeout: Duration) -> Self {
        TcpPool {
            semaphore: Arc::new(Semaphore::new(capacity)),
            connect_timeout,
            waiting: VecDeque::new(),
        }
    }

    /// Acquire a slot (waiting if the pool is saturated) and connect.
    /// The returned permit must be held for the slot's lifetime; dropping
    /// it returns the capacity to the pool.
    pub async fn acquire(&mut self, addr: SocketAddr) -> Result<(TcpSlot, tokio::sync::OwnedSemaphorePermit)> {
        self.waiting.push_back(addr);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NsdError::TooManyConnections)?;
        if let Some(pos) = self.waiting.iter().position(|a| *a == addr) {
            self.waiting.remove(pos);
        }
        let slot = TcpSlot::connect(addr, self.connect_timeout).await?;
        Ok((slot, permit))
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_starts_with_full_capacity() {
        let pool = TcpPool::new(4, Duration::from_secs(5));
        assert_eq!(pool.available_permits(), 4);
        assert_eq!(pool.waiting_count(), 0);
    }
}
