//! # Transport Layer Module
//!
//! This module defines the `TransportLayer` trait, which abstracts the datagram transport
//! used for probes and gossip, and the `StreamLayer` trait, which abstracts the synchronous
//! request/response channel used for anti-entropy exchanges.
use std::fmt;

use async_trait::async_trait;
use snafu::location;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{Error, Result};

/// Upper bound of a single push-pull frame.
pub(crate) const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The `TransportLayer` trait abstracts the datagram transport.
#[async_trait]
pub trait TransportLayer: Send + Sync + 'static {
    /// Receives data from the socket and writes it into the provided buffer.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Sends data to the specified target address.
    async fn send_to(&self, buf: &[u8], target: &str) -> Result<usize>;

    /// Retrieves the local address that the socket is bound to.
    fn local_addr(&self) -> Result<String>;
}

#[async_trait]
impl TransportLayer for UdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let (len, _) = self.recv_from(buf).await?;
        Ok(len)
    }

    async fn send_to(&self, buf: &[u8], target: &str) -> Result<usize> {
        Ok(self.send_to(buf, target).await?)
    }

    fn local_addr(&self) -> Result<String> {
        let addr = self.local_addr()?;
        Ok(addr.to_string())
    }
}

/// The `StreamLayer` trait abstracts the request/response channel used by push-pull.
#[async_trait]
pub trait StreamLayer: Send + Sync + fmt::Debug {
    /// Sends `payload` to `target` and returns the reply.
    async fn request(&self, target: &str, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Length prefixed frames over a fresh TCP connection per request.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpStreamLayer;

#[async_trait]
impl StreamLayer for TcpStreamLayer {
    async fn request(&self, target: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(target).await?;
        write_frame(&mut stream, payload).await?;
        let reply = read_frame(&mut stream).await?;
        stream.shutdown().await?;

        Ok(reply)
    }
}

pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::InvalidData {
            message: format!("frame of {} bytes exceeds the limit", payload.len()),
            location: location!(),
        });
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::InvalidData {
            message: format!("frame of {len} bytes exceeds the limit"),
            location: location!(),
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(buf)
}
