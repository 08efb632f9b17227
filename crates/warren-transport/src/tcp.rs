//! TCP transport.
//!
//! Frames are reassembled from a read buffer with
//! [`Frame::decode_from`]; outbound frames are encoded into a write buffer
//! and written with one `write_all` per batch.

use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace};
use warren_protocol::frame::{FRAME_MIN_SIZE, PROTOCOL_HEADER_SIZE};
use warren_protocol::Frame;

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub bind_addr: SocketAddr,
    /// Largest frame accepted before tuning completes.
    pub max_frame_size: usize,
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5672)),
            max_frame_size: 131_072,
            nodelay: true,
        }
    }
}

/// TCP transport.
pub struct TcpTransport {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpTransport {
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: TcpConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("TCP transport listening on {}", config.bind_addr);
        Ok(Self { listener, config })
    }

    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(TcpConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        debug!("Accepted TCP connection from {}", addr);
        Ok(Box::new(TcpConnection::new(stream, addr, self.config.max_frame_size)))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// An AMQP connection over TCP.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
    is_open: bool,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    max_frame_size: usize,
}

impl TcpConnection {
    #[must_use]
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, max_frame_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr,
            is_open: true,
            read_buffer: BytesMut::with_capacity(FRAME_MIN_SIZE as usize),
            write_buffer: BytesMut::with_capacity(FRAME_MIN_SIZE as usize),
            max_frame_size,
        }
    }

    /// Read more bytes into the buffer. Returns `false` on end of stream.
    async fn fill(&mut self) -> Result<bool, TransportError> {
        let n = self.stream.read_buf(&mut self.read_buffer).await?;
        if n == 0 {
            self.is_open = false;
            return Ok(false);
        }
        trace!(connection = %self.id, bytes = n, "Read");
        Ok(true)
    }

    async fn flush_writes(&mut self) -> Result<(), TransportError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let data = self.write_buffer.split().freeze();
        self.stream.write_all(&data).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv_protocol_header(&mut self) -> Result<[u8; PROTOCOL_HEADER_SIZE], TransportError> {
        while self.read_buffer.len() < PROTOCOL_HEADER_SIZE {
            if !self.fill().await? {
                return Err(TransportError::ConnectionClosed);
            }
        }
        let mut header = [0u8; PROTOCOL_HEADER_SIZE];
        header.copy_from_slice(&self.read_buffer.split_to(PROTOCOL_HEADER_SIZE));
        Ok(header)
    }

    async fn send_protocol_header(&mut self, header: [u8; PROTOCOL_HEADER_SIZE]) -> Result<(), TransportError> {
        self.stream.write_all(&header).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            if let Some(frame) = Frame::decode_from(&mut self.read_buffer, self.max_frame_size)? {
                return Ok(Some(frame));
            }
            if !self.fill().await? {
                return if self.read_buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(TransportError::ConnectionClosed)
                };
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        frame.encode_into(&mut self.write_buffer);
        self.flush_writes().await
    }

    async fn send_all(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        for frame in &frames {
            frame.encode_into(&mut self.write_buffer);
        }
        self.flush_writes().await
    }

    fn set_max_frame_size(&mut self, max: usize) {
        self.max_frame_size = max;
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.is_open {
            self.is_open = false;
            self.flush_writes().await?;
            self.stream.shutdown().await?;
            debug!(connection = %self.id, "Connection closed");
        }
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use warren_protocol::{FrameType, ProtocolInitiation, V0_91};

    async fn pair() -> (TcpStream, Box<dyn Connection>) {
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = transport.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let server = transport.accept().await.unwrap();
        (client.await.unwrap(), server)
    }

    #[tokio::test]
    async fn test_header_then_frames() {
        let (mut client, mut server) = pair().await;

        let mut bytes = ProtocolInitiation::for_version(V0_91).encode().to_vec();
        let frame = Frame::method(1, Bytes::from_static(&[0, 20, 0, 10, 0]));
        bytes.extend_from_slice(&frame.encode());
        // split mid-frame to exercise reassembly
        client.write_all(&bytes[..11]).await.unwrap();
        client.flush().await.unwrap();

        let header = server.recv_protocol_header().await.unwrap();
        assert_eq!(ProtocolInitiation::decode(header).unwrap(), V0_91);

        client.write_all(&bytes[11..]).await.unwrap();
        let received = server.recv().await.unwrap().unwrap();
        assert_eq!(received, frame);
    }

    #[tokio::test]
    async fn test_send_all_and_clean_close() {
        let (mut client, mut server) = pair().await;

        server
            .send_all(vec![
                Frame::method(1, Bytes::from_static(&[0, 20, 0, 11])),
                Frame::heartbeat(),
            ])
            .await
            .unwrap();
        server.close().await.unwrap();
        assert!(!server.is_open());

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        let mut buf = BytesMut::from(&received[..]);
        let first = Frame::decode_from(&mut buf, 4096).unwrap().unwrap();
        let second = Frame::decode_from(&mut buf, 4096).unwrap().unwrap();
        assert_eq!(first.frame_type, FrameType::Method);
        assert!(second.is_heartbeat());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_between_frames() {
        let (client, mut server) = pair().await;
        drop(client);
        assert!(server.recv().await.unwrap().is_none());
        assert!(!server.is_open());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = pair().await;
        server.set_max_frame_size(64);
        let frame = Frame::content_body(1, Bytes::from(vec![0u8; 128]));
        client.write_all(&frame.encode()).await.unwrap();
        assert!(matches!(
            server.recv().await,
            Err(TransportError::Frame(_))
        ));
    }
}
