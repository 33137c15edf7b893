use async_trait::async_trait;
use std::{io, net::SocketAddr, sync::Arc};

mod memory;

pub use memory::MemorySocket;

/// Definition of datagram transport behavior
///
/// One `recv_from` returns exactly one datagram. If `buf` is too small the
/// rest of the datagram is lost, as with UDP.
#[async_trait]
pub trait DatagramSocket: Send + Sync {
    /// Receive a single datagram
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    /// Send a single datagram
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
    /// Bound address
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[cfg(feature = "tokio-runtime")]
#[async_trait]
impl DatagramSocket for tokio::net::UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        tokio::net::UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        tokio::net::UdpSocket::send_to(self, buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::UdpSocket::local_addr(self)
    }
}

#[async_trait]
impl<T> DatagramSocket for Arc<T>
where
    T: DatagramSocket + ?Sized,
{
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        (**self).recv_from(buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}
