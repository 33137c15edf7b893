use crate::{lock::Mutex, transports::DatagramSocket};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    StreamExt,
    channel::mpsc::{Receiver, Sender, channel},
    lock::Mutex as AsyncMutex,
};
use log::debug;
use once_cell::sync::Lazy;
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt, io,
    net::SocketAddr,
};

/// Datagrams queued per socket before new ones are dropped
const QUEUE_SIZE: usize = 1024;

type Datagram = (Bytes, SocketAddr);

static MEMORY_HUB: Lazy<Mutex<HashMap<SocketAddr, Sender<Datagram>>>> =
    Lazy::new(|| Mutex::new(HashMap::default()));

/// A memory mock datagram socket, reachable by the address it is bound to
/// from any other `MemorySocket` in the process
///
/// Keeps message boundaries like UDP: one send is one receive, a receive
/// buffer that is too small truncates the datagram, and a full queue drops it.
pub struct MemorySocket {
    local_addr: SocketAddr,
    receiver: AsyncMutex<Receiver<Datagram>>,
}

impl MemorySocket {
    /// Bind to `addr`, port 0 picks a random free port
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let (tx, rx) = channel(QUEUE_SIZE);

        let local_addr = {
            let hub = &mut *MEMORY_HUB.lock();
            let local_addr = if addr.port() == 0 {
                loop {
                    let port: u16 = rand::random();
                    if port == 0 {
                        continue;
                    }
                    let candidate = SocketAddr::new(addr.ip(), port);
                    if !hub.contains_key(&candidate) {
                        break candidate;
                    }
                }
            } else {
                addr
            };
            match hub.entry(local_addr) {
                Entry::Occupied(_) => return Err(io::ErrorKind::AddrInUse.into()),
                Entry::Vacant(inner) => {
                    inner.insert(tx);
                }
            }
            local_addr
        };

        Ok(MemorySocket {
            local_addr,
            receiver: AsyncMutex::new(rx),
        })
    }
}

impl fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut receiver = self.receiver.lock().await;
        match receiver.next().await {
            Some((data, from)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, from))
            }
            None => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        // don't lock too long
        let mut sender = match MEMORY_HUB.lock().get(&target) {
            Some(sender) => sender.clone(),
            None => return Err(io::ErrorKind::ConnectionRefused.into()),
        };

        if let Err(e) = sender.try_send((Bytes::copy_from_slice(buf), self.local_addr)) {
            if e.is_full() {
                debug!("memory socket {} queue full, datagram dropped", target);
            } else {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
        }
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        MEMORY_HUB.lock().remove(&self.local_addr);
    }
}
