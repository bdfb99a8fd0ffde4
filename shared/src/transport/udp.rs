//! Connection-oriented transport over a tokio UDP socket
//!
//! Every datagram starts with one control byte:
//! - `Connect`: client asks to join; answered with `Accept` or `Reject`
//! - `Data`: application payload, handed to the session as a `Receive` event
//! - `Disconnect`: graceful teardown
//! - `Keepalive`: sent to any peer nothing was sent to for a quarter of the
//!   peer timeout, so an idle but live peer is never timed out
//!
//! Peers that stay silent longer than the peer timeout are dropped and
//! reported as `Timeout`. Delivery is best effort regardless of the
//! requested [`Delivery`].

use super::{Delivery, PeerId, Transport, TransportError, TransportEvent, SERVER_PEER};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

/// Default time a connect handshake may take
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a silent peer stays connected
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);
const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Control {
    Connect = 0,
    Accept = 1,
    Reject = 2,
    Data = 3,
    Disconnect = 4,
    Keepalive = 5,
}

impl Control {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Control::Connect),
            1 => Some(Control::Accept),
            2 => Some(Control::Reject),
            3 => Some(Control::Data),
            4 => Some(Control::Disconnect),
            5 => Some(Control::Keepalive),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    last_seen: Instant,
    last_sent: Instant,
}

/// UDP transport usable as either a listening server or a connected client
pub struct UdpTransport {
    socket: UdpSocket,
    peers: HashMap<PeerId, Peer>,
    next_peer_id: PeerId,
    max_peers: usize,
    peer_timeout: Duration,
    pending: VecDeque<TransportEvent>,
    recv_buffer: Vec<u8>,
    send_buffer: Vec<u8>,
}

impl UdpTransport {
    fn with_socket(socket: UdpSocket, max_peers: usize) -> Self {
        Self {
            socket,
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            peer_timeout: PEER_TIMEOUT,
            pending: VecDeque::new(),
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
            send_buffer: Vec::with_capacity(RECV_BUFFER_SIZE),
        }
    }

    /// Binds a listening transport accepting up to `max_peers` connections
    pub async fn bind(addr: &str, max_peers: usize) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Self::with_socket(socket, max_peers))
    }

    /// Connects to a listening transport, retrying the handshake until `connect_timeout`
    ///
    /// On success the server is registered as [`SERVER_PEER`] and a `Connect`
    /// event is queued for the first poll.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let server_addr = lookup_host(addr)
            .await?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, format!("no address for {addr}")))?;

        let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        let mut transport = Self::with_socket(socket, 0);

        let deadline = Instant::now() + connect_timeout;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::ConnectTimeout(server_addr));
            }

            transport
                .socket
                .send_to(&[Control::Connect as u8], server_addr)
                .await?;

            let wait = CONNECT_RETRY_INTERVAL.min(deadline - now);
            let (len, from) = match timeout(wait, transport.socket.recv_from(&mut buffer)).await {
                Ok(received) => received?,
                Err(_) => {
                    debug!("No answer from {} yet, retrying", server_addr);
                    continue;
                }
            };

            if from != server_addr || len == 0 {
                continue;
            }

            match Control::from_byte(buffer[0]) {
                Some(Control::Accept) => {}
                Some(Control::Data) => {
                    // Data overtook the accept; the connection is evidently established
                    transport
                        .pending
                        .push_back(TransportEvent::Receive(SERVER_PEER, buffer[1..len].to_vec()));
                }
                Some(Control::Reject) => return Err(TransportError::Rejected(server_addr)),
                _ => continue,
            }

            transport.peers.insert(
                SERVER_PEER,
                Peer {
                    addr: server_addr,
                    last_seen: Instant::now(),
                    last_sent: Instant::now(),
                },
            );
            transport
                .pending
                .push_front(TransportEvent::Connect(SERVER_PEER));
            info!("Connected to {}", server_addr);
            return Ok(transport);
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Overrides how long a silent peer stays connected
    pub fn set_peer_timeout(&mut self, peer_timeout: Duration) {
        self.peer_timeout = peer_timeout;
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    fn send_control(&self, control: Control, addr: SocketAddr) {
        match self.socket.try_send_to(&[control as u8], addr) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                warn!("Socket busy, dropped {:?} to {}", control, addr);
            }
            Err(e) => error!("Failed to send {:?} to {}: {}", control, addr, e),
        }
    }

    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        let Some((&control, payload)) = data.split_first() else {
            return;
        };

        let known = self.find_peer_by_addr(addr);
        if let Some(id) = known {
            if let Some(peer) = self.peers.get_mut(&id) {
                peer.last_seen = Instant::now();
            }
        }

        match (Control::from_byte(control), known) {
            (Some(Control::Connect), Some(_)) => {
                // Our accept was lost; the peer is retrying
                self.send_control(Control::Accept, addr);
            }
            (Some(Control::Connect), None) => {
                if self.peers.len() >= self.max_peers {
                    warn!("Rejecting {}: at capacity ({})", addr, self.max_peers);
                    self.send_control(Control::Reject, addr);
                    return;
                }

                let id = self.next_peer_id;
                self.next_peer_id += 1;
                self.peers.insert(
                    id,
                    Peer {
                        addr,
                        last_seen: Instant::now(),
                        last_sent: Instant::now(),
                    },
                );
                self.send_control(Control::Accept, addr);
                info!("Peer {} connected from {}", id, addr);
                self.pending.push_back(TransportEvent::Connect(id));
            }
            (Some(Control::Data), Some(id)) => {
                self.pending
                    .push_back(TransportEvent::Receive(id, payload.to_vec()));
            }
            (Some(Control::Disconnect), Some(id)) => {
                self.peers.remove(&id);
                info!("Peer {} disconnected", id);
                self.pending.push_back(TransportEvent::Disconnect(id));
            }
            (Some(Control::Accept), Some(_)) | (Some(Control::Keepalive), Some(_)) => {}
            (Some(Control::Reject), Some(id)) => {
                self.peers.remove(&id);
                self.pending.push_back(TransportEvent::Disconnect(id));
            }
            (Some(_), None) => {
                debug!("Ignoring datagram from unknown address {}", addr);
            }
            (None, _) => {
                warn!("Unknown control byte {} from {}", control, addr);
            }
        }
    }

    fn send_keepalives(&mut self) {
        let interval = self.peer_timeout / 4;
        let idle: Vec<(PeerId, SocketAddr)> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.last_sent.elapsed() >= interval)
            .map(|(id, peer)| (*id, peer.addr))
            .collect();

        for (id, addr) in idle {
            self.send_control(Control::Keepalive, addr);
            if let Some(peer) = self.peers.get_mut(&id) {
                peer.last_sent = Instant::now();
            }
        }
    }

    fn check_timeouts(&mut self) {
        let peer_timeout = self.peer_timeout;
        let timed_out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.last_seen.elapsed() > peer_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in timed_out {
            self.peers.remove(&id);
            warn!("Peer {} timed out", id);
            self.pending.push_back(TransportEvent::Timeout(id));
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: PeerId, bytes: &[u8], _delivery: Delivery) -> Result<(), TransportError> {
        let addr = match self.peers.get_mut(&peer) {
            Some(p) => {
                p.last_sent = Instant::now();
                p.addr
            }
            None => return Err(TransportError::UnknownPeer(peer)),
        };

        self.send_buffer.clear();
        self.send_buffer.push(Control::Data as u8);
        self.send_buffer.extend_from_slice(bytes);

        match self.socket.try_send_to(&self.send_buffer, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                warn!("Socket busy, dropped {} bytes to peer {}", bytes.len(), peer);
                Ok(())
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        loop {
            match self.socket.try_recv_from(&mut self.recv_buffer) {
                Ok((len, addr)) => {
                    let data = self.recv_buffer[..len].to_vec();
                    self.handle_datagram(&data, addr);
                    if let Some(event) = self.pending.pop_front() {
                        return Some(event);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    break;
                }
            }
        }

        self.service();
        self.check_timeouts();
        self.pending.pop_front()
    }

    fn service(&mut self) {
        self.send_keepalives();
    }

    fn disconnect(&mut self, peer: PeerId) {
        if let Some(removed) = self.peers.remove(&peer) {
            self.send_control(Control::Disconnect, removed.addr);
            self.pending.push_back(TransportEvent::Disconnect(peer));
        }
    }
}
