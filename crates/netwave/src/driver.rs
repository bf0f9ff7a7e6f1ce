use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::NetworkMode;
use crate::connection::{Connection, ConnectionState};
use crate::endpoint::UdpEndpoint;
use crate::protocol::{
    Packet, PacketKind, CONNECTION_TIMEOUT_SECS, MAX_PACKETS_PER_TICK, MAX_PACKET_SIZE,
};

/// Stable handle for a peer connection, allocated from 1.
pub type ConnectionId = u32;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("invalid server address `{0}`")]
    InvalidAddress(String),

    #[error("connect is only valid in client mode")]
    NotClient,
}

/// Transport-level notifications drained by the layer above once per tick.
#[derive(Debug)]
pub enum DriverEvent {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
    Packet(ConnectionId, Packet),
}

/// Owns the UDP endpoint and the connection table; runs the handshake,
/// the bounded receive pump, clock advance, flush, and the server-side
/// timeout sweep.
pub struct NetDriver {
    mode: NetworkMode,
    endpoint: Option<UdpEndpoint>,

    connections: HashMap<ConnectionId, Connection>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    next_connection_id: ConnectionId,
    /// The single distinguished peer in client mode.
    server_connection: Option<ConnectionId>,

    max_connections: u32,
    timeout_secs: f32,

    events: VecDeque<DriverEvent>,
}

impl Default for NetDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NetDriver {
    pub fn new() -> Self {
        Self {
            mode: NetworkMode::Standalone,
            endpoint: None,
            connections: HashMap::new(),
            by_addr: HashMap::new(),
            next_connection_id: 1,
            server_connection: None,
            max_connections: 0,
            timeout_secs: CONNECTION_TIMEOUT_SECS,
            events: VecDeque::new(),
        }
    }

    pub fn init_server(
        &mut self,
        bind_addr: &str,
        port: u16,
        max_connections: u32,
    ) -> Result<(), NetError> {
        let endpoint = UdpEndpoint::bind((bind_addr, port))?;
        log::info!("server listening on {}", endpoint.local_addr());

        self.endpoint = Some(endpoint);
        self.mode = NetworkMode::Server;
        self.max_connections = max_connections;
        Ok(())
    }

    pub fn init_client(&mut self) -> Result<(), NetError> {
        let endpoint = UdpEndpoint::bind(("0.0.0.0", 0))?;
        log::info!("client socket bound to {}", endpoint.local_addr());

        self.endpoint = Some(endpoint);
        self.mode = NetworkMode::Client;
        Ok(())
    }

    /// Creates the server connection in `Connecting` and queues a reliable
    /// `ConnectionRequest`. The reply promotes the connection to
    /// `Connected`.
    pub fn connect(&mut self, server_addr: SocketAddr) -> Result<ConnectionId, NetError> {
        if self.mode != NetworkMode::Client {
            return Err(NetError::NotClient);
        }

        let id = self.create_connection(server_addr);
        self.server_connection = Some(id);

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.send(Packet::new(PacketKind::ConnectionRequest), true);
        }

        log::info!("connecting to server {}", server_addr);
        Ok(id)
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    pub fn is_server(&self) -> bool {
        self.mode == NetworkMode::Server
    }

    pub fn is_client(&self) -> bool {
        self.mode == NetworkMode::Client
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|e| e.local_addr())
    }

    pub fn server_connection(&self) -> Option<ConnectionId> {
        self.server_connection
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.state() == ConnectionState::Connected)
            .count()
    }

    /// Ids of peers in `Connected` state.
    pub fn connected_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, c)| c.state() == ConnectionState::Connected)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn take_events(&mut self) -> VecDeque<DriverEvent> {
        std::mem::take(&mut self.events)
    }

    /// One transport pump: receive (bounded), advance connection clocks
    /// (which schedules retransmissions), flush, sweep timeouts.
    pub fn tick(&mut self, dt: f32) {
        if self.endpoint.is_none() {
            return;
        }

        self.receive_packets();

        for conn in self.connections.values_mut() {
            conn.tick(dt);
        }

        self.flush_all();

        if self.mode == NetworkMode::Server {
            self.check_timeouts();
        }
    }

    pub fn send(&mut self, id: ConnectionId, packet: Packet, reliable: bool) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.send(packet, reliable);
        }
    }

    pub fn broadcast(&mut self, packet: &Packet, reliable: bool) {
        for conn in self.connections.values_mut() {
            if conn.state() == ConnectionState::Connected {
                conn.send(packet.clone(), reliable);
            }
        }
    }

    /// Best-effort teardown: one unreliable `Disconnect`, then immediate
    /// removal. Unacked reliables are dropped.
    pub fn disconnect(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get(&id) {
            log::info!("disconnecting {}", conn.addr());
            self.send_raw(Packet::new(PacketKind::Disconnect), conn.addr());
        }
        self.events.push_back(DriverEvent::Disconnected(id));
        self.remove_connection(id);
    }

    pub fn shutdown(&mut self) {
        let addrs: Vec<SocketAddr> = self
            .connections
            .values()
            .filter(|c| c.state() == ConnectionState::Connected)
            .map(|c| c.addr())
            .collect();
        for addr in addrs {
            self.send_raw(Packet::new(PacketKind::Disconnect), addr);
        }

        self.connections.clear();
        self.by_addr.clear();
        self.server_connection = None;
        self.endpoint = None;
        self.mode = NetworkMode::Standalone;
        log::info!("driver shut down");
    }

    fn receive_packets(&mut self) {
        let mut buf = [0u8; MAX_PACKET_SIZE * 2];

        for _ in 0..MAX_PACKETS_PER_TICK {
            let Some(endpoint) = self.endpoint.as_ref() else {
                return;
            };

            let (size, from) = match endpoint.recv_from(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("socket receive error: {}", e);
                    break;
                }
            };

            if size > MAX_PACKET_SIZE {
                log::debug!("dropping oversize datagram ({} bytes) from {}", size, from);
                continue;
            }

            let packet = match Packet::deserialize(&buf[..size]) {
                Ok(packet) => packet,
                Err(e) => {
                    log::debug!("dropping malformed datagram from {}: {}", from, e);
                    continue;
                }
            };

            self.dispatch(packet, from, size);
        }
    }

    pub(crate) fn dispatch(&mut self, packet: Packet, from: SocketAddr, size: usize) {
        let Some(kind) = packet.kind() else {
            log::debug!(
                "dropping packet of unknown kind {} from {}",
                packet.header.kind,
                from
            );
            return;
        };

        match kind {
            PacketKind::ConnectionRequest => {
                if self.mode == NetworkMode::Server {
                    self.handle_connection_request(&packet, from);
                }
            }
            PacketKind::ConnectionAccept => {
                if self.mode == NetworkMode::Client {
                    self.handle_connection_accept(&packet, from);
                }
            }
            PacketKind::ConnectionDenied => {
                if self.mode == NetworkMode::Client {
                    log::warn!("connection denied by {}", from);
                    if let Some(id) = self.server_connection {
                        self.events.push_back(DriverEvent::Disconnected(id));
                        self.remove_connection(id);
                    }
                }
            }
            PacketKind::Disconnect => {
                if let Some(&id) = self.by_addr.get(&from) {
                    log::info!("peer disconnected: {}", from);
                    self.events.push_back(DriverEvent::Disconnected(id));
                    self.remove_connection(id);
                }
            }
            _ => {
                if let Some(&id) = self.by_addr.get(&from) {
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.note_bytes_received(size);
                        conn.receive(&packet);
                        self.events.push_back(DriverEvent::Packet(id, packet));
                    }
                } else {
                    log::debug!("dropping packet from unknown peer {}", from);
                }
            }
        }
    }

    fn handle_connection_request(&mut self, packet: &Packet, from: SocketAddr) {
        if let Some(&id) = self.by_addr.get(&from) {
            // Duplicate request: our accept (or its ack) was lost. Re-ack so
            // the peer stops retransmitting, but create no new state.
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.receive(packet);
            }
            return;
        }

        if self.connections.len() >= self.max_connections as usize {
            log::info!("connection denied (at capacity): {}", from);
            self.send_raw(Packet::new(PacketKind::ConnectionDenied), from);
            return;
        }

        let id = self.create_connection(from);
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.receive(packet);
            conn.set_state(ConnectionState::Connected);
            conn.send(Packet::new(PacketKind::ConnectionAccept), true);
        }

        log::info!("client connected: {}", from);
        self.events.push_back(DriverEvent::Connected(id));
    }

    fn handle_connection_accept(&mut self, packet: &Packet, from: SocketAddr) {
        let Some(id) = self.server_connection else {
            return;
        };

        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if conn.addr() != from {
            log::debug!("connection accept from unexpected peer {}", from);
            return;
        }

        conn.receive(packet);
        if conn.state() != ConnectionState::Connected {
            conn.set_state(ConnectionState::Connected);
            log::info!("connected to server {}", from);
            self.events.push_back(DriverEvent::Connected(id));
        }
    }

    fn flush_all(&mut self) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return;
        };

        for conn in self.connections.values_mut() {
            if let Err(e) = conn.flush(endpoint) {
                log::warn!("flush to {} failed: {}", conn.addr(), e);
            }
        }
    }

    fn check_timeouts(&mut self) {
        let timed_out: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.is_timed_out(self.timeout_secs))
            .map(|(&id, _)| id)
            .collect();

        for id in timed_out {
            if let Some(conn) = self.connections.get(&id) {
                log::info!("connection timed out: {}", conn.addr());
            }
            self.disconnect(id);
        }
    }

    /// Sends a standalone packet outside any connection's sequencing.
    /// Used for replies to peers we refuse to track and for teardown.
    fn send_raw(&self, packet: Packet, addr: SocketAddr) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return;
        };
        match packet.serialize() {
            Ok(data) => {
                if let Err(e) = endpoint.send_to(&data, addr) {
                    log::debug!("raw send to {} failed: {}", addr, e);
                }
            }
            Err(e) => log::warn!("failed to serialize raw packet: {}", e),
        }
    }

    fn create_connection(&mut self, addr: SocketAddr) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        self.connections.insert(id, Connection::new(addr));
        self.by_addr.insert(addr, id);
        id
    }

    fn remove_connection(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.remove(&id) {
            self.by_addr.remove(&conn.addr());
        }
        if self.server_connection == Some(id) {
            self.server_connection = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_driver(max_connections: u32) -> NetDriver {
        let mut driver = NetDriver::new();
        driver.init_server("127.0.0.1", 0, max_connections).unwrap();
        driver
    }

    fn request_from(addr: &str) -> (Packet, SocketAddr) {
        (Packet::new(PacketKind::ConnectionRequest), addr.parse().unwrap())
    }

    #[test]
    fn test_server_accepts_connection_request() {
        let mut driver = server_driver(4);
        let (packet, from) = request_from("127.0.0.1:50001");

        driver.dispatch(packet, from, 12);

        assert_eq!(driver.connection_count(), 1);
        assert_eq!(driver.connected_count(), 1);

        let events = driver.take_events();
        assert!(matches!(events.front(), Some(DriverEvent::Connected(_))));

        let id = driver.connected_ids()[0];
        let conn = driver.connection(id).unwrap();
        // Ack for the request plus the reliable accept.
        assert_eq!(conn.outgoing_len(), 2);
        assert_eq!(conn.retained_count(), 1);
    }

    #[test]
    fn test_duplicate_request_creates_no_state() {
        let mut driver = server_driver(4);
        let (packet, from) = request_from("127.0.0.1:50002");

        driver.dispatch(packet.clone(), from, 12);
        driver.take_events();
        driver.dispatch(packet, from, 12);

        assert_eq!(driver.connection_count(), 1);
        assert!(driver.take_events().is_empty());
    }

    #[test]
    fn test_capacity_refusal() {
        let mut driver = server_driver(1);
        let (first, from_a) = request_from("127.0.0.1:50003");
        let (second, from_b) = request_from("127.0.0.1:50004");

        driver.dispatch(first, from_a, 12);
        driver.dispatch(second, from_b, 12);

        assert_eq!(driver.connection_count(), 1);
        let events = driver.take_events();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_timeout_sweep_disconnects_once() {
        let mut driver = server_driver(4);
        let (packet, from) = request_from("127.0.0.1:50005");
        driver.dispatch(packet, from, 12);
        driver.take_events();

        for _ in 0..7 {
            driver.tick(5.0);
        }

        assert_eq!(driver.connection_count(), 0);
        let disconnects = driver
            .take_events()
            .iter()
            .filter(|e| matches!(e, DriverEvent::Disconnected(_)))
            .count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn test_unknown_peer_payload_dropped() {
        let mut driver = server_driver(4);
        let packet = Packet::new(PacketKind::ActorReplication);

        driver.dispatch(packet, "127.0.0.1:50006".parse().unwrap(), 12);

        assert_eq!(driver.connection_count(), 0);
        assert!(driver.take_events().is_empty());
    }

    #[test]
    fn test_broadcast_skips_unconnected() {
        let mut driver = server_driver(4);
        let (packet, from) = request_from("127.0.0.1:50007");
        driver.dispatch(packet, from, 12);

        let id = driver.connected_ids()[0];
        driver
            .connection_mut(id)
            .unwrap()
            .set_state(ConnectionState::Connecting);

        let before = driver.connection(id).unwrap().outgoing_len();
        driver.broadcast(&Packet::new(PacketKind::Heartbeat), false);
        assert_eq!(driver.connection(id).unwrap().outgoing_len(), before);
    }
}
