use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::SocketAddr;

use crate::actor::NetId;
use crate::endpoint::UdpEndpoint;
use crate::protocol::{Packet, PacketKind};
use crate::stream::ByteWriter;

/// Floor for the retransmission timer before an RTT estimate exists.
const RETRANSMIT_FLOOR_SECS: f32 = 0.2;
const RETRANSMIT_CEIL_SECS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_retransmitted: u64,
}

/// A reliable packet held until its sequence is acknowledged.
///
/// `send_time` is the first transmission and feeds the RTT estimate;
/// `last_send_time` moves forward on every retransmission.
#[derive(Debug, Clone)]
struct RetainedPacket {
    packet: Packet,
    send_time: f32,
    last_send_time: f32,
}

/// Per-peer sequencing, reliability, and activity bookkeeping.
///
/// Time is a plain `f32` accumulator advanced by the host tick, so timeout
/// and retransmission behavior follows simulated time rather than the wall
/// clock.
#[derive(Debug)]
pub struct Connection {
    addr: SocketAddr,
    state: ConnectionState,

    send_sequence: u32,
    remote_sequence: u32,

    retained: BTreeMap<u32, RetainedPacket>,
    outgoing: VecDeque<Packet>,

    rtt: f32,
    last_send_time: f32,
    last_receive_time: f32,
    current_time: f32,

    /// The peer's avatar actor, if the application has assigned one.
    user_tag: Option<NetId>,

    stats: ConnectionStats,
}

impl Connection {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: ConnectionState::Connecting,
            send_sequence: 0,
            remote_sequence: 0,
            retained: BTreeMap::new(),
            outgoing: VecDeque::new(),
            rtt: 0.0,
            last_send_time: 0.0,
            last_receive_time: 0.0,
            current_time: 0.0,
            user_tag: None,
            stats: ConnectionStats::default(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn rtt(&self) -> f32 {
        self.rtt
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn remote_sequence(&self) -> u32 {
        self.remote_sequence
    }

    pub fn user_tag(&self) -> Option<NetId> {
        self.user_tag
    }

    pub fn set_user_tag(&mut self, tag: Option<NetId>) {
        self.user_tag = tag;
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    pub fn is_retained(&self, sequence: u32) -> bool {
        self.retained.contains_key(&sequence)
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Packets queued but not yet flushed, oldest first.
    pub fn queued_packets(&self) -> impl Iterator<Item = &Packet> {
        self.outgoing.iter()
    }

    pub fn time_since_last_receive(&self) -> f32 {
        self.current_time - self.last_receive_time
    }

    pub fn is_timed_out(&self, timeout: f32) -> bool {
        self.time_since_last_receive() > timeout
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    /// Stamps the next outgoing sequence and queues the packet. A reliable
    /// packet is copied into the retention map before it can leave the
    /// queue, so the retention invariant holds even mid-flush.
    pub fn send(&mut self, mut packet: Packet, reliable: bool) {
        let sequence = self.next_sequence();
        packet.set_sequence(sequence);

        if reliable {
            self.retained.insert(
                sequence,
                RetainedPacket {
                    packet: packet.clone(),
                    send_time: self.current_time,
                    last_send_time: self.current_time,
                },
            );
        }

        self.outgoing.push_back(packet);
    }

    /// Updates activity and sequence bookkeeping for an inbound packet,
    /// acknowledges it if the peer expects one, and consumes any
    /// acknowledgement it carries.
    pub fn receive(&mut self, packet: &Packet) {
        self.last_receive_time = self.current_time;
        self.stats.packets_received += 1;

        let sequence = packet.sequence();
        if sequence > self.remote_sequence {
            self.remote_sequence = sequence;
        }

        match packet.kind() {
            Some(PacketKind::Acknowledgement) => self.process_acknowledgement(packet),
            Some(PacketKind::Heartbeat) => {}
            _ => self.send_acknowledgement(sequence),
        }
    }

    fn process_acknowledgement(&mut self, packet: &Packet) {
        let mut reader = packet.reader();
        let Ok(acked) = reader.read_u32() else {
            log::debug!("dropping acknowledgement with truncated payload from {}", self.addr);
            return;
        };

        if let Some(retained) = self.retained.remove(&acked) {
            let sample = self.current_time - retained.send_time;
            self.rtt = self.rtt * 0.9 + sample * 0.1;
        }
    }

    fn send_acknowledgement(&mut self, sequence: u32) {
        let mut writer = ByteWriter::with_capacity(4);
        writer.write_u32(sequence);
        let ack = Packet::with_payload(PacketKind::Acknowledgement, writer.into_bytes());
        self.send(ack, false);
    }

    fn retransmit_timeout(&self) -> f32 {
        if self.rtt > 0.0 {
            (self.rtt * 1.5).clamp(RETRANSMIT_FLOOR_SECS, RETRANSMIT_CEIL_SECS)
        } else {
            RETRANSMIT_FLOOR_SECS
        }
    }

    /// Advances the connection clock and re-enqueues unacked reliables
    /// whose retransmission timer has elapsed. Retransmissions keep their
    /// original sequence so a late ack still clears them.
    pub fn tick(&mut self, dt: f32) {
        self.current_time += dt;

        let timeout = self.retransmit_timeout();
        let now = self.current_time;

        let mut resends = Vec::new();
        for (&sequence, retained) in &mut self.retained {
            if now - retained.last_send_time > timeout {
                retained.last_send_time = now;
                resends.push(sequence);
            }
        }

        for sequence in resends {
            if let Some(retained) = self.retained.get(&sequence) {
                self.outgoing.push_back(retained.packet.clone());
                self.stats.packets_retransmitted += 1;
            }
        }
    }

    /// Drains the outgoing queue onto the socket. Stops on would-block and
    /// keeps the head of the queue for the next tick.
    pub fn flush(&mut self, endpoint: &UdpEndpoint) -> io::Result<()> {
        while let Some(packet) = self.outgoing.front() {
            let data = match packet.serialize() {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("dropping unserializable packet to {}: {}", self.addr, e);
                    self.outgoing.pop_front();
                    continue;
                }
            };

            match endpoint.send_to(&data, self.addr)? {
                Some(sent) => {
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += sent as u64;
                    self.last_send_time = self.current_time;
                    self.outgoing.pop_front();
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Tears down local reliability state. Anything unacked is gone; the
    /// peer discovers the loss through its own timeout.
    pub fn drop_pending(&mut self) {
        self.retained.clear();
        self.outgoing.clear();
    }

    pub(crate) fn note_bytes_received(&mut self, bytes: usize) {
        self.stats.bytes_received += bytes as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    fn heartbeat() -> Packet {
        Packet::new(PacketKind::Heartbeat)
    }

    #[test]
    fn test_sequences_start_at_zero() {
        let mut conn = Connection::new(test_addr());
        conn.send(heartbeat(), false);
        conn.send(heartbeat(), false);
        conn.send(heartbeat(), false);

        let sequences: Vec<u32> = conn.outgoing.iter().map(|p| p.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_reliable_packet_retained_until_ack() {
        let mut conn = Connection::new(test_addr());
        conn.send(Packet::new(PacketKind::ConnectionAccept), true);
        assert!(conn.is_retained(0));

        let mut writer = ByteWriter::new();
        writer.write_u32(0);
        let mut ack = Packet::with_payload(PacketKind::Acknowledgement, writer.into_bytes());
        ack.set_sequence(0);

        conn.receive(&ack);
        assert!(!conn.is_retained(0));
        assert_eq!(conn.retained_count(), 0);
    }

    #[test]
    fn test_unreliable_packet_not_retained() {
        let mut conn = Connection::new(test_addr());
        conn.send(heartbeat(), false);
        assert_eq!(conn.retained_count(), 0);
    }

    #[test]
    fn test_receive_enqueues_ack() {
        let mut conn = Connection::new(test_addr());
        let mut incoming = Packet::new(PacketKind::ActorReplication);
        incoming.set_sequence(5);

        conn.receive(&incoming);

        assert_eq!(conn.outgoing_len(), 1);
        let ack = conn.outgoing.front().unwrap();
        assert_eq!(ack.kind(), Some(PacketKind::Acknowledgement));
        assert_eq!(ack.reader().read_u32().unwrap(), 5);
        assert_eq!(conn.remote_sequence(), 5);
    }

    #[test]
    fn test_ack_and_heartbeat_not_acked() {
        let mut conn = Connection::new(test_addr());

        let mut writer = ByteWriter::new();
        writer.write_u32(77);
        let ack = Packet::with_payload(PacketKind::Acknowledgement, writer.into_bytes());
        conn.receive(&ack);
        conn.receive(&heartbeat());

        assert_eq!(conn.outgoing_len(), 0);
    }

    #[test]
    fn test_rtt_uses_send_time_of_acked_packet() {
        let mut conn = Connection::new(test_addr());
        conn.send(Packet::new(PacketKind::ActorSpawn), true);

        // Unrelated later traffic must not skew the sample.
        conn.tick(0.05);
        conn.send(heartbeat(), false);
        conn.tick(0.05);

        let mut writer = ByteWriter::new();
        writer.write_u32(0);
        let ack = Packet::with_payload(PacketKind::Acknowledgement, writer.into_bytes());
        conn.receive(&ack);

        // Sample is 0.1s since the spawn was sent at t=0; EMA from zero.
        assert!((conn.rtt() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_retransmit_after_timeout() {
        let mut conn = Connection::new(test_addr());
        conn.send(Packet::new(PacketKind::ActorSpawn), true);
        let queued = conn.outgoing_len();

        conn.tick(0.1);
        assert_eq!(conn.outgoing_len(), queued, "too early to retransmit");

        conn.tick(0.15);
        assert_eq!(conn.outgoing_len(), queued + 1);

        let resent = conn.outgoing.back().unwrap();
        assert_eq!(resent.sequence(), 0, "retransmission keeps its sequence");
        assert_eq!(conn.stats().packets_retransmitted, 1);
    }

    #[test]
    fn test_no_retransmit_after_ack() {
        let mut conn = Connection::new(test_addr());
        conn.send(Packet::new(PacketKind::ActorSpawn), true);

        let mut writer = ByteWriter::new();
        writer.write_u32(0);
        let ack = Packet::with_payload(PacketKind::Acknowledgement, writer.into_bytes());
        conn.receive(&ack);

        let queued = conn.outgoing_len();
        conn.tick(5.0);
        assert_eq!(conn.outgoing_len(), queued);
    }

    #[test]
    fn test_timeout_follows_simulated_time() {
        let mut conn = Connection::new(test_addr());
        conn.tick(10.0);
        assert!(!conn.is_timed_out(30.0));

        conn.receive(&heartbeat());
        conn.tick(29.0);
        assert!(!conn.is_timed_out(30.0));

        conn.tick(2.0);
        assert!(conn.is_timed_out(30.0));
    }
}
