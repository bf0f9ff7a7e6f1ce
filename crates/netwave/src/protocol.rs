use crate::stream::{ByteReader, ByteWriter, WireError};

/// "WVNE" in ASCII. Fixed for the lifetime of the protocol.
pub const PACKET_MAGIC: u32 = 0x57564E45;
/// Maximum on-wire datagram size in bytes, header included.
pub const MAX_PACKET_SIZE: usize = 1024;
/// Header size in bytes (u32 magic + u32 sequence + u16 kind + u16 size).
pub const HEADER_SIZE: usize = 12;

pub const DEFAULT_SERVER_PORT: u16 = 7777;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 64;
pub const DEFAULT_TICK_RATE: f32 = 30.0;
pub const DEFAULT_RELEVANCY_DISTANCE: f32 = 10000.0;
/// Server drops a peer after this many seconds without traffic.
pub const CONNECTION_TIMEOUT_SECS: f32 = 30.0;
/// Receive pump bound per tick, to avoid starving the rest of the frame.
pub const MAX_PACKETS_PER_TICK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketKind {
    // Connection management
    ConnectionRequest = 0,
    ConnectionAccept = 1,
    ConnectionDenied = 2,
    Disconnect = 3,

    // Reliability
    Acknowledgement = 10,
    Heartbeat = 11,

    // Actor replication
    ActorSpawn = 20,
    ActorDestroy = 21,
    ActorReplication = 22,

    // RPC
    RpcServer = 30,
    RpcClient = 31,
    RpcMulticast = 32,

    // Control (reserved)
    TimeSync = 100,
}

impl PacketKind {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::ConnectionRequest),
            1 => Some(Self::ConnectionAccept),
            2 => Some(Self::ConnectionDenied),
            3 => Some(Self::Disconnect),
            10 => Some(Self::Acknowledgement),
            11 => Some(Self::Heartbeat),
            20 => Some(Self::ActorSpawn),
            21 => Some(Self::ActorDestroy),
            22 => Some(Self::ActorReplication),
            30 => Some(Self::RpcServer),
            31 => Some(Self::RpcClient),
            32 => Some(Self::RpcMulticast),
            100 => Some(Self::TimeSync),
            _ => None,
        }
    }
}

/// Fixed 12-byte header carried by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub sequence: u32,
    pub kind: u16,
    pub payload_size: u16,
}

impl PacketHeader {
    pub fn new(kind: PacketKind) -> Self {
        Self {
            magic: PACKET_MAGIC,
            sequence: 0,
            kind: kind as u16,
            payload_size: 0,
        }
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.magic);
        writer.write_u32(self.sequence);
        writer.write_u16(self.kind);
        writer.write_u16(self.payload_size);
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        let magic = reader.read_u32()?;
        if magic != PACKET_MAGIC {
            return Err(WireError::BadMagic { found: magic });
        }
        Ok(Self {
            magic,
            sequence: reader.read_u32()?,
            kind: reader.read_u16()?,
            payload_size: reader.read_u16()?,
        })
    }
}

/// A framed packet: header plus an opaque payload read through the codec.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind) -> Self {
        Self {
            header: PacketHeader::new(kind),
            payload: Vec::new(),
        }
    }

    pub fn with_payload(kind: PacketKind, payload: Vec<u8>) -> Self {
        let mut header = PacketHeader::new(kind);
        header.payload_size = payload.len() as u16;
        Self { header, payload }
    }

    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::from_u16(self.header.kind)
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn set_sequence(&mut self, sequence: u32) {
        self.header.sequence = sequence;
    }

    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.payload)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        let total = HEADER_SIZE + self.payload.len();
        if total > MAX_PACKET_SIZE {
            return Err(WireError::PayloadTooLarge {
                size: total,
                max: MAX_PACKET_SIZE,
            });
        }

        let mut writer = ByteWriter::with_capacity(total);
        let mut header = self.header;
        header.payload_size = self.payload.len() as u16;
        header.encode(&mut writer);
        writer.write_bytes(&self.payload);
        Ok(writer.into_bytes())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, WireError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(WireError::PayloadTooLarge {
                size: data.len(),
                max: MAX_PACKET_SIZE,
            });
        }

        let mut reader = ByteReader::new(data);
        let header = PacketHeader::decode(&mut reader)?;

        let declared = header.payload_size as usize;
        if declared > reader.remaining() {
            return Err(WireError::ShortPayload {
                declared,
                available: reader.remaining(),
            });
        }

        let payload = reader.read_bytes(declared)?.to_vec();
        Ok(Self { header, payload })
    }
}
