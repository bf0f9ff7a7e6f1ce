//! Tick-driven UDP networking runtime for games.
//!
//! The runtime turns an unreliable datagram socket into per-connection
//! sequenced, optionally reliable channels, and layers three systems on
//! top: an actor world with stable network identities, a fixed-rate
//! property replication engine, and actor-bound RPC dispatch.
//!
//! Everything runs single-threaded off a host-supplied `tick(dt)`; socket
//! I/O is non-blocking and would-block simply retries next tick.

pub mod actor;
pub mod config;
pub mod connection;
pub mod driver;
pub mod endpoint;
pub mod manager;
pub mod protocol;
pub mod replication;
pub mod rpc;
pub mod stream;
pub mod world;

pub use actor::{Actor, ActorCore, NetId, PropertyKind, PropertyValue, ReplicatedProperty};
pub use config::{NetworkConfig, NetworkMode};
pub use connection::{Connection, ConnectionState, ConnectionStats};
pub use driver::{ConnectionId, DriverEvent, NetDriver, NetError};
pub use endpoint::UdpEndpoint;
pub use manager::NetworkManager;
pub use protocol::{
    Packet, PacketHeader, PacketKind, CONNECTION_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_RELEVANCY_DISTANCE, DEFAULT_SERVER_PORT, DEFAULT_TICK_RATE, HEADER_SIZE,
    MAX_PACKET_SIZE, PACKET_MAGIC,
};
pub use replication::ReplicationManager;
pub use rpc::{RpcHandler, RpcKind, RpcRegistry};
pub use stream::{ByteReader, ByteWriter, WireError};
pub use world::{ActorFactory, World, WorldCommands, WorldError};
