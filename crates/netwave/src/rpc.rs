use std::collections::HashMap;

use crate::actor::{Actor, NetId};
use crate::driver::{ConnectionId, NetDriver};
use crate::protocol::{Packet, PacketKind};
use crate::stream::{ByteReader, ByteWriter, WireError};
use crate::world::World;

/// Declared directionality of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcKind {
    /// Client asks the server to run it.
    Server,
    /// Server runs it on one specific client.
    Client,
    /// Server runs it on every connected client.
    Multicast,
}

impl RpcKind {
    fn packet_kind(self) -> PacketKind {
        match self {
            Self::Server => PacketKind::RpcServer,
            Self::Client => PacketKind::RpcClient,
            Self::Multicast => PacketKind::RpcMulticast,
        }
    }
}

pub type RpcHandler = Box<dyn FnMut(&mut dyn Actor, &mut ByteReader<'_>)>;

struct RpcEntry {
    kind: RpcKind,
    handler: RpcHandler,
}

/// Name-keyed RPC registry plus the three invocation paths. All RPC
/// traffic rides the reliable channel, so calls ordered after a
/// replication update arrive after it.
#[derive(Default)]
pub struct RpcRegistry {
    handlers: HashMap<String, RpcEntry>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Names are global; re-registering replaces the
    /// previous handler.
    pub fn register<F>(&mut self, name: &str, kind: RpcKind, handler: F)
    where
        F: FnMut(&mut dyn Actor, &mut ByteReader<'_>) + 'static,
    {
        if self
            .handlers
            .insert(
                name.to_string(),
                RpcEntry {
                    kind,
                    handler: Box::new(handler),
                },
            )
            .is_some()
        {
            log::warn!("rpc `{}` re-registered", name);
        } else {
            log::debug!("registered rpc `{}` ({:?})", name, kind);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Client-side: invoke a server RPC through the server connection.
    pub fn call_server(
        &self,
        driver: &mut NetDriver,
        actor_net_id: NetId,
        name: &str,
        params: &[u8],
    ) {
        if !driver.is_client() {
            log::warn!("server rpc `{}` can only be called from a client", name);
            return;
        }
        let Some(server) = driver.server_connection() else {
            log::warn!("server rpc `{}` dropped: not connected", name);
            return;
        };
        driver.send(server, encode_rpc(PacketKind::RpcServer, actor_net_id, name, params), true);
    }

    /// Server-side: invoke a client RPC on one peer.
    pub fn call_client(
        &self,
        driver: &mut NetDriver,
        target: ConnectionId,
        actor_net_id: NetId,
        name: &str,
        params: &[u8],
    ) {
        if !driver.is_server() {
            log::warn!("client rpc `{}` can only be called from the server", name);
            return;
        }
        driver.send(target, encode_rpc(PacketKind::RpcClient, actor_net_id, name, params), true);
    }

    /// Server-side: invoke a multicast RPC on every connected peer.
    pub fn call_multicast(
        &self,
        driver: &mut NetDriver,
        actor_net_id: NetId,
        name: &str,
        params: &[u8],
    ) {
        if !driver.is_server() {
            log::warn!("multicast rpc `{}` can only be called from the server", name);
            return;
        }
        let packet = encode_rpc(PacketKind::RpcMulticast, actor_net_id, name, params);
        driver.broadcast(&packet, true);
    }

    /// Receive-side routing: resolve the actor, resolve the handler,
    /// verify the packet kind matches the declared kind, then invoke with
    /// a view over the remaining parameter bytes. Every failure drops the
    /// call without invoking anything.
    pub fn dispatch(
        &mut self,
        packet_kind: PacketKind,
        packet: &Packet,
        world: &mut World,
    ) -> Result<(), WireError> {
        let mut reader = packet.reader();
        let actor_net_id = reader.read_u32()?;
        let name = reader.read_string()?;

        let Some(actor) = world.actor_mut(actor_net_id) else {
            log::debug!("rpc `{}` references unknown actor {}", name, actor_net_id);
            return Ok(());
        };

        let Some(entry) = self.handlers.get_mut(&name) else {
            log::warn!("rpc `{}` is not registered", name);
            return Ok(());
        };

        if entry.kind.packet_kind() != packet_kind {
            log::warn!(
                "rpc `{}` kind mismatch: declared {:?}, packet {:?}",
                name,
                entry.kind,
                packet_kind
            );
            return Ok(());
        }

        let mut params = ByteReader::new(reader.rest());
        (entry.handler)(actor, &mut params);
        Ok(())
    }
}

fn encode_rpc(kind: PacketKind, actor_net_id: NetId, name: &str, params: &[u8]) -> Packet {
    let mut writer = ByteWriter::new();
    writer.write_u32(actor_net_id);
    writer.write_str(name);
    writer.write_bytes(params);
    Packet::with_payload(kind, writer.into_bytes())
}
