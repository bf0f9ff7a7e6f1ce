use std::net::{SocketAddr, ToSocketAddrs};

use crate::config::{NetworkConfig, NetworkMode};
use crate::driver::{ConnectionId, DriverEvent, NetDriver, NetError};
use crate::protocol::{Packet, PacketKind};
use crate::replication::ReplicationManager;
use crate::rpc::RpcRegistry;
use crate::world::World;

/// Composes the driver, world, replication engine, and RPC registry into
/// one tick-driven runtime. Everything is an explicit owned value; there
/// are no process-wide singletons.
pub struct NetworkManager {
    config: NetworkConfig,
    driver: NetDriver,
    world: World,
    replication: ReplicationManager,
    rpc: RpcRegistry,
}

impl NetworkManager {
    /// Builds and initializes the runtime for the configured mode. Only
    /// socket setup can fail; everything else is handled locally at
    /// runtime.
    pub fn new(config: NetworkConfig) -> Result<Self, NetError> {
        let mut driver = NetDriver::new();

        match config.mode {
            NetworkMode::Server => {
                driver.init_server("0.0.0.0", config.server_port, config.max_connections)?;
            }
            NetworkMode::Client => {
                driver.init_client()?;
                let addr = resolve(&config.server_address, config.server_port)?;
                driver.connect(addr)?;
            }
            NetworkMode::Standalone => {}
        }

        let replication = ReplicationManager::new(
            config.replication_rate(),
            config.enable_relevancy,
            config.relevancy_distance,
        );

        Ok(Self {
            config,
            driver,
            world: World::new(),
            replication,
            rpc: RpcRegistry::new(),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn is_server(&self) -> bool {
        self.driver.is_server()
    }

    pub fn is_client(&self) -> bool {
        self.driver.is_client()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn driver(&self) -> &NetDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut NetDriver {
        &mut self.driver
    }

    pub fn rpc_mut(&mut self) -> &mut RpcRegistry {
        &mut self.rpc
    }

    pub fn replication_mut(&mut self) -> &mut ReplicationManager {
        &mut self.replication
    }

    pub fn register_actor_type(
        &mut self,
        type_name: &'static str,
        factory: crate::world::ActorFactory,
    ) {
        self.world.register_actor_type(type_name, factory);
    }

    /// Client-side convenience: invoke a server RPC on an actor.
    pub fn call_server_rpc(&mut self, actor_net_id: u32, name: &str, params: &[u8]) {
        self.rpc
            .call_server(&mut self.driver, actor_net_id, name, params);
    }

    /// Server-side convenience: invoke a client RPC on one peer.
    pub fn call_client_rpc(
        &mut self,
        target: ConnectionId,
        actor_net_id: u32,
        name: &str,
        params: &[u8],
    ) {
        self.rpc
            .call_client(&mut self.driver, target, actor_net_id, name, params);
    }

    /// Server-side convenience: invoke a multicast RPC on all peers.
    pub fn call_multicast_rpc(&mut self, actor_net_id: u32, name: &str, params: &[u8]) {
        self.rpc
            .call_multicast(&mut self.driver, actor_net_id, name, params);
    }

    /// One frame of the runtime: advance the world, pump the transport,
    /// route what arrived, then let replication emit its burst. The burst
    /// is flushed by the next tick's transport pump.
    pub fn tick(&mut self, dt: f32) {
        self.world.tick(dt);
        self.driver.tick(dt);

        for event in self.driver.take_events() {
            match event {
                DriverEvent::Connected(id) => {
                    log::info!("connection {} is up", id);
                }
                DriverEvent::Disconnected(id) => {
                    log::info!("connection {} is gone", id);
                    self.replication.drop_connection(id);
                }
                DriverEvent::Packet(id, packet) => self.route_packet(id, packet),
            }
        }

        self.replication
            .tick(dt, &mut self.driver, &mut self.world);
    }

    /// Best-effort disconnect notifications, then full teardown.
    pub fn shutdown(&mut self) {
        self.driver.shutdown();
        self.world.clear();
    }

    fn route_packet(&mut self, from: ConnectionId, packet: Packet) {
        let Some(kind) = packet.kind() else {
            return;
        };

        match kind {
            PacketKind::ActorSpawn | PacketKind::ActorDestroy | PacketKind::ActorReplication => {
                // Replication flows server -> client only.
                if self.driver.is_server() {
                    log::debug!("ignoring replication packet from connection {}", from);
                    return;
                }
                if let Err(e) = self.replication.apply_packet(kind, &packet, &mut self.world) {
                    log::warn!("malformed replication packet from {}: {}", from, e);
                }
            }
            PacketKind::RpcServer => {
                if !self.driver.is_server() {
                    log::debug!("ignoring server rpc on a non-server peer");
                    return;
                }
                if let Err(e) = self.rpc.dispatch(kind, &packet, &mut self.world) {
                    log::warn!("malformed rpc packet from {}: {}", from, e);
                }
            }
            PacketKind::RpcClient | PacketKind::RpcMulticast => {
                if !self.driver.is_client() {
                    log::debug!("ignoring client rpc on a non-client peer");
                    return;
                }
                if let Err(e) = self.rpc.dispatch(kind, &packet, &mut self.world) {
                    log::warn!("malformed rpc packet from {}: {}", from, e);
                }
            }
            // Acks and heartbeats are consumed by the connection layer;
            // TimeSync is reserved.
            PacketKind::Acknowledgement | PacketKind::Heartbeat | PacketKind::TimeSync => {}
            _ => {}
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| NetError::InvalidAddress(format!("{}:{}", host, port)))?
        .next()
        .ok_or_else(|| NetError::InvalidAddress(format!("{}:{}", host, port)))
}
