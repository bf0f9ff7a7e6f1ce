use std::collections::HashMap;

use crate::actor::{Actor, NetId, PropertyKind, PropertyValue};
use crate::driver::{ConnectionId, NetDriver};
use crate::protocol::{Packet, PacketKind, DEFAULT_TICK_RATE};
use crate::stream::{ByteWriter, WireError};
use crate::world::World;

/// Per-(peer, actor) bookkeeping. Lives until the connection drops or the
/// actor leaves relevance.
#[derive(Debug, Default, Clone)]
struct ReplicationState {
    spawned: bool,
    last_replication_time: f32,
}

/// Server-side replication scheduler and the shared receive-side apply
/// path. Bursts run at a fixed rate independent of the host frame rate;
/// drift is bounded to one interval because the accumulator zeroes after
/// each burst.
pub struct ReplicationManager {
    interval: f32,
    accumulator: f32,
    clock: f32,
    enable_relevancy: bool,
    relevancy_distance: f32,
    states: HashMap<ConnectionId, HashMap<NetId, ReplicationState>>,
}

impl ReplicationManager {
    pub fn new(tick_rate: f32, enable_relevancy: bool, relevancy_distance: f32) -> Self {
        let rate = if tick_rate > 0.0 {
            tick_rate
        } else {
            DEFAULT_TICK_RATE
        };
        Self {
            interval: 1.0 / rate,
            accumulator: 0.0,
            clock: 0.0,
            enable_relevancy,
            relevancy_distance,
            states: HashMap::new(),
        }
    }

    pub fn set_tick_rate(&mut self, tick_rate: f32) {
        if tick_rate > 0.0 {
            self.interval = 1.0 / tick_rate;
        }
    }

    pub fn set_relevancy_distance(&mut self, distance: f32) {
        self.relevancy_distance = distance;
    }

    /// Forgets all per-peer state for a dropped connection.
    pub fn drop_connection(&mut self, conn_id: ConnectionId) {
        self.states.remove(&conn_id);
    }

    /// Server pump: notify destroys, then emit a burst when the
    /// accumulator crosses the replication interval.
    pub fn tick(&mut self, dt: f32, driver: &mut NetDriver, world: &mut World) {
        // Drain even when not authoritative so the queue cannot grow
        // without bound on clients.
        let despawned = world.take_despawned();

        if !driver.is_server() {
            return;
        }

        for net_id in despawned {
            self.notify_destroy(net_id, driver);
        }

        self.clock += dt;
        self.accumulator += dt;

        if self.accumulator >= self.interval {
            for conn_id in driver.connected_ids() {
                self.replicate_to(conn_id, driver, world);
            }
            self.accumulator = 0.0;
        }
    }

    fn notify_destroy(&mut self, net_id: NetId, driver: &mut NetDriver) {
        for (&conn_id, states) in self.states.iter_mut() {
            if let Some(state) = states.remove(&net_id) {
                if state.spawned {
                    driver.send(conn_id, destroy_packet(net_id), true);
                }
            }
        }
    }

    fn replicate_to(&mut self, conn_id: ConnectionId, driver: &mut NetDriver, world: &mut World) {
        for net_id in world.net_ids() {
            let Some(actor) = world.actor(net_id) else {
                continue;
            };
            if !actor.core().replicates() {
                continue;
            }

            let relevant = self.is_relevant(actor, conn_id, driver, world);

            let state = self
                .states
                .entry(conn_id)
                .or_default()
                .entry(net_id)
                .or_default();

            let mut just_spawned = false;
            if relevant && !state.spawned {
                driver.send(conn_id, spawn_packet(actor), true);
                state.spawned = true;
                just_spawned = true;
            } else if !relevant {
                // Left relevance: tell the peer and forget the spawn so a
                // return re-sends full state.
                if state.spawned {
                    log::debug!(
                        "actor {} left relevance for connection {} ({:.2}s since last update)",
                        net_id,
                        conn_id,
                        self.clock - state.last_replication_time
                    );
                    driver.send(conn_id, destroy_packet(net_id), true);
                    state.spawned = false;
                }
                continue;
            }

            let Some(actor) = world.actor_mut(net_id) else {
                continue;
            };
            let core = actor.core_mut();

            // A freshly spawned peer needs the whole property image, not
            // just what moved since the last burst to everyone else.
            let to_send: Vec<String> = core
                .properties()
                .filter(|p| just_spawned || p.has_changed())
                .map(|p| p.name().to_string())
                .collect();

            if to_send.is_empty() {
                continue;
            }

            let mut writer = ByteWriter::new();
            writer.write_u32(net_id);
            writer.write_u32(to_send.len() as u32);
            for name in &to_send {
                if let Some(prop) = core.property(name) {
                    prop.encode_entry(&mut writer);
                }
            }

            driver.send(
                conn_id,
                Packet::with_payload(PacketKind::ActorReplication, writer.into_bytes()),
                true,
            );

            for name in &to_send {
                if let Some(prop) = core.property_mut(name) {
                    prop.update_last_value();
                }
            }

            if let Some(state) = self
                .states
                .get_mut(&conn_id)
                .and_then(|peer| peer.get_mut(&net_id))
            {
                state.last_replication_time = self.clock;
            }
        }
    }

    /// Baseline policy is "always relevant". With relevancy enabled the
    /// actor is measured against the peer's tagged avatar; peers without
    /// an avatar (or avatars that vanished) see everything.
    fn is_relevant(
        &self,
        actor: &dyn Actor,
        conn_id: ConnectionId,
        driver: &NetDriver,
        world: &World,
    ) -> bool {
        if !self.enable_relevancy {
            return true;
        }
        let Some(avatar_id) = driver.connection(conn_id).and_then(|c| c.user_tag()) else {
            return true;
        };
        if avatar_id == actor.core().net_id() {
            return true;
        }
        let Some(avatar) = world.actor(avatar_id) else {
            return true;
        };
        let distance = actor.core().position().distance(avatar.core().position());
        distance <= self.relevancy_distance
    }

    /// Receive-side apply for `ActorSpawn` / `ActorDestroy` /
    /// `ActorReplication`. Property entries are read strictly in stream
    /// order: name, then kind, then the value of that kind.
    pub fn apply_packet(
        &mut self,
        kind: PacketKind,
        packet: &Packet,
        world: &mut World,
    ) -> Result<(), WireError> {
        match kind {
            PacketKind::ActorSpawn => {
                let mut reader = packet.reader();
                let net_id = reader.read_u32()?;
                let type_name = reader.read_string()?;
                let position = reader.read_vec3()?;
                let rotation = reader.read_quat()?;

                if world.actor(net_id).is_some() {
                    log::debug!("ignoring duplicate spawn for actor {}", net_id);
                    return Ok(());
                }

                match world.spawn_remote(&type_name, net_id) {
                    Ok(id) => {
                        if let Some(actor) = world.actor_mut(id) {
                            let core = actor.core_mut();
                            core.set_position(position);
                            core.set_rotation(rotation);
                            core.set_replicates(true);
                        }
                    }
                    Err(e) => log::warn!("dropping actor spawn: {}", e),
                }
            }
            PacketKind::ActorDestroy => {
                let mut reader = packet.reader();
                let net_id = reader.read_u32()?;
                world.destroy(net_id);
            }
            PacketKind::ActorReplication => {
                let mut reader = packet.reader();
                let net_id = reader.read_u32()?;
                let count = reader.read_u32()?;

                let Some(actor) = world.actor_mut(net_id) else {
                    log::debug!("update for unknown actor {}", net_id);
                    return Ok(());
                };

                for _ in 0..count {
                    let name = reader.read_string()?;
                    let kind_byte = reader.read_u8()?;
                    let Some(prop_kind) = PropertyKind::from_u8(kind_byte) else {
                        // The value width is unknowable; nothing after this
                        // entry can be framed.
                        log::warn!("unknown property kind {} for `{}`", kind_byte, name);
                        return Ok(());
                    };

                    let value = PropertyValue::decode(prop_kind, &mut reader)?;
                    match actor.core_mut().property_mut(&name) {
                        Some(prop) if prop.kind() == prop_kind => prop.apply_decoded(value),
                        Some(prop) => log::warn!(
                            "property `{}` kind mismatch: wire {:?}, registered {:?}",
                            name,
                            prop_kind,
                            prop.kind()
                        ),
                        None => log::debug!("ignoring unknown property `{}`", name),
                    }
                }

                actor.on_replicated();
            }
            _ => {}
        }
        Ok(())
    }
}

fn spawn_packet(actor: &dyn Actor) -> Packet {
    let core = actor.core();
    let mut writer = ByteWriter::new();
    writer.write_u32(core.net_id());
    writer.write_str(actor.type_name());
    writer.write_vec3(core.position());
    writer.write_quat(core.rotation());
    Packet::with_payload(PacketKind::ActorSpawn, writer.into_bytes())
}

fn destroy_packet(net_id: NetId) -> Packet {
    let mut writer = ByteWriter::with_capacity(4);
    writer.write_u32(net_id);
    Packet::with_payload(PacketKind::ActorDestroy, writer.into_bytes())
}
