use std::collections::HashMap;

use thiserror::Error;

use crate::actor::{Actor, NetId};

pub type ActorFactory = fn() -> Box<dyn Actor>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("actor type `{0}` is not registered")]
    UnknownActorType(String),
}

/// Deferred structural changes raised from inside actor tick hooks.
/// Applied by the world once the hook pass is over, so iteration is never
/// invalidated mid-tick.
#[derive(Default)]
pub struct WorldCommands {
    spawns: Vec<Box<dyn Actor>>,
    destroys: Vec<NetId>,
}

impl WorldCommands {
    pub fn spawn(&mut self, actor: Box<dyn Actor>) {
        self.spawns.push(actor);
    }

    pub fn destroy(&mut self, net_id: NetId) {
        self.destroys.push(net_id);
    }
}

/// The authoritative actor registry: allocates NetIds, owns actor
/// lifetime, and defers destruction to the end of the tick.
pub struct World {
    next_net_id: NetId,
    actors: HashMap<NetId, Box<dyn Actor>>,
    /// Insertion order; drives tick iteration.
    order: Vec<NetId>,
    pending_destroy: Vec<NetId>,
    factories: HashMap<&'static str, ActorFactory>,
    /// Replicated actors removed by the last destroy pass, pending
    /// notification to connected peers.
    despawned: Vec<NetId>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            next_net_id: 1,
            actors: HashMap::new(),
            order: Vec::new(),
            pending_destroy: Vec::new(),
            factories: HashMap::new(),
            despawned: Vec::new(),
        }
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn actor(&self, net_id: NetId) -> Option<&dyn Actor> {
        self.actors.get(&net_id).map(|a| &**a)
    }

    pub fn actor_mut(&mut self, net_id: NetId) -> Option<&mut (dyn Actor + '_)> {
        match self.actors.get_mut(&net_id) {
            Some(a) => Some(&mut **a),
            None => None,
        }
    }

    /// Live actors in insertion order.
    pub fn actors(&self) -> impl Iterator<Item = &dyn Actor> {
        self.order.iter().filter_map(|id| self.actor(*id))
    }

    /// NetIds in insertion order; a stable snapshot for callers that need
    /// to mutate the world while iterating.
    pub fn net_ids(&self) -> Vec<NetId> {
        self.order.clone()
    }

    /// Takes ownership, assigns a fresh NetId, and runs the spawn hook.
    /// The actor is visible to lookups as soon as this returns.
    pub fn spawn(&mut self, actor: Box<dyn Actor>) -> NetId {
        let net_id = self.allocate_net_id();
        self.insert(net_id, actor)
    }

    /// Spawns an actor under an id assigned by a remote authority. The
    /// local allocator is bumped past it so local spawns cannot collide.
    pub fn spawn_remote(&mut self, type_name: &str, net_id: NetId) -> Result<NetId, WorldError> {
        let factory = self
            .factories
            .get(type_name)
            .copied()
            .ok_or_else(|| WorldError::UnknownActorType(type_name.to_string()))?;

        if net_id >= self.next_net_id {
            self.next_net_id = net_id + 1;
        }
        Ok(self.insert(net_id, factory()))
    }

    pub fn register_actor_type(&mut self, type_name: &'static str, factory: ActorFactory) {
        log::debug!("registered actor type `{}`", type_name);
        self.factories.insert(type_name, factory);
    }

    pub fn spawn_by_type(&mut self, type_name: &str) -> Result<NetId, WorldError> {
        let factory = self
            .factories
            .get(type_name)
            .copied()
            .ok_or_else(|| WorldError::UnknownActorType(type_name.to_string()))?;
        Ok(self.spawn(factory()))
    }

    /// Queues an actor for destruction at the end of the current tick.
    /// Idempotent; unknown ids are ignored.
    pub fn destroy(&mut self, net_id: NetId) {
        if self.actors.contains_key(&net_id) && !self.pending_destroy.contains(&net_id) {
            self.pending_destroy.push(net_id);
        }
    }

    /// Runs every live actor's tick hook in insertion order, applies
    /// command-buffer spawns/destroys, then runs the destroy pass.
    pub fn tick(&mut self, dt: f32) {
        let ids = self.order.clone();
        let mut commands = WorldCommands::default();

        for id in ids {
            if let Some(actor) = self.actors.get_mut(&id) {
                actor.tick(dt, &mut commands);
            }
        }

        for actor in commands.spawns {
            self.spawn(actor);
        }
        for net_id in commands.destroys {
            self.destroy(net_id);
        }

        self.run_destroy_pass();
    }

    /// Replicated actors removed since the last call; the replication
    /// engine turns these into `ActorDestroy` notifications.
    pub fn take_despawned(&mut self) -> Vec<NetId> {
        std::mem::take(&mut self.despawned)
    }

    /// Destroys everything immediately and resets the id allocator.
    /// Teardown and test fixtures only.
    pub fn clear(&mut self) {
        let ids = std::mem::take(&mut self.order);
        for id in ids {
            if let Some(mut actor) = self.actors.remove(&id) {
                actor.on_destroy();
            }
        }
        self.actors.clear();
        self.pending_destroy.clear();
        self.despawned.clear();
        self.next_net_id = 1;
    }

    fn allocate_net_id(&mut self) -> NetId {
        let net_id = self.next_net_id;
        self.next_net_id += 1;
        net_id
    }

    fn insert(&mut self, net_id: NetId, mut actor: Box<dyn Actor>) -> NetId {
        actor.core_mut().set_net_id(net_id);
        self.actors.insert(net_id, actor);
        self.order.push(net_id);

        if let Some(actor) = self.actors.get_mut(&net_id) {
            actor.on_spawn();
        }
        net_id
    }

    fn run_destroy_pass(&mut self) {
        let pending = std::mem::take(&mut self.pending_destroy);
        for net_id in pending {
            if let Some(mut actor) = self.actors.remove(&net_id) {
                actor.on_destroy();
                self.order.retain(|id| *id != net_id);
                if actor.core().replicates() {
                    self.despawned.push(net_id);
                }
            }
        }
    }
}
