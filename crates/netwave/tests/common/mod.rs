#![allow(dead_code)]

use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use netwave::{
    Actor, ActorCore, NetDriver, NetworkConfig, NetworkManager, NetworkMode, PropertyValue,
};

/// Per-test port allocation. Each integration binary passes its own base so
/// concurrently running binaries cannot collide.
pub struct PortAllocator(AtomicU16);

impl PortAllocator {
    pub const fn new(base: u16) -> Self {
        Self(AtomicU16::new(base))
    }

    pub fn next(&self) -> u16 {
        self.0.fetch_add(10, Ordering::SeqCst)
    }
}

/// Minimal replicated actor used across the integration tests.
pub struct PlayerActor {
    core: ActorCore,
}

impl PlayerActor {
    pub fn new() -> Self {
        let mut core = ActorCore::new();
        core.set_replicates(true);
        core.register_property("Health", PropertyValue::I32(100));
        core.register_property("Name", PropertyValue::String("player".into()));
        Self { core }
    }
}

impl Default for PlayerActor {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for PlayerActor {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActorCore {
        &mut self.core
    }

    fn type_name(&self) -> &'static str {
        "PlayerActor"
    }
}

pub fn server_manager(port: u16) -> NetworkManager {
    let config = NetworkConfig {
        mode: NetworkMode::Server,
        server_port: port,
        ..Default::default()
    };
    let mut manager = NetworkManager::new(config).expect("server init");
    manager.register_actor_type("PlayerActor", || Box::new(PlayerActor::new()));
    manager
}

pub fn client_manager(port: u16) -> NetworkManager {
    let config = NetworkConfig {
        mode: NetworkMode::Client,
        server_address: "127.0.0.1".to_string(),
        server_port: port,
        ..Default::default()
    };
    let mut manager = NetworkManager::new(config).expect("client init");
    manager.register_actor_type("PlayerActor", || Box::new(PlayerActor::new()));
    manager
}

/// Ticks both runtimes with a small simulated dt until the predicate holds
/// or the real-time budget runs out. Returns whether the predicate held.
pub fn pump_until<F>(
    server: &mut NetworkManager,
    client: &mut NetworkManager,
    budget_ms: u64,
    mut done: F,
) -> bool
where
    F: FnMut(&mut NetworkManager, &mut NetworkManager) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(budget_ms) {
        server.tick(0.01);
        client.tick(0.01);
        if done(server, client) {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Driver-level variant of [`pump_until`] that also hands back each side's
/// drained events.
pub fn pump_drivers<F>(
    server: &mut NetDriver,
    client: &mut NetDriver,
    budget_ms: u64,
    mut step: F,
) where
    F: FnMut(&mut NetDriver, &mut NetDriver) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(budget_ms) {
        server.tick(0.01);
        client.tick(0.01);
        if step(server, client) {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
