use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use glam::Vec3;

use netwave::{
    Actor, ActorCore, ByteWriter, NetworkConfig, NetworkManager, NetworkMode, PropertyValue,
    RpcKind, DEFAULT_SERVER_PORT,
};

#[derive(Parser)]
#[command(name = "netwave-client")]
#[command(about = "Netwave sample client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Stop after this many seconds; 0 runs until killed.
    #[arg(long, default_value_t = 0)]
    run_secs: u64,
}

/// Client-side mirror of the server's demo actor.
struct PlayerActor {
    core: ActorCore,
}

impl PlayerActor {
    fn new() -> Self {
        let mut core = ActorCore::new();
        core.set_replicates(true);
        core.register_property("Health", PropertyValue::I32(100));
        core.register_property("Position", PropertyValue::Vec3(Vec3::ZERO));
        Self { core }
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

    fn on_spawn(&mut self) {
        log::info!("player actor appeared with net id {}", self.core.net_id());
    }

    fn on_replicated(&mut self) {
        let health = self
            .core
            .property("Health")
            .and_then(|p| p.value().as_i32())
            .unwrap_or(0);
        let position = self
            .core
            .property("Position")
            .and_then(|p| p.value().as_vec3())
            .unwrap_or(Vec3::ZERO);
        log::debug!("player {} health {} at {}", self.core.net_id(), health, position);
    }

    fn on_destroy(&mut self) {
        log::info!("player actor {} removed", self.core.net_id());
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = NetworkConfig {
        mode: NetworkMode::Client,
        server_address: args.server.clone(),
        server_port: args.port,
        ..Default::default()
    };

    let mut manager = NetworkManager::new(config)?;
    manager.register_actor_type("PlayerActor", || Box::new(PlayerActor::new()));
    manager
        .rpc_mut()
        .register("Announce", RpcKind::Multicast, |actor, params| {
            let message = params.read_string().unwrap_or_default();
            log::info!("server announce via actor {}: {}", actor.core().net_id(), message);
        });

    log::info!("connecting to {}:{}", args.server, args.port);

    let frame = Duration::from_secs_f64(1.0 / 60.0);
    let started = Instant::now();
    let mut last_tick = Instant::now();
    let mut last_report = Instant::now();
    let mut heal_requested = false;

    loop {
        let now = Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;

        manager.tick(dt);

        // Once the world is mirrored, ask the server to heal the first
        // player we can see. One shot; the reliable channel does the rest.
        if !heal_requested {
            let target = manager
                .world()
                .actors()
                .find(|a| a.type_name() == "PlayerActor")
                .map(|a| a.core().net_id());
            if let Some(net_id) = target {
                let mut params = ByteWriter::new();
                params.write_i32(25);
                manager.call_server_rpc(net_id, "Heal", params.as_slice());
                heal_requested = true;
            }
        }

        if last_report.elapsed() > Duration::from_secs(5) {
            last_report = Instant::now();
            for actor in manager.world().actors() {
                let health = actor
                    .core()
                    .property("Health")
                    .and_then(|p| p.value().as_i32())
                    .unwrap_or(0);
                log::info!(
                    "actor {} ({}) health {}",
                    actor.core().net_id(),
                    actor.type_name(),
                    health
                );
            }
        }

        if args.run_secs > 0 && started.elapsed() > Duration::from_secs(args.run_secs) {
            break;
        }

        let elapsed = now.elapsed();
        if elapsed < frame {
            std::thread::sleep(frame - elapsed);
        }
    }

    log::info!("disconnecting");
    manager.shutdown();
    Ok(())
}
