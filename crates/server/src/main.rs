use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use glam::Vec3;

use netwave::{
    Actor, ActorCore, NetworkConfig, NetworkManager, NetworkMode, PropertyValue, RpcKind,
    WorldCommands, DEFAULT_SERVER_PORT,
};

#[derive(Parser)]
#[command(name = "netwave-server")]
#[command(about = "Netwave sample dedicated server")]
struct Args {
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 30.0)]
    tick_rate: f32,

    #[arg(short, long, default_value_t = 16)]
    max_clients: u32,

    /// Stop after this many seconds; 0 runs until killed.
    #[arg(long, default_value_t = 0)]
    run_secs: u64,
}

/// Demo actor: circles the origin while its health ticks down.
struct PlayerActor {
    core: ActorCore,
    age: f32,
}

impl PlayerActor {
    fn new() -> Self {
        let mut core = ActorCore::new();
        core.set_replicates(true);
        core.register_property("Health", PropertyValue::I32(100));
        core.register_property("Position", PropertyValue::Vec3(Vec3::ZERO));
        Self { core, age: 0.0 }
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
        log::info!("player actor spawned with net id {}", self.core.net_id());
    }

    fn tick(&mut self, dt: f32, _commands: &mut WorldCommands) {
        self.age += dt;

        let position = Vec3::new(self.age.cos() * 5.0, 0.0, self.age.sin() * 5.0);
        self.core.set_position(position);
        self.core
            .set_property("Position", PropertyValue::Vec3(position));

        let health = self
            .core
            .property("Health")
            .and_then(|p| p.value().as_i32())
            .unwrap_or(0);
        let drained = (health as f32 - dt * 10.0).max(0.0) as i32;
        if drained != health {
            self.core.set_property("Health", PropertyValue::I32(drained));
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = NetworkConfig {
        mode: NetworkMode::Server,
        server_port: args.port,
        max_connections: args.max_clients,
        tick_rate: args.tick_rate,
        ..Default::default()
    };

    let mut manager = NetworkManager::new(config)?;
    manager.register_actor_type("PlayerActor", || Box::new(PlayerActor::new()));
    manager
        .rpc_mut()
        .register("Heal", RpcKind::Server, |actor, params| {
            let amount = params.read_i32().unwrap_or(0);
            let health = actor
                .core()
                .property("Health")
                .and_then(|p| p.value().as_i32())
                .unwrap_or(0);
            actor
                .core_mut()
                .set_property("Health", PropertyValue::I32((health + amount).min(100)));
            log::info!("healed for {}", amount);
        });

    manager.world_mut().spawn(Box::new(PlayerActor::new()));
    log::info!("server up on port {}", args.port);

    let frame = Duration::from_secs_f64(1.0 / 60.0);
    let started = Instant::now();
    let mut last_tick = Instant::now();
    let mut last_report = Instant::now();

    loop {
        let now = Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;

        manager.tick(dt);

        if last_report.elapsed() > Duration::from_secs(5) {
            last_report = Instant::now();
            log::info!(
                "{} connection(s), {} actor(s)",
                manager.driver().connected_count(),
                manager.world().actor_count()
            );
        }

        if args.run_secs > 0 && started.elapsed() > Duration::from_secs(args.run_secs) {
            break;
        }

        let elapsed = now.elapsed();
        if elapsed < frame {
            std::thread::sleep(frame - elapsed);
        }
    }

    log::info!("shutting down");
    manager.shutdown();
    Ok(())
}
