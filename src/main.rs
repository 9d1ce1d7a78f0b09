//! Tessera Server
//!
//! Headless authoritative server. Runs a small walled arena where every
//! connecting client gets an avatar it can step around the grid.

use std::sync::Arc;
use anyhow::Context as _;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tessera::{
    runner, ClientId, Content, ContentError, Event, EventKind, GameContext, GameDef, PlayerId, Vec2, World,
    DEFAULT_TICK_RATE, VERSION,
    game::physics::CollisionOutcome,
    game::shape::{Shape, COLLISION_DEFAULT},
    network::server::{SyncBridge, UdpServer},
};

/// Arena half-width in cells.
const ARENA_RADIUS: i64 = 8;

/// Walled arena with one avatar per player.
struct Arena;

impl Arena {
    fn build_walls(world: &mut World) -> Result<(), ContentError> {
        let tile = world.physics.config().tile_size;
        for i in -ARENA_RADIUS..=ARENA_RADIUS {
            for (x, y) in [(i, -ARENA_RADIUS), (i, ARENA_RADIUS), (-ARENA_RADIUS, i), (ARENA_RADIUS, i)] {
                let mut wall = world.create_object("Wall")?;
                wall.remove_on_destroy = false;
                let id = world.add_object(wall);
                world.spawn_object(id, Vec2::new(x as f64 * tile, y as f64 * tile))?;
            }
        }
        Ok(())
    }

    fn spawn_avatar(world: &mut World, player_id: PlayerId) -> Result<(), ContentError> {
        let mut avatar = world.create_object("Avatar")?;
        avatar.player_id = Some(player_id);
        let obj_id = world.add_object(avatar);
        world.spawn_object(obj_id, Vec2::ZERO)?;
        if let Some(player) = world.players.get_mut(player_id) {
            player.attach_object(obj_id);
        }
        Ok(())
    }
}

impl Content for Arena {
    fn load(&mut self, world: &mut World, client_only: bool) -> Result<(), ContentError> {
        world.registry.register(
            "Wall",
            Arc::new(|id| tessera::GameObject::new(id, "Wall").with_shape(Shape::rectangle(Vec2::ZERO, 16.0, 16.0))),
        );
        world.registry.register(
            "Avatar",
            Arc::new(|id| tessera::GameObject::new(id, "Avatar").with_shape(Shape::circle(6.0))),
        );
        world.physics.set_collision_callback(
            COLLISION_DEFAULT,
            COLLISION_DEFAULT,
            Arc::new(|_| CollisionOutcome::Block),
        );
        if client_only {
            return Ok(());
        }
        Self::build_walls(world)
    }

    fn reset(&mut self, world: &mut World) -> Result<(), ContentError> {
        world.clear_objects();
        Self::build_walls(world)?;
        for player_id in world.players.ids() {
            Self::spawn_avatar(world, player_id)?;
        }
        Ok(())
    }

    fn update(&mut self, _world: &mut World) {}

    fn process_input_event(&mut self, world: &mut World, event: &Event) -> Vec<Event> {
        let EventKind::Input { player_id, ref input_data } = event.kind else {
            return Vec::new();
        };
        let Some(step) = input_data.get("move").and_then(Value::as_array) else {
            return Vec::new();
        };
        let (Some(dx), Some(dy)) = (
            step.first().and_then(Value::as_f64),
            step.get(1).and_then(Value::as_f64),
        ) else {
            return Vec::new();
        };

        let Some(obj_id) = world.players.get(player_id).and_then(|p| p.obj_id) else {
            return Vec::new();
        };
        let Some(position) = world.objects.get(obj_id).and_then(|o| o.position) else {
            return Vec::new();
        };
        let tile = world.physics.config().tile_size;
        let target = position + Vec2::new(dx.signum() * tile, dy.signum() * tile);
        if let Err(e) = world.move_object(obj_id, target, None) {
            warn!(player_id = %player_id, "Move rejected: {}", e);
        }
        Vec::new()
    }

    fn new_player(
        &mut self,
        world: &mut World,
        client_id: &ClientId,
        player_type: u32,
        is_human: bool,
    ) -> Result<PlayerId, ContentError> {
        let player_id = world.add_player(client_id.clone(), player_type, is_human);
        Self::spawn_avatar(world, player_id)?;
        Ok(player_id)
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let def = GameDef::from_env().context("Invalid configuration")?;
    info!("Tessera Server v{}", VERSION);
    info!(
        "Tick Rate: {}",
        def.game.tick_rate.map_or_else(|| "uncapped".to_string(), |rate| format!("{rate} Hz"))
    );
    if def.game.tick_rate.is_some_and(|rate| rate != DEFAULT_TICK_RATE) {
        info!("Tick rate overridden (default {} Hz)", DEFAULT_TICK_RATE);
    }

    // Simulation
    let world = World::new(def.game.clone(), def.physics.clone());
    let (requests, bridge) = SyncBridge::channel(def.server.bridge_capacity, def.server.max_unconfirmed);
    let mut ctx = GameContext::new(world, Box::new(Arena)).with_bridge(bridge);
    ctx.load().context("Failed to load content")?;

    // Network
    let socket = UdpSocket::bind(def.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", def.server.bind_addr))?;
    let server = Arc::new(UdpServer::new(def.server.clone(), requests));
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(Arc::new(socket)).await })
    };

    // Shutdown on Ctrl-C
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(());
    });

    runner::run(&mut ctx, shutdown_rx, None).await;

    server.shutdown();
    server_task.await??;
    info!("Server stopped at tick {}", ctx.world.tick());
    Ok(())
}
