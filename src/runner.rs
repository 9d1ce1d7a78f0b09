//! Tick Loop
//!
//! Drives a [`GameContext`] one step at a time. At a fixed tick rate steps
//! are paced by a tokio interval (late steps are skipped, the clock catches
//! up on its own); uncapped contexts step as fast as the runtime allows,
//! yielding between steps so network tasks keep running.

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, instrument};

use crate::core::ids::Tick;
use crate::game::context::GameContext;

/// Run until `shutdown` fires (or its sender is dropped), or until the
/// clock reaches `stop_at`. Returns the number of steps run.
#[instrument(skip_all)]
pub async fn run(ctx: &mut GameContext, mut shutdown: broadcast::Receiver<()>, stop_at: Option<Tick>) -> u64 {
    let reached = |ctx: &GameContext| stop_at.is_some_and(|stop| ctx.world.tick() >= stop);
    let mut steps = 0u64;

    match ctx.world.clock.tick_duration() {
        Some(period) => {
            info!(?period, "Running at fixed rate");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            while !reached(ctx) {
                tokio::select! {
                    _ = ticker.tick() => {
                        ctx.run_step();
                        steps += 1;
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }
        None => {
            info!("Running uncapped");
            while !reached(ctx) {
                match shutdown.try_recv() {
                    Err(broadcast::error::TryRecvError::Empty) => {}
                    _ => break,
                }
                ctx.run_step();
                steps += 1;
                tokio::task::yield_now().await;
            }
        }
    }

    info!(steps, tick = ctx.world.tick(), "Tick loop stopped");
    steps
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ClientId, PlayerId};
    use crate::game::content::{Content, ContentError};
    use crate::game::events::Event;
    use crate::game::physics::PhysicsConfig;
    use crate::game::world::{GameConfig, World};
    use std::time::Duration;

    struct Idle;

    impl Content for Idle {
        fn load(&mut self, _world: &mut World, _client_only: bool) -> Result<(), ContentError> {
            Ok(())
        }

        fn reset(&mut self, _world: &mut World) -> Result<(), ContentError> {
            Ok(())
        }

        fn update(&mut self, _world: &mut World) {}

        fn process_input_event(&mut self, _world: &mut World, _event: &Event) -> Vec<Event> {
            Vec::new()
        }

        fn new_player(
            &mut self,
            world: &mut World,
            client_id: &ClientId,
            player_type: u32,
            is_human: bool,
        ) -> Result<PlayerId, ContentError> {
            Ok(world.add_player(client_id.clone(), player_type, is_human))
        }
    }

    fn context(tick_rate: Option<u32>) -> GameContext {
        let world = World::new(GameConfig { tick_rate, client_only_mode: false }, PhysicsConfig::default());
        GameContext::new(world, Box::new(Idle))
    }

    #[tokio::test]
    async fn test_uncapped_runs_to_stop_tick() {
        let mut ctx = context(None);
        let (_tx, rx) = broadcast::channel(1);
        let steps = run(&mut ctx, rx, Some(25)).await;
        assert_eq!(steps, 25);
        assert_eq!(ctx.world.tick(), 25);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let mut ctx = context(Some(100));
        let (tx, rx) = broadcast::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });
        let steps = tokio::time::timeout(Duration::from_secs(2), run(&mut ctx, rx, None))
            .await
            .unwrap();
        assert!(steps > 0);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_uncapped() {
        let mut ctx = context(None);
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);
        assert_eq!(run(&mut ctx, rx, None).await, 0);
    }
}
