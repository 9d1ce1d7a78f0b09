//! Game Context
//!
//! Composes the world, content, local clients and the server bridge into the
//! per-tick pipeline:
//!
//! ```text
//! pre-event hook + remote requests -> events (to fixed point)
//!     -> physics -> content update -> tick
//! ```
//!
//! In client-only mode physics and the content update are skipped; state
//! arrives from the server instead.

use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::ids::{ClientId, EventId, PlayerId, Tick};
use crate::game::content::{Content, ContentError, StepInfo};
use crate::game::events::{Event, EventKind};
use crate::game::object::ObjectError;
use crate::game::world::World;
use crate::network::client::{ClientConnector, GameClient, Renderer};
use crate::network::protocol::{ClientRequest, ResponseInfo, ServerResponse, MESSAGE_UPDATE};
use crate::network::server::{SyncBridge, SyncRequest};

/// Events handled in one pass before the remainder is deferred to the next
/// tick.
pub const MAX_EVENTS_PER_PASS: usize = 100_000;

/// Tick pipeline orchestrator.
pub struct GameContext {
    /// Simulation state
    pub world: World,
    content: Box<dyn Content>,
    bridge: Option<SyncBridge>,
    clients: Vec<GameClient>,
    done: bool,
    step_counter: u64,
}

impl GameContext {
    /// Context over `world` driven by `content`.
    pub fn new(world: World, content: Box<dyn Content>) -> Self {
        Self {
            world,
            content,
            bridge: None,
            clients: Vec::new(),
            done: false,
            step_counter: 0,
        }
    }

    /// Serve remote clients through `bridge`.
    pub fn with_bridge(mut self, bridge: SyncBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Let content set up the world.
    pub fn load(&mut self) -> Result<(), ContentError> {
        let client_only = self.world.config.client_only_mode;
        self.content.load(&mut self.world, client_only)?;
        info!(objects = self.world.objects.len(), client_only, "Content loaded");
        Ok(())
    }

    /// Reset content to the start of an episode.
    pub fn reset(&mut self) -> Result<(), ContentError> {
        self.content.reset(&mut self.world)?;
        self.done = false;
        Ok(())
    }

    /// Steps run by [`GameContext::run_episode_step`].
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Attach a client for a new in-process player.
    pub fn add_local_client(
        &mut self,
        player_type: u32,
        is_human: bool,
        renderer: Option<Box<dyn Renderer>>,
    ) -> Result<PlayerId, ContentError> {
        let client_id = ClientId::generate();
        let player_id = self.content.new_player(&mut self.world, &client_id, player_type, is_human)?;
        self.clients.push(GameClient::local(client_id, player_id, renderer));
        Ok(player_id)
    }

    /// Attach a client synchronizing with a remote server.
    pub fn add_remote_client(&mut self, connector: ClientConnector, renderer: Option<Box<dyn Renderer>>) {
        self.clients.push(GameClient::remote(connector, renderer));
    }

    /// Attached clients.
    pub fn clients(&self) -> &[GameClient] {
        &self.clients
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Inject content's pre-event events and answer waiting remote requests.
    pub fn run_pre_event_processing(&mut self) {
        let events = self.content.pre_event(&mut self.world);
        self.world.add_events(events);
        self.serve_remote_requests();
    }

    /// Process the bus to a fixed point. Returns the number of events handled.
    ///
    /// Every event pending at the start of the pass, and every event added
    /// while the pass runs, is consumed once. Events not flagged for server
    /// processing are consumed without dispatch unless this process is
    /// client-only. Delayed events not yet due, periodic events not asking
    /// for removal, and sound events awaiting a local renderer return to the
    /// bus for the next tick.
    pub fn run_event_processing(&mut self) -> usize {
        let tick = self.world.tick();
        let keep_sounds = !self.clients.is_empty();
        let mut working: VecDeque<Event> = self.world.bus.take_all().into();
        let mut retained = Vec::new();
        let mut processed = 0;

        while let Some(mut event) = working.pop_front() {
            if processed == MAX_EVENTS_PER_PASS {
                warn!(remaining = working.len() + 1, "Event pass limit reached, deferring the rest");
                retained.push(event);
                retained.extend(working.drain(..));
                break;
            }
            processed += 1;

            let (follow_ups, keep) = self.dispatch(&mut event, tick, keep_sounds);
            if keep {
                retained.push(event);
            }
            self.world.add_events(follow_ups);
            working.extend(self.world.bus.take_all());
        }

        self.world.bus.add_all(retained);
        #[cfg(feature = "debug-tracing")]
        debug!(tick, processed, pending = self.world.bus.len(), "Event pass complete");
        processed
    }

    fn dispatch(&mut self, event: &mut Event, tick: Tick, keep_sounds: bool) -> (Vec<Event>, bool) {
        let world = &mut self.world;
        // Client-scoped events were already forwarded when they were added.
        if !event.is_server_event && !world.config.client_only_mode {
            return (Vec::new(), false);
        }
        match event.kind {
            EventKind::Input { .. } => (self.content.process_input_event(world, event), false),
            EventKind::AdminCommand { .. } => (self.content.process_admin_command_event(world, event), false),
            EventKind::Content { .. } => (self.content.process_event(world, event), false),
            EventKind::PositionChange { .. } => {
                self.content.process_position_change_event(world, event);
                (Vec::new(), false)
            }
            EventKind::View { player_id, distance_diff, center_diff, orientation_diff } => {
                world.apply_view(player_id, distance_diff, center_diff, orientation_diff);
                (Vec::new(), false)
            }
            EventKind::RemoveObject { object_id } => {
                world.remove_object_now(object_id);
                (Vec::new(), false)
            }
            EventKind::Delayed(ref delayed) => match delayed.run(tick) {
                Some(follow_ups) => (follow_ups, false),
                None => (Vec::new(), true),
            },
            EventKind::Periodic(ref mut periodic) => {
                let (follow_ups, remove) = periodic.run(tick);
                (follow_ups, !remove)
            }
            EventKind::Object { obj_id, ref op } => {
                match world.apply_object_op(obj_id, op.clone()) {
                    Ok(()) => {}
                    Err(ObjectError::NotFound(id)) => {
                        warn!(object_id = %id, event_id = %event.id, "Object event for missing object");
                    }
                    Err(e) => debug!(event_id = %event.id, "Object event skipped: {}", e),
                }
                (Vec::new(), false)
            }
            EventKind::Sound { .. } => (Vec::new(), keep_sounds),
        }
    }

    /// Resolve buffered moves.
    pub fn run_physics_processing(&mut self) {
        let tick = self.world.tick();
        let events = self.world.physics.update(&mut self.world.objects, tick);
        self.world.add_events(events);
    }

    /// Content per-tick update.
    pub fn run_update(&mut self) {
        self.content.update(&mut self.world);
    }

    /// Advance the clock. Returns the new tick.
    pub fn tick(&mut self) -> Tick {
        let tick = self.world.clock.tick();
        self.world.objects.set_tick(tick);
        tick
    }

    /// Run one tick of the pipeline. Returns the new tick.
    pub fn run_step(&mut self) -> Tick {
        // 1. Pre-event hook and remote requests
        self.run_pre_event_processing();

        // 2. Events to fixed point
        self.run_event_processing();

        // 3. Physics and content (authoritative side only)
        if !self.world.config.client_only_mode {
            self.run_physics_processing();
            self.run_update();
        }

        // 4. Advance
        self.tick()
    }

    /// One agent-facing step: reset if the previous step finished the
    /// episode, run client steps and the pipeline, render, and report every
    /// player's step info.
    pub fn run_episode_step(&mut self) -> Result<Vec<(PlayerId, StepInfo)>, ContentError> {
        // Client-only processes take their state from the server.
        if self.done && !self.world.config.client_only_mode {
            self.reset()?;
        }
        for client in &mut self.clients {
            client.run_step(&mut self.world);
        }
        self.run_step();
        for client in &mut self.clients {
            client.render(&mut self.world);
        }

        let infos: Vec<(PlayerId, StepInfo)> = self
            .world
            .players
            .iter()
            .map(|player| (player.uid, self.content.step_info(&self.world, player)))
            .collect();
        self.done = infos.iter().any(|(_, info)| info.done);
        self.step_counter += 1;
        Ok(infos)
    }

    // =========================================================================
    // Server side of the snapshot protocol
    // =========================================================================

    fn serve_remote_requests(&mut self) {
        let (requests, max_unconfirmed) = {
            let Some(bridge) = self.bridge.as_mut() else { return };
            let mut requests = Vec::new();
            while let Some(request) = bridge.try_next() {
                requests.push(request);
            }
            (requests, bridge.max_unconfirmed)
        };

        for SyncRequest { request, reply } in requests {
            match self.process_client_request(request, max_unconfirmed) {
                Ok(response) => {
                    if reply.send(response).is_err() {
                        debug!("Requester gave up before the response was ready");
                    }
                }
                Err(e) => warn!("Failed to serve client request: {}", e),
            }
        }
    }

    /// Handle one client request and build its response.
    #[instrument(skip(self, request), fields(client_id = %request.info.client_id))]
    pub fn process_client_request(
        &mut self,
        request: ClientRequest,
        max_unconfirmed: usize,
    ) -> Result<ServerResponse, ContentError> {
        let ClientRequest { info, items } = request;

        // 1. Identity
        let client_id = if info.client_id.is_empty() {
            let assigned = ClientId::generate();
            info!(client_id = %assigned, "Assigned client id");
            assigned
        } else {
            info.client_id
        };
        self.world.remote_client(&client_id).record_request(Instant::now());

        // 2. Player
        let assigned = self.world.remote_client(&client_id).player_id;
        let known = assigned.filter(|id| self.world.players.get(*id).is_some());
        let player_id = match known {
            Some(id) => id,
            None => {
                let id = self.content.new_player(&mut self.world, &client_id, info.player_type, info.is_human)?;
                self.world.remote_client(&client_id).player_id = Some(id);
                info!(client_id = %client_id, player_id = %id, "New player");
                id
            }
        };

        // 3. Acknowledgements
        self.world.remote_client(&client_id).acknowledge(&info.snapshots_received);

        // 4. Client events, re-keyed into this bus
        for batch in items {
            for mut event in batch {
                event.id = EventId(0);
                self.world.add_event(event);
            }
        }

        // 5. Backpressure
        self.world.remote_client(&client_id).check_backpressure(max_unconfirmed);

        // 6. Snapshot
        let snapshot = self.world.create_snapshot_for_client(&client_id);
        let snapshot_timestamp = snapshot.timestamp;
        self.world.remote_client(&client_id).record_sent(snapshot_timestamp);

        Ok(ServerResponse {
            info: ResponseInfo {
                server_tick: self.world.tick(),
                server_time: self.world.clock.game_time(),
                message: MESSAGE_UPDATE.to_string(),
                client_id,
                player_id: Some(player_id),
                snapshot_timestamp,
            },
            snapshot,
        })
    }
}

impl std::fmt::Debug for GameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameContext")
            .field("world", &self.world)
            .field("clients", &self.clients)
            .field("serving", &self.bridge.is_some())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ObjectId;
    use crate::core::vec2::Vec2;
    use crate::game::events::ObjectOp;
    use crate::game::physics::PhysicsConfig;
    use crate::game::world::GameConfig;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Content that chains content events and spawns an avatar per player.
    #[derive(Default)]
    struct TestContent {
        handled: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl Content for TestContent {
        fn load(&mut self, _world: &mut World, _client_only: bool) -> Result<(), ContentError> {
            Ok(())
        }

        fn reset(&mut self, world: &mut World) -> Result<(), ContentError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            for player in world.players.ids() {
                if let Some(player) = world.players.get_mut(player) {
                    player.data.clear();
                }
            }
            Ok(())
        }

        fn update(&mut self, _world: &mut World) {}

        fn process_input_event(&mut self, world: &mut World, event: &Event) -> Vec<Event> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if let EventKind::Input { player_id, .. } = event.kind {
                if let Some(player) = world.players.get_mut(player_id) {
                    player.set_data_value("finished", json!(true));
                }
            }
            Vec::new()
        }

        fn process_event(&mut self, _world: &mut World, event: &Event) -> Vec<Event> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            match &event.kind {
                EventKind::Content { data } => match data["generation"].as_u64() {
                    Some(n) if n > 0 => vec![
                        Event::content(json!({"generation": n - 1})),
                        Event::content(json!({"generation": n - 1})),
                    ],
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            }
        }

        fn new_player(
            &mut self,
            world: &mut World,
            client_id: &ClientId,
            player_type: u32,
            is_human: bool,
        ) -> Result<PlayerId, ContentError> {
            let player_id = world.add_player(client_id.clone(), player_type, is_human);
            let mut avatar = world.create_object("GObject")?;
            avatar.player_id = Some(player_id);
            let obj_id = world.add_object(avatar);
            world.spawn_object(obj_id, Vec2::ZERO)?;
            if let Some(player) = world.players.get_mut(player_id) {
                player.attach_object(obj_id);
            }
            Ok(player_id)
        }

        fn step_info(&self, _world: &World, player: &crate::game::player::Player) -> StepInfo {
            StepInfo {
                done: player.data_value("finished").is_some(),
                ..StepInfo::default()
            }
        }
    }

    fn context_with(config: GameConfig) -> (GameContext, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let content = TestContent::default();
        let handled = content.handled.clone();
        let resets = content.resets.clone();
        let world = World::new(config, PhysicsConfig::default());
        (GameContext::new(world, Box::new(content)), handled, resets)
    }

    fn context() -> GameContext {
        context_with(GameConfig::default()).0
    }

    fn spawn(ctx: &mut GameContext, at: Vec2) -> ObjectId {
        let obj = ctx.world.create_object("GObject").unwrap();
        let id = ctx.world.add_object(obj);
        ctx.world.spawn_object(id, at).unwrap();
        id
    }

    #[test]
    fn test_follow_ups_processed_in_same_pass() {
        let (mut ctx, handled, _) = context_with(GameConfig::default());
        ctx.world.add_event(Event::content(json!({"generation": 3})));

        // 1 + 2 + 4 + 8 events over four generations.
        assert_eq!(ctx.run_event_processing(), 15);
        assert_eq!(handled.load(Ordering::SeqCst), 15);
        assert!(ctx.world.bus.is_empty());
    }

    #[test]
    fn test_delayed_event_waits_for_target_tick() {
        let mut ctx = context();
        let now = ctx.world.tick();
        ctx.world.add_event(Event::delayed(now, 2, Value::Null, Arc::new(|_| vec![Event::sound("ding", None)])));

        ctx.run_step();
        assert_eq!(ctx.world.bus.len(), 1);
        ctx.run_step();
        // Fired: follow-up sound consumed (no local client), delayed event gone.
        ctx.run_event_processing();
        assert!(ctx.world.bus.is_empty());
    }

    #[test]
    fn test_periodic_event_until_removed() {
        let mut ctx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let now = ctx.world.tick();
        ctx.world.add_event(Event::periodic(
            now,
            1,
            true,
            Value::Null,
            Arc::new(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                (Vec::new(), n >= 3)
            }),
        ));

        for _ in 0..5 {
            ctx.run_step();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(ctx.world.bus.is_empty());
    }

    #[test]
    fn test_periodic_runs_once_per_tick() {
        let mut ctx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        ctx.world.add_event(Event::periodic(
            0,
            0,
            true,
            Value::Null,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                (vec![Event::content(Value::Null)], false)
            }),
        ));

        ctx.run_event_processing();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.world.bus.len(), 1);
    }

    #[test]
    fn test_duplicate_removal_is_harmless() {
        let mut ctx = context();
        let id = spawn(&mut ctx, Vec2::ZERO);
        ctx.world.remove_object(id);
        ctx.world.remove_object(id);
        ctx.world.add_event(Event::object(id, ObjectOp::SetVisible { visible: false }));

        ctx.run_event_processing();
        assert!(ctx.world.objects.is_empty());
        assert!(ctx.world.physics.space().is_empty());
        assert!(ctx.world.bus.is_empty());
    }

    #[test]
    fn test_object_move_resolved_by_step() {
        let mut ctx = context();
        let id = spawn(&mut ctx, Vec2::ZERO);
        ctx.world.add_event(Event::object(id, ObjectOp::Move { position: Vec2::new(32.0, 16.0) }));

        let before = ctx.world.tick();
        let after = ctx.run_step();
        assert_eq!(after, before + 1);
        assert_eq!(ctx.world.objects.get(id).unwrap().position, Some(Vec2::new(32.0, 16.0)));
        assert_eq!(ctx.world.objects.tick(), after);
    }

    #[test]
    fn test_client_only_mode_skips_physics() {
        let (mut ctx, _, _) = context_with(GameConfig { tick_rate: None, client_only_mode: true });
        let id = spawn(&mut ctx, Vec2::ZERO);
        ctx.world.move_object(id, Vec2::new(16.0, 0.0), None).unwrap();

        ctx.run_step();
        assert_eq!(ctx.world.objects.get(id).unwrap().position, Some(Vec2::ZERO));
        assert_eq!(ctx.world.physics.pending_len(), 1);
    }

    fn request(client_id: &ClientId, acks: Vec<Tick>) -> ClientRequest {
        let mut request = ClientRequest::default();
        request.info.client_id = client_id.clone();
        request.info.snapshots_received = acks;
        request
    }

    #[test]
    fn test_fresh_client_gets_identity_and_full_delta() {
        let mut ctx = context();
        spawn(&mut ctx, Vec2::new(64.0, 0.0));
        ctx.tick();

        let response = ctx.process_client_request(ClientRequest::default(), 10).unwrap();
        assert!(!response.info.client_id.is_empty());
        let player_id = response.info.player_id.unwrap();
        assert!(ctx.world.players.get(player_id).is_some());
        // Pre-existing object plus the new avatar.
        assert_eq!(response.snapshot.om.len(), 2);
        assert_eq!(response.snapshot.pm.len(), 1);
        assert_eq!(response.info.snapshot_timestamp, ctx.world.tick());

        // Same client again: same player.
        let again = ctx
            .process_client_request(request(&response.info.client_id, vec![]), 10)
            .unwrap();
        assert_eq!(again.info.player_id, Some(player_id));
        assert_eq!(ctx.world.players.len(), 1);
    }

    #[test]
    fn test_acknowledged_delta_skips_unchanged_objects() {
        let mut ctx = context();
        let client_id = ClientId::from("c1");
        // Avatar created at tick 0.
        let first = ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();
        assert!(!first.snapshot.om.is_empty());

        ctx.tick();
        let second = ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();
        assert_eq!(second.info.snapshot_timestamp, 1);

        ctx.tick();
        ctx.tick();
        let added = spawn(&mut ctx, Vec2::new(16.0, 16.0));

        let third = ctx
            .process_client_request(request(&client_id, vec![second.info.snapshot_timestamp]), 10)
            .unwrap();
        let ids: Vec<ObjectId> = third.snapshot.om.iter().filter_map(|o| o.object_id()).collect();
        assert_eq!(ids, vec![added]);
    }

    #[test]
    fn test_partial_ack_keeps_unacknowledged() {
        let mut ctx = context();
        let client_id = ClientId::from("c1");
        ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();
        {
            let client = ctx.world.remote_client(&client_id);
            client.unconfirmed.clear();
            client.record_sent(100);
            client.record_sent(105);
        }

        ctx.process_client_request(request(&client_id, vec![100]), 10).unwrap();
        let client = ctx.world.get_remote_client(&client_id).unwrap();
        assert!(client.unconfirmed.contains(&105));
        assert!(!client.unconfirmed.contains(&100));
        assert_eq!(client.last_snapshot_time, 100);
    }

    #[test]
    fn test_backpressure_forces_full_state() {
        let mut ctx = context();
        let client_id = ClientId::from("silent");
        for _ in 0..3 {
            ctx.process_client_request(request(&client_id, vec![9999]), 2).unwrap();
            ctx.tick();
        }
        assert_eq!(ctx.world.get_remote_client(&client_id).unwrap().unconfirmed.len(), 3);

        let response = ctx.process_client_request(request(&client_id, vec![9999]), 2).unwrap();
        let client = ctx.world.get_remote_client(&client_id).unwrap();
        assert_eq!(client.last_snapshot_time, 0);
        assert_eq!(client.unconfirmed.iter().copied().collect::<Vec<_>>(), vec![response.snapshot.timestamp]);
        // Delta since zero carries every object.
        assert_eq!(response.snapshot.om.len(), ctx.world.objects.len());
    }

    #[test]
    fn test_client_events_rekeyed() {
        let mut ctx = context();
        let existing = ctx.world.add_event(Event::content(Value::Null));

        let mut input = Event::input(PlayerId(1), Default::default());
        input.id = existing;
        let mut req = request(&ClientId::from("c1"), vec![]);
        req.items = vec![vec![input]];
        ctx.process_client_request(req, 10).unwrap();

        assert!(ctx.world.bus.get(existing).is_some());
        assert_eq!(ctx.world.bus.client_snapshot().len(), 1);
        assert_ne!(ctx.world.bus.client_snapshot()[0].id, existing);
    }

    #[test]
    fn test_queued_client_events_delivered_once() {
        let mut ctx = context();
        let client_id = ClientId::from("c1");
        ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();

        let id = spawn(&mut ctx, Vec2::ZERO);
        ctx.world.remove_object(id);
        let first = ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();
        assert!(first.snapshot.em.iter().any(|e| matches!(e.kind, EventKind::RemoveObject { .. })));
        let second = ctx.process_client_request(request(&client_id, vec![]), 10).unwrap();
        assert!(second.snapshot.em.is_empty());
    }

    #[test]
    fn test_episode_resets_after_done() {
        let (mut ctx, _, resets) = context_with(GameConfig::default());
        let player_id = ctx.add_local_client(0, false, None).unwrap();

        let infos = ctx.run_episode_step().unwrap();
        assert_eq!(infos.len(), 1);
        assert!(!infos[0].1.done);

        ctx.world.players.get_mut(player_id).unwrap().add_event(Event::input(player_id, Default::default()));
        let infos = ctx.run_episode_step().unwrap();
        assert!(infos[0].1.done);

        let infos = ctx.run_episode_step().unwrap();
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(!infos[0].1.done);
        assert_eq!(ctx.step_counter(), 3);
    }

    #[test]
    fn test_client_scoped_events_skip_server_dispatch() {
        let (mut ctx, handled, _) = context_with(GameConfig::default());
        let mut event = Event::content(json!({"generation": 0}));
        event.is_server_event = false;
        ctx.world.add_event(event.clone());
        ctx.world.add_event(Event::content(json!({"generation": 0})));

        assert_eq!(ctx.run_event_processing(), 2);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(ctx.world.bus.is_empty());

        let (mut client, handled, _) = context_with(GameConfig { tick_rate: None, client_only_mode: true });
        client.world.add_event(event);
        client.run_event_processing();
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_only_episode_never_resets() {
        let (mut ctx, _, resets) = context_with(GameConfig { tick_rate: None, client_only_mode: true });
        let player_id = ctx.add_local_client(0, false, None).unwrap();
        ctx.world.players.get_mut(player_id).unwrap().set_data_value("finished", json!(true));

        assert!(ctx.run_episode_step().unwrap()[0].1.done);
        let infos = ctx.run_episode_step().unwrap();
        assert!(infos[0].1.done);
        assert_eq!(resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bridge_requests_answered_in_pre_event() {
        let (tx, bridge) = SyncBridge::channel(4, 10);
        let mut ctx = context().with_bridge(bridge);

        let (reply, response_rx) = tokio::sync::oneshot::channel();
        tx.send(SyncRequest { request: ClientRequest::default(), reply }).await.unwrap();

        ctx.run_pre_event_processing();
        let response = response_rx.await.unwrap();
        assert_eq!(response.info.message, MESSAGE_UPDATE);
        assert!(response.info.player_id.is_some());
    }
}
