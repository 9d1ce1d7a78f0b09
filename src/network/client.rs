//! Client Side Synchronization
//!
//! Two halves:
//!
//! - [`ClientConnector`]: a background task exchanging one request/response
//!   pair with the server per cycle. It talks to the simulation only through
//!   bounded queues (outgoing event batches, incoming responses).
//! - [`GameClient`]: runs inside the simulation step. It forwards local input
//!   to the connector, records received snapshots, loads the snapshot
//!   bordering the current tick, and interpolates render positions toward
//!   the next one.
//!
//! A cycle that times out is abandoned and retried from scratch with the same
//! items and acknowledgements.

use std::net::{Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::history::{LatencyLog, TimedHistory};
use crate::core::ids::{ClientId, PlayerId, Tick};
use crate::game::events::Event;
use crate::game::object::update_view_position;
use crate::game::player::Player;
use crate::game::snapshot::Snapshot;
use crate::game::world::World;
use crate::network::codec::{self, ChunkAssembler};
use crate::network::protocol::{ClientRequest, RequestInfo, ResponseInfo, ServerResponse, MESSAGE_UPDATE};
use crate::network::server::{NetError, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

/// Client-side latency samples kept.
pub const CLIENT_LATENCY_HISTORY: usize = 10_000;
/// Received snapshots kept for interpolation.
pub const SNAPSHOT_HISTORY: usize = 500;
/// Server infos kept.
pub const INFO_HISTORY: usize = 100;
/// Outgoing batches tolerated before local input is dropped.
pub const MAX_OUTGOING_BATCHES: usize = 300;
/// Server time is assumed this far ahead of what the client sees (seconds).
pub const CLOCK_SYNC_OFFSET: f64 = 0.03;
/// Clock drift tolerated before rebasing (seconds).
pub const CLOCK_SYNC_TOLERANCE: f64 = 0.02;

const RECV_BUFFER_SIZE: usize = 65_536;

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address
    pub server_addr: SocketAddr,
    /// Known client id; empty lets the server assign one
    pub client_id: ClientId,
    /// Requested player role
    pub player_type: u32,
    /// Driven by a person
    pub is_human: bool,
    /// Free-form metadata sent with every request
    pub meta: Value,
    /// Payload bytes per outgoing datagram
    pub chunk_size: usize,
    /// Bounded wait for each response datagram
    pub recv_timeout: Duration,
    /// Request cycles per second
    pub requests_per_second: u32,
    /// Interval between network stat reports
    pub report_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            client_id: ClientId::default(),
            player_type: 0,
            is_human: true,
            meta: Value::Null,
            chunk_size: DEFAULT_CHUNK_SIZE,
            recv_timeout: Duration::from_secs(1),
            requests_per_second: 20,
            report_interval: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// Handle to the background request loop.
#[derive(Debug)]
pub struct ClientConnector {
    outgoing_tx: mpsc::Sender<Vec<Event>>,
    incoming_rx: mpsc::Receiver<ServerResponse>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ClientConnector {
    /// Spawn the request loop on the current tokio runtime.
    pub fn start(config: ClientConfig) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(MAX_OUTGOING_BATCHES);
        let (incoming_tx, incoming_rx) = mpsc::channel(SNAPSHOT_HISTORY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        info!(server = %config.server_addr, "Starting connection to server");
        let connection = Connection::new(config);
        tokio::spawn(connection.run(outgoing_rx, incoming_tx, shutdown_rx));

        Self { outgoing_tx, incoming_rx, shutdown_tx }
    }

    /// Batches waiting to be sent.
    pub fn outgoing_len(&self) -> usize {
        self.outgoing_tx.max_capacity() - self.outgoing_tx.capacity()
    }

    /// Queue a batch for the next request. Returns false when the queue is
    /// full or the loop has stopped.
    pub fn send_events(&self, batch: Vec<Event>) -> bool {
        self.outgoing_tx.try_send(batch).is_ok()
    }

    /// Next received response, without blocking.
    pub fn try_recv(&mut self) -> Option<ServerResponse> {
        self.incoming_rx.try_recv().ok()
    }

    /// Stop the request loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for ClientConnector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State of the request loop.
struct Connection {
    config: ClientConfig,
    client_id: ClientId,
    acks: Vec<Tick>,
    items: Vec<Vec<Event>>,
    latency: LatencyLog,
    bytes_out: usize,
    bytes_in: usize,
    exchanges: u64,
    failures: u64,
    last_report: Instant,
}

impl Connection {
    fn new(config: ClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            config,
            acks: Vec::new(),
            items: Vec::new(),
            latency: LatencyLog::new(CLIENT_LATENCY_HISTORY),
            bytes_out: 0,
            bytes_in: 0,
            exchanges: 0,
            failures: 0,
            last_report: Instant::now(),
        }
    }

    async fn run(
        mut self,
        mut outgoing_rx: mpsc::Receiver<Vec<Event>>,
        incoming_tx: mpsc::Sender<ServerResponse>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let period = Duration::from_secs_f64(1.0 / self.config.requests_per_second.max(1) as f64);
        let mut pace = interval(period);
        pace.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = pace.tick() => {}
                _ = shutdown_rx.recv() => break,
            }
            if incoming_tx.is_closed() {
                break;
            }

            while let Ok(batch) = outgoing_rx.try_recv() {
                if !batch.is_empty() {
                    self.items.push(batch);
                }
            }

            let request = self.create_request();
            let started = Instant::now();
            match self.exchange(&request).await {
                Ok(response) => {
                    self.latency.record(started.elapsed().as_secs_f64());
                    self.items.clear();
                    self.acks = vec![response.info.snapshot_timestamp];
                    if self.client_id != response.info.client_id {
                        debug!(client_id = %response.info.client_id, "Adopting client id");
                        self.client_id = response.info.client_id.clone();
                    }
                    if response.info.message == MESSAGE_UPDATE && incoming_tx.try_send(response).is_err() {
                        warn!("Incoming queue full, dropping snapshot");
                    }
                    self.exchanges += 1;
                }
                Err(e) => {
                    self.failures += 1;
                    warn!("Error communicating with server [{}]. Retrying...", e);
                }
            }
            self.report();
        }
        debug!("Connection loop stopped");
    }

    fn create_request(&self) -> ClientRequest {
        ClientRequest {
            info: RequestInfo {
                client_id: self.client_id.clone(),
                meta: self.config.meta.clone(),
                snapshots_received: self.acks.clone(),
                player_type: self.config.player_type,
                is_human: self.config.is_human,
                message: MESSAGE_UPDATE.to_string(),
            },
            items: self.items.clone(),
        }
    }

    async fn exchange(&mut self, request: &ClientRequest) -> Result<ServerResponse, NetError> {
        let server = self.config.server_addr;
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;

        for datagram in codec::encode_chunked(request, self.config.chunk_size)? {
            self.bytes_out += socket.send_to(&datagram, server).await?;
        }

        let wait = self.config.recv_timeout;
        let mut assembler = ChunkAssembler::new();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, _) = timeout(wait, socket.recv_from(&mut buf))
                .await
                .map_err(|_| NetError::Timeout(wait))??;
            self.bytes_in += len;
            if let Some(payload) = assembler.push(&buf[..len])? {
                return Ok(codec::decode(&payload)?);
            }
        }
    }

    fn report(&mut self) {
        let elapsed = self.last_report.elapsed();
        if elapsed < self.config.report_interval {
            return;
        }
        let secs = elapsed.as_secs_f64();
        debug!(
            exchanges = self.exchanges,
            failures = self.failures,
            kb_out_per_sec = self.bytes_out as f64 / secs / 1024.0,
            kb_in_per_sec = self.bytes_in as f64 / secs / 1024.0,
            avg_latency = self.latency.average(),
            "Network stats"
        );
        self.bytes_out = 0;
        self.bytes_in = 0;
        self.last_report = Instant::now();
    }
}

// =============================================================================
// RENDERER
// =============================================================================

/// Frame renderer driven by a [`GameClient`].
pub trait Renderer: Send {
    /// Draw the current state from `player`'s point of view.
    fn process_frame(&mut self, world: &World, player: Option<&Player>);

    /// Play the sound events drained this frame.
    fn play_sounds(&mut self, _sounds: Vec<Event>) {}
}

// =============================================================================
// GAME CLIENT
// =============================================================================

/// Per-step client logic, local or backed by a remote connection.
pub struct GameClient {
    connector: Option<ClientConnector>,
    renderer: Option<Box<dyn Renderer>>,
    client_id: ClientId,
    player_id: Option<PlayerId>,
    snapshots: TimedHistory<Snapshot>,
    infos: TimedHistory<ResponseInfo>,
    last_loaded: Option<Tick>,
    step_counter: u64,
}

impl GameClient {
    /// Client for a player living in the same process.
    pub fn local(client_id: ClientId, player_id: PlayerId, renderer: Option<Box<dyn Renderer>>) -> Self {
        let mut client = Self::new(None, renderer);
        client.client_id = client_id;
        client.player_id = Some(player_id);
        client
    }

    /// Client synchronizing with a remote server.
    pub fn remote(connector: ClientConnector, renderer: Option<Box<dyn Renderer>>) -> Self {
        Self::new(Some(connector), renderer)
    }

    fn new(connector: Option<ClientConnector>, renderer: Option<Box<dyn Renderer>>) -> Self {
        Self {
            connector,
            renderer,
            client_id: ClientId::default(),
            player_id: None,
            snapshots: TimedHistory::new(SNAPSHOT_HISTORY),
            infos: TimedHistory::new(INFO_HISTORY),
            last_loaded: None,
            step_counter: 0,
        }
    }

    /// Client id (assigned by the server for remote clients).
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Controlled player.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Steps run.
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Forward the local bus's input events to the connector, then clear the
    /// bus.
    pub fn send_local_events(&mut self, world: &mut World) {
        let Some(connector) = &self.connector else { return };
        let batch = world.bus.client_snapshot();
        if batch.is_empty() {
            return;
        }
        if connector.outgoing_len() < MAX_OUTGOING_BATCHES {
            if !connector.send_events(batch) {
                warn!("Connection loop is gone, dropping local events");
            }
        } else {
            warn!("Outgoing queue is large, dropping local events");
        }
        world.bus.clear();
    }

    /// Record every response received since the last step.
    pub fn sync_with_remote_state(&mut self, world: &mut World) {
        let Some(connector) = self.connector.as_mut() else { return };
        while let Some(response) = connector.try_recv() {
            let ServerResponse { info, snapshot } = response;

            let server_game_time = info.server_time - CLOCK_SYNC_OFFSET;
            if (server_game_time - world.clock.game_time()).abs() > CLOCK_SYNC_TOLERANCE {
                world.clock.rebase(server_game_time);
            }
            self.client_id = info.client_id.clone();
            self.snapshots.add(info.snapshot_timestamp, snapshot);
            self.infos.add(info.snapshot_timestamp, info);
        }
    }

    /// Load the snapshot bordering the current tick and interpolate render
    /// positions toward the following one.
    pub fn load_snapshot(&mut self, world: &mut World) {
        let tick = world.tick();
        let bordering = self.snapshots.bordering(tick);
        let Some((timestamp, snapshot)) = bordering.prev.or(bordering.next) else {
            return;
        };

        if self.last_loaded != Some(timestamp) {
            world.load_snapshot(snapshot.clone());
            self.last_loaded = Some(timestamp);
        }

        let (Some((t1, _)), Some((t2, next))) = (bordering.prev, bordering.next) else {
            return;
        };
        if t2 <= t1 {
            return;
        }
        let fraction = (tick - t1) as f64 / (t2 - t1) as f64;
        for data in &next.om {
            let target = match world.registry.create_from_snapshot(data) {
                Ok(target) => target,
                Err(e) => {
                    debug!("Skipping interpolation target: {}", e);
                    continue;
                }
            };
            if let Some(current) = world.objects.get_mut(target.id) {
                update_view_position(current, &target, fraction);
            }
        }
    }

    /// Follow the player named by the latest server info.
    pub fn update_player_info(&mut self) {
        if let Some((_, info)) = self.infos.latest() {
            if info.player_id.is_some() {
                self.player_id = info.player_id;
            }
        }
    }

    /// One client step: queue the player's pending input, then synchronize
    /// with the server when remote.
    pub fn run_step(&mut self, world: &mut World) {
        if let Some(player_id) = self.player_id {
            let events = world
                .players
                .get_mut(player_id)
                .map(Player::pull_input_events)
                .unwrap_or_default();
            world.add_events(events);
        }

        if self.connector.is_some() {
            self.send_local_events(world);
            self.sync_with_remote_state(world);
            self.load_snapshot(world);
            self.update_player_info();
        }
        self.step_counter += 1;
    }

    /// Render a frame and hand pending sounds to the renderer.
    pub fn render(&mut self, world: &mut World) {
        let sounds = world.drain_sound_events();
        let Some(renderer) = self.renderer.as_mut() else { return };
        let player = self.player_id.and_then(|id| world.players.get(id));
        renderer.process_frame(world, player);
        renderer.play_sounds(sounds);
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("client_id", &self.client_id)
            .field("player_id", &self.player_id)
            .field("remote", &self.connector.is_some())
            .field("snapshots", &self.snapshots.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::physics::PhysicsConfig;
    use crate::game::world::GameConfig;
    use crate::network::server::{ServerConfig, SyncBridge, SyncRequest, UdpServer};
    use std::sync::{Arc, Mutex};

    fn client_world() -> World {
        World::new(GameConfig { tick_rate: None, client_only_mode: true }, PhysicsConfig::default())
    }

    fn snapshot_with_object(world: &mut World, timestamp: Tick, x: f64) -> Snapshot {
        let mut obj = world.create_object("GObject").unwrap();
        obj.id = crate::core::ids::ObjectId(1);
        obj.position = Some(Vec2::new(x, 0.0));
        obj.enabled = true;
        Snapshot { om: vec![obj.snapshot().unwrap()], timestamp, ..Snapshot::default() }
    }

    #[test]
    fn test_interpolates_between_bordering_snapshots() {
        let mut world = client_world();
        let first = snapshot_with_object(&mut world, 10, 0.0);
        let second = snapshot_with_object(&mut world, 20, 100.0);

        let mut client = GameClient::new(None, None);
        client.snapshots.add(10, first);
        client.snapshots.add(20, second);

        world.clock.set_ticks(15);
        client.load_snapshot(&mut world);

        let obj = world.objects.get(crate::core::ids::ObjectId(1)).unwrap();
        assert_eq!(obj.position, Some(Vec2::new(0.0, 0.0)));
        assert_eq!(obj.view_position, Some(Vec2::new(50.0, 0.0)));
        assert_eq!(client.last_loaded, Some(10));
    }

    #[test]
    fn test_loads_next_when_nothing_older() {
        let mut world = client_world();
        let only = snapshot_with_object(&mut world, 5, 32.0);
        let mut client = GameClient::new(None, None);
        client.snapshots.add(5, only);

        client.load_snapshot(&mut world);
        assert_eq!(world.objects.len(), 1);
        assert_eq!(client.last_loaded, Some(5));
    }

    #[test]
    fn test_local_client_forwards_player_input() {
        let mut world = client_world();
        let player_id = world.add_player(ClientId::from("local"), 0, true);
        world
            .players
            .get_mut(player_id)
            .unwrap()
            .add_event(Event::input(player_id, Default::default()));

        let mut client = GameClient::local(ClientId::from("local"), player_id, None);
        client.run_step(&mut world);
        assert_eq!(world.bus.client_snapshot().len(), 1);
        assert_eq!(client.step_counter(), 1);
    }

    struct RecordingRenderer {
        frames: Arc<Mutex<usize>>,
        sounds: Arc<Mutex<usize>>,
    }

    impl Renderer for RecordingRenderer {
        fn process_frame(&mut self, _world: &World, _player: Option<&Player>) {
            *self.frames.lock().unwrap() += 1;
        }

        fn play_sounds(&mut self, sounds: Vec<Event>) {
            *self.sounds.lock().unwrap() += sounds.len();
        }
    }

    #[test]
    fn test_render_drains_sounds() {
        let mut world = client_world();
        let frames = Arc::new(Mutex::new(0));
        let sounds = Arc::new(Mutex::new(0));
        let renderer = RecordingRenderer { frames: frames.clone(), sounds: sounds.clone() };
        let player_id = world.add_player(ClientId::from("local"), 0, true);
        let mut client = GameClient::local(ClientId::from("local"), player_id, Some(Box::new(renderer)));

        world.add_event(Event::sound("bell", None));
        client.render(&mut world);

        assert_eq!(*frames.lock().unwrap(), 1);
        assert_eq!(*sounds.lock().unwrap(), 1);
        assert!(world.bus.is_empty());
    }

    #[tokio::test]
    async fn test_connector_exchanges_with_server() {
        let (tx, mut bridge) = SyncBridge::channel(8, 10);
        let server = Arc::new(UdpServer::new(ServerConfig::default(), tx));
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = socket.local_addr().unwrap();
        {
            let server = server.clone();
            tokio::spawn(async move { server.serve(socket).await });
        }

        // Stand-in simulation assigning a client id.
        tokio::spawn(async move {
            let mut tick = 0;
            loop {
                while let Some(SyncRequest { request, reply }) = bridge.try_next() {
                    tick += 1;
                    let client_id = if request.info.client_id.is_empty() {
                        ClientId::from("assigned")
                    } else {
                        request.info.client_id
                    };
                    let info = ResponseInfo {
                        server_tick: tick,
                        server_time: 1.0,
                        message: MESSAGE_UPDATE.into(),
                        client_id,
                        player_id: Some(PlayerId(1)),
                        snapshot_timestamp: tick,
                    };
                    let _ = reply.send(ServerResponse { info, snapshot: Snapshot { timestamp: tick, ..Snapshot::default() } });
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let config = ClientConfig { server_addr, ..ClientConfig::default() };
        let mut client = GameClient::remote(ClientConnector::start(config), None);
        let mut world = client_world();

        for _ in 0..200 {
            client.run_step(&mut world);
            if client.player_id().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(client.player_id(), Some(PlayerId(1)));
        assert_eq!(client.client_id(), &ClientId::from("assigned"));
        assert!((world.clock.game_time() - (1.0 - CLOCK_SYNC_OFFSET)).abs() < 0.5);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_exchange_accepts_large_server_chunks() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let noise: String = (0..40_000).map(|_| char::from(b'a' + rng.gen_range(0..26u8))).collect();
        let response = ServerResponse {
            info: ResponseInfo {
                server_tick: 3,
                server_time: 0.1,
                message: MESSAGE_UPDATE.into(),
                client_id: ClientId::from("big"),
                player_id: None,
                snapshot_timestamp: 3,
            },
            snapshot: Snapshot {
                em: vec![Event::content(Value::String(noise))],
                timestamp: 3,
                ..Snapshot::default()
            },
        };
        let datagrams = codec::encode_chunked(&response, 8192).unwrap();
        assert!(datagrams.len() > 1);
        assert!(datagrams[0].len() > 4096);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            for datagram in &datagrams {
                server.send_to(datagram, peer).await.unwrap();
            }
        });

        let mut connection = Connection::new(ClientConfig { server_addr, ..ClientConfig::default() });
        let request = connection.create_request();
        let received = connection.exchange(&request).await.unwrap();
        assert_eq!(received.info.client_id, ClientId::from("big"));
        assert_eq!(received.snapshot.em.len(), 1);
    }
}
