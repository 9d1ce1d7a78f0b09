//! UDP Snapshot Server
//!
//! Receives chunked client requests, hands each complete request to the
//! simulation through the [`SyncBridge`] and sends the simulation's response
//! back to the sender, chunked the same way.
//!
//! The simulation never shares state with this task. Requests and responses
//! cross the boundary by value over bounded channels.
//!
//! ```text
//! socket --datagrams--> assembler (per peer) --ClientRequest--> handler task
//!   handler --SyncRequest{request, reply}--> simulation (mpsc, bounded)
//!   simulation --ServerResponse--> reply (oneshot) --> chunks --> socket
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::network::codec::{self, ChunkAssembler, CodecError, DEFAULT_MAX_CHUNKS};
use crate::network::protocol::{ClientRequest, ServerResponse};

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 10001;

/// Default payload bytes per datagram.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Default unconfirmed-snapshot threshold per client.
pub const DEFAULT_MAX_UNCONFIRMED: usize = 10;

/// Largest datagram the server accepts.
const RECV_BUFFER_SIZE: usize = 65_536;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
    /// Payload bytes per outgoing datagram
    pub chunk_size: usize,
    /// Unacknowledged snapshots tolerated before a client is reset to fresh
    pub max_unconfirmed: usize,
    /// How long a handler waits for the simulation to answer
    pub response_timeout: Duration,
    /// Capacity of the request queue into the simulation
    pub bridge_capacity: usize,
    /// Chunks one incoming transfer may announce
    pub max_chunks: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_unconfirmed: DEFAULT_MAX_UNCONFIRMED,
            response_timeout: Duration::from_secs(1),
            bridge_capacity: 256,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

/// Network errors.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Socket failure
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete answer within the bounded wait
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The other side of a channel is gone
    #[error("Channel closed")]
    ChannelClosed,

    /// Encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

// =============================================================================
// SIMULATION BRIDGE
// =============================================================================

/// A request waiting for the simulation, with its reply handle.
#[derive(Debug)]
pub struct SyncRequest {
    /// Decoded client request
    pub request: ClientRequest,
    /// Where the simulation sends the response
    pub reply: oneshot::Sender<ServerResponse>,
}

/// Simulation side of the bridge: drained once per tick.
#[derive(Debug)]
pub struct SyncBridge {
    receiver: mpsc::Receiver<SyncRequest>,
    /// Unconfirmed-snapshot threshold applied to every client
    pub max_unconfirmed: usize,
}

impl SyncBridge {
    /// Create a bridge. The sender goes to [`UdpServer::new`].
    pub fn channel(capacity: usize, max_unconfirmed: usize) -> (mpsc::Sender<SyncRequest>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver, max_unconfirmed })
    }

    /// Next waiting request, without blocking.
    pub fn try_next(&mut self) -> Option<SyncRequest> {
        self.receiver.try_recv().ok()
    }
}

// =============================================================================
// PEER REASSEMBLY
// =============================================================================

#[derive(Debug)]
struct PeerTransfer {
    assembler: ChunkAssembler,
    last_seen: Instant,
}

/// Partial transfers keyed by sender. Peers silent for longer than the idle
/// limit are dropped on the next receive.
#[derive(Debug)]
pub struct PeerAssemblers {
    transfers: HashMap<SocketAddr, PeerTransfer>,
    max_chunks: usize,
    idle: Duration,
}

impl PeerAssemblers {
    /// Empty table.
    pub fn new(max_chunks: usize, idle: Duration) -> Self {
        Self { transfers: HashMap::new(), max_chunks, idle }
    }

    /// Feed a datagram from `peer` received at `now`.
    pub fn push(&mut self, peer: SocketAddr, datagram: &[u8], now: Instant) -> Result<Option<Vec<u8>>, CodecError> {
        let idle = self.idle;
        self.transfers
            .retain(|_, transfer| now.saturating_duration_since(transfer.last_seen) <= idle);

        let max_chunks = self.max_chunks;
        let transfer = self.transfers.entry(peer).or_insert_with(|| PeerTransfer {
            assembler: ChunkAssembler::with_max_chunks(max_chunks),
            last_seen: now,
        });
        transfer.last_seen = now;
        let result = transfer.assembler.push(datagram);
        if !matches!(result, Ok(None)) {
            self.transfers.remove(&peer);
        }
        result
    }

    /// Peers with a partial transfer.
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// No partial transfers.
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

// =============================================================================
// UDP SERVER
// =============================================================================

/// UDP server task.
pub struct UdpServer {
    config: ServerConfig,
    requests: mpsc::Sender<SyncRequest>,
    shutdown_tx: broadcast::Sender<()>,
}

impl UdpServer {
    /// Create a server forwarding to `requests`.
    pub fn new(config: ServerConfig, requests: mpsc::Sender<SyncRequest>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { config, requests, shutdown_tx }
    }

    /// Configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), NetError> {
        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        self.serve(Arc::new(socket)).await
    }

    /// Serve on an already bound socket until shutdown.
    pub async fn serve(&self, socket: Arc<UdpSocket>) -> Result<(), NetError> {
        info!("Snapshot server listening on {}", socket.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut assemblers = PeerAssemblers::new(self.config.max_chunks, self.config.response_timeout);
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("Receive error: {}", e);
                            continue;
                        }
                    };
                    match assemblers.push(peer, &buf[..len], Instant::now()) {
                        Ok(Some(payload)) => self.dispatch(socket.clone(), peer, payload),
                        Ok(None) => {}
                        Err(e) => warn!(%peer, "Dropping transfer: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    fn dispatch(&self, socket: Arc<UdpSocket>, peer: SocketAddr, payload: Vec<u8>) {
        let request: ClientRequest = match codec::decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(%peer, "Undecodable request: {}", e);
                return;
            }
        };
        let requests = self.requests.clone();
        let chunk_size = self.config.chunk_size;
        let wait = self.config.response_timeout;

        tokio::spawn(async move {
            if let Err(e) = Self::handle_request(socket, peer, request, requests, chunk_size, wait).await {
                warn!(%peer, "Request abandoned: {}", e);
            }
        });
    }

    async fn handle_request(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        request: ClientRequest,
        requests: mpsc::Sender<SyncRequest>,
        chunk_size: usize,
        wait: Duration,
    ) -> Result<(), NetError> {
        let (reply, response_rx) = oneshot::channel();
        requests
            .send(SyncRequest { request, reply })
            .await
            .map_err(|_| NetError::ChannelClosed)?;

        let response = timeout(wait, response_rx)
            .await
            .map_err(|_| NetError::Timeout(wait))?
            .map_err(|_| NetError::ChannelClosed)?;

        let datagrams = codec::encode_chunked(&response, chunk_size)?;
        let mut bytes_out = 0;
        for datagram in &datagrams {
            bytes_out += socket.send_to(datagram, peer).await?;
        }
        debug!(%peer, chunks = datagrams.len(), bytes_out, "Response sent");
        Ok(())
    }

    /// Stop serving.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

// =============================================================================
// TESTS
// =============================================================================
