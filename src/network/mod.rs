//! Network Layer
//!
//! Snapshot synchronization over UDP. The simulation never blocks on the
//! network: sockets live in tokio tasks and exchange owned messages with the
//! tick loop over bounded channels.

pub mod protocol;
pub mod codec;
pub mod session;
pub mod server;
pub mod client;

pub use protocol::{ClientRequest, RequestInfo, ServerResponse, ResponseInfo, MESSAGE_UPDATE};
pub use codec::{ChunkAssembler, CodecError};
pub use session::RemoteClient;
pub use server::{UdpServer, ServerConfig, SyncBridge, SyncRequest, PeerAssemblers, NetError};
pub use client::{ClientConfig, ClientConnector, GameClient, Renderer};
