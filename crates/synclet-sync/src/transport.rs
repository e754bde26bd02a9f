//! Transport abstraction for the packet layer.
//!
//! A transport is an unreliable string pipe. Outbound packets start with the
//! recipient id (or [`BROADCAST_ID`]); the transport routes on it and
//! delivers the packet with that first field rewritten to the sender's id.
//! Implementations may use WebSockets, broadcast channels, brokers, or
//! anything else.

use async_trait::async_trait;
use tokio::sync::mpsc;

use synclet_core::{Binding, BROADCAST_ID};

use crate::error::{Result, SyncError};

/// Where a transport delivers inbound packets.
pub type PacketSender = mpsc::UnboundedSender<String>;

/// Transport trait for moving raw packets between replicas.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Ownership slot; the bound synclet id is this replica's address on
    /// the transport.
    fn binding(&self) -> &Binding;

    /// Start delivering inbound packets to `receiver`.
    async fn connect(&self, receiver: PacketSender) -> Result<()>;

    /// Stop delivering packets.
    async fn disconnect(&self) -> Result<()>;

    /// Send one raw packet.
    async fn send_packet(&self, packet: String) -> Result<()>;
}

/// Split a packet into its first field and the remainder.
pub fn split_recipient(packet: &str) -> Result<(&str, &str)> {
    packet
        .split_once(' ')
        .filter(|(peer, _)| !peer.is_empty())
        .ok_or_else(|| SyncError::MalformedPacket("missing peer id".into()))
}

/// An in-process transport for tests and demos.
///
/// Transports are grouped into pools held by an explicit
/// [`MemoryTransportRegistry`]; dropping the registry drops every pool.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing::{debug, trace};

    /// Shared state for the memory transport network.
    pub struct MemoryTransportRegistry {
        /// pool id -> replica id -> inbound channel.
        pools: RwLock<HashMap<String, HashMap<String, PacketSender>>>,
    }

    impl MemoryTransportRegistry {
        /// Create a new registry.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport attached to `pool`.
        pub fn create_transport(self: &Arc<Self>, pool: impl Into<String>) -> MemoryTransport {
            MemoryTransport {
                pool: pool.into(),
                registry: Arc::clone(self),
                binding: Binding::new(),
            }
        }

        /// Replica ids currently connected to `pool`, sorted.
        pub async fn peers(&self, pool: &str) -> Vec<String> {
            let pools = self.pools.read().await;
            let mut peers: Vec<String> = pools
                .get(pool)
                .map(|members| members.keys().cloned().collect())
                .unwrap_or_default();
            peers.sort();
            peers
        }
    }

    impl Default for MemoryTransportRegistry {
        fn default() -> Self {
            Self {
                pools: RwLock::new(HashMap::new()),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        pool: String,
        registry: Arc<MemoryTransportRegistry>,
        binding: Binding,
    }

    impl MemoryTransport {
        /// Pool this transport joins on connect.
        pub fn pool(&self) -> &str {
            &self.pool
        }

        fn replica_id(&self) -> Result<&str> {
            self.binding
                .owner()
                .ok_or_else(|| SyncError::Transport("memory transport is not bound".into()))
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn binding(&self) -> &Binding {
            &self.binding
        }

        async fn connect(&self, receiver: PacketSender) -> Result<()> {
            let id = self.replica_id()?.to_owned();
            let mut pools = self.registry.pools.write().await;
            pools
                .entry(self.pool.clone())
                .or_default()
                .insert(id.clone(), receiver);
            debug!(pool = %self.pool, replica = %id, "memory transport connected");
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            let id = self.replica_id()?;
            let mut pools = self.registry.pools.write().await;
            if let Some(members) = pools.get_mut(&self.pool) {
                members.remove(id);
                if members.is_empty() {
                    pools.remove(&self.pool);
                }
            }
            debug!(pool = %self.pool, replica = %id, "memory transport disconnected");
            Ok(())
        }

        async fn send_packet(&self, packet: String) -> Result<()> {
            let from = self.replica_id()?;
            let (to, rest) = split_recipient(&packet)?;

            let pools = self.registry.pools.read().await;
            let members = pools
                .get(&self.pool)
                .filter(|members| members.contains_key(from))
                .ok_or_else(|| SyncError::Transport("memory transport is not connected".into()))?;

            let delivered = format!("{from} {rest}");
            if to == BROADCAST_ID {
                for (peer, sender) in members.iter().filter(|(peer, _)| *peer != from) {
                    // Receivers that went away are simply skipped.
                    if sender.send(delivered.clone()).is_err() {
                        trace!(pool = %self.pool, peer = %peer, "dropping packet for closed peer");
                    }
                }
            } else if let Some(sender) = members.get(to) {
                if sender.send(delivered).is_err() {
                    trace!(pool = %self.pool, peer = %to, "dropping packet for closed peer");
                }
            } else {
                debug!(pool = %self.pool, peer = %to, "dropping packet for unknown peer");
            }
            Ok(())
        }
    }
}
