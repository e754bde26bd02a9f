//! The Synclet: one replica of a synchronized tree.
//!
//! A synclet owns a data connector, a meta connector and any number of
//! transports. Every protocol-driven connector access runs on its
//! [`SyncQueue`], so reconciliation of one replica is strictly sequential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use synclet_core::{
    Address, Atom, Binding, Context, CoreError, Hash, HlcClock, Message, Timestamp, BROADCAST_ID,
    PROTOCOL_VERSION,
};
use synclet_store::{ensure_leaf, ensure_within, DataConnector, MetaConnector};
use synclet_sync::{digest, PacketLayer, Reconciler, SyncQueue, Transport};

use crate::config::{SyncletConfig, SyncletHooks};
use crate::error::{Result, SyncletError};

/// A transport attached to a synclet, with its own reassembly buffers.
struct AttachedTransport {
    transport: Arc<dyn Transport>,
    packets: PacketLayer,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

struct SyncletInner<D, M> {
    id: String,
    reconciler: Reconciler<D, M>,
    transports: Vec<AttachedTransport>,
    hooks: SyncletHooks,
    clock: HlcClock,
    queue: SyncQueue,
    started: AtomicBool,
    /// Serializes start and stop.
    lifecycle: tokio::sync::Mutex<()>,
}

/// Builder for [`Synclet`].
///
/// Building binds the connectors and every transport to the new synclet's
/// id. A component already bound elsewhere fails the build.
pub struct SyncletBuilder<D, M> {
    data: Arc<D>,
    meta: Arc<M>,
    transports: Vec<Arc<dyn Transport>>,
    config: SyncletConfig,
    hooks: SyncletHooks,
}

impl<D: DataConnector, M: MetaConnector> SyncletBuilder<D, M> {
    /// Start a builder over a connector pair.
    pub fn new(data: Arc<D>, meta: Arc<M>) -> Self {
        Self {
            data,
            meta,
            transports: Vec::new(),
            config: SyncletConfig::default(),
            hooks: SyncletHooks::default(),
        }
    }

    /// Attach a transport. May be called several times.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Replace the id and packet settings.
    pub fn config(mut self, config: SyncletConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the message hooks.
    pub fn hooks(mut self, hooks: SyncletHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate the configuration and bind every component.
    pub fn build(self) -> Result<Synclet<D, M>> {
        let (data_depth, meta_depth) = (self.data.depth(), self.meta.depth());
        if data_depth != meta_depth {
            return Err(SyncletError::DepthMismatch {
                data: data_depth,
                meta: meta_depth,
            });
        }

        let id = self.config.id.unwrap_or_else(random_id);
        if id.is_empty() || id == BROADCAST_ID || id.contains(char::is_whitespace) {
            return Err(SyncletError::InvalidId(id));
        }

        let mut bindings: Vec<(&'static str, &Binding)> = vec![
            ("data connector", self.data.binding()),
            ("meta connector", self.meta.binding()),
        ];
        bindings.extend(
            self.transports
                .iter()
                .map(|transport| ("transport", transport.binding())),
        );
        check_unbound(&bindings, &id)?;
        for (kind, binding) in bindings {
            binding.bind(kind, &id)?;
        }

        let transports = self
            .transports
            .into_iter()
            .map(|transport| AttachedTransport {
                transport,
                packets: PacketLayer::new(self.config.fragment_size),
                receiver: Mutex::new(None),
            })
            .collect();

        debug!(synclet = %id, depth = data_depth, "synclet built");

        Ok(Synclet {
            inner: Arc::new(SyncletInner {
                clock: HlcClock::new(&id),
                id,
                reconciler: Reconciler::new(self.data, self.meta),
                transports,
                hooks: self.hooks,
                queue: SyncQueue::new(),
                started: AtomicBool::new(false),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

/// One replica of a fixed-depth tree kept in sync with its peers.
///
/// Cloning is cheap; clones share the same replica.
pub struct Synclet<D, M> {
    inner: Arc<SyncletInner<D, M>>,
}

impl<D, M> Clone for Synclet<D, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: DataConnector, M: MetaConnector> Synclet<D, M> {
    /// Shorthand for [`SyncletBuilder::new`].
    pub fn builder(data: Arc<D>, meta: Arc<M>) -> SyncletBuilder<D, M> {
        SyncletBuilder::new(data, meta)
    }

    /// This replica's id on every transport.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Depth of the tree, shared by both connectors.
    pub fn depth(&self) -> usize {
        self.inner.reconciler.depth()
    }

    /// Whether `start` has completed and `stop` has not been called since.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// The data connector.
    pub fn data(&self) -> &Arc<D> {
        self.inner.reconciler.data()
    }

    /// The meta connector.
    pub fn meta(&self) -> &Arc<M> {
        self.inner.reconciler.meta()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Connect everything and announce the root digest to all peers.
    ///
    /// Starting a started synclet does nothing.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let _guard = inner.lifecycle.lock().await;
            if self.is_started() {
                return Ok(());
            }

            inner.reconciler.data().connect().await?;
            inner.reconciler.meta().connect().await?;

            for (index, attached) in inner.transports.iter().enumerate() {
                let (tx, rx) = mpsc::unbounded_channel();
                attached.transport.connect(tx).await?;
                let handle = tokio::spawn(receive_loop(Arc::clone(inner), index, rx));
                *attached
                    .receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }

            inner.started.store(true, Ordering::Release);
            info!(
                synclet = %inner.id,
                depth = self.depth(),
                transports = inner.transports.len(),
                "synclet started"
            );
        }

        self.sync(&Address::root()).await
    }

    /// Disconnect transports, drop partial messages, then disconnect the
    /// connectors. Stopping a stopped synclet does nothing.
    ///
    /// Every component is torn down even if an earlier one fails; the first
    /// failure is returned.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;
        if !self.is_started() {
            return Ok(());
        }
        inner.started.store(false, Ordering::Release);

        let mut first_error: Option<SyncletError> = None;
        for attached in &inner.transports {
            let handle = attached
                .receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                handle.abort();
            }
            attached.packets.clear();
            if let Err(error) = attached.transport.disconnect().await {
                warn!(synclet = %inner.id, %error, "failed to disconnect transport");
                first_error.get_or_insert(error.into());
            }
        }

        let connectors = [
            inner.reconciler.data().disconnect().await,
            inner.reconciler.meta().disconnect().await,
        ];
        for error in connectors.into_iter().filter_map(|result| result.err()) {
            warn!(synclet = %inner.id, %error, "failed to disconnect connector");
            first_error.get_or_insert(error.into());
        }

        info!(synclet = %inner.id, "synclet stopped");
        first_error.map_or(Ok(()), Err)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol
    // ─────────────────────────────────────────────────────────────────────────

    /// Broadcast the representative node at `address` on every transport.
    ///
    /// Does nothing while stopped.
    pub async fn sync(&self, address: &Address) -> Result<()> {
        ensure_within(address, self.depth())?;
        if !self.is_started() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let address = address.clone();
        self.inner
            .queue
            .run(async move { inner.propagate(&address).await })
            .await?;
        Ok(())
    }

    /// Handle a message from `from`, replying to it on every transport.
    ///
    /// Dropped while stopped. Messages from this replica or the broadcast
    /// id, and messages with a mismatched version or depth, are dropped with
    /// a warning.
    pub async fn receive_message(&self, message: Message, from: &str) -> Result<()> {
        SyncletInner::receive(&self.inner, message, from, None).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Write an atom with a fresh clock timestamp and propagate it.
    pub async fn set_atom(&self, address: &Address, atom: impl Into<Atom>) -> Result<Timestamp> {
        self.write_local(address, Some(atom.into()), None).await
    }

    /// Write an atom with an explicit timestamp and propagate it.
    pub async fn set_atom_at(
        &self,
        address: &Address,
        atom: impl Into<Atom>,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.write_local(address, Some(atom.into()), Some(timestamp))
            .await
            .map(drop)
    }

    /// Delete an atom, leaving a tombstone timestamp, and propagate it.
    pub async fn delete_atom(&self, address: &Address) -> Result<Timestamp> {
        self.write_local(address, None, None).await
    }

    /// Delete an atom with an explicit tombstone timestamp and propagate it.
    pub async fn delete_atom_at(&self, address: &Address, timestamp: Timestamp) -> Result<()> {
        self.write_local(address, None, Some(timestamp))
            .await
            .map(drop)
    }

    async fn write_local(
        &self,
        address: &Address,
        atom: Option<Atom>,
        timestamp: Option<Timestamp>,
    ) -> Result<Timestamp> {
        ensure_leaf(address, self.depth())?;
        let inner = Arc::clone(&self.inner);
        let address = address.clone();
        let timestamp = self
            .inner
            .queue
            .run(async move {
                let timestamp = match timestamp {
                    Some(timestamp) => timestamp,
                    None => {
                        // A local write must outrank the value it replaces.
                        let current = inner.reconciler.meta().read_timestamp(&address).await?;
                        inner.clock.next_after(&current).ok_or_else(|| {
                            CoreError::TimestampExhausted(current.as_str().to_owned())
                        })?
                    }
                };
                debug!(
                    synclet = %inner.id,
                    %address,
                    timestamp = timestamp.as_str(),
                    delete = atom.is_none(),
                    "local write"
                );
                inner
                    .reconciler
                    .apply_leaf(&address, timestamp.clone(), atom)
                    .await?;
                if inner.started.load(Ordering::Acquire) {
                    inner.propagate(&address).await?;
                }
                Ok(timestamp)
            })
            .await?;
        Ok(timestamp)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Atom at a leaf; `None` if never written or deleted.
    pub async fn get_atom(&self, address: &Address) -> Result<Option<Atom>> {
        ensure_leaf(address, self.depth())?;
        Ok(self.data().read_atom(address).await?)
    }

    /// Timestamp at a leaf; empty if never written.
    pub async fn get_timestamp(&self, address: &Address) -> Result<Timestamp> {
        ensure_leaf(address, self.depth())?;
        Ok(self.meta().read_timestamp(address).await?)
    }

    /// Digest of the subtree at an interior address.
    pub async fn digest(&self, address: &Address) -> Result<Hash> {
        ensure_within(address, self.depth())?;
        Ok(digest(self.meta().as_ref(), address).await?)
    }
}

impl<D, M> std::fmt::Debug for Synclet<D, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synclet")
            .field("id", &self.inner.id)
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("transports", &self.inner.transports.len())
            .finish()
    }
}

impl<D: DataConnector, M: MetaConnector> SyncletInner<D, M> {
    fn depth(&self) -> usize {
        self.reconciler.depth()
    }

    /// Broadcast the representative node at `address`. Runs on the queue.
    async fn propagate(&self, address: &Address) -> synclet_sync::Result<()> {
        self.propagate_except(address, None).await
    }

    /// Broadcast on every transport but `skip`.
    async fn propagate_except(
        &self,
        address: &Address,
        skip: Option<usize>,
    ) -> synclet_sync::Result<()> {
        let node = self.reconciler.representative(address).await?;
        let message = Message::new(
            self.depth(),
            address.clone(),
            node,
            self.hooks.send_context(None),
        );
        for (index, attached) in self.transports.iter().enumerate() {
            if Some(index) != skip {
                self.send(attached, &message, None).await?;
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        attached: &AttachedTransport,
        message: &Message,
        to: Option<&str>,
    ) -> synclet_sync::Result<()> {
        self.hooks.sent(message, to);
        debug!(
            synclet = %self.id,
            to = to.unwrap_or(BROADCAST_ID),
            address = %message.address,
            node = message.node.kind(),
            "sending message"
        );
        attached
            .packets
            .send_packets(attached.transport.as_ref(), message, to)
            .await
    }

    /// Validate, reconcile and reply. `via` names the transport the message
    /// arrived on; `None` replies through every transport.
    async fn receive(
        self: &Arc<Self>,
        message: Message,
        from: &str,
        via: Option<usize>,
    ) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            debug!(synclet = %self.id, from, "dropping message while stopped");
            return Ok(());
        }
        if from == self.id || from == BROADCAST_ID {
            warn!(synclet = %self.id, from, "dropping message with invalid sender");
            return Ok(());
        }
        if message.version != PROTOCOL_VERSION {
            warn!(
                synclet = %self.id,
                from,
                version = message.version,
                "dropping message with unsupported protocol version"
            );
            return Ok(());
        }
        if message.depth != self.depth() {
            warn!(
                synclet = %self.id,
                from,
                depth = message.depth,
                expected = self.depth(),
                "dropping message with mismatched depth"
            );
            return Ok(());
        }

        if message.address.len() > self.depth() {
            warn!(
                synclet = %self.id,
                from,
                address = %message.address,
                "dropping message addressed below the leaves"
            );
            return Ok(());
        }

        self.hooks.received(&message, from);
        if !self.hooks.can_receive(&message.context) {
            debug!(synclet = %self.id, from, "message rejected by receive hook");
            return Ok(());
        }

        debug!(
            synclet = %self.id,
            from,
            address = %message.address,
            node = message.node.kind(),
            "received message"
        );

        let inner = Arc::clone(self);
        let from = from.to_owned();
        self.queue
            .run(async move {
                let Message {
                    address,
                    node,
                    context,
                    ..
                } = message;

                // With several transports, changes learned on one are relayed
                // to the others.
                let before = match via {
                    Some(_) if inner.transports.len() > 1 => {
                        Some(inner.reconciler.representative(&address).await?)
                    }
                    _ => None,
                };

                if let Some(node) = inner.reconciler.transform_node(&address, node).await? {
                    let reply = Message::new(
                        inner.depth(),
                        address.clone(),
                        node,
                        inner.hooks.send_context(Some(&context)),
                    );
                    inner.reply(&reply, &from, via).await?;
                }

                if let Some(before) = before {
                    if inner.reconciler.representative(&address).await? != before {
                        debug!(synclet = %inner.id, %address, "relaying change");
                        inner.propagate_except(&address, via).await?;
                    }
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn reply(
        &self,
        message: &Message,
        to: &str,
        via: Option<usize>,
    ) -> synclet_sync::Result<()> {
        match via.and_then(|index| self.transports.get(index)) {
            Some(attached) => self.send(attached, message, Some(to)).await,
            None => {
                for attached in &self.transports {
                    self.send(attached, message, Some(to)).await?;
                }
                Ok(())
            }
        }
    }
}

/// Feed packets from one transport into its packet layer until the
/// transport goes away.
async fn receive_loop<D: DataConnector, M: MetaConnector>(
    inner: Arc<SyncletInner<D, M>>,
    index: usize,
    mut packets: mpsc::UnboundedReceiver<String>,
) {
    while let Some(packet) = packets.recv().await {
        let Some(attached) = inner.transports.get(index) else {
            return;
        };
        match attached.packets.receive_packet(&packet) {
            Ok(Some((from, message))) => {
                if let Err(error) = SyncletInner::receive(&inner, message, &from, Some(index)).await
                {
                    warn!(synclet = %inner.id, from = %from, %error, "failed to handle message");
                }
            }
            Ok(None) => {}
            Err(error) => warn!(synclet = %inner.id, %error, "dropping malformed packet"),
        }
    }
}

/// Fail if any component is already owned or listed twice.
fn check_unbound(bindings: &[(&'static str, &Binding)], id: &str) -> Result<()> {
    for (index, &(kind, binding)) in bindings.iter().enumerate() {
        if let Some(owner) = binding.owner() {
            return Err(CoreError::AlreadyBound {
                kind,
                owner: owner.to_owned(),
            }
            .into());
        }
        if bindings[..index]
            .iter()
            .any(|(_, other)| std::ptr::eq(*other, binding))
        {
            return Err(CoreError::AlreadyBound {
                kind,
                owner: id.to_owned(),
            }
            .into());
        }
    }
    Ok(())
}

fn random_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}
