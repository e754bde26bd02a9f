//! Synclet configuration and extension hooks.

use std::fmt;
use std::sync::Arc;

use synclet_core::{Context, Message};
use synclet_sync::DEFAULT_FRAGMENT_SIZE;

/// Configuration for a [`Synclet`](crate::Synclet).
#[derive(Debug, Clone)]
pub struct SyncletConfig {
    /// Replica id. A random 16 hex digit id is generated when `None`.
    pub id: Option<String>,
    /// Maximum packet payload length, in characters.
    pub fragment_size: usize,
}

impl Default for SyncletConfig {
    fn default() -> Self {
        Self {
            id: None,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl SyncletConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size;
        self
    }
}

type CanReceiveFn = dyn Fn(&Context) -> bool + Send + Sync;
type SendContextFn = dyn Fn(Option<&Context>) -> Context + Send + Sync;
type OnSendFn = dyn Fn(&Message, Option<&str>) + Send + Sync;
type OnReceiveFn = dyn Fn(&Message, &str) + Send + Sync;

/// Optional collaborators consulted around the reconciliation algorithm.
///
/// None of these influence how trees are compared; they gate, annotate or
/// observe messages.
#[derive(Clone, Default)]
pub struct SyncletHooks {
    can_receive_message: Option<Arc<CanReceiveFn>>,
    get_send_context: Option<Arc<SendContextFn>>,
    on_send: Option<Arc<OnSendFn>>,
    on_receive: Option<Arc<OnReceiveFn>>,
}

impl SyncletHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate inbound messages on their context. Rejected messages are
    /// dropped before reconciliation.
    pub fn with_can_receive_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.can_receive_message = Some(Arc::new(f));
        self
    }

    /// Produce the context of outgoing messages. Receives the context of
    /// the message being answered, or `None` for propagation.
    pub fn with_get_send_context<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Context>) -> Context + Send + Sync + 'static,
    {
        self.get_send_context = Some(Arc::new(f));
        self
    }

    /// Observe every outgoing message and its recipient (`None` = broadcast).
    pub fn with_on_send<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message, Option<&str>) + Send + Sync + 'static,
    {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Observe every well-formed inbound message and its sender.
    pub fn with_on_receive<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message, &str) + Send + Sync + 'static,
    {
        self.on_receive = Some(Arc::new(f));
        self
    }

    pub(crate) fn can_receive(&self, context: &Context) -> bool {
        self.can_receive_message
            .as_ref()
            .map_or(true, |f| f(context))
    }

    pub(crate) fn send_context(&self, received: Option<&Context>) -> Context {
        self.get_send_context
            .as_ref()
            .map_or_else(Context::new, |f| f(received))
    }

    pub(crate) fn sent(&self, message: &Message, to: Option<&str>) {
        if let Some(f) = &self.on_send {
            f(message, to);
        }
    }

    pub(crate) fn received(&self, message: &Message, from: &str) {
        if let Some(f) = &self.on_receive {
            f(message, from);
        }
    }
}

impl fmt::Debug for SyncletHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncletHooks")
            .field("can_receive_message", &self.can_receive_message.is_some())
            .field("get_send_context", &self.get_send_context.is_some())
            .field("on_send", &self.on_send.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_hooks_pass_through() {
        let hooks = SyncletHooks::new();
        assert!(hooks.can_receive(&Context::new()));
        assert!(hooks.send_context(None).is_empty());
    }

    #[test]
    fn test_send_context_sees_received_context() {
        let hooks = SyncletHooks::new().with_get_send_context(|received| {
            let mut context = Context::new();
            let hops = received
                .and_then(|c| c.get("hops"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            context.insert("hops".into(), json!(hops + 1));
            context
        });

        let mut received = Context::new();
        received.insert("hops".into(), json!(2));
        assert_eq!(hooks.send_context(Some(&received))["hops"], json!(3));
        assert_eq!(hooks.send_context(None)["hops"], json!(1));
    }

    #[test]
    fn test_config_builders() {
        let config = SyncletConfig::default().with_id("a").with_fragment_size(16);
        assert_eq!(config.id.as_deref(), Some("a"));
        assert_eq!(config.fragment_size, 16);
    }
}
