//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: replicas sharing an in-memory
//! transport pool, and polling helpers for asynchronous convergence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use synclet::{Result, Synclet, SyncletBuilder, SyncletConfig, SyncletHooks};
use synclet_core::Address;
use synclet_store::{MemoryDataConnector, MemoryMetaConnector};
use synclet_sync::{verify_convergence, MemoryTransportRegistry};

/// A synclet over the in-memory reference connectors.
pub type MemorySynclet = Synclet<MemoryDataConnector, MemoryMetaConnector>;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Install a test-friendly tracing subscriber, filtered by `RUST_LOG`.
///
/// Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replicas of one tree connected through a shared memory transport pool.
pub struct ReplicaPool {
    registry: Arc<MemoryTransportRegistry>,
    pool: String,
    depth: usize,
    replicas: Vec<MemorySynclet>,
}

impl ReplicaPool {
    pub fn new(depth: usize) -> Self {
        Self {
            registry: MemoryTransportRegistry::new(),
            pool: "testkit".to_owned(),
            depth,
            replicas: Vec::new(),
        }
    }

    pub fn replicas(&self) -> &[MemorySynclet] {
        &self.replicas
    }

    /// Add a replica with default hooks.
    pub fn add(&mut self, id: &str) -> Result<MemorySynclet> {
        self.add_with(id, SyncletHooks::default(), SyncletConfig::default())
    }

    /// Add a replica with custom hooks and config. The id always wins over
    /// `config.id`.
    pub fn add_with(
        &mut self,
        id: &str,
        hooks: SyncletHooks,
        config: SyncletConfig,
    ) -> Result<MemorySynclet> {
        let synclet = SyncletBuilder::new(
            Arc::new(MemoryDataConnector::new(self.depth)),
            Arc::new(MemoryMetaConnector::new(self.depth)),
        )
        .transport(Arc::new(self.registry.create_transport(self.pool.as_str())))
        .config(config.with_id(id))
        .hooks(hooks)
        .build()?;
        self.replicas.push(synclet.clone());
        Ok(synclet)
    }

    pub async fn start_all(&self) -> Result<()> {
        for replica in &self.replicas {
            replica.start().await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        for replica in &self.replicas {
            replica.stop().await?;
        }
        Ok(())
    }

    /// Whether every replica holds the same timestamps and atoms.
    pub async fn converged(&self) -> Result<bool> {
        let Some((first, rest)) = self.replicas.split_first() else {
            return Ok(true);
        };
        let atoms = first.data().snapshot();
        for other in rest {
            let result =
                verify_convergence(first.meta().as_ref(), other.meta().as_ref()).await?;
            if !result.is_converged() || other.data().snapshot() != atoms {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Wait for the replicas to converge. Returns `false` on timeout.
    pub async fn settle(&self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.converged().await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Ask every replica to rebroadcast its root digest.
    pub async fn resync(&self) -> Result<()> {
        for replica in &self.replicas {
            replica.sync(&Address::root()).await?;
        }
        Ok(())
    }
}

/// Poll `condition` until it holds. Returns `false` on timeout.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_pool_is_converged() {
        let pool = ReplicaPool::new(1);
        assert!(pool.converged().await.unwrap());
    }

    #[tokio::test]
    async fn test_pool_assigns_ids() {
        let mut pool = ReplicaPool::new(2);
        let a = pool.add("a").unwrap();
        let b = pool.add("b").unwrap();
        assert_eq!(a.id(), "a");
        assert_eq!(b.id(), "b");
        assert_eq!(pool.replicas().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(20), || async { false }).await);
        assert!(wait_until(Duration::from_millis(20), || async { true }).await);
    }
}
