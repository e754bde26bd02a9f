//! Convergence verification.
//!
//! After syncing, two replicas can check they agree by comparing root
//! digests, and locate the first disagreeing leaf by walking both trees
//! only where digests differ.

use std::collections::BTreeSet;

use futures::future::BoxFuture;
use futures::FutureExt;

use synclet_core::{Address, Timestamp};
use synclet_store::MetaConnector;

use crate::digest::digest;
use crate::error::Result;

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both replicas hold identical timestamps everywhere.
    Converged,
    /// The replicas disagree at `address`.
    Diverged {
        address: Address,
        local: Timestamp,
        remote: Timestamp,
    },
}

impl ConvergenceResult {
    /// Check if replicas have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two replicas' meta connectors.
///
/// Both connectors must share the same depth.
pub async fn verify_convergence<L, R>(local: &L, remote: &R) -> Result<ConvergenceResult>
where
    L: MetaConnector + ?Sized,
    R: MetaConnector + ?Sized,
{
    let root = Address::root();
    Ok(first_divergence(local, remote, &root)
        .await?
        .unwrap_or(ConvergenceResult::Converged))
}

fn first_divergence<'a, L, R>(
    local: &'a L,
    remote: &'a R,
    address: &'a Address,
) -> BoxFuture<'a, Result<Option<ConvergenceResult>>>
where
    L: MetaConnector + ?Sized,
    R: MetaConnector + ?Sized,
{
    async move {
        if address.is_leaf(local.depth()) {
            let mine = local.read_timestamp(address).await?;
            let theirs = remote.read_timestamp(address).await?;
            return Ok((mine != theirs).then(|| ConvergenceResult::Diverged {
                address: address.clone(),
                local: mine,
                remote: theirs,
            }));
        }

        if digest(local, address).await? == digest(remote, address).await? {
            return Ok(None);
        }

        let ids: BTreeSet<String> = local
            .read_child_ids(address)
            .await?
            .into_iter()
            .chain(remote.read_child_ids(address).await?)
            .collect();

        for id in ids {
            let child = address.child(id);
            if let Some(divergence) = first_divergence(local, remote, &child).await? {
                return Ok(Some(divergence));
            }
        }
        Ok(None)
    }
    .boxed()
}
