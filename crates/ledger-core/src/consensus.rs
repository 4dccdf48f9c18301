use crate::{
    chain::{check_chain, Ledger},
    error::PeerError,
    Block,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A node's full chain as served to peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl ChainSnapshot {
    pub fn of(ledger: &Ledger) -> Self {
        let chain = ledger.chain();
        Self {
            length: chain.len() as u64,
            chain,
        }
    }
}

/// Retrieves a peer's chain. Implemented by the transport; faked in tests.
#[async_trait]
pub trait PeerFetcher: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError>;
}

/// Known peer addresses in `host:port` form.
#[derive(Clone, Debug, Default)]
pub struct PeerSet {
    peers: HashSet<String>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the address was already known.
    pub fn insert(&mut self, address: impl Into<String>) -> bool {
        self.peers.insert(address.into())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PeerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            peers: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Longest-valid-chain rule over a set of peers.
pub struct ConsensusResolver<F: ?Sized> {
    fetcher: Arc<F>,
}

impl<F: PeerFetcher + ?Sized> ConsensusResolver<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self { fetcher }
    }

    /// Queries every peer in turn and adopts the longest chain that is strictly longer than
    /// the local one and valid. Unreachable peers and invalid chains are skipped.
    ///
    /// Only the final swap touches the ledger lock. Among equally long winners the first
    /// one scanned is kept; peer order is unspecified.
    pub async fn resolve_conflicts(&self, ledger: &Ledger, peers: &PeerSet) -> bool {
        let mut max_length = ledger.len();
        let mut best: Option<(&str, Vec<Block>)> = None;

        for peer in peers.iter() {
            let snapshot = match self.fetcher.fetch_chain(peer).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(%err, "skipping peer");
                    continue;
                }
            };
            if snapshot.length != snapshot.chain.len() as u64 {
                debug!(
                    peer,
                    declared = snapshot.length,
                    actual = snapshot.chain.len(),
                    "peer chain length mismatch"
                );
                continue;
            }
            if snapshot.chain.len() <= max_length {
                continue;
            }
            if let Err(err) = check_chain(&snapshot.chain) {
                debug!(peer, %err, "rejecting invalid peer chain");
                continue;
            }
            max_length = snapshot.chain.len();
            best = Some((peer, snapshot.chain));
        }

        match best {
            Some((peer, chain)) => {
                let replaced = ledger.replace_chain(chain);
                if replaced {
                    info!(peer, length = max_length, "adopted longer chain from peer");
                }
                replaced
            }
            None => false,
        }
    }
}
