#![allow(dead_code)]

use async_trait::async_trait;
use ledger_core::{mine::mine, ChainSnapshot, Ledger, PeerError, PeerFetcher};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a ledger with `extra` mined blocks on top of genesis.
pub fn create_ledger(node_id: &str, extra: usize) -> Ledger {
    let ledger = Ledger::new();
    for _ in 0..extra {
        mine(&ledger, node_id);
    }
    ledger
}

/// Serves the current chain of in-process ledgers, keyed by peer address.
#[derive(Default)]
pub struct LocalPeers {
    nodes: HashMap<String, Arc<Ledger>>,
}

impl LocalPeers {
    pub fn with(mut self, address: &str, ledger: Arc<Ledger>) -> Self {
        self.nodes.insert(address.to_string(), ledger);
        self
    }
}

#[async_trait]
impl PeerFetcher for LocalPeers {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        match self.nodes.get(peer) {
            Some(ledger) => Ok(ChainSnapshot::of(ledger)),
            None => Err(PeerError::Status {
                peer: peer.to_string(),
                status: 503,
            }),
        }
    }
}
